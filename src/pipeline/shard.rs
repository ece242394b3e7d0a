//! Pipeline shard.
//!
//! Owns the in-flight jobs of a subset of orders and one task handler per step.
//! Handlers hand jobs back over an event channel; the shard's dispatch loop then
//! decides which handler sees the job next, or finalizes it.

use super::handler::{PipelineEvent, StepTaskHandler};
use super::job::{ProcessJob, SharedJob};
use super::registry::StepRegistry;
use super::steps;
use crate::error::{PipelineError, StoreError};
use crate::order::{OrderId, OrderRecord, OrderRepository, Step};

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub struct Pipeline {
    id: usize,
    repository: OrderRepository,
    jobs: Mutex<HashMap<OrderId, SharedJob>>,
    stalled: Mutex<HashSet<OrderId>>,
    handlers: HashMap<Step, Arc<StepTaskHandler>>,
    events: Mutex<Option<mpsc::UnboundedReceiver<PipelineEvent>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Pipeline {
    pub fn new(
        id: usize,
        repository: OrderRepository,
        registry: Arc<StepRegistry>,
        queue_capacity: usize,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let handlers = Step::ALL
            .into_iter()
            .map(|step| {
                let handler =
                    StepTaskHandler::new(step, queue_capacity, registry.clone(), events_tx.clone());
                (step, handler)
            })
            .collect();

        Arc::new(Self {
            id,
            repository,
            jobs: Mutex::new(HashMap::new()),
            stalled: Mutex::new(HashSet::new()),
            handlers,
            events: Mutex::new(Some(events_rx)),
            dispatcher: Mutex::new(None),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Starts every step worker and the dispatch loop. Calling it twice is a no-op.
    pub fn start(self: &Arc<Self>) {
        let Some(mut events) = self.events.lock().take() else {
            return;
        };

        for handler in self.handlers.values() {
            handler.start();
        }

        let pipeline = self.clone();
        *self.dispatcher.lock() = Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                pipeline.handle_event(event).await;
            }
        }));

        tracing::debug!("Pipeline {} started", self.id);
    }

    /// Stops accepting work. Jobs already queued in a handler are drained, but
    /// nothing is dispatched afterwards.
    pub fn stop(&self) {
        for handler in self.handlers.values() {
            handler.stop();
        }
        if let Some(dispatcher) = self.dispatcher.lock().take() {
            dispatcher.abort();
        }

        tracing::debug!("Pipeline {} stopped", self.id);
    }

    pub fn job_count(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.jobs.lock().contains_key(order_id)
    }

    pub fn stalled_count(&self) -> usize {
        self.stalled.lock().len()
    }

    /// Registers `record` as a job of this shard and dispatches it.
    ///
    /// An order that is already registered here is left alone.
    pub async fn append_job(&self, record: OrderRecord) -> Result<(), PipelineError> {
        let order_id = record.order_id.clone();

        {
            let mut jobs = self.jobs.lock();
            if jobs.contains_key(&order_id) {
                tracing::warn!("[{}] already running in pipeline {}", order_id, self.id);
                return Err(PipelineError::DuplicateJob(order_id.to_string()));
            }
            let job = ProcessJob::new(record, self.repository.clone()).shared();
            jobs.insert(order_id.clone(), job);
        }

        tracing::info!("[{}] appended to pipeline {}", order_id, self.id);
        let dispatched = self.dispatch(&order_id).await;
        if dispatched.is_err() {
            self.stall(&order_id);
        }
        dispatched
    }

    /// The handler `order_id` has to visit next.
    pub async fn get_next_step(&self, order_id: &OrderId) -> Result<Step, PipelineError> {
        let job = self.job(order_id)?;
        let job = job.lock().await;
        steps::next_step(&job.record)
    }

    /// Moves a job to its next handler, or finalizes it once it is done.
    pub async fn dispatch(&self, order_id: &OrderId) -> Result<(), PipelineError> {
        let job = self.job(order_id)?;

        let next = {
            let guard = job.lock().await;
            let record = &guard.record;
            if record.is_in_terminal_step() && !record.is_rollbacking() {
                None
            } else {
                Some(steps::next_step(record)?)
            }
        };

        match next {
            None => self.finish_job(order_id, &job).await,
            Some(step) => {
                let handler = self
                    .handlers
                    .get(&step)
                    .ok_or(PipelineError::HandlerStopped(step))?;
                tracing::trace!("[{}] dispatched to {}", order_id, step);
                handler.submit(job)
            }
        }
    }

    /// Re-persists every stalled job and dispatches the ones that succeed.
    ///
    /// Jobs whose ownership moved to another service are dropped.
    pub async fn resume_stalled(&self) -> usize {
        let stalled: Vec<OrderId> = self.stalled.lock().drain().collect();
        let mut resumed = 0;

        for order_id in stalled {
            let Ok(job) = self.job(&order_id) else {
                continue;
            };

            let persisted = job.lock().await.persist().await;
            match persisted {
                Ok(()) => {
                    resumed += 1;
                    if let Err(e) = self.dispatch(&order_id).await {
                        tracing::error!("[{}] dispatch after resume failed: {}", order_id, e);
                        self.stall(&order_id);
                    }
                }
                Err(StoreError::OwnershipLost { service_id, .. }) => {
                    tracing::info!(
                        "[{}] no longer owned by {}, dropping from pipeline {}",
                        order_id,
                        service_id,
                        self.id
                    );
                    self.jobs.lock().remove(&order_id);
                }
                Err(e) => {
                    tracing::warn!("[{}] still stalled: {}", order_id, e);
                    self.stall(&order_id);
                }
            }
        }

        resumed
    }

    async fn handle_event(&self, event: PipelineEvent) {
        match event {
            PipelineEvent::Dispatch(order_id) => {
                if let Err(e) = self.dispatch(&order_id).await {
                    tracing::error!("[{}] dispatch failed: {}", order_id, e);
                    self.stall(&order_id);
                }
            }
            PipelineEvent::Stalled(order_id) => self.stall(&order_id),
        }
    }

    /// Seals a terminal job and removes it. The job stays registered if the
    /// final save fails.
    async fn finish_job(&self, order_id: &OrderId, job: &SharedJob) -> Result<(), PipelineError> {
        {
            let mut guard = job.lock().await;
            if guard.record.finalize()? {
                guard.persist().await?;
            }
        }

        self.jobs.lock().remove(order_id);
        tracing::info!("[{}] finished in pipeline {}", order_id, self.id);
        Ok(())
    }

    fn stall(&self, order_id: &OrderId) {
        if self.contains(order_id) {
            self.stalled.lock().insert(order_id.clone());
        }
    }

    fn job(&self, order_id: &OrderId) -> Result<SharedJob, PipelineError> {
        self.jobs
            .lock()
            .get(order_id)
            .cloned()
            .ok_or_else(|| PipelineError::UnknownJob(order_id.to_string()))
    }
}
