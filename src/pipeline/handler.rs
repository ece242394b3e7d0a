//! Step Task Handler
//!
//! One handler per step name and per pipeline shard. Each owns a bounded FIFO
//! queue and a single worker, so jobs of the same step are processed strictly in
//! submission order and never in parallel.

use super::job::{ProcessJob, SharedJob};
use super::registry::{StepContext, StepRegistry};
use super::steps::verify_step_switch;
use crate::error::PipelineError;
use crate::order::{OrderId, Step};

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const MAX_PENDING_TASKS: usize = 10_000;

/// Messages a handler sends back to its pipeline once it releases a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// The job was persisted and needs its next step computed.
    Dispatch(OrderId),
    /// Persisting the job failed; it stays parked until retried.
    Stalled(OrderId),
}

pub struct StepTaskHandler {
    step: Step,
    sender: Mutex<Option<mpsc::Sender<SharedJob>>>,
    receiver: Mutex<Option<mpsc::Receiver<SharedJob>>>,
    pending: AtomicUsize,
    registry: Arc<StepRegistry>,
    events: mpsc::UnboundedSender<PipelineEvent>,
}

impl StepTaskHandler {
    pub fn new(
        step: Step,
        capacity: usize,
        registry: Arc<StepRegistry>,
        events: mpsc::UnboundedSender<PipelineEvent>,
    ) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(capacity.max(1));

        Arc::new(Self {
            step,
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            pending: AtomicUsize::new(0),
            registry,
            events,
        })
    }

    pub fn step(&self) -> Step {
        self.step
    }

    /// Number of jobs waiting in the queue.
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Spawns the worker. Returns `None` if the worker was already started.
    pub fn start(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let receiver = self.receiver.lock().take()?;
        let handler = self.clone();

        Some(tokio::spawn(async move {
            handler.worker_loop(receiver).await;
        }))
    }

    /// Enqueues a job without blocking.
    pub fn submit(&self, job: SharedJob) -> Result<(), PipelineError> {
        let guard = self.sender.lock();
        let sender = guard
            .as_ref()
            .ok_or(PipelineError::HandlerStopped(self.step))?;

        match sender.try_send(job) {
            Ok(()) => {
                self.pending.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => Err(PipelineError::QueueFull(self.step)),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(PipelineError::HandlerStopped(self.step))
            }
        }
    }

    /// Closes the queue. Already queued jobs are still drained by the worker.
    pub fn stop(&self) {
        if self.sender.lock().take().is_some() {
            tracing::debug!("Stopped task handler for step {}", self.step);
        }
    }

    async fn worker_loop(&self, mut receiver: mpsc::Receiver<SharedJob>) {
        tracing::trace!("Task handler for step {} started", self.step);

        while let Some(job) = receiver.recv().await {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            self.handle_job(job).await;
        }

        tracing::trace!("Task handler for step {} drained", self.step);
    }

    /// Runs one job through this step, persists it and hands it back.
    async fn handle_job(&self, job: SharedJob) {
        let mut job = job.lock().await;
        let order_id = job.order_id().clone();

        tracing::debug!("[{}] handling step {}", order_id, self.step);

        if job.record.is_rollbacking() && self.step != Step::Failed {
            self.rollback(&mut job);
        } else {
            self.perform_step(&mut job).await;
        }

        let event = match job.persist().await {
            Ok(()) => PipelineEvent::Dispatch(order_id),
            Err(e) => {
                tracing::error!(
                    "[{}] failed to persist after step {}: {}",
                    order_id,
                    self.step,
                    e
                );
                PipelineEvent::Stalled(order_id)
            }
        };

        if self.events.send(event).is_err() {
            tracing::warn!("Pipeline gone, dropping hand-back from step {}", self.step);
        }
    }

    fn rollback(&self, job: &mut ProcessJob) {
        if job.record.rollback_step(self.step) {
            tracing::info!("[{}] rolled back step {}", job.order_id(), self.step);
        } else {
            tracing::warn!(
                "[{}] nothing to roll back for step {}",
                job.order_id(),
                self.step
            );
        }
    }

    async fn perform_step(&self, job: &mut ProcessJob) {
        if let Err(e) = self.enter_step(job) {
            tracing::warn!("[{}] rejected step {}: {}", job.order_id(), self.step, e);
            Self::fail(job);
            return;
        }

        let outcome = if job.record.is_in_terminal_step() {
            Ok(())
        } else {
            let ctx = StepContext {
                order_id: job.record.order_id.clone(),
                step: self.step,
                user_id: job.record.user_id.clone(),
            };
            self.registry.execute(ctx).await
        };

        match outcome {
            Ok(()) => {
                job.record.finish_current_step();
                tracing::debug!("[{}] finished step {}", job.order_id(), self.step);
            }
            Err(e) => {
                tracing::info!("[{}] step {} failed: {}", job.order_id(), self.step, e);
                Self::fail(job);
            }
        }
    }

    /// Opens this step on the record, or resumes it when it is already the open,
    /// healthy current step (an order reloaded mid-step).
    fn enter_step(&self, job: &mut ProcessJob) -> Result<(), PipelineError> {
        let record = &mut job.record;

        let resuming = record.current_step == self.step
            && !record.is_current_step_completed()
            && !record.failure_occurred;
        if resuming {
            tracing::debug!("[{}] resuming open step {}", record.order_id, self.step);
            return Ok(());
        }

        verify_step_switch(record.current_step, self.step)?;
        record.start_step(self.step)?;

        tracing::debug!("[{}] started step {}", record.order_id, self.step);
        Ok(())
    }

    fn fail(job: &mut ProcessJob) {
        job.record.mark_failure();
        job.record.start_rollback();
    }
}
