//! Order state machine.
//!
//! Pure transformations over an [`OrderRecord`]. Nothing here touches the store;
//! callers persist the record after every mutation.

use super::types::*;
use crate::error::OrderError;
use chrono::Utc;

impl OrderRecord {
    /// Builds a fresh order with a single open `Scheduling` step.
    ///
    /// `user_id` is mandatory; everything else is defaulted.
    pub fn create(fields: NewOrder) -> Result<Self, OrderError> {
        let user_id = fields
            .user_id
            .filter(|user_id| !user_id.trim().is_empty())
            .ok_or_else(|| OrderError::Validation("user_id is required".to_string()))?;

        let first_step = OrderStep::open(Step::Scheduling);

        Ok(Self {
            order_id: OrderId::new(),
            current_step: Step::Scheduling,
            start_time: first_step.start_time,
            complete_time: None,
            steps: vec![first_step],
            user_id,
            owning_service_id: fields.owning_service_id,
            finished: false,
            failure_occurred: false,
            rollback_state: RollbackState::NotTriggered,
        })
    }

    pub fn is_current_step_completed(&self) -> bool {
        self.steps.last().map(|step| step.completed).unwrap_or(false)
    }

    pub fn is_in_terminal_step(&self) -> bool {
        self.current_step.is_terminal()
    }

    /// Opens a new entry for `name`.
    ///
    /// Rejected when `name` is already the current step, or when the current
    /// step is still open and no failure has been recorded.
    pub fn start_step(&mut self, name: Step) -> Result<(), OrderError> {
        if self.current_step == name {
            return Err(OrderError::Sequence {
                requested: name,
                reason: "the step has already started".to_string(),
            });
        }

        if !self.is_current_step_completed() && !self.failure_occurred {
            return Err(OrderError::Sequence {
                requested: name,
                reason: format!("previous step {} not completed", self.current_step),
            });
        }

        self.steps.push(OrderStep::open(name));
        self.current_step = name;
        Ok(())
    }

    /// Marks the newest entry completed; a terminal step outside of rollback
    /// also finishes the order.
    pub fn finish_current_step(&mut self) {
        let now = Utc::now();
        if let Some(step) = self.steps.last_mut() {
            step.completed = true;
            step.complete_time = Some(now);
        }

        if self.is_in_terminal_step() && !self.is_rollbacking() {
            self.finished = true;
            self.complete_time = Some(now);
        }
    }

    pub fn mark_failure(&mut self) {
        self.failure_occurred = true;
    }

    /// Idempotent. A triggered rollback always implies a recorded failure.
    pub fn start_rollback(&mut self) {
        self.failure_occurred = true;
        self.rollback_state = RollbackState::Triggered;
    }

    pub fn is_rollback_triggered(&self) -> bool {
        self.rollback_state == RollbackState::Triggered
    }

    /// True while rollback is triggered and some non-terminal step is still uncompensated.
    pub fn is_rollbacking(&self) -> bool {
        self.is_rollback_triggered() && self.pending_rollback_index().is_some()
    }

    /// The most recent non-terminal step that has not been rolled back yet.
    pub fn next_rollback_step(&self) -> Result<Step, OrderError> {
        self.pending_rollback_index()
            .map(|index| self.steps[index].name)
            .ok_or(OrderError::NothingToRollback)
    }

    /// Marks the newest uncompensated entry named `name` as rolled back.
    ///
    /// Returns whether an entry was marked.
    pub fn rollback_step(&mut self, name: Step) -> bool {
        match self
            .steps
            .iter_mut()
            .rev()
            .find(|step| step.name == name && !step.rolled_back)
        {
            Some(step) => {
                step.rolled_back = true;
                true
            }
            None => false,
        }
    }

    /// Seals a terminal order. Returns whether anything changed.
    pub fn finalize(&mut self) -> Result<bool, OrderError> {
        if !self.is_in_terminal_step() || self.is_rollbacking() {
            return Err(OrderError::NotReady {
                current: self.current_step,
            });
        }

        if self.finished && self.complete_time.is_some() {
            return Ok(false);
        }

        self.finished = true;
        self.complete_time = Some(Utc::now());
        Ok(true)
    }

    /// The ownership state this record should be indexed under after a save.
    pub fn ownership_state(&self) -> OrderStateInService {
        if self.finished && !self.is_rollbacking() {
            OrderStateInService::Completed
        } else {
            OrderStateInService::Active
        }
    }

    fn pending_rollback_index(&self) -> Option<usize> {
        self.steps
            .iter()
            .rposition(|step| !step.name.is_terminal() && !step.rolled_back)
    }
}
