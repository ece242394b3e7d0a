//! Step transition table.
//!
//! | step            | retry           | forward         | failure |
//! |-----------------|-----------------|-----------------|---------|
//! | Scheduling      | Scheduling      | Pre-Processing  | Failed  |
//! | Pre-Processing  | Pre-Processing  | Processing      | Failed  |
//! | Processing      | Processing      | Post-Processing | Failed  |
//! | Post-Processing | Post-Processing | Completed       | Failed  |
//! | Completed       | Completed       | -               | -       |
//! | Failed          | Failed          | -               | -       |

use crate::error::PipelineError;
use crate::order::{OrderRecord, Step};

/// Forward successor of a non-terminal step.
pub fn forward_successor(step: Step) -> Option<Step> {
    match step {
        Step::Scheduling => Some(Step::PreProcessing),
        Step::PreProcessing => Some(Step::Processing),
        Step::Processing => Some(Step::PostProcessing),
        Step::PostProcessing => Some(Step::Completed),
        Step::Completed | Step::Failed => None,
    }
}

/// Successor of a non-terminal step once a failure has been recorded.
pub fn failure_successor(step: Step) -> Option<Step> {
    if step.is_terminal() {
        None
    } else {
        Some(Step::Failed)
    }
}

/// Every step that may legally follow `previous`, itself included.
pub fn legal_successors(previous: Step) -> Vec<Step> {
    let mut steps = vec![previous];
    steps.extend(forward_successor(previous));
    steps.extend(failure_successor(previous));
    steps
}

pub fn verify_step_switch(previous: Step, requested: Step) -> Result<(), PipelineError> {
    if legal_successors(previous).contains(&requested) {
        Ok(())
    } else {
        Err(PipelineError::IllegalTransition {
            from: previous,
            to: requested,
        })
    }
}

/// Which handler an order has to visit next.
///
/// 1. An open step without failure is re-dispatched to itself.
/// 2. A terminal order that is still rolling back visits the next step to compensate.
/// 3. Otherwise the table decides: forward when healthy, `Failed` after a failure,
///    and a terminal step maps to itself.
pub fn next_step(record: &OrderRecord) -> Result<Step, PipelineError> {
    let current = record.current_step;

    if !record.is_current_step_completed() && !record.failure_occurred {
        return Ok(current);
    }

    if record.is_rollbacking() && record.is_in_terminal_step() {
        return Ok(record.next_rollback_step()?);
    }

    let next = if current.is_terminal() {
        Some(current)
    } else if record.failure_occurred {
        failure_successor(current)
    } else {
        forward_successor(current)
    };

    next.ok_or_else(|| PipelineError::NoNextStep {
        order_id: record.order_id.to_string(),
        current,
    })
}
