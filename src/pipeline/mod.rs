//! Pipeline Module
//!
//! Drives orders through their steps.
//!
//! ## Architecture
//! - **`PipelineManager`**: owns a fixed number of shards and assigns new or
//!   reloaded orders to them round-robin.
//! - **`Pipeline`**: one shard. Keeps its in-flight jobs and one task handler per
//!   step, and decides where a job goes after each step.
//! - **`StepTaskHandler`**: a bounded FIFO queue plus a single worker for one step.
//! - **`StepRegistry`**: the async action executed for each step.
//!
//! ## Flow
//! 1. The manager appends the order to a shard, which computes its next step.
//! 2. The step's handler opens (or rolls back) the step, runs its action and saves.
//! 3. The handler hands the job back; the shard dispatches it again until it
//!    reaches a terminal step with nothing left to roll back, then finalizes it.
//!
//! Jobs whose save failed are parked and retried by a periodic sweep.

pub mod handler;
pub mod job;
pub mod manager;
pub mod registry;
pub mod shard;
pub mod steps;

pub use handler::{PipelineEvent, StepTaskHandler};
pub use job::{ProcessJob, SharedJob};
pub use manager::{PipelineManager, PipelineSettings};
pub use registry::{StepContext, StepRegistry};
pub use shard::Pipeline;
