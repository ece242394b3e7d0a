//! Order Module
//!
//! Everything about a single order: its typed record, the step state machine
//! that moves it forward or back, and the repository that persists it.
//!
//! ## Lifecycle
//! 1. **Create**: `OrderRecord::create` seeds one open `Scheduling` step.
//! 2. **Advance**: the owning pipeline opens and completes steps one at a time.
//! 3. **Rollback**: after a failure, completed steps are compensated newest first.
//! 4. **Finalize**: once a terminal step is reached and nothing is left to roll
//!    back, the order is sealed. Records are never deleted.
//!
//! ## Submodules
//! - **`types`**: record, step and ownership-index data types.
//! - **`record`**: the state machine operations.
//! - **`repository`**: persistence and the per-service ownership index.

pub mod record;
pub mod repository;
pub mod types;

pub use repository::OrderRepository;
pub use types::{
    NewOrder, OrderId, OrderRecord, OrderStateInService, OrderStep, OrderSummary,
    OwnershipEntry, RollbackState, Step,
};
