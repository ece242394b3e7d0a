//! Error Taxonomy
//!
//! One error enum per subsystem. Validation and sequencing errors are recovered
//! inside the pipeline (they drive the order into rollback); store errors stall a
//! single order; cluster errors during startup are fatal to the process.

use crate::order::types::Step;

/// Errors raised by the order state machine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    /// A required field was missing or malformed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A step was requested out of order.
    #[error("cannot start step {requested}: {reason}")]
    Sequence { requested: Step, reason: String },

    /// Rollback was requested but every non-terminal step is already compensated.
    #[error("no step left to roll back")]
    NothingToRollback,

    /// `finalize` was called before the order reached a terminal step.
    #[error("order not ready to be finalized (current step {current})")]
    NotReady { current: Step },

    #[error("{0} is not a valid order id")]
    InvalidOrderId(String),
}

/// Errors raised by the key-hash store and the persistence layer above it.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("key {key} not found in table {table}")]
    NotFound { table: String, key: String },

    #[error("store backend error: {0}")]
    Backend(String),

    #[error("failed to (de)serialize record: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The writing service no longer holds the order as Active.
    #[error("order {order_id} is not active in service {service_id}")]
    OwnershipLost { service_id: String, order_id: String },

    #[error(transparent)]
    Order(#[from] OrderError),
}

/// Errors raised by step task handlers and pipeline shards.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("task handler for step {0} has been stopped")]
    HandlerStopped(Step),

    #[error("task handler queue for step {0} is full")]
    QueueFull(Step),

    #[error("cannot find next step for order {order_id} (current step {current})")]
    NoNextStep { order_id: String, current: Step },

    #[error("illegal step switch from {from} to {to}")]
    IllegalTransition { from: Step, to: Step },

    #[error("job {0} is not registered in this pipeline")]
    UnknownJob(String),

    #[error("job {0} is already registered in this pipeline")]
    DuplicateJob(String),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by the consensus and membership layer.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("no leader is currently known")]
    NoLeader,

    /// The request must be retried against the leader.
    #[error("not the leader, redirect to {leader_addr}")]
    RedirectRequired { leader_addr: String },

    #[error("cannot join a cluster with an existing log")]
    ExistingLog,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to persist consensus state: {0}")]
    Persistence(String),

    #[error("request rejected by {peer}: {reason}")]
    Rejected { peer: String, reason: String },

    #[error("entry {index} was not committed in time")]
    CommitTimeout { index: u64 },
}

/// Errors raised while taking over another service's orders.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised while resolving the caller of an API request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("missing authorization token")]
    MissingToken,

    #[error("invalid authorization token: {0}")]
    InvalidToken(String),
}
