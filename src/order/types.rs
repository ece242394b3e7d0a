use crate::error::OrderError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Globally unique order identifier.
///
/// Always a UUID; ids coming from outside the process go through [`OrderId::parse`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn parse(raw: &str) -> Result<Self, OrderError> {
        uuid::Uuid::parse_str(raw)
            .map(|id| Self(id.to_string()))
            .map_err(|_| OrderError::InvalidOrderId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The fixed set of pipeline stages an order moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Step {
    Scheduling,
    #[serde(rename = "Pre-Processing")]
    PreProcessing,
    Processing,
    #[serde(rename = "Post-Processing")]
    PostProcessing,
    Completed,
    Failed,
}

impl Step {
    pub const ALL: [Step; 6] = [
        Step::Scheduling,
        Step::PreProcessing,
        Step::Processing,
        Step::PostProcessing,
        Step::Completed,
        Step::Failed,
    ];

    /// `Completed` and `Failed` end the forward path.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduling => "Scheduling",
            Self::PreProcessing => "Pre-Processing",
            Self::Processing => "Processing",
            Self::PostProcessing => "Post-Processing",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Step::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| OrderError::Validation(format!("unknown step name: {s}")))
    }
}

/// One attempt at a named pipeline stage.
///
/// Entries are append-only; after creation only `completed`, `complete_time`
/// and `rolled_back` ever change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderStep {
    #[serde(rename = "step_name")]
    pub name: Step,
    #[serde(rename = "step_start_time")]
    pub start_time: DateTime<Utc>,
    #[serde(rename = "step_complete_time", default, skip_serializing_if = "Option::is_none")]
    pub complete_time: Option<DateTime<Utc>>,
    #[serde(rename = "step_completed")]
    pub completed: bool,
    #[serde(rename = "step_rolled_back")]
    pub rolled_back: bool,
}

impl OrderStep {
    pub fn open(name: Step) -> Self {
        Self {
            name,
            start_time: Utc::now(),
            complete_time: None,
            completed: false,
            rolled_back: false,
        }
    }
}

/// Whether the compensating pass has been started. `Triggered` never reverts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackState {
    NotTriggered,
    Triggered,
}

/// The full history and current state of one order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRecord {
    pub order_id: OrderId,
    pub current_step: Step,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete_time: Option<DateTime<Utc>>,
    pub steps: Vec<OrderStep>,
    pub user_id: String,
    #[serde(rename = "service_id")]
    pub owning_service_id: String,
    pub finished: bool,
    pub failure_occurred: bool,
    pub rollback_state: RollbackState,
}

/// Input to [`OrderRecord::create`].
#[derive(Debug, Clone, Default)]
pub struct NewOrder {
    pub user_id: Option<String>,
    pub owning_service_id: String,
}

/// Per-service ownership state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStateInService {
    Active,
    Completed,
    Transferred,
}

impl fmt::Display for OrderStateInService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Transferred => write!(f, "transferred"),
        }
    }
}

/// One row of a service's ownership index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OwnershipEntry {
    pub order_id: OrderId,
    pub state: OrderStateInService,
}

/// What an API caller sees of an order. Rollback and failure bookkeeping stay internal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderSummary {
    pub order_id: OrderId,
    pub current_step: Step,
    pub start_time: DateTime<Utc>,
    pub steps: Vec<StepSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complete_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepSummary {
    pub step_name: Step,
    pub step_start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_complete_time: Option<DateTime<Utc>>,
}

impl From<&OrderRecord> for OrderSummary {
    fn from(record: &OrderRecord) -> Self {
        Self {
            order_id: record.order_id.clone(),
            current_step: record.current_step,
            start_time: record.start_time,
            steps: record
                .steps
                .iter()
                .map(|step| StepSummary {
                    step_name: step.name,
                    step_start_time: step.start_time,
                    step_complete_time: step.complete_time.filter(|_| step.completed),
                })
                .collect(),
            complete_time: record.complete_time.filter(|_| record.finished),
        }
    }
}
