//! Step Action Registry
//!
//! Maps each step to the async action that performs it. This is where real
//! business logic plugs in; the default registration simulates the work with a
//! fixed delay and a fixed failure probability.

use crate::order::{OrderId, Step};

use anyhow::Result;
use dashmap::DashMap;
use rand::Rng;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// What a step action gets to see of the order.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub order_id: OrderId,
    pub step: Step,
    pub user_id: String,
}

/// Type-erased async step action. An `Err` is treated as a step failure and
/// sends the order into rollback.
pub type StepActionFn =
    Arc<dyn Fn(StepContext) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> + Send + Sync>;

/// Registry holding the action of every step.
pub struct StepRegistry {
    actions: DashMap<Step, StepActionFn>,
}

impl StepRegistry {
    /// Creates a new, empty registry. Steps without an action complete immediately.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The stand-in for real step execution: every non-terminal step sleeps for
    /// `delay` and fails with probability `failure_ratio`.
    pub fn simulated(delay: Duration, failure_ratio: f64) -> Arc<Self> {
        let registry = Self::new();
        let failure_ratio = failure_ratio.clamp(0.0, 1.0);

        for step in Step::ALL.into_iter().filter(|step| !step.is_terminal()) {
            registry.register(step, move |ctx| async move {
                tokio::time::sleep(delay).await;

                if rand::thread_rng().gen_bool(failure_ratio) {
                    anyhow::bail!("synthetic failure while handling {}", ctx.step);
                }
                Ok(())
            });
        }

        registry
    }

    /// Registers (or replaces) the action of `step`.
    pub fn register<F, Fut>(&self, step: Step, action: F)
    where
        F: Fn(StepContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let action_fn: StepActionFn = Arc::new(move |ctx: StepContext| {
            Box::pin(action(ctx)) as Pin<Box<dyn Future<Output = Result<()>> + Send>>
        });

        self.actions.insert(step, action_fn);

        tracing::debug!("Registered step action: {}", step);
    }

    /// Runs the action registered for `ctx.step`.
    pub async fn execute(&self, ctx: StepContext) -> Result<()> {
        // Clone out of the map so no shard lock is held across the await.
        let action = self.actions.get(&ctx.step).map(|entry| entry.value().clone());

        match action {
            Some(action) => action(ctx).await,
            None => Ok(()),
        }
    }

    pub fn has_action(&self, step: Step) -> bool {
        self.actions.contains_key(&step)
    }

    pub fn action_count(&self) -> usize {
        self.actions.len()
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self {
            actions: DashMap::new(),
        }
    }
}
