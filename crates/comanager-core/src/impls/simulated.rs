//! Simulated step executor: sleeps for a random delay and succeeds with a
//! configured probability.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tracing::debug;

use crate::config::ExecutorConfig;
use crate::domain::StepOutcome;
use crate::ports::{StepContext, StepExecutor};

#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    success_probability: f64,
    min_delay: Duration,
    max_delay: Duration,
}

impl SimulatedExecutor {
    pub fn new(config: &ExecutorConfig) -> Self {
        let min = config.min_delay_ms.min(config.max_delay_ms);
        let max = config.min_delay_ms.max(config.max_delay_ms);
        Self {
            success_probability: config.success_probability.clamp(0.0, 1.0),
            min_delay: Duration::from_millis(min),
            max_delay: Duration::from_millis(max),
        }
    }

    /// Draw the delay and the verdict up front; the rng is not held across await.
    fn draw(&self) -> (Duration, bool) {
        let mut rng = rand::thread_rng();
        let delay = if self.min_delay == self.max_delay {
            self.min_delay
        } else {
            rng.gen_range(self.min_delay..=self.max_delay)
        };
        (delay, rng.gen_bool(self.success_probability))
    }
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::new(&ExecutorConfig::default())
    }
}

#[async_trait]
impl StepExecutor for SimulatedExecutor {
    async fn execute(&self, step: &StepContext) -> StepOutcome {
        let (delay, succeeded) = self.draw();
        debug!(task_id = %step.task_id, step = step.number(), ?delay, "simulating step");
        tokio::time::sleep(delay).await;

        if succeeded {
            StepOutcome::success(format!("Step {} completed successfully.", step.number()))
        } else {
            StepOutcome::failure(format!(
                "Step {} failed due to a simulated error.",
                step.number()
            ))
        }
    }
}
