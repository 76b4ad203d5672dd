//! AlertBridge - monitoring alert をタスクに変換する
//!
//! 重複排除はしない。同じ alert を 2 回送れば 2 つのタスクになる。

use std::sync::Arc;

use tracing::info;

use crate::app::engine::TaskEngine;
use crate::domain::{Alert, ManagerError, Task, TaskOrigin};
use crate::ports::{AlertRequest, ResolutionService};

#[derive(Clone)]
pub struct AlertBridge {
    engine: TaskEngine,
    resolver: Arc<dyn ResolutionService>,
}

impl AlertBridge {
    pub fn new(engine: TaskEngine, resolver: Arc<dyn ResolutionService>) -> Self {
        Self { engine, resolver }
    }

    pub async fn resolve(&self, alert: &Alert) -> Result<Task, ManagerError> {
        if alert.title.trim().is_empty() {
            return Err(ManagerError::precondition("alert title is empty"));
        }

        let response = self
            .resolver
            .resolve(&AlertRequest {
                title: alert.title.clone(),
                description: alert.description.clone(),
            })
            .await?;
        info!(alert = %alert.title, goal = %response.goal, "alert resolved to goal");

        self.engine
            .create_with_origin(
                &response.goal,
                TaskOrigin::Alert {
                    title: alert.title.clone(),
                },
            )
            .await
    }
}
