//! CommandConsole - シェルコマンドのシミュレーション
//!
//! コマンドは実行しない。command simulator が返した出力をそのまま返すだけ。

use std::sync::Arc;

use tracing::debug;

use crate::domain::ManagerError;
use crate::ports::CommandSimulator;

#[derive(Clone)]
pub struct CommandConsole {
    simulator: Arc<dyn CommandSimulator>,
}

impl CommandConsole {
    pub fn new(simulator: Arc<dyn CommandSimulator>) -> Self {
        Self { simulator }
    }

    pub async fn simulate(&self, command: &str) -> Result<String, ManagerError> {
        let command = command.trim();
        if command.is_empty() {
            return Err(ManagerError::precondition("command is empty"));
        }
        debug!(command, "simulating command");
        Ok(self.simulator.simulate(command).await?)
    }
}
