//! comanager-core
//!
//! Task lifecycle engine for an IT co-manager: goals become planned tasks whose
//! steps run in order, failed tasks can be superseded by self-healing retries,
//! and finished tasks get a root-cause-analysis report.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, task, outcome, report, errors, events）
//! - **ports**: 抽象化レイヤー（TaskStore, ReportStore, StepLogStore, 生成サービス, StepExecutor, Clock, ...）
//! - **impls**: 実装（InMemoryStore, JsonFileStore, SimulatedExecutor, template services）
//! - **app**: アプリケーションロジック（TaskEngine, SelfHealingCoordinator, RcaReporter, AppBuilder, ...）
//! - **config**: TOML 設定

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;

#[cfg(test)]
mod testing;

pub use crate::app::{App, AppBuilder};
pub use crate::config::Config;
