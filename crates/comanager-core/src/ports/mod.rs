//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（document store, 生成サービス, 実行バックエンド）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - store handle は明示的に渡す（グローバルなシングルトンは持たない）
//! - 生成サービスは request/response の形だけを知っている

pub mod clock;
pub mod event_sink;
pub mod executor;
pub mod id_generator;
pub mod services;
pub mod task_store;

// 主要な trait を再エクスポート
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::EventSink;
pub use self::executor::{StepContext, StepExecutor};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::services::{
    AlertRequest, CommandSimulator, GoalResponse, HealingRequest, Plan, PlanGenerator,
    PlannedStep, ReportRequest, ReportWriter, ResolutionService, SelfHealingService, Services,
};
pub use self::task_store::{ReportStore, StepLogLine, StepLogStore, Stores, TaskStore};
