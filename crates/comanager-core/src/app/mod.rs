//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **TaskEngine**: タスクのライフサイクル（create → execute）
//! - **SelfHealingCoordinator**: 失敗したタスクの置き換え
//! - **RcaReporter**: 1 タスク 1 レポートの RCA
//! - **AlertBridge**: alert → goal → タスク
//! - **CommandConsole**: シェルコマンドのシミュレーション
//! - **AppBuilder / App**: ワイヤリング

pub mod alerts;
pub mod builder;
pub mod console;
pub mod engine;
pub mod healing;
pub mod locks;
pub mod reporter;
pub mod retry;
pub mod status;

// 主要な型を再エクスポート
pub use self::alerts::AlertBridge;
pub use self::builder::{App, AppBuilder, BuildError};
pub use self::console::CommandConsole;
pub use self::engine::{EngineOptions, TaskEngine};
pub use self::healing::{MISSING_FAILURE_LOG, RetryOutcome, SelfHealingCoordinator};
pub use self::locks::KeyedLocks;
pub use self::reporter::{MISSING_STEP_LOG, RcaReporter, REPORT_GUIDANCE};
pub use self::retry::RetryPolicy;
pub use self::status::StatusCounts;
