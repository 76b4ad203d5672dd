//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryStore**: テスト・単発実行用の正本
//! - **JsonFileStore**: ディレクトリ上の JSON ドキュメント（CLI 用）
//! - **SimulatedExecutor**: 遅延 + 確率で成功/失敗するステップ実行
//! - **Template\***: 生成バックエンドなしで動く固定テンプレートのサービス
//! - **NoopEventSink / BroadcastEventSink**

pub mod events;
pub mod file_store;
pub mod memory;
pub mod simulated;
pub mod template;

// 主要な型を再エクスポート
pub use self::events::{BroadcastEventSink, NoopEventSink};
pub use self::file_store::JsonFileStore;
pub use self::memory::InMemoryStore;
pub use self::simulated::SimulatedExecutor;
pub use self::template::{
    TemplateConsole, TemplateHealer, TemplatePlanner, TemplateReportWriter, TemplateResolver,
};
