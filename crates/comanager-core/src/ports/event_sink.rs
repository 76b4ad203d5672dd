//! EventSink port - イベント記録の抽象化
//!
//! # 実装
//! - NoopEventSink: 何もしない
//! - BroadcastEventSink: tokio broadcast で購読者に配信

use crate::domain::DomainEvent;

/// EventSink はドメインイベントを記録
///
/// `emit` is synchronous and must not block: it is called from inside the
/// execution unit between store writes.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DomainEvent);
}
