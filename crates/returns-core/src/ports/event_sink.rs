//! EventSink port - イベント記録の抽象化
//!
//! # 実装
//! - TracingEventSink: tracing のイベントとして出力（デフォルト）
//! - NoopEventSink: 何もしない
//! - MemoryEventSink: テスト用に保持

use async_trait::async_trait;

use crate::domain::DomainEvent;

#[derive(Debug, thiserror::Error)]
#[error("event sink failed: {0}")]
pub struct EventSinkError(pub String);

/// EventSink はコミット済みのドメインイベントを受け取る
///
/// 失敗しても既にコミットされた変更は取り消されません。
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: DomainEvent) -> Result<(), EventSinkError>;
}
