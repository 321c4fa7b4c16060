//! EventSink 実装
//!
//! - **TracingEventSink**: `tracing` の INFO イベントとして出力（デフォルト）
//! - **NoopEventSink**: 何もしない
//! - **MemoryEventSink**: 受け取ったイベントを保持（テスト・CLI の出力用）

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::info;

use crate::domain::DomainEvent;
use crate::ports::{EventSink, EventSinkError};

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, event: DomainEvent) -> Result<(), EventSinkError> {
        let payload = serde_json::to_string(&event).map_err(|e| EventSinkError(e.to_string()))?;
        info!(
            target: "returns::events",
            event = event.name(),
            return_id = %event.return_id(),
            payload = %payload,
            "domain event"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn emit(&self, _event: DomainEvent) -> Result<(), EventSinkError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryEventSink {
    events: Arc<Mutex<Vec<DomainEvent>>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn emit(&self, event: DomainEvent) -> Result<(), EventSinkError> {
        self.events.lock().await.push(event);
        Ok(())
    }
}
