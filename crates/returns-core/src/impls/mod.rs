//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryReturnStore**: 開発・テスト用の正本
//! - **SqliteReturnStore**: SQLite による正本（CLI が使う）
//! - **TracingEventSink / NoopEventSink / MemoryEventSink**: EventSink 実装

pub mod event_sinks;
pub mod inmem_store;
pub mod sqlite_store;

pub use self::event_sinks::{MemoryEventSink, NoopEventSink, TracingEventSink};
pub use self::inmem_store::InMemoryReturnStore;
pub use self::sqlite_store::SqliteReturnStore;
