//! returns-core
//!
//! 受注返品のライフサイクル（状態遷移・在庫戻し・監査ログ）のコア。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, status, notes, return_record, inventory, order, events, errors）
//! - **ports**: 抽象化レイヤー（ReturnStore, Clock, IdGenerator, EventSink）
//! - **impls**: 実装（InMemoryReturnStore, SqliteReturnStore, EventSink 各種）
//! - **app**: アプリケーション層（AppBuilder, ReturnService, ReturnsConfig, StatusCounts）
//! - **error**: サービス層のエラー型

pub mod app;
pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;

pub use app::{AppBuilder, ReturnHistory, ReturnService, ReturnsConfig, StatusCounts};
pub use error::ReturnsError;
