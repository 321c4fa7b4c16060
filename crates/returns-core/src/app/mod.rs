//! App - アプリケーション層
//!
//! ports を組み合わせて返品ライフサイクルを実装します。
//!
//! # 主要コンポーネント
//! - **AppBuilder**: ReturnService の構築とワイヤリング
//! - **ReturnService**: 作成・状態遷移・参照の操作面
//! - **ReturnsConfig**: 設定（TOML）
//! - **StatusCounts**: ステータス別件数

pub mod builder;
pub mod config;
pub mod service;
pub mod status;

pub use self::builder::{AppBuilder, BuildError};
pub use self::config::{ConfigError, ReturnsConfig};
pub use self::service::{ReturnHistory, ReturnService};
pub use self::status::StatusCounts;
