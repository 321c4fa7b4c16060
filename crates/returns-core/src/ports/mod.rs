//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部システム（データベース、時刻、ID 採番、イベント送信）への
//! インターフェースです。実装は `impls` にあります。

pub mod clock;
pub mod event_sink;
pub mod id_generator;
pub mod return_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::{EventSink, EventSinkError};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::return_store::{
    NewReturn, RestockLine, RestockPlan, ReturnStore, StatusUpdate, StoreError, check_against_order,
};
