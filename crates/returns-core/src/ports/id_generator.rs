//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（Clock の時刻をタイムスタンプ部に使う）

use crate::domain::ids::{BatchId, Id, IdMarker, MovementId, OrderId, ReturnId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は分散環境でも衝突しない ID を生成
pub trait IdGenerator: Send + Sync {
    fn generate_return_id(&self) -> ReturnId;

    fn generate_movement_id(&self) -> MovementId;

    fn generate_batch_id(&self) -> BatchId;

    fn generate_order_id(&self) -> OrderId;
}

/// UlidGenerator は ULID ベースの ID 生成器
///
/// FixedClock を渡すとタイムスタンプ部が固定されます（ランダム部は毎回異なる）。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next<T: IdMarker>(&self) -> Id<T> {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        Id::from(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_return_id(&self) -> ReturnId {
        self.next()
    }

    fn generate_movement_id(&self) -> MovementId {
        self.next()
    }

    fn generate_batch_id(&self) -> BatchId {
        self.next()
    }

    fn generate_order_id(&self) -> OrderId {
        self.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn ulid_generator_generates_unique_ids() {
        let id_gen = UlidGenerator::new(SystemClock);

        let id1 = id_gen.generate_return_id();
        let id2 = id_gen.generate_return_id();

        assert_ne!(id1, id2);
    }

    #[test]
    fn fixed_clock_pins_the_timestamp_part() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(FixedClock::new(fixed_time));

        let id1 = id_gen.generate_movement_id();
        let id2 = id_gen.generate_movement_id();

        assert_ne!(id1, id2);
        assert_eq!(id1.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
        assert_eq!(id2.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
    }
}
