//! Inventory - バッチと在庫移動の監査ログ
//!
//! 数量は `Decimal`（重量で管理する在庫があるため）。加算はすべて checked。

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::ValidationError;
use super::ids::{BatchId, MovementId, ReturnId, UserId};

/// 仕入れ単位で追跡する在庫（ロット）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchId,
    /// 人が読むロットコード（例: `OG-KUSH-2409-A`）
    pub code: String,
    pub on_hand: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    pub fn new(id: BatchId, code: impl Into<String>, on_hand: Decimal, at: DateTime<Utc>) -> Self {
        Self {
            id,
            code: code.into(),
            on_hand,
            updated_at: at,
        }
    }

    /// 登録前のチェック。在庫数は負にならない
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.on_hand < Decimal::ZERO {
            return Err(ValidationError::NegativeOnHand {
                batch_id: self.id,
                on_hand: self.on_hand,
            });
        }
        Ok(())
    }

    /// 返品された数量を在庫に戻す
    ///
    /// 戻り値は `(before, after)`。溢れる場合は `None` で、バッチは変更しない。
    pub fn restock(&mut self, quantity: Decimal, at: DateTime<Utc>) -> Option<(Decimal, Decimal)> {
        let before = self.on_hand;
        let after = before.checked_add(quantity)?;
        self.on_hand = after;
        self.updated_at = at;
        Some((before, after))
    }
}

/// 在庫移動の種別
///
/// 入荷・販売と共有するテーブルなので種別は 4 つあるが、ここで書くのは `Return` だけ。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    Intake,
    Sale,
    Adjustment,
    Return,
}

impl MovementType {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::Intake => "INTAKE",
            MovementType::Sale => "SALE",
            MovementType::Adjustment => "ADJUSTMENT",
            MovementType::Return => "RETURN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            MovementType::Intake,
            MovementType::Sale,
            MovementType::Adjustment,
            MovementType::Return,
        ]
        .into_iter()
        .find(|t| t.as_str() == s)
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 在庫移動の原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementReference {
    Return(ReturnId),
}

impl MovementReference {
    pub fn kind(&self) -> &'static str {
        match self {
            MovementReference::Return(_) => "RETURN",
        }
    }

    pub fn id(&self) -> String {
        match self {
            MovementReference::Return(id) => id.to_storage(),
        }
    }
}

/// 監査ログの 1 行（before / after 付きの数量変化）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryMovement {
    pub id: MovementId,
    pub batch_id: BatchId,
    pub movement_type: MovementType,
    pub quantity_change: Decimal,
    pub quantity_before: Decimal,
    pub quantity_after: Decimal,
    pub reference: MovementReference,
    pub performed_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl InventoryMovement {
    /// 返品による在庫戻しの監査行
    pub fn for_return(
        id: MovementId,
        batch_id: BatchId,
        return_id: ReturnId,
        (before, after): (Decimal, Decimal),
        performed_by: UserId,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            batch_id,
            movement_type: MovementType::Return,
            quantity_change: after - before,
            quantity_before: before,
            quantity_after: after,
            reference: MovementReference::Return(return_id),
            performed_by,
            created_at: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn batch(on_hand: Decimal) -> Batch {
        Batch::new(BatchId::from_ulid(Ulid::new()), "LOT-1", on_hand, Utc::now())
    }

    #[test]
    fn restock_adds_to_on_hand() {
        let mut b = batch(Decimal::new(1000, 1));
        let (before, after) = b.restock(Decimal::new(25, 1), Utc::now()).unwrap();

        assert_eq!(before, Decimal::new(1000, 1));
        assert_eq!(after, Decimal::new(1025, 1));
        assert_eq!(b.on_hand, after);
    }

    #[test]
    fn restock_overflow_leaves_batch_untouched() {
        let mut b = batch(Decimal::MAX);
        assert!(b.restock(Decimal::ONE, Utc::now()).is_none());
        assert_eq!(b.on_hand, Decimal::MAX);
    }

    #[test]
    fn validate_accepts_zero_and_positive_stock() {
        assert!(batch(Decimal::ZERO).validate().is_ok());
        assert!(batch(Decimal::new(5, 1)).validate().is_ok());
    }

    #[test]
    fn validate_rejects_negative_stock() {
        let b = batch(Decimal::new(-1, 1));
        assert!(matches!(
            b.validate(),
            Err(ValidationError::NegativeOnHand { batch_id, .. }) if batch_id == b.id
        ));
    }

    #[test]
    fn movement_records_the_delta() {
        let m = InventoryMovement::for_return(
            MovementId::from_ulid(Ulid::new()),
            BatchId::from_ulid(Ulid::new()),
            ReturnId::from_ulid(Ulid::new()),
            (Decimal::from(10), Decimal::from(13)),
            UserId::new("dock"),
            Utc::now(),
        );
        assert_eq!(m.quantity_change, Decimal::from(3));
        assert_eq!(m.movement_type, MovementType::Return);
        assert_eq!(m.reference.kind(), "RETURN");
    }
}
