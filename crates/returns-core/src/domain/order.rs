//! Order - 返品元の受注
//!
//! 受注そのものの管理は外部の責務です。ここでは返品作成時の検証に
//! 必要な情報（状態と出荷明細）だけを持ちます。

use std::collections::HashMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::ValidationError;
use super::ids::{BatchId, OrderId};
use super::return_record::{ReturnItem, ReturnRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Fulfilled,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Fulfilled => "FULFILLED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Fulfilled,
            OrderStatus::Cancelled,
        ]
        .into_iter()
        .find(|status| status.as_str() == s)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A shipped line: which batch and how much of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub batch_id: BatchId,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
}

impl Order {
    pub fn new(id: OrderId, status: OrderStatus, lines: Vec<OrderLine>) -> Self {
        Self { id, status, lines }
    }

    /// 受注明細の形式チェック（明細が 1 行以上、数量は正、同一 batch の合計が溢れない）
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.lines.is_empty() {
            return Err(ValidationError::EmptyOrder(self.id));
        }
        for line in &self.lines {
            if line.quantity <= Decimal::ZERO {
                return Err(ValidationError::NonPositiveQuantity {
                    batch_id: line.batch_id,
                    quantity: line.quantity,
                });
            }
            self.shipped_quantity(line.batch_id)?;
        }
        Ok(())
    }

    /// batch の出荷数量の合計。受注に含まれない batch は `None`
    pub fn shipped_quantity(&self, batch_id: BatchId) -> Result<Option<Decimal>, ValidationError> {
        self.lines
            .iter()
            .filter(|line| line.batch_id == batch_id)
            .try_fold(None, |total: Option<Decimal>, line| {
                let sum = match total {
                    Some(total) => total.checked_add(line.quantity),
                    None => Some(line.quantity),
                };
                sum.map(Some)
                    .ok_or(ValidationError::QuantityOverflow { batch_id })
            })
    }

    /// 返品可能か検証
    ///
    /// - 受注が FULFILLED であること
    /// - 返品する batch が受注に含まれること
    /// - 既存の有効な返品（REJECTED / CANCELLED 以外）と合わせて出荷数量を超えないこと
    ///
    /// 合計はすべて checked 演算で、溢れた場合は `QuantityOverflow`。
    pub fn check_returnable(
        &self,
        existing: &[ReturnRecord],
        items: &[ReturnItem],
    ) -> Result<(), ValidationError> {
        if self.status != OrderStatus::Fulfilled {
            return Err(ValidationError::OrderNotFulfilled {
                order_id: self.id,
                status: self.status,
            });
        }

        let mut already_returned: HashMap<BatchId, Decimal> = HashMap::new();
        for record in existing.iter().filter(|r| r.status.is_live()) {
            for item in &record.items {
                let total = already_returned.entry(item.batch_id).or_default();
                *total = total
                    .checked_add(item.quantity)
                    .ok_or(ValidationError::QuantityOverflow {
                        batch_id: item.batch_id,
                    })?;
            }
        }

        for item in items {
            let shipped =
                self.shipped_quantity(item.batch_id)?
                    .ok_or(ValidationError::BatchNotOnOrder {
                        order_id: self.id,
                        batch_id: item.batch_id,
                    })?;
            let returned = already_returned
                .get(&item.batch_id)
                .copied()
                .unwrap_or_default();
            let remaining = shipped
                .checked_sub(returned)
                .ok_or(ValidationError::QuantityOverflow {
                    batch_id: item.batch_id,
                })?
                .max(Decimal::ZERO);
            if item.quantity > remaining {
                return Err(ValidationError::ExceedsShipped {
                    batch_id: item.batch_id,
                    requested: item.quantity,
                    remaining,
                    shipped,
                });
            }
        }
        Ok(())
    }
}
