//! Events - ドメインイベント
//!
//! コミット済みの変更だけをイベントとして発行します（EventSink 経由）。

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::ids::{BatchId, MovementId, OrderId, ReturnId, UserId};
use super::status::ReturnStatus;

/// DomainEvent は返品処理で発生したイベント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    ReturnCreated {
        return_id: ReturnId,
        order_id: OrderId,
        processed_by: UserId,
        restocked: bool,
    },
    ReturnTransitioned {
        return_id: ReturnId,
        from: ReturnStatus,
        to: ReturnStatus,
        actor: UserId,
    },
    InventoryRestocked {
        return_id: ReturnId,
        batch_id: BatchId,
        movement_id: MovementId,
        quantity_before: Decimal,
        quantity_after: Decimal,
    },
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::ReturnCreated { .. } => "return_created",
            DomainEvent::ReturnTransitioned { .. } => "return_transitioned",
            DomainEvent::InventoryRestocked { .. } => "inventory_restocked",
        }
    }

    pub fn return_id(&self) -> ReturnId {
        match self {
            DomainEvent::ReturnCreated { return_id, .. }
            | DomainEvent::ReturnTransitioned { return_id, .. }
            | DomainEvent::InventoryRestocked { return_id, .. } => *return_id,
        }
    }
}
