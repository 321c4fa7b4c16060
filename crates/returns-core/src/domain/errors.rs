//! Errors - ドメインエラー
//!
//! - `TransitionError`: 状態遷移の検証エラー
//! - `ValidationError`: 返品内容・受注との整合性エラー

use rust_decimal::Decimal;

use super::ids::{BatchId, OrderId};
use super::order::OrderStatus;
use super::status::ReturnStatus;

/// TransitionError は状態遷移の検証エラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("unknown return status '{0}'")]
    UnknownStatus(String),

    #[error("cannot transition from {from}: {from} is a terminal state")]
    Terminal { from: ReturnStatus },

    #[error(
        "invalid transition from {from} to {to}; allowed next states from {from}: {}",
        join_states(.allowed)
    )]
    NotAllowed {
        from: ReturnStatus,
        to: ReturnStatus,
        allowed: Vec<ReturnStatus>,
    },
}

fn join_states(states: &[ReturnStatus]) -> String {
    states
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// ValidationError は返品の作成要求が受け付けられない理由
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("a return needs at least one item")]
    NoItems,

    #[error("quantity for {batch_id} must be positive, got {quantity}")]
    NonPositiveQuantity { batch_id: BatchId, quantity: Decimal },

    #[error("quantities of {batch_id} add up beyond the representable range")]
    QuantityOverflow { batch_id: BatchId },

    #[error("on-hand quantity of {batch_id} must not be negative, got {on_hand}")]
    NegativeOnHand { batch_id: BatchId, on_hand: Decimal },

    #[error("order {0} has no lines")]
    EmptyOrder(OrderId),

    #[error("{0} appears more than once in the return")]
    DuplicateBatch(BatchId),

    #[error("unknown return reason '{0}'")]
    UnknownReason(String),

    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("order {order_id} is {status}; only fulfilled orders accept returns")]
    OrderNotFulfilled {
        order_id: OrderId,
        status: OrderStatus,
    },

    #[error("{batch_id} was not shipped on order {order_id}")]
    BatchNotOnOrder { order_id: OrderId, batch_id: BatchId },

    #[error(
        "returning {requested} of {batch_id} exceeds what is left to return ({remaining} of {shipped} shipped)"
    )]
    ExceedsShipped {
        batch_id: BatchId,
        requested: Decimal,
        remaining: Decimal,
        shipped: Decimal,
    },
}
