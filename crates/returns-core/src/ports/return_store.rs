//! ReturnStore port - 返品・バッチ・在庫移動の正本（source of truth）
//!
//! # 設計原則
//! - 返品の作成/状態更新と在庫戻し（restock）は同一トランザクション内
//! - restock はバッチ行をロックしてから読み、加算して書き戻す
//! - 途中で失敗した場合は返品行も在庫移動も一切残さない
//! - 受注に対する返品可能数量のチェックも挿入と同じトランザクション内で行う
//!   （同時に作成された返品が合わせて出荷数量を超えないように）

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::domain::{
    Batch, BatchId, InventoryMovement, MovementId, Order, OrderId, ReturnId, ReturnRecord,
    ReturnStatus, UserId, ValidationError,
};
use crate::ports::IdGenerator;

/// StoreError はストレージ操作のエラー
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("batch not found: {0}")]
    BatchNotFound(BatchId),

    #[error("return not found: {0}")]
    ReturnNotFound(ReturnId),

    #[error("duplicate key: {0}")]
    Duplicate(String),

    #[error("return {id} is {actual}, expected {expected} (concurrent update)")]
    Conflict {
        id: ReturnId,
        expected: ReturnStatus,
        actual: ReturnStatus,
    },

    #[error("restocking {batch_id} overflows its on-hand quantity")]
    QuantityOverflow { batch_id: BatchId },

    /// Rejected by the order check run inside the transaction.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// One line of a restock: which batch gets how much back, and the id its
/// audit row will carry.
#[derive(Debug, Clone, PartialEq)]
pub struct RestockLine {
    pub movement_id: MovementId,
    pub batch_id: BatchId,
    pub quantity: Decimal,
}

/// Restock work carried out inside the return's transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct RestockPlan {
    pub performed_by: UserId,
    pub at: DateTime<Utc>,
    pub lines: Vec<RestockLine>,
}

impl RestockPlan {
    /// One line per returned item, in item order.
    pub fn for_return(
        record: &ReturnRecord,
        performed_by: UserId,
        ids: &dyn IdGenerator,
        at: DateTime<Utc>,
    ) -> Self {
        let lines = record
            .items
            .iter()
            .map(|item| RestockLine {
                movement_id: ids.generate_movement_id(),
                batch_id: item.batch_id,
                quantity: item.quantity,
            })
            .collect();
        Self {
            performed_by,
            at,
            lines,
        }
    }

    /// Applies one line to a locked batch and builds its audit row.
    pub fn apply_line(
        &self,
        return_id: ReturnId,
        line: &RestockLine,
        batch: &mut Batch,
    ) -> Result<InventoryMovement, StoreError> {
        let change = batch
            .restock(line.quantity, self.at)
            .ok_or(StoreError::QuantityOverflow {
                batch_id: line.batch_id,
            })?;
        Ok(InventoryMovement::for_return(
            line.movement_id,
            line.batch_id,
            return_id,
            change,
            self.performed_by.clone(),
            self.at,
        ))
    }
}

/// A return to insert.
///
/// With `check_order` set, the store loads the order and its existing returns
/// inside the insert's transaction and runs `Order::check_returnable` there.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReturn {
    pub record: ReturnRecord,
    pub restock: Option<RestockPlan>,
    pub check_order: bool,
}

impl NewReturn {
    pub fn new(record: ReturnRecord) -> Self {
        Self {
            record,
            restock: None,
            check_order: false,
        }
    }

    pub fn with_restock(mut self, plan: RestockPlan) -> Self {
        self.restock = Some(plan);
        self
    }

    pub fn checked_against_order(mut self) -> Self {
        self.check_order = true;
        self
    }
}

/// Validates `record` against its order and the order's existing returns.
///
/// Both stores call this under their write lock.
pub fn check_against_order(
    order: Option<&Order>,
    existing: &[ReturnRecord],
    record: &ReturnRecord,
) -> Result<(), StoreError> {
    let order = order.ok_or(ValidationError::OrderNotFound(record.order_id))?;
    order.check_returnable(existing, &record.items)?;
    Ok(())
}

/// A status change to persist.
///
/// `record` already carries the new status and notes. The store only commits
/// it if the stored status still equals `from`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub from: ReturnStatus,
    pub record: ReturnRecord,
    pub restock: Option<RestockPlan>,
}

/// ReturnStore は返品・受注・バッチ・在庫移動を保持する
#[async_trait]
pub trait ReturnStore: Send + Sync {
    async fn insert_order(&self, order: Order) -> Result<(), StoreError>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    async fn insert_batch(&self, batch: Batch) -> Result<(), StoreError>;

    async fn get_batch(&self, id: BatchId) -> Result<Option<Batch>, StoreError>;

    async fn get_return(&self, id: ReturnId) -> Result<Option<ReturnRecord>, StoreError>;

    /// Returns of an order, oldest first.
    async fn list_returns_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<ReturnRecord>, StoreError>;

    /// All returns, oldest first.
    async fn list_returns(&self) -> Result<Vec<ReturnRecord>, StoreError>;

    async fn movements_for_batch(
        &self,
        batch_id: BatchId,
    ) -> Result<Vec<InventoryMovement>, StoreError>;

    async fn movements_for_return(
        &self,
        return_id: ReturnId,
    ) -> Result<Vec<InventoryMovement>, StoreError>;

    /// Inserts the return, optionally after the order check and followed by
    /// the restock plan. Atomic.
    async fn create_return(&self, new: NewReturn) -> Result<Vec<InventoryMovement>, StoreError>;

    /// Persists a status change and, if given, runs the restock plan. Atomic.
    async fn apply_transition(
        &self,
        update: StatusUpdate,
    ) -> Result<Vec<InventoryMovement>, StoreError>;
}
