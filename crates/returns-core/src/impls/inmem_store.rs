//! InMemoryReturnStore - 開発・テスト用の正本
//!
//! # 実装詳細
//! - 全テーブルを 1 つの `tokio::sync::Mutex` で保護（ロック中は他の書き込みが待つ）
//! - トランザクションは変更をステージングし、全行成功した時だけ反映する

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    Batch, BatchId, InventoryMovement, MovementReference, Order, OrderId, ReturnId, ReturnRecord,
};
use crate::ports::{
    NewReturn, RestockPlan, ReturnStore, StatusUpdate, StoreError, check_against_order,
};

#[derive(Default)]
struct InMemoryState {
    orders: HashMap<OrderId, Order>,
    batches: HashMap<BatchId, Batch>,
    returns: HashMap<ReturnId, ReturnRecord>,
    /// Append-only audit log.
    movements: Vec<InventoryMovement>,
}

impl InMemoryState {
    /// Runs the plan against copies of the touched batches.
    ///
    /// Nothing in `self` changes; the caller commits the result.
    fn stage_restock(
        &self,
        return_id: ReturnId,
        plan: &RestockPlan,
    ) -> Result<(HashMap<BatchId, Batch>, Vec<InventoryMovement>), StoreError> {
        let mut staged: HashMap<BatchId, Batch> = HashMap::new();
        let mut movements = Vec::with_capacity(plan.lines.len());
        for line in &plan.lines {
            let batch = match staged.entry(line.batch_id) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => {
                    let current = self
                        .batches
                        .get(&line.batch_id)
                        .ok_or(StoreError::BatchNotFound(line.batch_id))?;
                    entry.insert(current.clone())
                }
            };
            movements.push(plan.apply_line(return_id, line, batch)?);
        }
        Ok((staged, movements))
    }

    fn commit_restock(&mut self, staged: HashMap<BatchId, Batch>, movements: &[InventoryMovement]) {
        self.batches.extend(staged);
        self.movements.extend_from_slice(movements);
    }

    fn sorted_returns<'a>(iter: impl Iterator<Item = &'a ReturnRecord>) -> Vec<ReturnRecord> {
        let mut out: Vec<ReturnRecord> = iter.cloned().collect();
        out.sort_by(|a, b| a.processed_at.cmp(&b.processed_at).then(a.id.cmp(&b.id)));
        out
    }
}

/// In-memory store implementation.
#[derive(Clone, Default)]
pub struct InMemoryReturnStore {
    state: Arc<Mutex<InMemoryState>>,
}

impl InMemoryReturnStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReturnStore for InMemoryReturnStore {
    async fn insert_order(&self, order: Order) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.orders.contains_key(&order.id) {
            return Err(StoreError::Duplicate(order.id.to_string()));
        }
        state.orders.insert(order.id, order);
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        Ok(self.state.lock().await.orders.get(&id).cloned())
    }

    async fn insert_batch(&self, batch: Batch) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.batches.contains_key(&batch.id) {
            return Err(StoreError::Duplicate(batch.id.to_string()));
        }
        state.batches.insert(batch.id, batch);
        Ok(())
    }

    async fn get_batch(&self, id: BatchId) -> Result<Option<Batch>, StoreError> {
        Ok(self.state.lock().await.batches.get(&id).cloned())
    }

    async fn get_return(&self, id: ReturnId) -> Result<Option<ReturnRecord>, StoreError> {
        Ok(self.state.lock().await.returns.get(&id).cloned())
    }

    async fn list_returns_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<ReturnRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(InMemoryState::sorted_returns(
            state.returns.values().filter(|r| r.order_id == order_id),
        ))
    }

    async fn list_returns(&self) -> Result<Vec<ReturnRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(InMemoryState::sorted_returns(state.returns.values()))
    }

    async fn movements_for_batch(
        &self,
        batch_id: BatchId,
    ) -> Result<Vec<InventoryMovement>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .movements
            .iter()
            .filter(|m| m.batch_id == batch_id)
            .cloned()
            .collect())
    }

    async fn movements_for_return(
        &self,
        return_id: ReturnId,
    ) -> Result<Vec<InventoryMovement>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .movements
            .iter()
            .filter(|m| m.reference == MovementReference::Return(return_id))
            .cloned()
            .collect())
    }

    async fn create_return(&self, new: NewReturn) -> Result<Vec<InventoryMovement>, StoreError> {
        let NewReturn {
            record,
            restock,
            check_order,
        } = new;
        let mut state = self.state.lock().await;
        if state.returns.contains_key(&record.id) {
            return Err(StoreError::Duplicate(record.id.to_string()));
        }
        if check_order {
            let existing = InMemoryState::sorted_returns(
                state.returns.values().filter(|r| r.order_id == record.order_id),
            );
            check_against_order(state.orders.get(&record.order_id), &existing, &record)?;
        }
        let staged = restock
            .as_ref()
            .map(|plan| state.stage_restock(record.id, plan))
            .transpose()?;

        // Everything validated; commit.
        state.returns.insert(record.id, record);
        Ok(match staged {
            Some((batches, movements)) => {
                state.commit_restock(batches, &movements);
                movements
            }
            None => Vec::new(),
        })
    }

    async fn apply_transition(
        &self,
        update: StatusUpdate,
    ) -> Result<Vec<InventoryMovement>, StoreError> {
        let mut state = self.state.lock().await;
        let id = update.record.id;
        let current = state
            .returns
            .get(&id)
            .ok_or(StoreError::ReturnNotFound(id))?;
        if current.status != update.from {
            return Err(StoreError::Conflict {
                id,
                expected: update.from,
                actual: current.status,
            });
        }
        let staged = update
            .restock
            .as_ref()
            .map(|plan| state.stage_restock(id, plan))
            .transpose()?;

        state.returns.insert(id, update.record);
        Ok(match staged {
            Some((batches, movements)) => {
                state.commit_restock(batches, &movements);
                movements
            }
            None => Vec::new(),
        })
    }
}
