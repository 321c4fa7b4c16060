//! ReturnService - 返品ライフサイクルの操作面
//!
//! # フロー（作成）
//! 1. ReturnDraft の形式チェック
//! 2. ReturnStore::create_return に渡す。同一トランザクション内で
//!    受注との整合性チェック（設定で無効化可）、挿入、在庫戻し（restock 指定時）
//! 3. コミット後に DomainEvent を発行
//!
//! # フロー（状態遷移）
//! 1. 現在の記録を読み、遷移を検証してメモにマーカーを追記
//! 2. APPROVED -> RECEIVED で未 restock なら在庫戻しを計画
//! 3. ReturnStore::apply_transition（読んだ時点の状態と一致する場合のみコミット）

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::app::config::ReturnsConfig;
use crate::app::status::StatusCounts;
use crate::domain::{
    DomainEvent, InventoryMovement, OrderId, ReturnDraft, ReturnId, ReturnRecord, ReturnStatus,
    UserId,
};
use crate::error::ReturnsError;
use crate::ports::{
    Clock, EventSink, IdGenerator, NewReturn, RestockPlan, ReturnStore, StatusUpdate,
};

/// A return together with the inventory movements it caused.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReturnHistory {
    pub record: ReturnRecord,
    pub movements: Vec<InventoryMovement>,
}

pub struct ReturnService {
    store: Arc<dyn ReturnStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    events: Arc<dyn EventSink>,
    config: ReturnsConfig,
}

impl ReturnService {
    pub(crate) fn new(
        store: Arc<dyn ReturnStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        events: Arc<dyn EventSink>,
        config: ReturnsConfig,
    ) -> Self {
        Self {
            store,
            clock,
            ids,
            events,
            config,
        }
    }

    pub fn store(&self) -> &Arc<dyn ReturnStore> {
        &self.store
    }

    pub fn config(&self) -> &ReturnsConfig {
        &self.config
    }

    /// Creates a return in `PENDING`, restocking in the same transaction when requested.
    #[instrument(skip_all, fields(order_id = %draft.order_id, items = draft.items.len()))]
    pub async fn create_return(&self, draft: ReturnDraft) -> Result<ReturnRecord, ReturnsError> {
        draft.validate()?;

        let now = self.clock.now();
        let restock = draft.restock;
        let mut record = ReturnRecord::new(self.ids.generate_return_id(), draft, now);
        record.restocked = restock;
        let mut new = NewReturn::new(record.clone());
        if restock {
            new = new.with_restock(RestockPlan::for_return(
                &record,
                record.processed_by.clone(),
                self.ids.as_ref(),
                now,
            ));
        }
        if self.config.require_fulfilled_order {
            new = new.checked_against_order();
        }

        let movements = self.store.create_return(new).await?;
        info!(
            return_id = %record.id,
            restocked = record.restocked,
            movements = movements.len(),
            "return created"
        );

        self.emit(DomainEvent::ReturnCreated {
            return_id: record.id,
            order_id: record.order_id,
            processed_by: record.processed_by.clone(),
            restocked: record.restocked,
        })
        .await;
        self.emit_restocks(record.id, &movements).await;
        Ok(record)
    }

    /// Moves a return to `to`.
    ///
    /// Fails with `Transition` for illegal moves and with `Store(Conflict)` when
    /// another writer changed the status after it was read.
    #[instrument(skip_all, fields(return_id = %id, to = %to, actor = %actor))]
    pub async fn transition(
        &self,
        id: ReturnId,
        to: ReturnStatus,
        actor: &UserId,
        comment: Option<&str>,
    ) -> Result<ReturnRecord, ReturnsError> {
        let mut record = self
            .store
            .get_return(id)
            .await?
            .ok_or(ReturnsError::NotFound(id))?;
        let now = self.clock.now();
        let from = record.apply_transition(to, actor, comment, now)?;

        let restock = if to == ReturnStatus::Received
            && self.config.restock_on_receive
            && !record.restocked
        {
            record.restocked = true;
            Some(RestockPlan::for_return(
                &record,
                actor.clone(),
                self.ids.as_ref(),
                now,
            ))
        } else {
            None
        };

        let movements = self
            .store
            .apply_transition(StatusUpdate {
                from,
                record: record.clone(),
                restock,
            })
            .await?;
        info!(%from, movements = movements.len(), "return transitioned");

        self.emit(DomainEvent::ReturnTransitioned {
            return_id: id,
            from,
            to,
            actor: actor.clone(),
        })
        .await;
        self.emit_restocks(id, &movements).await;
        Ok(record)
    }

    pub async fn approve(
        &self,
        id: ReturnId,
        actor: &UserId,
        comment: Option<&str>,
    ) -> Result<ReturnRecord, ReturnsError> {
        self.transition(id, ReturnStatus::Approved, actor, comment).await
    }

    pub async fn reject(
        &self,
        id: ReturnId,
        actor: &UserId,
        comment: Option<&str>,
    ) -> Result<ReturnRecord, ReturnsError> {
        self.transition(id, ReturnStatus::Rejected, actor, comment).await
    }

    pub async fn receive(
        &self,
        id: ReturnId,
        actor: &UserId,
        comment: Option<&str>,
    ) -> Result<ReturnRecord, ReturnsError> {
        self.transition(id, ReturnStatus::Received, actor, comment).await
    }

    pub async fn process(
        &self,
        id: ReturnId,
        actor: &UserId,
        comment: Option<&str>,
    ) -> Result<ReturnRecord, ReturnsError> {
        self.transition(id, ReturnStatus::Processed, actor, comment).await
    }

    pub async fn cancel(
        &self,
        id: ReturnId,
        actor: &UserId,
        comment: Option<&str>,
    ) -> Result<ReturnRecord, ReturnsError> {
        self.transition(id, ReturnStatus::Cancelled, actor, comment).await
    }

    pub async fn get_return(&self, id: ReturnId) -> Result<ReturnRecord, ReturnsError> {
        self.store
            .get_return(id)
            .await?
            .ok_or(ReturnsError::NotFound(id))
    }

    pub async fn status_of(&self, id: ReturnId) -> Result<ReturnStatus, ReturnsError> {
        Ok(self.get_return(id).await?.status)
    }

    pub async fn returns_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<ReturnRecord>, ReturnsError> {
        Ok(self.store.list_returns_for_order(order_id).await?)
    }

    pub async fn history(&self, id: ReturnId) -> Result<ReturnHistory, ReturnsError> {
        let record = self.get_return(id).await?;
        let movements = self.store.movements_for_return(id).await?;
        Ok(ReturnHistory { record, movements })
    }

    pub async fn status_counts(&self) -> Result<StatusCounts, ReturnsError> {
        let returns = self.store.list_returns().await?;
        Ok(StatusCounts::from_records(&returns))
    }

    async fn emit_restocks(&self, return_id: ReturnId, movements: &[InventoryMovement]) {
        for movement in movements {
            self.emit(DomainEvent::InventoryRestocked {
                return_id,
                batch_id: movement.batch_id,
                movement_id: movement.id,
                quantity_before: movement.quantity_before,
                quantity_after: movement.quantity_after,
            })
            .await;
        }
    }

    /// Sink failures are logged; the change is already committed.
    async fn emit(&self, event: DomainEvent) {
        let name = event.name();
        if let Err(err) = self.events.emit(event).await {
            warn!(event = name, error = %err, "failed to emit domain event");
        }
    }
}
