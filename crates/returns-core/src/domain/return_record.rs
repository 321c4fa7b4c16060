//! ReturnRecord - 返品の記録
//!
//! 顧客が受注に対して商品を返送する依頼です。作成時は常に PENDING。

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::{TransitionError, ValidationError};
use super::ids::{BatchId, OrderId, ReturnId, UserId};
use super::notes;
use super::reason::ReturnReason;
use super::status::ReturnStatus;

/// 返品明細（batch と戻ってくる数量）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnItem {
    pub batch_id: BatchId,
    pub quantity: Decimal,
}

impl ReturnItem {
    pub fn new(batch_id: BatchId, quantity: Decimal) -> Self {
        Self { batch_id, quantity }
    }
}

/// ReturnDraft は返品作成の入力
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnDraft {
    pub order_id: OrderId,
    pub items: Vec<ReturnItem>,
    pub reason: ReturnReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub processed_by: UserId,
    /// true なら作成と同一トランザクションで在庫に戻す
    #[serde(default)]
    pub restock: bool,
}

impl ReturnDraft {
    pub fn new(
        order_id: OrderId,
        items: Vec<ReturnItem>,
        reason: ReturnReason,
        processed_by: UserId,
    ) -> Self {
        Self {
            order_id,
            items,
            reason,
            notes: None,
            processed_by,
            restock: false,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_restock(mut self, restock: bool) -> Self {
        self.restock = restock;
        self
    }

    /// ストレージを見ずにできる形式チェック
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.items.is_empty() {
            return Err(ValidationError::NoItems);
        }
        let mut seen = HashSet::new();
        for item in &self.items {
            if item.quantity <= Decimal::ZERO {
                return Err(ValidationError::NonPositiveQuantity {
                    batch_id: item.batch_id,
                    quantity: item.quantity,
                });
            }
            if !seen.insert(item.batch_id) {
                return Err(ValidationError::DuplicateBatch(item.batch_id));
            }
        }
        Ok(())
    }
}

/// 永続化される返品レコード
///
/// 正本は `status` 列。`notes` にも遷移ごとにマーカー行を追記するので、
/// メモからステータスを導出する旧来の読み手とも一致します。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnRecord {
    pub id: ReturnId,
    pub order_id: OrderId,
    pub items: Vec<ReturnItem>,
    pub reason: ReturnReason,
    pub notes: Option<String>,
    pub processed_by: UserId,
    pub processed_at: DateTime<Utc>,
    pub status: ReturnStatus,
    /// 在庫戻し済み（二重には戻さない）
    pub restocked: bool,
    pub updated_at: DateTime<Utc>,
}

impl ReturnRecord {
    /// PENDING の新規レコード。メモはマーカーを含まないよう sanitize する
    pub fn new(id: ReturnId, draft: ReturnDraft, at: DateTime<Utc>) -> Self {
        Self {
            id,
            order_id: draft.order_id,
            items: draft.items,
            reason: draft.reason,
            notes: draft
                .notes
                .map(|n| notes::sanitize(&n))
                .filter(|n| !n.is_empty()),
            processed_by: draft.processed_by,
            processed_at: at,
            status: ReturnStatus::Pending,
            restocked: false,
            updated_at: at,
        }
    }

    /// ステータスがメモのマーカーにしかない旧データからレコードを復元
    #[allow(clippy::too_many_arguments)]
    pub fn from_legacy(
        id: ReturnId,
        order_id: OrderId,
        items: Vec<ReturnItem>,
        reason: ReturnReason,
        notes: Option<String>,
        processed_by: UserId,
        processed_at: DateTime<Utc>,
        restocked: bool,
    ) -> Self {
        let status = notes::extract_status(notes.as_deref());
        Self {
            id,
            order_id,
            items,
            reason,
            notes,
            processed_by,
            processed_at,
            status,
            restocked,
            updated_at: processed_at,
        }
    }

    /// `to` へ遷移し、メモにマーカー行を追記する
    ///
    /// 戻り値は遷移前のステータス。失敗時はレコードを変更しない。
    pub fn apply_transition(
        &mut self,
        to: ReturnStatus,
        actor: &UserId,
        comment: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<ReturnStatus, TransitionError> {
        let from = self.status;
        from.validate_transition(to)?;
        self.notes = Some(notes::append_marker(
            self.notes.as_deref(),
            to,
            actor.as_str(),
            comment,
        ));
        self.status = to;
        self.updated_at = at;
        Ok(from)
    }

    /// 返品数量の合計。溢れた場合は `None`
    pub fn total_quantity(&self) -> Option<Decimal> {
        self.items
            .iter()
            .try_fold(Decimal::ZERO, |total, item| total.checked_add(item.quantity))
    }
}
