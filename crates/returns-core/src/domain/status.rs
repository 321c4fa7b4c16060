//! Status - 返品ステータスの状態遷移
//!
//! # 状態遷移
//! - PENDING  -> APPROVED | REJECTED | CANCELLED
//! - APPROVED -> RECEIVED | CANCELLED
//! - RECEIVED -> PROCESSED | CANCELLED
//! - REJECTED / PROCESSED / CANCELLED は終端（遷移先なし）

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::TransitionError;

/// ReturnStatus は返品の現在状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnStatus {
    /// 受付済み・未審査
    Pending,
    /// 返品承認済み（商品の到着待ち）
    Approved,
    /// 却下
    Rejected,
    /// 商品到着済み
    Received,
    /// 返金・在庫処理まで完了
    Processed,
    /// 取消
    Cancelled,
}

impl ReturnStatus {
    pub const ALL: [ReturnStatus; 6] = [
        ReturnStatus::Pending,
        ReturnStatus::Approved,
        ReturnStatus::Rejected,
        ReturnStatus::Received,
        ReturnStatus::Processed,
        ReturnStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReturnStatus::Pending => "PENDING",
            ReturnStatus::Approved => "APPROVED",
            ReturnStatus::Rejected => "REJECTED",
            ReturnStatus::Received => "RECEIVED",
            ReturnStatus::Processed => "PROCESSED",
            ReturnStatus::Cancelled => "CANCELLED",
        }
    }

    /// メモに書く角括弧付きマーカー（例: `[APPROVED]`）
    pub fn marker(self) -> &'static str {
        match self {
            ReturnStatus::Pending => "[PENDING]",
            ReturnStatus::Approved => "[APPROVED]",
            ReturnStatus::Rejected => "[REJECTED]",
            ReturnStatus::Received => "[RECEIVED]",
            ReturnStatus::Processed => "[PROCESSED]",
            ReturnStatus::Cancelled => "[CANCELLED]",
        }
    }

    /// 遷移可能な次の状態
    pub fn allowed_transitions(self) -> &'static [ReturnStatus] {
        use ReturnStatus::*;
        match self {
            Pending => &[Approved, Rejected, Cancelled],
            Approved => &[Received, Cancelled],
            Received => &[Processed, Cancelled],
            Rejected | Processed | Cancelled => &[],
        }
    }

    /// 終端状態か（遷移先なし）
    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    pub fn can_transition_to(self, to: ReturnStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }

    /// 出荷数量に対して有効な返品として数えるか（REJECTED / CANCELLED 以外）
    pub fn is_live(self) -> bool {
        !matches!(self, ReturnStatus::Rejected | ReturnStatus::Cancelled)
    }

    /// ワークフロー上の順位（メモのマーカーから最も進んだ状態を選ぶのに使う）
    ///
    /// 終端状態は非終端状態より常に上位。
    pub(crate) fn workflow_rank(self) -> u8 {
        match self {
            ReturnStatus::Pending => 0,
            ReturnStatus::Approved => 1,
            ReturnStatus::Received => 2,
            ReturnStatus::Processed => 3,
            ReturnStatus::Rejected => 4,
            ReturnStatus::Cancelled => 5,
        }
    }

    /// 遷移を検証
    ///
    /// - 終端状態からの遷移は `Terminal`
    /// - 隣接していない遷移は `NotAllowed`（遷移可能な状態を列挙）
    pub fn validate_transition(self, to: ReturnStatus) -> Result<(), TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::Terminal { from: self });
        }
        if !self.can_transition_to(to) {
            return Err(TransitionError::NotAllowed {
                from: self,
                to,
                allowed: self.allowed_transitions().to_vec(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReturnStatus {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        ReturnStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == upper)
            .ok_or_else(|| TransitionError::UnknownStatus(s.to_string()))
    }
}

/// 文字列での遷移チェック。未知の状態名は常に無効
pub fn is_valid_transition(from: &str, to: &str) -> bool {
    match (from.parse::<ReturnStatus>(), to.parse::<ReturnStatus>()) {
        (Ok(from), Ok(to)) => from.can_transition_to(to),
        _ => false,
    }
}

/// 両端をパースして遷移を検証
pub fn validate_transition(
    from: &str,
    to: &str,
) -> Result<(ReturnStatus, ReturnStatus), TransitionError> {
    let from = from.parse::<ReturnStatus>()?;
    let to = to.parse::<ReturnStatus>()?;
    from.validate_transition(to)?;
    Ok((from, to))
}
