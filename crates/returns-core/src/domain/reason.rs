//! Reason - 返品理由コード

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::ValidationError;

/// 返品理由
///
/// パースは大文字小文字を区別せず、`-` と空白を `_` とみなします。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnReason {
    Defective,
    WrongItem,
    NotAsDescribed,
    CustomerChangedMind,
    Other,
}

impl ReturnReason {
    pub const ALL: [ReturnReason; 5] = [
        ReturnReason::Defective,
        ReturnReason::WrongItem,
        ReturnReason::NotAsDescribed,
        ReturnReason::CustomerChangedMind,
        ReturnReason::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReturnReason::Defective => "DEFECTIVE",
            ReturnReason::WrongItem => "WRONG_ITEM",
            ReturnReason::NotAsDescribed => "NOT_AS_DESCRIBED",
            ReturnReason::CustomerChangedMind => "CUSTOMER_CHANGED_MIND",
            ReturnReason::Other => "OTHER",
        }
    }
}

impl fmt::Display for ReturnReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReturnReason {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        ReturnReason::ALL
            .into_iter()
            .find(|reason| reason.as_str() == normalized)
            .ok_or_else(|| ValidationError::UnknownReason(s.to_string()))
    }
}
