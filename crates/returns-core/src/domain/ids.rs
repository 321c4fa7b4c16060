//! Domain identifiers (strongly-typed IDs).
//!
//! # ULID ベースの ID
//! 返品・受注・バッチ・在庫移動の ID はすべて ULID を使います。
//! `Id<T>` のマーカー型 `T` はコンパイル時にだけ存在し（PhantomData）、
//! `ReturnId` と `BatchId` を取り違えるとコンパイルエラーになります。
//!
//! 文字列表現は `{prefix}{ulid}`（例: `ret-01HV...`）。
//! パース時はプレフィックスの有無どちらも受け付けます。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    /// Display で使うプレフィックス（例: "ret-", "batch-"）
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
///
/// シリアライズ形式はプレフィックスなしの ULID 文字列です。
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    /// ULID から Id を作成
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// 内部の ULID を取得
    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }

    /// Storage form (bare ULID, no prefix).
    pub fn to_storage(&self) -> String {
        self.ulid.to_string()
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// ID のパースエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind} id '{input}'")]
pub struct ParseIdError {
    pub kind: &'static str,
    pub input: String,
}

impl<T: IdMarker> FromStr for Id<T> {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let raw = trimmed.strip_prefix(T::prefix()).unwrap_or(trimmed);
        Ulid::from_string(raw)
            .map(Self::from_ulid)
            .map_err(|_| ParseIdError {
                kind: T::prefix().trim_end_matches('-'),
                input: s.to_string(),
            })
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Return のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Return {}

impl IdMarker for Return {
    fn prefix() -> &'static str {
        "ret-"
    }
}

/// Order のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Order {}

impl IdMarker for Order {
    fn prefix() -> &'static str {
        "order-"
    }
}

/// Batch のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Batch {}

impl IdMarker for Batch {
    fn prefix() -> &'static str {
        "batch-"
    }
}

/// InventoryMovement のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Movement {}

impl IdMarker for Movement {
    fn prefix() -> &'static str {
        "mov-"
    }
}

/// Identifier of a customer return.
pub type ReturnId = Id<Return>;

/// Identifier of the originating order.
pub type OrderId = Id<Order>;

/// Identifier of an inventory batch (lot).
pub type BatchId = Id<Batch>;

/// Identifier of an inventory-movement audit row.
pub type MovementId = Id<Movement>;

/// UserId は操作ユーザーの識別子
///
/// ユーザー管理は外部システムの責務なので、不透明な文字列として扱います。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
