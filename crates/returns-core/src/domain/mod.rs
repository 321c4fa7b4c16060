//! Domain model (IDs, status machine, records, inventory).
//!
//! ストレージや非同期処理に依存しない純粋な型とルールだけを置きます。

pub mod errors;
pub mod events;
pub mod ids;
pub mod inventory;
pub mod notes;
pub mod order;
pub mod reason;
pub mod return_record;
pub mod status;

pub use self::errors::{TransitionError, ValidationError};
pub use self::events::DomainEvent;
pub use self::ids::{BatchId, MovementId, OrderId, ParseIdError, ReturnId, UserId};
pub use self::inventory::{Batch, InventoryMovement, MovementReference, MovementType};
pub use self::notes::{append_marker, extract_status};
pub use self::order::{Order, OrderLine, OrderStatus};
pub use self::reason::ReturnReason;
pub use self::return_record::{ReturnDraft, ReturnItem, ReturnRecord};
pub use self::status::{ReturnStatus, is_valid_transition, validate_transition};
