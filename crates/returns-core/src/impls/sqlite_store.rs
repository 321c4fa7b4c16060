//! SqliteReturnStore - SQLite による正本
//!
//! # 実装詳細
//! - 書き込みは `BEGIN IMMEDIATE` トランザクション。開始時点で書き込みロックを
//!   取るので、バッチ数量の読み取り→加算→書き戻しの間に他の書き込みは入らない
//!   （別プロセスが同じファイルを開いていても同様）
//! - `rusqlite::Connection` は同期 API なので `spawn_blocking` で実行する
//! - 数量は TEXT（Decimal の文字列表現）、時刻は RFC 3339（ナノ秒固定幅）

use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::domain::{
    Batch, BatchId, InventoryMovement, MovementReference, MovementType, Order, OrderId, OrderLine,
    OrderStatus, ReturnId, ReturnItem, ReturnReason, ReturnRecord, ReturnStatus, UserId,
};
use crate::ports::{
    NewReturn, RestockPlan, ReturnStore, StatusUpdate, StoreError, check_against_order,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS orders (
    id          TEXT PRIMARY KEY,
    status      TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS order_lines (
    order_id    TEXT NOT NULL REFERENCES orders(id),
    line_no     INTEGER NOT NULL,
    batch_id    TEXT NOT NULL,
    quantity    TEXT NOT NULL,
    PRIMARY KEY (order_id, line_no)
);
CREATE TABLE IF NOT EXISTS batches (
    id          TEXT PRIMARY KEY,
    code        TEXT NOT NULL,
    on_hand     TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS returns (
    id           TEXT PRIMARY KEY,
    order_id     TEXT NOT NULL,
    reason       TEXT NOT NULL,
    notes        TEXT,
    processed_by TEXT NOT NULL,
    processed_at TEXT NOT NULL,
    status       TEXT NOT NULL,
    restocked    INTEGER NOT NULL,
    updated_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_returns_order ON returns(order_id);
CREATE TABLE IF NOT EXISTS return_items (
    return_id   TEXT NOT NULL REFERENCES returns(id),
    line_no     INTEGER NOT NULL,
    batch_id    TEXT NOT NULL,
    quantity    TEXT NOT NULL,
    PRIMARY KEY (return_id, line_no)
);
CREATE TABLE IF NOT EXISTS inventory_movements (
    id              TEXT PRIMARY KEY,
    batch_id        TEXT NOT NULL,
    movement_type   TEXT NOT NULL,
    quantity_change TEXT NOT NULL,
    quantity_before TEXT NOT NULL,
    quantity_after  TEXT NOT NULL,
    reference_type  TEXT NOT NULL,
    reference_id    TEXT NOT NULL,
    performed_by    TEXT NOT NULL,
    created_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_movements_batch ON inventory_movements(batch_id);
CREATE INDEX IF NOT EXISTS idx_movements_reference ON inventory_movements(reference_type, reference_id);
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, Some(msg))
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Duplicate(msg.clone())
            }
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

/// SQLite-backed store.
#[derive(Clone)]
pub struct SqliteReturnStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteReturnStore {
    /// Opens (or creates) the database file and applies the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` on the blocking pool with the connection locked.
    async fn with_conn<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Backend("connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("storage task failed: {e}")))?
    }
}

// ========================================
// 変換ヘルパー
// ========================================

fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{raw}': {e}")))
}

fn parse_dec(raw: &str) -> Result<Decimal, StoreError> {
    Decimal::from_str(raw).map_err(|e| StoreError::Corrupt(format!("quantity '{raw}': {e}")))
}

fn parse_id<T: FromStr>(raw: &str) -> Result<T, StoreError>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| StoreError::Corrupt(e.to_string()))
}

struct ReturnRow {
    id: String,
    order_id: String,
    reason: String,
    notes: Option<String>,
    processed_by: String,
    processed_at: String,
    status: String,
    restocked: bool,
    updated_at: String,
}

const RETURN_COLUMNS: &str =
    "id, order_id, reason, notes, processed_by, processed_at, status, restocked, updated_at";

fn map_return_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReturnRow> {
    Ok(ReturnRow {
        id: row.get(0)?,
        order_id: row.get(1)?,
        reason: row.get(2)?,
        notes: row.get(3)?,
        processed_by: row.get(4)?,
        processed_at: row.get(5)?,
        status: row.get(6)?,
        restocked: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn load_items(conn: &Connection, return_id: &str) -> Result<Vec<ReturnItem>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT batch_id, quantity FROM return_items WHERE return_id = ?1 ORDER BY line_no",
    )?;
    let raw = stmt
        .query_map(params![return_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    raw.iter()
        .map(|(batch, qty)| -> Result<ReturnItem, StoreError> {
            Ok(ReturnItem::new(parse_id(batch)?, parse_dec(qty)?))
        })
        .collect()
}

fn hydrate_return(conn: &Connection, row: ReturnRow) -> Result<ReturnRecord, StoreError> {
    Ok(ReturnRecord {
        id: parse_id(&row.id)?,
        order_id: parse_id(&row.order_id)?,
        items: load_items(conn, &row.id)?,
        reason: row
            .reason
            .parse::<ReturnReason>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        notes: row.notes,
        processed_by: UserId::new(row.processed_by),
        processed_at: parse_ts(&row.processed_at)?,
        status: row
            .status
            .parse::<ReturnStatus>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        restocked: row.restocked,
        updated_at: parse_ts(&row.updated_at)?,
    })
}

fn query_returns(
    conn: &Connection,
    filter: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<ReturnRecord>, StoreError> {
    let sql = format!("SELECT {RETURN_COLUMNS} FROM returns {filter} ORDER BY processed_at, id");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(args, map_return_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    drop(stmt);
    rows.into_iter().map(|row| hydrate_return(conn, row)).collect()
}

fn select_return(conn: &Connection, id: ReturnId) -> Result<Option<ReturnRecord>, StoreError> {
    let sql = format!("SELECT {RETURN_COLUMNS} FROM returns WHERE id = ?1");
    let row = conn
        .query_row(&sql, params![id.to_storage()], map_return_row)
        .optional()?;
    row.map(|row| hydrate_return(conn, row)).transpose()
}

fn select_order(conn: &Connection, id: OrderId) -> Result<Option<Order>, StoreError> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM orders WHERE id = ?1",
            params![id.to_storage()],
            |row| row.get(0),
        )
        .optional()?;
    let Some(status) = status else {
        return Ok(None);
    };
    let status = OrderStatus::parse(&status)
        .ok_or_else(|| StoreError::Corrupt(format!("order status '{status}'")))?;
    let mut stmt = conn.prepare(
        "SELECT batch_id, quantity FROM order_lines WHERE order_id = ?1 ORDER BY line_no",
    )?;
    let raw = stmt
        .query_map(params![id.to_storage()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    let lines = raw
        .iter()
        .map(|(batch, qty)| -> Result<OrderLine, StoreError> {
            Ok(OrderLine {
                batch_id: parse_id(batch)?,
                quantity: parse_dec(qty)?,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;
    Ok(Some(Order::new(id, status, lines)))
}

fn select_batch(conn: &Connection, id: BatchId) -> Result<Option<Batch>, StoreError> {
    let row = conn
        .query_row(
            "SELECT code, on_hand, updated_at FROM batches WHERE id = ?1",
            params![id.to_storage()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;
    row.map(|(code, on_hand, updated_at)| -> Result<Batch, StoreError> {
        Ok(Batch::new(id, code, parse_dec(&on_hand)?, parse_ts(&updated_at)?))
    })
    .transpose()
}

fn select_movements(
    conn: &Connection,
    filter: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<InventoryMovement>, StoreError> {
    let sql = format!(
        "SELECT id, batch_id, movement_type, quantity_change, quantity_before, quantity_after, \
         reference_type, reference_id, performed_by, created_at \
         FROM inventory_movements {filter} ORDER BY created_at, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let raw = stmt
        .query_map(args, |row| {
            let mut cols: [String; 10] = Default::default();
            for (i, col) in cols.iter_mut().enumerate() {
                *col = row.get(i)?;
            }
            Ok(cols)
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    raw.iter()
        .map(|c| -> Result<InventoryMovement, StoreError> {
            let movement_type = MovementType::parse(&c[2])
                .ok_or_else(|| StoreError::Corrupt(format!("movement type '{}'", c[2])))?;
            let reference = match c[6].as_str() {
                "RETURN" => MovementReference::Return(parse_id(&c[7])?),
                other => {
                    return Err(StoreError::Corrupt(format!("reference type '{other}'")));
                }
            };
            Ok(InventoryMovement {
                id: parse_id(&c[0])?,
                batch_id: parse_id(&c[1])?,
                movement_type,
                quantity_change: parse_dec(&c[3])?,
                quantity_before: parse_dec(&c[4])?,
                quantity_after: parse_dec(&c[5])?,
                reference,
                performed_by: UserId::new(c[8].clone()),
                created_at: parse_ts(&c[9])?,
            })
        })
        .collect()
}

fn insert_return_row(conn: &Connection, record: &ReturnRecord) -> Result<(), StoreError> {
    conn.execute(
        &format!("INSERT INTO returns ({RETURN_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"),
        params![
            record.id.to_storage(),
            record.order_id.to_storage(),
            record.reason.as_str(),
            record.notes,
            record.processed_by.as_str(),
            ts(&record.processed_at),
            record.status.as_str(),
            record.restocked,
            ts(&record.updated_at),
        ],
    )?;
    for (line_no, item) in record.items.iter().enumerate() {
        conn.execute(
            "INSERT INTO return_items (return_id, line_no, batch_id, quantity) VALUES (?1, ?2, ?3, ?4)",
            params![
                record.id.to_storage(),
                line_no as i64,
                item.batch_id.to_storage(),
                item.quantity.to_string(),
            ],
        )?;
    }
    Ok(())
}

fn insert_movement(conn: &Connection, m: &InventoryMovement) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO inventory_movements (id, batch_id, movement_type, quantity_change, \
         quantity_before, quantity_after, reference_type, reference_id, performed_by, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            m.id.to_storage(),
            m.batch_id.to_storage(),
            m.movement_type.as_str(),
            m.quantity_change.to_string(),
            m.quantity_before.to_string(),
            m.quantity_after.to_string(),
            m.reference.kind(),
            m.reference.id(),
            m.performed_by.as_str(),
            ts(&m.created_at),
        ],
    )?;
    Ok(())
}

/// Restock inside an open IMMEDIATE transaction.
fn restock_in_tx(
    conn: &Connection,
    return_id: ReturnId,
    plan: &RestockPlan,
) -> Result<Vec<InventoryMovement>, StoreError> {
    let mut movements = Vec::with_capacity(plan.lines.len());
    for line in &plan.lines {
        let mut batch =
            select_batch(conn, line.batch_id)?.ok_or(StoreError::BatchNotFound(line.batch_id))?;
        let movement = plan.apply_line(return_id, line, &mut batch)?;
        conn.execute(
            "UPDATE batches SET on_hand = ?1, updated_at = ?2 WHERE id = ?3",
            params![batch.on_hand.to_string(), ts(&batch.updated_at), batch.id.to_storage()],
        )?;
        insert_movement(conn, &movement)?;
        debug!(
            batch_id = %batch.id,
            before = %movement.quantity_before,
            after = %movement.quantity_after,
            "restocked batch"
        );
        movements.push(movement);
    }
    Ok(movements)
}

fn create_return_tx(
    conn: &mut Connection,
    new: &NewReturn,
) -> Result<Vec<InventoryMovement>, StoreError> {
    let record = &new.record;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if new.check_order {
        // 書き込みロック下で読むので、並行する作成はこの時点の件数を必ず見る
        let order = select_order(&tx, record.order_id)?;
        let existing = query_returns(
            &tx,
            "WHERE order_id = ?1",
            params![record.order_id.to_storage()],
        )?;
        check_against_order(order.as_ref(), &existing, record)?;
    }
    insert_return_row(&tx, record)?;
    let movements = match &new.restock {
        Some(plan) => restock_in_tx(&tx, record.id, plan)?,
        None => Vec::new(),
    };
    tx.commit()?;
    Ok(movements)
}

fn apply_transition_tx(
    conn: &mut Connection,
    update: &StatusUpdate,
) -> Result<Vec<InventoryMovement>, StoreError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let id = update.record.id;
    let current: Option<String> = tx
        .query_row(
            "SELECT status FROM returns WHERE id = ?1",
            params![id.to_storage()],
            |row| row.get(0),
        )
        .optional()?;
    let current = current
        .ok_or(StoreError::ReturnNotFound(id))?
        .parse::<ReturnStatus>()
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    if current != update.from {
        return Err(StoreError::Conflict {
            id,
            expected: update.from,
            actual: current,
        });
    }
    tx.execute(
        "UPDATE returns SET notes = ?1, status = ?2, restocked = ?3, updated_at = ?4 \
         WHERE id = ?5 AND status = ?6",
        params![
            update.record.notes,
            update.record.status.as_str(),
            update.record.restocked,
            ts(&update.record.updated_at),
            id.to_storage(),
            update.from.as_str(),
        ],
    )?;
    let movements = match &update.restock {
        Some(plan) => restock_in_tx(&tx, id, plan)?,
        None => Vec::new(),
    };
    tx.commit()?;
    Ok(movements)
}

#[async_trait]
impl ReturnStore for SqliteReturnStore {
    async fn insert_order(&self, order: Order) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            tx.execute(
                "INSERT INTO orders (id, status) VALUES (?1, ?2)",
                params![order.id.to_storage(), order.status.as_str()],
            )?;
            for (line_no, line) in order.lines.iter().enumerate() {
                tx.execute(
                    "INSERT INTO order_lines (order_id, line_no, batch_id, quantity) VALUES (?1, ?2, ?3, ?4)",
                    params![
                        order.id.to_storage(),
                        line_no as i64,
                        line.batch_id.to_storage(),
                        line.quantity.to_string(),
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        self.with_conn(move |conn| select_order(conn, id)).await
    }

    async fn insert_batch(&self, batch: Batch) -> Result<(), StoreError> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO batches (id, code, on_hand, updated_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    batch.id.to_storage(),
                    batch.code,
                    batch.on_hand.to_string(),
                    ts(&batch.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_batch(&self, id: BatchId) -> Result<Option<Batch>, StoreError> {
        self.with_conn(move |conn| select_batch(conn, id)).await
    }

    async fn get_return(&self, id: ReturnId) -> Result<Option<ReturnRecord>, StoreError> {
        self.with_conn(move |conn| select_return(conn, id)).await
    }

    async fn list_returns_for_order(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<ReturnRecord>, StoreError> {
        self.with_conn(move |conn| {
            query_returns(conn, "WHERE order_id = ?1", params![order_id.to_storage()])
        })
        .await
    }

    async fn list_returns(&self) -> Result<Vec<ReturnRecord>, StoreError> {
        self.with_conn(|conn| query_returns(conn, "", params![])).await
    }

    async fn movements_for_batch(
        &self,
        batch_id: BatchId,
    ) -> Result<Vec<InventoryMovement>, StoreError> {
        self.with_conn(move |conn| {
            select_movements(conn, "WHERE batch_id = ?1", params![batch_id.to_storage()])
        })
        .await
    }

    async fn movements_for_return(
        &self,
        return_id: ReturnId,
    ) -> Result<Vec<InventoryMovement>, StoreError> {
        self.with_conn(move |conn| {
            select_movements(
                conn,
                "WHERE reference_type = 'RETURN' AND reference_id = ?1",
                params![return_id.to_storage()],
            )
        })
        .await
    }

    async fn create_return(&self, new: NewReturn) -> Result<Vec<InventoryMovement>, StoreError> {
        self.with_conn(move |conn| {
            create_return_tx(conn, &new).inspect_err(|e| {
                warn!(return_id = %new.record.id, error = %e, "create_return rolled back");
            })
        })
        .await
    }

    async fn apply_transition(
        &self,
        update: StatusUpdate,
    ) -> Result<Vec<InventoryMovement>, StoreError> {
        self.with_conn(move |conn| {
            apply_transition_tx(conn, &update).inspect_err(|e| {
                warn!(return_id = %update.record.id, error = %e, "apply_transition rolled back");
            })
        })
        .await
    }
}
