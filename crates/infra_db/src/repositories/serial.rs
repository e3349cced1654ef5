//! Serial repository implementation

use chrono::NaiveDateTime;
use sqlx::PgPool;
use tracing::debug;

use core_kernel::{
    CustomerId, InventoryItemId, OrderId, OrderLineId, SerialId, SerialTransactionId, UserId, VendorId,
    WarehouseId,
};
use domain_inventory::{InventoryError, Serial, SerialEvent, SerialStatus, SerialTransaction};

use crate::error::DatabaseError;
use crate::repositories::DbTransaction;

/// A serial loaded under lock, with the boundary between stored and new
/// history rows
#[derive(Debug, Clone)]
pub struct LockedSerial {
    pub serial: Serial,
    /// First provisional id; rows at or above it are not yet stored
    first_new_id: SerialTransactionId,
}

impl LockedSerial {
    fn new(serial: Serial) -> Self {
        let first_new_id = serial
            .history
            .iter()
            .map(|tx| tx.id)
            .max()
            .map_or(SerialTransactionId::new(1), |id| id.next());
        Self { serial, first_new_id }
    }

    /// Id to pass for the next event recorded on the serial
    pub fn next_id(&self) -> SerialTransactionId {
        self.serial
            .history
            .iter()
            .map(|tx| tx.id)
            .filter(|id| *id >= self.first_new_id)
            .max()
            .map_or(self.first_new_id, |id| id.next())
    }

    /// History rows recorded since the serial was loaded, in id order
    pub fn new_rows(&self) -> Vec<&SerialTransaction> {
        let mut rows: Vec<_> = self
            .serial
            .history
            .iter()
            .filter(|tx| tx.id >= self.first_new_id)
            .collect();
        rows.sort_by_key(|tx| tx.id);
        rows
    }
}

/// Repository for serialized assets and their event history
#[derive(Debug, Clone)]
pub struct SerialRepository {
    pool: PgPool,
}

impl SerialRepository {
    /// Creates a new SerialRepository with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Starts the database transaction a unit of work runs in
    pub async fn begin(&self) -> Result<DbTransaction<'static>, DatabaseError> {
        Ok(self.pool.begin().await?)
    }

    /// Registers a new serial number with an empty history
    pub async fn create_serial(
        &self,
        tx: &mut DbTransaction<'_>,
        item_id: InventoryItemId,
        serial_number: &str,
    ) -> Result<SerialId, DatabaseError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO serial (inventory_item_id, serial_number) VALUES ($1, $2) RETURNING id",
        )
        .bind(item_id.get())
        .bind(serial_number)
        .fetch_one(&mut **tx)
        .await?;

        Ok(SerialId::new(id))
    }

    /// Loads a serial with its full history and locks the serial row
    ///
    /// The derived state is replayed from the history rather than read from
    /// the stored columns.
    ///
    /// # Errors
    ///
    /// Returns `Inventory(SerialNotFound)` for an unknown id.
    pub async fn load_serial(&self, tx: &mut DbTransaction<'_>, id: SerialId) -> Result<LockedSerial, DatabaseError> {
        let row = sqlx::query_as::<_, SerialRow>(
            "SELECT id, inventory_item_id, serial_number FROM serial WHERE id = $1 FOR UPDATE",
        )
        .bind(id.get())
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(InventoryError::SerialNotFound(id))?;

        let history = sqlx::query_as::<_, SerialTransactionRow>(
            r#"
            SELECT
                id, serial_id, transaction_type, transaction_datetime,
                warehouse_id, vendor_id, customer_id, order_id, order_line_id,
                lot_number, last_update_user_id
            FROM serial_transaction
            WHERE serial_id = $1
            ORDER BY id
            "#,
        )
        .bind(id.get())
        .fetch_all(&mut **tx)
        .await?
        .into_iter()
        .map(SerialTransactionRow::into_domain)
        .collect::<Result<Vec<_>, _>>()?;

        let serial = Serial::from_history(
            id,
            InventoryItemId::new(row.inventory_item_id),
            row.serial_number,
            history,
        )?;
        debug!(serial_id = %id, events = serial.history.len(), "Serial loaded");
        Ok(LockedSerial::new(serial))
    }

    /// Inserts the newly recorded history rows and stores the derived state
    ///
    /// # Returns
    ///
    /// The number of history rows inserted
    pub async fn save_serial(&self, tx: &mut DbTransaction<'_>, locked: &LockedSerial) -> Result<usize, DatabaseError> {
        let rows = locked.new_rows();
        for row in &rows {
            sqlx::query(
                r#"
                INSERT INTO serial_transaction (
                    serial_id, transaction_type, transaction_datetime,
                    warehouse_id, vendor_id, customer_id, order_id, order_line_id,
                    lot_number, last_update_user_id
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(row.serial_id.get())
            .bind(row.event.legacy_name())
            .bind(row.time)
            .bind(row.warehouse_id.map(|id| id.get()))
            .bind(row.vendor_id.map(|id| id.get()))
            .bind(row.customer_id.map(|id| id.get()))
            .bind(row.order_id.map(|id| id.get()))
            .bind(row.order_line_id.map(|id| id.get()))
            .bind(row.lot_number.as_deref())
            .bind(row.actor.get())
            .execute(&mut **tx)
            .await?;
        }

        let serial = &locked.serial;
        let state = &serial.state;
        sqlx::query(
            r#"
            UPDATE serial SET
                status = $2,
                warehouse_id = $3,
                lot_number = $4,
                sold_date = $5,
                current_customer_id = $6,
                last_customer_id = $7,
                vendor_id = $8,
                order_id = $9
            WHERE id = $1
            "#,
        )
        .bind(serial.id.get())
        .bind(state.status.map(|status| status.legacy_name()))
        .bind(state.warehouse_id.map(|id| id.get()))
        .bind(state.lot_number.as_deref())
        .bind(state.sold_date)
        .bind(state.current_customer_id.map(|id| id.get()))
        .bind(state.last_customer_id.map(|id| id.get()))
        .bind(state.vendor_id.map(|id| id.get()))
        .bind(state.order_id.map(|id| id.get()))
        .execute(&mut **tx)
        .await?;

        debug!(serial_id = %serial.id, inserted = rows.len(), status = ?state.status, "Serial saved");
        Ok(rows.len())
    }

    /// Reads the stored status column without locking
    pub async fn stored_status(&self, id: SerialId) -> Result<Option<SerialStatus>, DatabaseError> {
        let status: Option<Option<String>> = sqlx::query_scalar("SELECT status FROM serial WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;

        match status {
            None => Err(InventoryError::SerialNotFound(id).into()),
            Some(None) => Ok(None),
            Some(Some(name)) => name
                .parse()
                .map(Some)
                .map_err(|e: InventoryError| DatabaseError::corrupt("serial", id.get(), e)),
        }
    }
}

/// Database row for a serial header
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SerialRow {
    pub id: i64,
    pub inventory_item_id: i64,
    pub serial_number: String,
}

/// Database row for a serial history event
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SerialTransactionRow {
    pub id: i64,
    pub serial_id: i64,
    pub transaction_type: String,
    pub transaction_datetime: NaiveDateTime,
    pub warehouse_id: Option<i64>,
    pub vendor_id: Option<i64>,
    pub customer_id: Option<i64>,
    pub order_id: Option<i64>,
    pub order_line_id: Option<i64>,
    pub lot_number: Option<String>,
    pub last_update_user_id: i64,
}

impl SerialTransactionRow {
    fn into_domain(self) -> Result<SerialTransaction, DatabaseError> {
        let event: SerialEvent = self
            .transaction_type
            .parse()
            .map_err(|e: InventoryError| DatabaseError::corrupt("serial_transaction", self.id, e))?;

        Ok(SerialTransaction {
            id: SerialTransactionId::new(self.id),
            serial_id: SerialId::new(self.serial_id),
            event,
            time: self.transaction_datetime,
            warehouse_id: self.warehouse_id.map(WarehouseId::new),
            vendor_id: self.vendor_id.map(VendorId::new),
            customer_id: self.customer_id.map(CustomerId::new),
            order_id: self.order_id.map(OrderId::new),
            order_line_id: self.order_line_id.map(OrderLineId::new),
            lot_number: self.lot_number,
            actor: UserId::new(self.last_update_user_id),
        })
    }
}
