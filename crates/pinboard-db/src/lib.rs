pub mod migrations;
pub mod models;
pub mod pins;
pub mod queries;

use anyhow::Result;
use chrono::Utc;
use pinboard_types::ObjectId;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

use crate::models::PinRow;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let db = Self::init(conn)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    /// Private, throwaway database. Used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }

    /// Exclusive access for multi-statement writes. The same lock guards
    /// reads, so a closure here sees no interleaved writer.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&mut conn)
    }
}

/// True if SQLite refused a write because of a UNIQUE or other constraint.
pub fn is_constraint_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Storage collaborator for pin engagement.
pub trait PinStore {
    fn find_pin_by_id(&self, id: &ObjectId) -> Result<Option<PinRow>>;

    /// Write the whole pin and return it as stored.
    fn save_pin(&self, pin: &PinRow) -> Result<PinRow>;

    /// Load, mutate and persist a pin. `Ok(None)` if the pin does not exist.
    ///
    /// `mutate` returns whether it changed anything. If it did not, nothing
    /// is written and the pin comes back exactly as loaded; otherwise
    /// `updated_at` is stamped before the write.
    ///
    /// The default is a plain read-modify-write; implementations that can
    /// hold a lock across both steps should override it.
    fn update_pin<F>(&self, id: &ObjectId, mutate: F) -> Result<Option<PinRow>>
    where
        F: FnOnce(&mut PinRow) -> bool,
    {
        let Some(mut pin) = self.find_pin_by_id(id)? else {
            return Ok(None);
        };
        if !mutate(&mut pin) {
            return Ok(Some(pin));
        }
        pin.updated_at = Utc::now();
        self.save_pin(&pin).map(Some)
    }
}
