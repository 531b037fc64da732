use anyhow::{Result, anyhow};
use chrono::Utc;
use pinboard_types::ObjectId;
use rusqlite::{Connection, Row};
use tracing::debug;

use crate::models::{PinRow, decode_id_set, encode_id_set};
use crate::queries::{OptionalExt, id_column, modify_user};
use crate::{Database, PinStore};

const PIN_COLUMNS: &str =
    "id, owner_id, title, description, image_url, likes, saves, created_at, updated_at";

impl PinStore for Database {
    fn find_pin_by_id(&self, id: &ObjectId) -> Result<Option<PinRow>> {
        self.with_conn(|conn| query_pin_by_id(conn, id))
    }

    fn save_pin(&self, pin: &PinRow) -> Result<PinRow> {
        self.with_conn_mut(|conn| {
            write_pin(conn, pin)?;
            query_pin_by_id(conn, &pin.id)?
                .ok_or_else(|| anyhow!("Pin vanished after save: {}", pin.id))
        })
    }

    /// Holds the connection lock across load, mutate and write, so two
    /// concurrent updates of one pin cannot overwrite each other.
    fn update_pin<F>(&self, id: &ObjectId, mutate: F) -> Result<Option<PinRow>>
    where
        F: FnOnce(&mut PinRow) -> bool,
    {
        self.with_conn_mut(|conn| {
            let Some(mut pin) = query_pin_by_id(conn, id)? else {
                return Ok(None);
            };
            if !mutate(&mut pin) {
                return Ok(Some(pin));
            }
            pin.updated_at = Utc::now();
            write_pin(conn, &pin)?;
            query_pin_by_id(conn, id)
        })
    }
}

impl Database {
    /// Insert a new pin and credit it to the owner's `total_pins_created`.
    pub fn create_pin(&self, pin: &PinRow) -> Result<PinRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            write_pin(&tx, pin)?;
            modify_user(&tx, &pin.owner_id, |u| u.total_pins_created += 1)?;
            tx.commit()?;

            debug!("Created pin {} for {}", pin.id, pin.owner_id);
            query_pin_by_id(conn, &pin.id)?
                .ok_or_else(|| anyhow!("Pin vanished after insert: {}", pin.id))
        })
    }

    /// Newest first.
    pub fn list_pins(&self, limit: u32, offset: u32) -> Result<Vec<PinRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM pins ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
                PIN_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![limit, offset], map_pin)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns false if there was no such pin. Comments go with it.
    pub fn delete_pin(&self, id: &ObjectId) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM pins WHERE id = ?1", [id.as_str()])?;
            Ok(n == 1)
        })
    }
}

/// Upsert. Owner and creation time are fixed at insert; `updated_at` is
/// written as the row carries it.
fn write_pin(conn: &Connection, pin: &PinRow) -> Result<()> {
    conn.execute(
        "INSERT INTO pins (id, owner_id, title, description, image_url, likes, saves, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            image_url = excluded.image_url,
            likes = excluded.likes,
            saves = excluded.saves,
            updated_at = excluded.updated_at",
        rusqlite::params![
            pin.id.as_str(),
            pin.owner_id.as_str(),
            pin.title,
            pin.description,
            pin.image_url,
            encode_id_set(&pin.likes),
            encode_id_set(&pin.saves),
            pin.created_at,
            pin.updated_at,
        ],
    )?;
    Ok(())
}

fn query_pin_by_id(conn: &Connection, id: &ObjectId) -> Result<Option<PinRow>> {
    let sql = format!("SELECT {} FROM pins WHERE id = ?1", PIN_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([id.as_str()], map_pin).optional()?;
    Ok(row)
}

fn map_pin(row: &Row<'_>) -> rusqlite::Result<PinRow> {
    let likes: Option<String> = row.get(5)?;
    let saves: Option<String> = row.get(6)?;

    Ok(PinRow {
        id: id_column(row, 0)?,
        owner_id: id_column(row, 1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        image_url: row.get(4)?,
        likes: decode_id_set(likes.as_deref()),
        saves: decode_id_set(saves.as_deref()),
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRow;
    use pinboard_types::metrics::Segment;

    fn setup() -> (Database, UserRow) {
        let db = Database::open_in_memory().unwrap();
        let owner = db
            .save_user(UserRow::new("ana", "ana@example.com", "hash"))
            .unwrap();
        (db, owner)
    }

    #[test]
    fn create_pin_credits_owner() {
        let (db, owner) = setup();
        let pin = db
            .create_pin(&PinRow::new(owner.id.clone(), "Lamp", "", "https://img/1.jpg"))
            .unwrap();
        assert!(pin.likes.is_empty());
        assert!(pin.saves.is_empty());

        let owner = db.find_user_by_id(&owner.id).unwrap().unwrap();
        assert_eq!(owner.total_pins_created, 1);
        assert!((owner.activity_score - 0.3).abs() < 1e-9);
        assert_eq!(owner.segment, Segment::Casual);
    }

    #[test]
    fn malformed_membership_columns_load_empty() {
        let (db, owner) = setup();
        let pin = db
            .create_pin(&PinRow::new(owner.id.clone(), "Lamp", "", "https://img/1.jpg"))
            .unwrap();

        db.with_conn(|conn| {
            conn.execute(
                "UPDATE pins SET likes = 'oops', saves = NULL WHERE id = ?1",
                [pin.id.as_str()],
            )?;
            Ok(())
        })
        .unwrap();

        let loaded = db.find_pin_by_id(&pin.id).unwrap().unwrap();
        assert!(loaded.likes.is_empty());
        assert!(loaded.saves.is_empty());
    }

    #[test]
    fn update_pin_persists_mutation() {
        let (db, owner) = setup();
        let pin = db
            .create_pin(&PinRow::new(owner.id.clone(), "Lamp", "", "https://img/1.jpg"))
            .unwrap();

        let liker = ObjectId::new();
        let updated = db
            .update_pin(&pin.id, |p| {
                p.likes.push(liker.clone());
                true
            })
            .unwrap()
            .unwrap();
        assert_eq!(updated.likes, vec![liker.clone()]);
        assert!(updated.updated_at >= pin.updated_at);

        let reloaded = db.find_pin_by_id(&pin.id).unwrap().unwrap();
        assert_eq!(reloaded.likes, vec![liker]);
        assert_eq!(reloaded.owner_id, owner.id);

        assert!(db.update_pin(&ObjectId::new(), |_| true).unwrap().is_none());
    }

    #[test]
    fn unchanged_update_writes_nothing() {
        let (db, owner) = setup();
        let pin = db
            .create_pin(&PinRow::new(owner.id.clone(), "Lamp", "", "https://img/1.jpg"))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));

        let returned = db.update_pin(&pin.id, |_| false).unwrap().unwrap();
        assert_eq!(returned.updated_at, pin.updated_at);

        let reloaded = db.find_pin_by_id(&pin.id).unwrap().unwrap();
        assert_eq!(reloaded.updated_at, pin.updated_at);
    }

    #[test]
    fn list_is_newest_first_and_paged() {
        let (db, owner) = setup();
        let first = db
            .create_pin(&PinRow::new(owner.id.clone(), "one", "", "u"))
            .unwrap();
        let mut second = PinRow::new(owner.id.clone(), "two", "", "u");
        second.created_at = first.created_at + chrono::Duration::seconds(5);
        let second = db.create_pin(&second).unwrap();

        let page = db.list_pins(1, 0).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, second.id);

        let page = db.list_pins(10, 1).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, first.id);
    }

    #[test]
    fn delete_takes_comments_with_it() {
        let (db, owner) = setup();
        let pin = db
            .create_pin(&PinRow::new(owner.id.clone(), "Lamp", "", "u"))
            .unwrap();
        db.add_comment(&pin.id, &owner.id, "nice").unwrap();
        assert_eq!(db.list_comments(&pin.id).unwrap().len(), 1);

        assert!(db.delete_pin(&pin.id).unwrap());
        assert!(!db.delete_pin(&pin.id).unwrap());
        assert!(db.find_pin_by_id(&pin.id).unwrap().is_none());
        assert!(db.list_comments(&pin.id).unwrap().is_empty());
    }
}
