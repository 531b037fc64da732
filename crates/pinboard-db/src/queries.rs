use crate::Database;
use crate::models::{BoardRow, CommentRow, UserRow};
use anyhow::{Result, anyhow};
use chrono::Utc;
use pinboard_types::ObjectId;
use pinboard_types::metrics::Segment;
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use tracing::{debug, warn};

const USER_COLUMNS: &str = "u.id, u.username, u.email, u.password, u.bio, u.avatar, u.location, u.website,
     u.total_pins_created, u.total_comments, u.total_boards,
     (SELECT COUNT(*) FROM follows f WHERE f.followee_id = u.id),
     (SELECT COUNT(*) FROM follows f WHERE f.follower_id = u.id),
     u.activity_score, u.segment, u.login_count, u.last_login, u.created_at, u.updated_at";

/// Outcome of [`Database::register_user`].
#[derive(Debug)]
pub enum Registration {
    Created(UserRow),
    EmailTaken,
    UsernameTaken,
}

impl Database {
    // -- Users --

    /// Insert a new user unless the email or username is already in use.
    /// The uniqueness checks and the insert run under one writer lock, so
    /// concurrent registrations of the same name cannot both succeed.
    pub fn register_user(&self, mut user: UserRow) -> Result<Registration> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if query_user_where(&tx, "u.email = ?1", &user.email)?.is_some() {
                return Ok(Registration::EmailTaken);
            }
            if query_user_where(&tx, "u.username = ?1", &user.username)?.is_some() {
                return Ok(Registration::UsernameTaken);
            }
            persist_user(&tx, &mut user)?;
            let created = query_user_by_id(&tx, &user.id)?
                .ok_or_else(|| anyhow!("User vanished after insert: {}", user.id))?;
            tx.commit()?;
            Ok(Registration::Created(created))
        })
    }

    /// Persist a user. The derived activity score and segment are
    /// recomputed from the stored follow relation and the row's counters
    /// before the write, every time.
    pub fn save_user(&self, mut user: UserRow) -> Result<UserRow> {
        self.with_conn_mut(|conn| {
            persist_user(conn, &mut user)?;
            query_user_by_id(conn, &user.id)?
                .ok_or_else(|| anyhow!("User vanished after save: {}", user.id))
        })
    }

    pub fn find_user_by_id(&self, id: &ObjectId) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_where(conn, "u.email = ?1", email))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_where(conn, "u.username = ?1", username))
    }

    /// Read-modify-save a user under the writer lock.
    pub fn update_user<F>(&self, id: &ObjectId, f: F) -> Result<Option<UserRow>>
    where
        F: FnOnce(&mut UserRow),
    {
        self.with_conn_mut(|conn| {
            let Some(mut user) = query_user_by_id(conn, id)? else {
                return Ok(None);
            };
            f(&mut user);
            persist_user(conn, &mut user)?;
            query_user_by_id(conn, id)
        })
    }

    pub fn record_login(&self, id: &ObjectId) -> Result<Option<UserRow>> {
        self.update_user(id, |user| {
            user.login_count += 1;
            user.last_login = Some(Utc::now());
        })
    }

    // -- Follows --

    /// Make `follower` follow `followee`. Returns whether a new edge was
    /// created and the followee as persisted, or `None` if the followee
    /// does not exist.
    pub fn follow(
        &self,
        follower: &ObjectId,
        followee: &ObjectId,
    ) -> Result<Option<(bool, UserRow)>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if query_user_by_id(&tx, followee)?.is_none() {
                return Ok(None);
            }
            let created = tx.execute(
                "INSERT OR IGNORE INTO follows (follower_id, followee_id) VALUES (?1, ?2)",
                (follower.as_str(), followee.as_str()),
            )? == 1;
            let user = modify_user(&tx, followee, |_| {})?;
            tx.commit()?;
            debug!("{} follows {} (new edge: {})", follower, followee, created);
            Ok(Some((created, user)))
        })
    }

    pub fn unfollow(
        &self,
        follower: &ObjectId,
        followee: &ObjectId,
    ) -> Result<Option<(bool, UserRow)>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if query_user_by_id(&tx, followee)?.is_none() {
                return Ok(None);
            }
            let removed = tx.execute(
                "DELETE FROM follows WHERE follower_id = ?1 AND followee_id = ?2",
                (follower.as_str(), followee.as_str()),
            )? == 1;
            let user = modify_user(&tx, followee, |_| {})?;
            tx.commit()?;
            Ok(Some((removed, user)))
        })
    }

    // -- Comments --

    /// Insert a comment and credit it to the author's `total_comments`.
    pub fn add_comment(
        &self,
        pin_id: &ObjectId,
        user_id: &ObjectId,
        text: &str,
    ) -> Result<CommentRow> {
        let id = ObjectId::new();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO comments (id, pin_id, user_id, text, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id.as_str(), pin_id.as_str(), user_id.as_str(), text, Utc::now()],
            )?;
            modify_user(&tx, user_id, |u| u.total_comments += 1)?;
            tx.commit()?;

            query_comments(conn, "c.id = ?1", id.as_str())?
                .pop()
                .ok_or_else(|| anyhow!("Comment vanished after insert: {}", id))
        })
    }

    /// Comments on a pin, oldest first.
    pub fn list_comments(&self, pin_id: &ObjectId) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| query_comments(conn, "c.pin_id = ?1", pin_id.as_str()))
    }

    // -- Boards --

    /// Insert a board and credit it to the owner's `total_boards`.
    pub fn create_board(&self, board: &BoardRow) -> Result<BoardRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO boards (id, owner_id, name, description, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    board.id.as_str(),
                    board.owner_id.as_str(),
                    board.name,
                    board.description,
                    board.created_at
                ],
            )?;
            modify_user(&tx, &board.owner_id, |u| u.total_boards += 1)?;
            tx.commit()?;
            Ok(board.clone())
        })
    }

    pub fn get_board(&self, id: &ObjectId) -> Result<Option<BoardRow>> {
        self.with_conn(|conn| Ok(query_boards(conn, "id = ?1", id.as_str())?.pop()))
    }

    pub fn list_boards_by_owner(&self, owner_id: &ObjectId) -> Result<Vec<BoardRow>> {
        self.with_conn(|conn| query_boards(conn, "owner_id = ?1", owner_id.as_str()))
    }

    /// All boards, newest first.
    pub fn list_boards(&self, limit: u32, offset: u32) -> Result<Vec<BoardRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, owner_id, name, description, created_at FROM boards
                 ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt
                .query_map(rusqlite::params![limit, offset], map_board)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Rename or re-describe a board. Owner and creation time never change.
    pub fn update_board<F>(&self, id: &ObjectId, f: F) -> Result<Option<BoardRow>>
    where
        F: FnOnce(&mut BoardRow),
    {
        self.with_conn_mut(|conn| {
            let Some(mut board) = query_boards(conn, "id = ?1", id.as_str())?.pop() else {
                return Ok(None);
            };
            f(&mut board);
            conn.execute(
                "UPDATE boards SET name = ?1, description = ?2 WHERE id = ?3",
                (&board.name, &board.description, id.as_str()),
            )?;
            Ok(Some(board))
        })
    }

    /// Returns false if there was no such board. The owner's
    /// `total_boards` is a lifetime count and is left as is.
    pub fn delete_board(&self, id: &ObjectId) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM boards WHERE id = ?1", [id.as_str()])?;
            Ok(n == 1)
        })
    }
}

/// Write a user row, recomputing the derived fields first.
pub(crate) fn persist_user(conn: &Connection, user: &mut UserRow) -> Result<()> {
    user.followers_count = count_followers(conn, &user.id)?;
    user.refresh_derived();

    conn.execute(
        "INSERT INTO users (id, username, email, password, bio, avatar, location, website,
                            total_pins_created, total_comments, total_boards,
                            activity_score, segment, login_count, last_login, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
         ON CONFLICT(id) DO UPDATE SET
            username = excluded.username,
            email = excluded.email,
            password = excluded.password,
            bio = excluded.bio,
            avatar = excluded.avatar,
            location = excluded.location,
            website = excluded.website,
            total_pins_created = excluded.total_pins_created,
            total_comments = excluded.total_comments,
            total_boards = excluded.total_boards,
            activity_score = excluded.activity_score,
            segment = excluded.segment,
            login_count = excluded.login_count,
            last_login = excluded.last_login,
            updated_at = excluded.updated_at",
        rusqlite::params![
            user.id.as_str(),
            user.username,
            user.email,
            user.password,
            user.bio,
            user.avatar,
            user.location,
            user.website,
            user.total_pins_created as i64,
            user.total_comments as i64,
            user.total_boards as i64,
            user.activity_score,
            user.segment.as_str(),
            user.login_count as i64,
            user.last_login,
            user.created_at,
            user.updated_at,
        ],
    )?;

    debug!(
        "Saved user {} (score {:.1}, segment {})",
        user.id, user.activity_score, user.segment
    );
    Ok(())
}

/// Load, adjust and persist a user inside an open connection or transaction.
pub(crate) fn modify_user<F>(conn: &Connection, id: &ObjectId, f: F) -> Result<UserRow>
where
    F: FnOnce(&mut UserRow),
{
    let mut user = query_user_by_id(conn, id)?.ok_or_else(|| anyhow!("User not found: {}", id))?;
    f(&mut user);
    persist_user(conn, &mut user)?;
    Ok(user)
}

fn count_followers(conn: &Connection, id: &ObjectId) -> Result<u64> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM follows WHERE followee_id = ?1",
        [id.as_str()],
        |row| row.get(0),
    )?;
    Ok(n.max(0) as u64)
}

pub(crate) fn query_user_by_id(conn: &Connection, id: &ObjectId) -> Result<Option<UserRow>> {
    query_user_where(conn, "u.id = ?1", id.as_str())
}

fn query_user_where(conn: &Connection, predicate: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users u WHERE {}", USER_COLUMNS, predicate);
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([value], map_user).optional()?;
    Ok(row)
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    let id = id_column(row, 0)?;
    let segment = row.get::<_, String>(14)?.parse().unwrap_or_else(|e| {
        warn!("Corrupt segment on user '{}': {}", id, e);
        Segment::Casual
    });

    Ok(UserRow {
        id,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        bio: row.get(4)?,
        avatar: row.get(5)?,
        location: row.get(6)?,
        website: row.get(7)?,
        total_pins_created: count_column(row, 8)?,
        total_comments: count_column(row, 9)?,
        total_boards: count_column(row, 10)?,
        followers_count: count_column(row, 11)?,
        following_count: count_column(row, 12)?,
        activity_score: row.get(13)?,
        segment,
        login_count: count_column(row, 15)?,
        last_login: row.get(16)?,
        created_at: row.get(17)?,
        updated_at: row.get(18)?,
    })
}

fn query_comments(conn: &Connection, predicate: &str, value: &str) -> Result<Vec<CommentRow>> {
    let sql = format!(
        "SELECT c.id, c.pin_id, c.user_id, u.username, c.text, c.created_at
         FROM comments c
         LEFT JOIN users u ON c.user_id = u.id
         WHERE {}
         ORDER BY c.created_at ASC, c.id ASC",
        predicate
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([value], |row| {
            Ok(CommentRow {
                id: id_column(row, 0)?,
                pin_id: id_column(row, 1)?,
                user_id: id_column(row, 2)?,
                username: row.get::<_, Option<String>>(3)?.unwrap_or_else(|| "unknown".to_string()),
                text: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn query_boards(conn: &Connection, predicate: &str, value: &str) -> Result<Vec<BoardRow>> {
    let sql = format!(
        "SELECT id, owner_id, name, description, created_at FROM boards WHERE {} ORDER BY created_at DESC",
        predicate
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([value], map_board)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn map_board(row: &Row<'_>) -> rusqlite::Result<BoardRow> {
    Ok(BoardRow {
        id: id_column(row, 0)?,
        owner_id: id_column(row, 1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub(crate) fn id_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<ObjectId> {
    let raw: String = row.get(idx)?;
    ObjectId::parse(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn count_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    Ok(row.get::<_, i64>(idx)?.max(0) as u64)
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn seed_user(db: &Database, name: &str) -> UserRow {
        db.save_user(UserRow::new(name, &format!("{name}@example.com"), "hash"))
            .unwrap()
    }

    #[test]
    fn new_user_round_trips() {
        let db = db();
        let user = seed_user(&db, "ana");

        let loaded = db.find_user_by_id(&user.id).unwrap().unwrap();
        assert_eq!(loaded.username, "ana");
        assert_eq!(loaded.segment, Segment::Casual);
        assert_eq!(loaded.activity_score, 0.0);
        assert!(db.get_user_by_email("ana@example.com").unwrap().is_some());
        assert!(db.get_user_by_username("ana").unwrap().is_some());
        assert!(db.find_user_by_id(&ObjectId::new()).unwrap().is_none());
    }

    #[test]
    fn save_recomputes_even_without_counter_change() {
        let db = db();
        let mut user = seed_user(&db, "ana");
        user.total_pins_created = 100;
        let user = db.save_user(user).unwrap();
        assert!((user.activity_score - 30.0).abs() < 1e-9);
        assert_eq!(user.segment, Segment::Power);

        // A client-supplied score is discarded on the next save.
        let mut tampered = user.clone();
        tampered.activity_score = 999.0;
        tampered.segment = Segment::Influencer;
        let saved = db.save_user(tampered).unwrap();
        assert!((saved.activity_score - 30.0).abs() < 1e-9);
        assert_eq!(saved.segment, Segment::Power);
    }

    #[test]
    fn followers_count_comes_from_relation_not_row() {
        let db = db();
        let mut user = seed_user(&db, "ana");
        user.followers_count = 10_000;
        let saved = db.save_user(user).unwrap();
        assert_eq!(saved.followers_count, 0);
        assert_eq!(saved.segment, Segment::Casual);
    }

    #[test]
    fn follow_is_idempotent_and_updates_followee_metrics() {
        let db = db();
        let ana = seed_user(&db, "ana");
        let bob = seed_user(&db, "bob");

        let (created, bob_after) = db.follow(&ana.id, &bob.id).unwrap().unwrap();
        assert!(created);
        assert_eq!(bob_after.followers_count, 1);
        assert!((bob_after.activity_score - 0.3).abs() < 1e-9);

        let (created, bob_after) = db.follow(&ana.id, &bob.id).unwrap().unwrap();
        assert!(!created);
        assert_eq!(bob_after.followers_count, 1);

        let ana_after = db.find_user_by_id(&ana.id).unwrap().unwrap();
        assert_eq!(ana_after.following_count, 1);

        let (removed, bob_after) = db.unfollow(&ana.id, &bob.id).unwrap().unwrap();
        assert!(removed);
        assert_eq!(bob_after.followers_count, 0);
        assert_eq!(bob_after.activity_score, 0.0);

        let (removed, _) = db.unfollow(&ana.id, &bob.id).unwrap().unwrap();
        assert!(!removed);
    }

    #[test]
    fn duplicate_username_on_update_is_a_constraint_violation() {
        let db = db();
        seed_user(&db, "ana");
        let bob = seed_user(&db, "bob");

        let err = db
            .update_user(&bob.id, |u| u.username = "ana".to_string())
            .unwrap_err();
        assert!(crate::is_constraint_violation(&err));
        assert!(!crate::is_constraint_violation(&anyhow!("disk full")));
    }

    #[test]
    fn follow_unknown_user_is_none() {
        let db = db();
        let ana = seed_user(&db, "ana");
        assert!(db.follow(&ana.id, &ObjectId::new()).unwrap().is_none());
    }

    #[test]
    fn register_rejects_taken_email_and_username() {
        let db = db();
        let ana = match db.register_user(UserRow::new("ana", "ana@example.com", "hash")).unwrap() {
            Registration::Created(user) => user,
            other => panic!("expected a new user, got {:?}", other),
        };
        assert_eq!(ana.segment, Segment::Casual);

        let same_email = db.register_user(UserRow::new("ana2", "ana@example.com", "hash")).unwrap();
        assert!(matches!(same_email, Registration::EmailTaken));

        let same_name = db.register_user(UserRow::new("ana", "other@example.com", "hash")).unwrap();
        assert!(matches!(same_name, Registration::UsernameTaken));

        assert!(db.get_user_by_email("other@example.com").unwrap().is_none());
    }

    #[test]
    fn record_login_counts() {
        let db = db();
        let ana = seed_user(&db, "ana");
        db.record_login(&ana.id).unwrap();
        let ana = db.record_login(&ana.id).unwrap().unwrap();
        assert_eq!(ana.login_count, 2);
        assert!(ana.last_login.is_some());
    }

    #[test]
    fn board_creation_bumps_owner() {
        let db = db();
        let ana = seed_user(&db, "ana");
        let board = db.create_board(&BoardRow::new(ana.id.clone(), "Kitchens", "")).unwrap();

        assert_eq!(db.get_board(&board.id).unwrap().unwrap().name, "Kitchens");
        assert_eq!(db.list_boards_by_owner(&ana.id).unwrap().len(), 1);

        let ana = db.find_user_by_id(&ana.id).unwrap().unwrap();
        assert_eq!(ana.total_boards, 1);
        assert!((ana.activity_score - 0.2).abs() < 1e-9);
    }

    #[test]
    fn board_edit_and_delete() {
        let db = db();
        let ana = seed_user(&db, "ana");
        let board = db.create_board(&BoardRow::new(ana.id.clone(), "Kitchens", "")).unwrap();

        let renamed = db
            .update_board(&board.id, |b| b.name = "Pantries".to_string())
            .unwrap()
            .unwrap();
        assert_eq!(renamed.name, "Pantries");
        assert_eq!(renamed.owner_id, ana.id);
        assert_eq!(db.get_board(&board.id).unwrap().unwrap().name, "Pantries");
        assert!(db.update_board(&ObjectId::new(), |_| {}).unwrap().is_none());

        assert!(db.delete_board(&board.id).unwrap());
        assert!(!db.delete_board(&board.id).unwrap());
        assert!(db.get_board(&board.id).unwrap().is_none());

        let ana = db.find_user_by_id(&ana.id).unwrap().unwrap();
        assert_eq!(ana.total_boards, 1);
    }

    #[test]
    fn boards_list_newest_first() {
        let db = db();
        let ana = seed_user(&db, "ana");
        let first = db.create_board(&BoardRow::new(ana.id.clone(), "one", "")).unwrap();
        let mut second = BoardRow::new(ana.id.clone(), "two", "");
        second.created_at = first.created_at + chrono::Duration::seconds(5);
        let second = db.create_board(&second).unwrap();

        let page = db.list_boards(1, 0).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, second.id);
        assert_eq!(db.list_boards(10, 1).unwrap()[0].id, first.id);
    }

    #[test]
    fn board_for_unknown_owner_rolls_back() {
        let db = db();
        let err = db.create_board(&BoardRow::new(ObjectId::new(), "Orphan", ""));
        assert!(err.is_err());
    }
}
