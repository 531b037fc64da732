//! Database row types — these map directly to SQLite rows.
//! Distinct from pinboard-types API models to keep the DB layer independent.
use chrono::{DateTime, Utc};
use pinboard_types::ObjectId;
use pinboard_types::id::normalize_id_set;
use pinboard_types::metrics::{ActivityCounters, Segment};
use pinboard_types::models::EngagementKind;
use serde_json::Value;

pub const DEFAULT_AVATAR: &str = "https://i.pravatar.cc/150";

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: ObjectId,
    pub username: String,
    pub email: String,
    pub password: String,
    pub bio: String,
    pub avatar: String,
    pub location: String,
    pub website: String,
    pub total_pins_created: u64,
    pub total_comments: u64,
    pub total_boards: u64,
    /// Size of the follow relation. Read-only: recounted from `follows`
    /// whenever the row is loaded or saved.
    pub followers_count: u64,
    pub following_count: u64,
    pub activity_score: f64,
    pub segment: Segment,
    pub login_count: u64,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    /// A freshly registered user: zero counters, casual segment.
    pub fn new(username: &str, email: &str, password_hash: &str) -> Self {
        let now = Utc::now();
        Self {
            id: ObjectId::new(),
            username: username.to_string(),
            email: email.to_string(),
            password: password_hash.to_string(),
            bio: String::new(),
            avatar: DEFAULT_AVATAR.to_string(),
            location: String::new(),
            website: String::new(),
            total_pins_created: 0,
            total_comments: 0,
            total_boards: 0,
            followers_count: 0,
            following_count: 0,
            activity_score: 0.0,
            segment: Segment::Casual,
            login_count: 0,
            last_login: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn counters(&self) -> ActivityCounters {
        ActivityCounters {
            pins_created: self.total_pins_created,
            comments: self.total_comments,
            boards: self.total_boards,
            followers: self.followers_count,
        }
    }

    /// Recompute the derived fields from the current counters. Runs on
    /// every save, whether or not a counter moved.
    pub fn refresh_derived(&mut self) {
        let metrics = self.counters().metrics();
        self.activity_score = metrics.activity_score;
        self.segment = metrics.segment;
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone)]
pub struct PinRow {
    pub id: ObjectId,
    pub owner_id: ObjectId,
    pub title: String,
    pub description: String,
    pub image_url: String,
    pub likes: Vec<ObjectId>,
    pub saves: Vec<ObjectId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PinRow {
    pub fn new(owner_id: ObjectId, title: &str, description: &str, image_url: &str) -> Self {
        let now = Utc::now();
        Self {
            id: ObjectId::new(),
            owner_id,
            title: title.to_string(),
            description: description.to_string(),
            image_url: image_url.to_string(),
            likes: Vec::new(),
            saves: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn members_mut(&mut self, kind: EngagementKind) -> &mut Vec<ObjectId> {
        match kind {
            EngagementKind::Like => &mut self.likes,
            EngagementKind::Save => &mut self.saves,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommentRow {
    pub id: ObjectId,
    pub pin_id: ObjectId,
    pub user_id: ObjectId,
    /// Joined from `users`; "unknown" if the author row is gone.
    pub username: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BoardRow {
    pub id: ObjectId,
    pub owner_id: ObjectId,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl BoardRow {
    pub fn new(owner_id: ObjectId, name: &str, description: &str) -> Self {
        Self {
            id: ObjectId::new(),
            owner_id,
            name: name.to_string(),
            description: description.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Decode a stored likes/saves column. NULL, unparsable text and non-array
/// JSON all load as an empty set.
pub fn decode_id_set(raw: Option<&str>) -> Vec<ObjectId> {
    let value = raw
        .and_then(|s| serde_json::from_str::<Value>(s).ok())
        .unwrap_or(Value::Null);
    normalize_id_set(&value)
}

pub fn encode_id_set(ids: &[ObjectId]) -> String {
    let raw: Vec<&str> = ids.iter().map(ObjectId::as_str).collect();
    Value::from(raw).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_tolerates_malformed_columns() {
        assert!(decode_id_set(None).is_empty());
        assert!(decode_id_set(Some("")).is_empty());
        assert!(decode_id_set(Some("{not json")).is_empty());
        assert!(decode_id_set(Some("17")).is_empty());
        assert!(decode_id_set(Some("\"507f1f77bcf86cd799439011\"")).is_empty());
    }

    #[test]
    fn encode_decode_keeps_order() {
        let ids = vec![ObjectId::new(), ObjectId::new(), ObjectId::new()];
        assert_eq!(decode_id_set(Some(&encode_id_set(&ids))), ids);
    }

    #[test]
    fn refresh_derived_tracks_counters() {
        let mut user = UserRow::new("ana", "ana@example.com", "x");
        user.total_pins_created = 100;
        user.followers_count = 200;
        user.refresh_derived();
        assert!((user.activity_score - 90.0).abs() < 1e-9);
        assert_eq!(user.segment, Segment::Influencer);

        user.total_pins_created = 0;
        user.followers_count = 0;
        user.refresh_derived();
        assert_eq!(user.activity_score, 0.0);
        assert_eq!(user.segment, Segment::Casual);
    }
}
