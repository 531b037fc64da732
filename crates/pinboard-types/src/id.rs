use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Length of the hex encoding of an identifier (12 bytes).
pub const ID_LEN: usize = 24;

static PROCESS_BYTES: LazyLock<[u8; 5]> = LazyLock::new(rand::random);
static COUNTER: LazyLock<AtomicU32> =
    LazyLock::new(|| AtomicU32::new(rand::random::<u32>() & 0x00ff_ffff));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid identifier: {0:?}")]
pub struct InvalidIdentifier(pub String);

/// Entity identifier: 24 lowercase hex characters.
///
/// Layout of generated ids: 4-byte big-endian unix seconds, 5 bytes fixed
/// per process, 3-byte wrapping counter. Ids from other writers are accepted
/// as long as they have the right shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn new() -> Self {
        let secs = chrono::Utc::now().timestamp() as u32;
        let count = COUNTER.fetch_add(1, Ordering::Relaxed) & 0x00ff_ffff;

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_BYTES);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);

        Self(hex::encode(bytes))
    }

    /// Parse a string identifier. Upper-case hex is accepted and folded to
    /// lower case.
    pub fn parse(raw: &str) -> Result<Self, InvalidIdentifier> {
        if raw.len() == ID_LEN && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(raw.to_ascii_lowercase()))
        } else {
            Err(InvalidIdentifier(raw.to_string()))
        }
    }

    /// Normalize any stored or transmitted representation of an identifier:
    /// a plain string, or an extended-JSON object `{"$oid": "..."}`.
    /// Anything else is `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Self::parse(s).ok(),
            Value::Object(map) => map.get("$oid").and_then(Self::from_value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for ObjectId {
    type Err = InvalidIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid identifier: {value}")))
    }
}

/// Normalize a stored membership collection.
///
/// Non-array values (null, numbers, objects, garbage left by older writers)
/// become empty. Elements that are not identifiers are dropped and
/// duplicates collapse to their first occurrence.
pub fn normalize_id_set(value: &Value) -> Vec<ObjectId> {
    let Value::Array(items) = value else {
        return Vec::new();
    };

    let mut out: Vec<ObjectId> = Vec::with_capacity(items.len());
    for id in items.iter().filter_map(ObjectId::from_value) {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generated_ids_are_well_formed_and_distinct() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_ne!(a, b);
        assert!(ObjectId::parse(a.as_str()).is_ok());
        assert_eq!(a.as_str().len(), ID_LEN);
    }

    #[test]
    fn generated_ids_are_distinct_and_canonical() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_ne!(a, b);
        assert_eq!(ObjectId::parse(a.as_str()).unwrap(), a);
        assert_eq!(a.as_str().len(), ID_LEN);
    }

    #[test]
    fn parse_rejects_bad_shapes() {
        assert!(ObjectId::parse("").is_err());
        assert!(ObjectId::parse("abc").is_err());
        assert!(ObjectId::parse("507f1f77bcf86cd79943901").is_err());
        assert!(ObjectId::parse("507f1f77bcf86cd7994390111").is_err());
        assert!(ObjectId::parse("507f1f77bcf86cd79943901z").is_err());
    }

    #[test]
    fn parse_folds_case() {
        let id = ObjectId::parse("507F1F77BCF86CD799439011").unwrap();
        assert_eq!(id.as_str(), "507f1f77bcf86cd799439011");
    }

    #[test]
    fn from_value_accepts_string_and_oid_object() {
        let plain = ObjectId::from_value(&json!("507f1f77bcf86cd799439011"));
        let wrapped = ObjectId::from_value(&json!({ "$oid": "507f1f77bcf86cd799439011" }));
        assert_eq!(plain, wrapped);
        assert!(plain.is_some());

        assert!(ObjectId::from_value(&json!(42)).is_none());
        assert!(ObjectId::from_value(&json!(null)).is_none());
        assert!(ObjectId::from_value(&json!({ "id": "507f1f77bcf86cd799439011" })).is_none());
    }

    #[test]
    fn normalize_id_set_tolerates_drift() {
        assert!(normalize_id_set(&json!(null)).is_empty());
        assert!(normalize_id_set(&json!(7)).is_empty());
        assert!(normalize_id_set(&json!({ "a": 1 })).is_empty());

        let set = normalize_id_set(&json!([
            "507f1f77bcf86cd799439011",
            "not-an-id",
            { "$oid": "507F1F77BCF86CD799439011" },
            "507f1f77bcf86cd799439012",
            null
        ]));
        assert_eq!(
            set,
            vec![
                ObjectId::parse("507f1f77bcf86cd799439011").unwrap(),
                ObjectId::parse("507f1f77bcf86cd799439012").unwrap(),
            ]
        );
    }

    #[test]
    fn serde_uses_plain_string() {
        let id = ObjectId::parse("507f1f77bcf86cd799439011").unwrap();
        assert_eq!(serde_json::to_value(&id).unwrap(), json!("507f1f77bcf86cd799439011"));

        let back: ObjectId =
            serde_json::from_value(json!({ "$oid": "507f1f77bcf86cd799439011" })).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_value::<ObjectId>(json!("nope")).is_err());
    }
}
