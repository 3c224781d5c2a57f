//! Identifiers for rooms, participants, sessions and negotiation logs.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Random v4 UUID in hyphenated form. Room and participant ids use it.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Eight hex digits tying together the log lines of one peer negotiation.
pub fn new_correlation_id() -> String {
    let mut cid = Uuid::new_v4().simple().to_string();
    cid.truncate(8);
    cid
}

/// One conferencing session of the local client, stable across the rooms
/// it enters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(new_id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_v4_uuids() {
        let a = new_id();
        let parsed = Uuid::parse_str(&a).unwrap();
        assert_eq!(parsed.get_version_num(), 4);
        assert_ne!(a, new_id());
    }

    #[test]
    fn correlation_id_is_eight_hex_digits() {
        let cid = new_correlation_id();
        assert_eq!(cid.len(), 8);
        assert!(cid.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn session_id_serializes_as_plain_string() {
        let sid = SessionId::new();
        assert_eq!(sid.to_string(), sid.as_str());

        let json = serde_json::to_string(&sid).unwrap();
        assert_eq!(json, format!("\"{sid}\""));
        let back: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sid);
    }
}
