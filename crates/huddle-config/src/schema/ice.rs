use serde::{Deserialize, Serialize};

/// STUN/TURN servers handed to the RTC engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IceConfig {
    pub stun_servers: Vec<String>,
    pub turn_servers: Vec<String>,
    pub turn_username: Option<String>,
    pub turn_credential: Option<String>,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec![
                "stun:stun.l.google.com:19302".into(),
                "stun:stun1.l.google.com:19302".into(),
                "stun:stun.mozilla.org:3478".into(),
            ],
            turn_servers: Vec::new(),
            turn_username: None,
            turn_credential: None,
        }
    }
}
