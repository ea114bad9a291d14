use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::ServerAddress;
use crate::persist::SchemaDigest;

pub const DEFAULT_AUTH_PORT: u16 = 20013;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    pub auth_address: ServerAddress,
    pub client_version: String,
    pub client_script_version: String,
    pub client_type: i8,
    #[serde(with = "duration_secs")]
    pub tick_interval: Duration,
    #[serde(with = "duration_secs")]
    pub liveness_window: Duration,
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
    pub expected_digest: Option<SchemaDigest>,
    pub persist_schema: bool,
    pub max_pending_updates: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auth_address: ServerAddress::new("127.0.0.1", DEFAULT_AUTH_PORT),
            client_version: "2.5.0".to_string(),
            client_script_version: "0.1.0".to_string(),
            client_type: 5,
            tick_interval: Duration::from_secs(15),
            // three missed heartbeats
            liveness_window: Duration::from_secs(45),
            connect_timeout: Duration::from_secs(5),
            expected_digest: None,
            persist_schema: true,
            max_pending_updates: 64,
        }
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.auth_address.to_string(), "127.0.0.1:20013");
        assert_eq!(config.liveness_window, config.tick_interval * 3);
        assert!(config.persist_schema);
        assert!(config.expected_digest.is_none());
    }
}
