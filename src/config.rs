// Session configuration
// Defaults reproduce the reference Global-A tester; a JSON file may override any field

use crate::types::CanId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_REQUEST_ID: u16 = 0x7E0;
pub const DEFAULT_RESPONSE_ID: u16 = 0x7E8;
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_LOCKOUT_DELAY_MS: u64 = 10_000;
pub const DEFAULT_TESTER_PRESENT_INTERVAL_MS: u64 = 2000;
pub const DEFAULT_BUS_ADDRESS: &str = "127.0.0.1:9000";
pub const DEFAULT_CLIENT_NAME: &str = "GM_TESTER";

/// Largest 11-bit identifier
const MAX_STANDARD_ID: u16 = 0x7FF;

/// Tunables for one SecurityAccess session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// ECM physical request identifier
    pub request_id: u16,
    /// ECM physical response identifier
    pub response_id: u16,
    /// Bound on every receive
    pub response_timeout_ms: u64,
    /// Penalty wait after NRC 0x36
    pub lockout_delay_ms: u64,
    /// Keep-alive period for long sessions
    pub tester_present_interval_ms: u64,
    /// Virtual CAN bus server address (the "channel")
    pub bus_address: String,
    /// Source name stamped on outgoing frames
    pub client_name: String,
    /// Directory for the hash-chained audit log; `None` disables it
    pub audit_log_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_id: DEFAULT_REQUEST_ID,
            response_id: DEFAULT_RESPONSE_ID,
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            lockout_delay_ms: DEFAULT_LOCKOUT_DELAY_MS,
            tester_present_interval_ms: DEFAULT_TESTER_PRESENT_INTERVAL_MS,
            bus_address: DEFAULT_BUS_ADDRESS.to_string(),
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            audit_log_dir: None,
        }
    }
}

impl SessionConfig {
    /// Load a JSON configuration file and validate it
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&json)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_id > MAX_STANDARD_ID {
            return Err(ConfigError::Invalid(format!(
                "request_id 0x{:X} is not an 11-bit identifier",
                self.request_id
            )));
        }
        if self.response_id > MAX_STANDARD_ID {
            return Err(ConfigError::Invalid(format!(
                "response_id 0x{:X} is not an 11-bit identifier",
                self.response_id
            )));
        }
        if self.request_id == self.response_id {
            return Err(ConfigError::Invalid(
                "request_id and response_id must differ".to_string(),
            ));
        }
        if self.response_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "response_timeout_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_can_id(&self) -> CanId {
        CanId::Standard(self.request_id)
    }

    pub fn response_can_id(&self) -> CanId {
        CanId::Standard(self.response_id)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn lockout_delay(&self) -> Duration {
        Duration::from_millis(self.lockout_delay_ms)
    }

    pub fn tester_present_interval(&self) -> Duration {
        Duration::from_millis(self.tester_present_interval_ms)
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ConfigError::Io(reason) => write!(f, "Failed to read configuration: {}", reason),
            ConfigError::Parse(reason) => write!(f, "Failed to parse configuration: {}", reason),
            ConfigError::Invalid(reason) => write!(f, "Invalid configuration: {}", reason),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_global_a_tester() {
        let config = SessionConfig::default();
        assert_eq!(config.request_can_id(), CanId::Standard(0x7E0));
        assert_eq!(config.response_can_id(), CanId::Standard(0x7E8));
        assert_eq!(config.response_timeout(), Duration::from_secs(1));
        assert_eq!(config.lockout_delay(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SessionConfig::from_json(r#"{ "lockout_delay_ms": 500 }"#).unwrap();
        assert_eq!(config.lockout_delay(), Duration::from_millis(500));
        assert_eq!(config.request_id, DEFAULT_REQUEST_ID);
        assert_eq!(config.bus_address, DEFAULT_BUS_ADDRESS);
    }

    #[test]
    fn test_invalid_identifiers_rejected() {
        let wide = SessionConfig::from_json(r#"{ "request_id": 4096 }"#);
        assert!(matches!(wide, Err(ConfigError::Invalid(_))));

        let same = SessionConfig::from_json(r#"{ "request_id": 2024, "response_id": 2024 }"#);
        assert!(matches!(same, Err(ConfigError::Invalid(_))));

        let zero = SessionConfig::from_json(r#"{ "response_timeout_ms": 0 }"#);
        assert!(matches!(zero, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(matches!(
            SessionConfig::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "client_name": "BENCH", "bus_address": "10.0.0.2:9000" }}"#).unwrap();

        let config = SessionConfig::from_file(file.path()).unwrap();
        assert_eq!(config.client_name, "BENCH");
        assert_eq!(config.bus_address, "10.0.0.2:9000");

        let missing = SessionConfig::from_file(Path::new("/nonexistent/ecm.json"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }
}
