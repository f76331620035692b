// Argument helpers shared by the command-line drivers

use crate::audit_log::AuditLogger;
use crate::config::{ConfigError, SessionConfig};
use std::path::Path;

/// Exit status for a missing or malformed required argument
pub const USAGE_EXIT_CODE: i32 = 2;

/// Value of `--flag value` or `--flag=value`
pub fn arg_value(args: &[String], flag: &str) -> Option<String> {
    let prefix = format!("{}=", flag);
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == flag {
            return iter.next().cloned();
        }
        if let Some(value) = arg.strip_prefix(&prefix) {
            return Some(value.to_string());
        }
    }
    None
}

/// Build the session configuration from `--config`, then apply
/// `--can-channel` and `--tester-name` overrides
pub fn session_config(args: &[String]) -> Result<SessionConfig, ConfigError> {
    let mut config = match arg_value(args, "--config") {
        Some(path) => SessionConfig::from_file(Path::new(&path))?,
        None => SessionConfig::default(),
    };

    if let Some(channel) = arg_value(args, "--can-channel") {
        config.bus_address = channel;
    }
    if let Some(name) = arg_value(args, "--tester-name") {
        config.client_name = name;
    }

    config.validate()?;
    Ok(config)
}

/// Audit logger for the configured directory, if auditing is enabled
pub fn audit_logger(config: &SessionConfig) -> std::io::Result<Option<AuditLogger>> {
    match &config.audit_log_dir {
        Some(dir) => AuditLogger::new(config.client_name.clone(), Some(dir.clone())).map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_arg_value_forms() {
        let argv = args(&["prog", "--key", "0x1D1E82E706", "--can-channel=10.0.0.5:9000"]);
        assert_eq!(arg_value(&argv, "--key").as_deref(), Some("0x1D1E82E706"));
        assert_eq!(arg_value(&argv, "--can-channel").as_deref(), Some("10.0.0.5:9000"));
        assert_eq!(arg_value(&argv, "--seed"), None);
        // flag without a value
        assert_eq!(arg_value(&args(&["prog", "--key"]), "--key"), None);
    }

    #[test]
    fn test_session_config_overrides() {
        let argv = args(&["prog", "--can-channel", "192.168.1.20:9000", "--tester-name", "BENCH"]);
        let config = session_config(&argv).unwrap();
        assert_eq!(config.bus_address, "192.168.1.20:9000");
        assert_eq!(config.client_name, "BENCH");
        assert_eq!(config.request_id, 0x7E0);
    }

    #[test]
    fn test_missing_config_file() {
        let argv = args(&["prog", "--config", "/nonexistent/ecm.json"]);
        assert!(matches!(session_config(&argv), Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_audit_disabled_by_default() {
        let logger = audit_logger(&SessionConfig::default()).unwrap();
        assert!(logger.is_none());
    }
}
