//! Configuration parsing and validation for wardend
//!
//! Supports TOML configuration with:
//! - Versioned schema
//! - Service paths and heartbeat cadence
//! - Restriction defaults (duration, holding zone, command blacklist)
//! - Validation with clear error messages

mod policy;
mod schema;

pub use policy::*;
pub use schema::*;

use std::path::Path;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation failed: {errors:?}")]
    ValidationFailed { errors: Vec<ValidationError> },

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(u32),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Current supported config version
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Load and validate configuration from a TOML file
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from a TOML string
pub fn parse_config(content: &str) -> ConfigResult<Config> {
    let raw: RawConfig = toml::from_str(content)?;

    if raw.config_version != CURRENT_CONFIG_VERSION {
        return Err(ConfigError::UnsupportedVersion(raw.config_version));
    }

    let errors = validate_config(&raw);
    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed { errors });
    }

    Ok(Config::from_raw(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn parse_minimal_config() {
        let config = r#"
            config_version = 1
        "#;

        let config = parse_config(config).unwrap();
        assert_eq!(
            config.restriction.default_duration,
            Duration::from_secs(15 * 60)
        );
        assert!(!config.restriction.blacklist.is_empty());
    }

    #[test]
    fn parse_full_config() {
        let config = r#"
            config_version = 1

            [service]
            heartbeat_secs = 120

            [restriction]
            default_duration_mins = 30
            holding_zone = "cellblock"
            rules_url = "https://example.test/rules"
            command_blacklist = ["tp", "trade"]
            webhook_url = "https://hooks.example.test/warden"
        "#;

        let config = parse_config(config).unwrap();
        assert_eq!(config.service.heartbeat_interval, Duration::from_secs(120));
        assert_eq!(
            config.restriction.default_duration,
            Duration::from_secs(30 * 60)
        );
        assert_eq!(config.restriction.holding_zone, "cellblock");
        assert!(config.restriction.blacklist.is_blocked("TP", &[]));
    }

    #[test]
    fn reject_wrong_version() {
        let config = r#"
            config_version = 99
        "#;

        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::UnsupportedVersion(99))));
    }

    #[test]
    fn reject_zero_default_duration() {
        let config = r#"
            config_version = 1

            [restriction]
            default_duration_mins = 0
        "#;

        let result = parse_config(config);
        assert!(matches!(result, Err(ConfigError::ValidationFailed { .. })));
    }
}
