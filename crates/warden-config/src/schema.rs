//! Raw configuration schema (as parsed from TOML)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw configuration as parsed from TOML
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawConfig {
    /// Config schema version
    pub config_version: u32,

    /// Service-level settings
    #[serde(default)]
    pub service: RawServiceConfig,

    /// Restriction policy settings
    #[serde(default)]
    pub restriction: RawRestrictionConfig,
}

/// Service-level settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawServiceConfig {
    /// IPC socket path (default: XDG runtime dir)
    pub socket_path: Option<PathBuf>,

    /// Data directory for the store
    pub data_dir: Option<PathBuf>,

    /// Seconds between heartbeat snapshots
    pub heartbeat_secs: Option<u64>,
}

/// Restriction policy settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawRestrictionConfig {
    /// Default restriction length in minutes, used when a command supplies none
    pub default_duration_mins: Option<u64>,

    /// Tag of the holding area the session server confines restricted
    /// entities to (opaque to wardend, forwarded in events)
    pub holding_zone: Option<String>,

    /// Rules URL shown to restricted entities by the session server
    pub rules_url: Option<String>,

    /// Commands restricted entities may not run
    pub command_blacklist: Option<Vec<String>>,

    /// Webhook URL for impose notices
    pub webhook_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_service_section() {
        let toml_str = r#"
            config_version = 1

            [service]
            socket_path = "/run/wardend/wardend.sock"
            heartbeat_secs = 60
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.service.heartbeat_secs, Some(60));
        assert!(config.service.socket_path.is_some());
    }

    #[test]
    fn parse_blacklist() {
        let toml_str = r#"
            config_version = 1

            [restriction]
            command_blacklist = ["tp", "tpa", "kill"]
        "#;

        let config: RawConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.restriction.command_blacklist.as_deref(),
            Some(&["tp".to_string(), "tpa".into(), "kill".into()][..])
        );
    }
}
