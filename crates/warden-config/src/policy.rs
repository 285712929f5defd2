//! Validated configuration ready for use by the daemon

use std::path::PathBuf;
use std::time::Duration;

use crate::schema::RawConfig;

/// Default restriction length when a command supplies none
const DEFAULT_DURATION_MINS: u64 = 15;

/// Default seconds between heartbeat snapshots
const DEFAULT_HEARTBEAT_SECS: u64 = 300;

/// Commands restricted entities may not run, if the config lists none
const DEFAULT_BLACKLIST: &[&str] = &["tp", "tpa", "tpr", "home", "trade", "kill"];

/// Validated configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    pub restriction: RestrictionPolicy,
}

impl Config {
    /// Convert from raw config (after validation)
    pub fn from_raw(raw: RawConfig) -> Self {
        Self {
            service: ServiceConfig {
                socket_path: raw
                    .service
                    .socket_path
                    .unwrap_or_else(warden_util::default_socket_path),
                data_dir: raw
                    .service
                    .data_dir
                    .unwrap_or_else(warden_util::default_data_dir),
                heartbeat_interval: Duration::from_secs(
                    raw.service.heartbeat_secs.unwrap_or(DEFAULT_HEARTBEAT_SECS),
                ),
            },
            restriction: RestrictionPolicy {
                default_duration: Duration::from_secs(
                    raw.restriction
                        .default_duration_mins
                        .unwrap_or(DEFAULT_DURATION_MINS)
                        * 60,
                ),
                holding_zone: raw
                    .restriction
                    .holding_zone
                    .unwrap_or_else(|| "detention".to_string()),
                rules_url: raw.restriction.rules_url,
                blacklist: CommandBlacklist::new(
                    raw.restriction.command_blacklist.unwrap_or_else(|| {
                        DEFAULT_BLACKLIST.iter().map(|s| s.to_string()).collect()
                    }),
                ),
                webhook_url: raw.restriction.webhook_url,
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_raw(RawConfig {
            config_version: crate::CURRENT_CONFIG_VERSION,
            service: Default::default(),
            restriction: Default::default(),
        })
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub socket_path: PathBuf,
    pub data_dir: PathBuf,
    pub heartbeat_interval: Duration,
}

/// Restriction policy
#[derive(Debug, Clone)]
pub struct RestrictionPolicy {
    pub default_duration: Duration,
    pub holding_zone: String,
    pub rules_url: Option<String>,
    pub blacklist: CommandBlacklist,
    pub webhook_url: Option<String>,
}

/// Case-insensitive command blacklist for restricted entities.
///
/// Matches the bare command, the command with its arguments appended, and
/// the part after a namespace dot (`chat.say` also matches an entry `say`).
#[derive(Debug, Clone)]
pub struct CommandBlacklist {
    entries: Vec<String>,
}

impl CommandBlacklist {
    pub fn new(entries: Vec<String>) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_blocked(&self, command: &str, args: &[String]) -> bool {
        let mut candidates = vec![command.to_string()];
        if let Some((_, tail)) = command.split_once('.') {
            candidates.push(tail.to_string());
        }

        for candidate in candidates {
            if self.matches(&candidate) {
                return true;
            }
            if !args.is_empty() {
                let with_args = format!("{} {}", candidate, args.join(" "));
                if self.matches(&with_args) {
                    return true;
                }
            }
        }

        false
    }

    fn matches(&self, candidate: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.eq_ignore_ascii_case(candidate))
    }
}

/// Validation error with field context
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a raw config, returning every problem found
pub fn validate_config(raw: &RawConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if raw.restriction.default_duration_mins == Some(0) {
        errors.push(ValidationError {
            field: "restriction.default_duration_mins".into(),
            message: "must be positive".into(),
        });
    }

    if raw.service.heartbeat_secs == Some(0) {
        errors.push(ValidationError {
            field: "service.heartbeat_secs".into(),
            message: "must be positive".into(),
        });
    }

    if let Some(url) = &raw.restriction.webhook_url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            errors.push(ValidationError {
                field: "restriction.webhook_url".into(),
                message: "must be an http(s) URL".into(),
            });
        }
    }

    if let Some(url) = &raw.restriction.rules_url {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            errors.push(ValidationError {
                field: "restriction.rules_url".into(),
                message: "must be an http(s) URL".into(),
            });
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blacklist() -> CommandBlacklist {
        CommandBlacklist::new(vec!["tp".into(), "kill".into(), "clan invite".into()])
    }

    #[test]
    fn blocks_bare_command_case_insensitively() {
        let list = blacklist();
        assert!(list.is_blocked("tp", &[]));
        assert!(list.is_blocked("TP", &[]));
        assert!(!list.is_blocked("tpx", &[]));
    }

    #[test]
    fn blocks_namespaced_command_by_suffix() {
        let list = blacklist();
        assert!(list.is_blocked("global.kill", &[]));
        assert!(!list.is_blocked("global.say", &[]));
    }

    #[test]
    fn blocks_command_with_arguments() {
        let list = blacklist();
        assert!(list.is_blocked("clan", &["invite".to_string()]));
        assert!(!list.is_blocked("clan", &["leave".to_string()]));
    }

    #[test]
    fn default_config_is_usable() {
        let config = Config::default();
        assert_eq!(
            config.restriction.default_duration,
            Duration::from_secs(15 * 60)
        );
        assert!(config.restriction.blacklist.is_blocked("tp", &[]));
        assert!(config.restriction.webhook_url.is_none());
    }

    #[test]
    fn webhook_url_must_be_http() {
        let raw: RawConfig = toml::from_str(
            r#"
            config_version = 1

            [restriction]
            webhook_url = "ftp://example.test"
            "#,
        )
        .unwrap();

        let errors = validate_config(&raw);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "restriction.webhook_url");
    }
}
