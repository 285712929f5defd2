//! Default paths for wardend components
//!
//! User-writable by default (no root required):
//! - Socket: `$XDG_RUNTIME_DIR/wardend/wardend.sock` or `/tmp/wardend-$USER/wardend.sock`
//! - Data: `$XDG_DATA_HOME/wardend` or `~/.local/share/wardend`
//! - Config: `$XDG_CONFIG_HOME/warden/config.toml` or `~/.config/warden/config.toml`

use std::path::PathBuf;

/// Environment variable for overriding the socket path
pub const WARDEN_SOCKET_ENV: &str = "WARDEN_SOCKET";

/// Environment variable for overriding the data directory
pub const WARDEN_DATA_DIR_ENV: &str = "WARDEN_DATA_DIR";

const SOCKET_FILENAME: &str = "wardend.sock";

const APP_DIR: &str = "wardend";

/// Default socket path: `$WARDEN_SOCKET`, then `$XDG_RUNTIME_DIR/wardend/`,
/// then `/tmp/wardend-$USER/`.
pub fn default_socket_path() -> PathBuf {
    if let Ok(path) = std::env::var(WARDEN_SOCKET_ENV) {
        return PathBuf::from(path);
    }

    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join(APP_DIR).join(SOCKET_FILENAME);
    }

    let username = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    PathBuf::from(format!("/tmp/{}-{}", APP_DIR, username)).join(SOCKET_FILENAME)
}

/// Default data directory: `$WARDEN_DATA_DIR`, then `$XDG_DATA_HOME/wardend`,
/// then `~/.local/share/wardend`.
pub fn default_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var(WARDEN_DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    if let Ok(data_home) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(data_home).join(APP_DIR);
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR);
    }

    PathBuf::from("/tmp").join(APP_DIR).join("data")
}

/// Default configuration file path: `$XDG_CONFIG_HOME/warden/config.toml`
/// or `~/.config/warden/config.toml`.
pub fn default_config_path() -> PathBuf {
    if let Ok(config_home) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(config_home).join("warden").join("config.toml");
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("warden")
            .join("config.toml");
    }

    PathBuf::from("/etc/warden/config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_path_names_the_daemon() {
        let path = default_socket_path();
        assert!(path.to_string_lossy().contains("wardend"));
        assert!(path.to_string_lossy().ends_with(".sock"));
    }

    #[test]
    fn config_path_is_toml() {
        let path = default_config_path();
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }
}
