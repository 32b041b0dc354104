//! Configuration loading and root folder resolution
//!
//! Resolution priority for every setting:
//! 1. Command-line argument (highest priority, handled by each binary's clap parser)
//! 2. Environment variable (`PRAN_*`, also wired through clap)
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! A missing config file is not an error: the services start with defaults and log a
//! warning, so a bare installation host can come up without any setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{Error, Result};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "PRAN_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "pran.db";

/// Election slot file name inside the root folder
pub const MASTER_SLOT_FILE: &str = "master.slot";

/// Complete TOML configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub log_level: Option<String>,
    pub server: ServerConfig,
    pub table: TableConfig,
    pub mirror: MirrorConfig,
}

/// `[server]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Plain admin token; only its digest is stored in the database
    pub admin_token: Option<String>,
    pub event_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".to_string(),
            port: 5800,
            admin_token: None,
            event_capacity: 256,
        }
    }
}

/// `[table]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Server base URL (`http://host:port`); the bus URL is derived from it
    pub server_url: String,
    /// Silence inserted between ordinary clips
    pub clip_gap_ms: u64,
    /// Silence inserted before a clip that opens a mood or pran choice
    pub pre_choice_gap_ms: u64,
    /// Delay between the last ENDING clip and the session reset
    pub auto_reset_ms: u64,
    /// Clip length assumed when the catalog carries none
    pub default_clip_ms: u64,
    /// Master election alive-check timeout
    pub ping_timeout_ms: u64,
    pub intro_ambience: String,
    pub closing_ambience: String,
    /// Folder that clip and ambience paths are relative to
    pub media_root: String,
    /// Ambience level under the clips, 0.0 to 1.0
    pub ambience_volume: f32,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5800".to_string(),
            clip_gap_ms: 600,
            pre_choice_gap_ms: 2000,
            auto_reset_ms: 2000,
            default_clip_ms: 5000,
            ping_timeout_ms: 1000,
            intro_ambience: "audio/ambience/intro.mp3".to_string(),
            closing_ambience: "audio/ambience/closing.mp3".to_string(),
            media_root: "media".to_string(),
            ambience_volume: 0.35,
        }
    }
}

/// `[mirror]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    pub server_url: String,
    /// How long revealed images stay up before the next clip is requested
    pub image_display_ms: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5800".to_string(),
            image_display_ms: 8000,
        }
    }
}

impl TomlConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config file: {}", e)))
    }
}

/// Load configuration
///
/// An explicitly named file must exist and parse. Without one, the platform
/// default location is tried and compiled defaults are used when it is absent.
pub fn load_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    if let Some(path) = explicit {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        info!("Loaded configuration from {}", path.display());
        return TomlConfig::from_toml_str(&content);
    }

    match default_config_path() {
        Some(path) if path.exists() => {
            let content = std::fs::read_to_string(&path)?;
            info!("Loaded configuration from {}", path.display());
            TomlConfig::from_toml_str(&content)
        }
        _ => {
            warn!("No config file found, using compiled defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Platform config file location (`<config_dir>/pran/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("pran").join("config.toml"))
}

/// Resolve the root folder holding the database and election slot
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("pran"))
        .unwrap_or_else(|| PathBuf::from("./pran_data"))
}

/// Create the root folder if needed and return the database path inside it
pub fn ensure_root_folder(root: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(root)?;
    Ok(root.join(DATABASE_FILE))
}

/// Turn `http://host:port` into the `ws://host:port/bus` Dispatch Bus URL
pub fn bus_url(server_url: &str, role: &str) -> String {
    let base = server_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}/bus?role={}", ws_base, role)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            [table]
            clip_gap_ms = 250

            [server]
            port = 6100
            "#,
        )
        .unwrap();

        assert_eq!(config.table.clip_gap_ms, 250);
        assert_eq!(config.table.pre_choice_gap_ms, 2000);
        assert_eq!(config.server.port, 6100);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.mirror.image_display_ms, 8000);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let result = TomlConfig::from_toml_str("[server\nport = ");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_bus_url_derivation() {
        assert_eq!(
            bus_url("http://10.0.0.2:5800/", "table"),
            "ws://10.0.0.2:5800/bus?role=table"
        );
        assert_eq!(
            bus_url("https://pran.local", "mirror"),
            "wss://pran.local/bus?role=mirror"
        );
    }
}
