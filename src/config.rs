//! TOML-based configuration system.
//!
//! Every section implements `Default` and is `#[serde(default)]`, so a
//! missing or partial `config.toml` yields the built-in behaviour.
//!
//! ## Config file search order
//!
//! 1. `SANPIX_CONFIG` environment variable (explicit override)
//! 2. Next to the executable (`<exe_dir>/config.toml`)
//! 3. Platform config directory (`$XDG_CONFIG_HOME/sanpix`, `%APPDATA%\SanPix`)
//! 4. Current working directory (`./config.toml`)
//! 5. No file found → `Config::default()`

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::filter::FilterRules;
use crate::notifications::NotificationPolicy;

const CONFIG_ENV: &str = "SANPIX_CONFIG";
const CONFIG_FILE: &str = "config.toml";

/// iPhone Safari, as the site serves its lightest layout to it.
const MOBILE_SAFARI_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
     AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";

// ─────────────────────────────────────────────────────────────────────────────
// Config structs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub window: WindowConfig,
    pub engine: EngineConfig,
    pub filter: FilterConfig,
    pub notifications: NotificationPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// The only origin navigation may reach. Validated at startup.
    pub trusted_origin: String,
    pub window_title: String,
    /// Scheme of app deep links (`<scheme>://movie/42`).
    pub app_scheme: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
}

/// Servo engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub user_agent: String,
    /// Maximum layout threads. 0 = auto-detect from CPU count.
    pub layout_threads: i64,
    /// HTTP cache size in bytes.
    pub cache_size: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub selectors: FilterRules,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            trusted_origin: "https://www.cineby.app/".to_string(),
            window_title: "SanPix".to_string(),
            app_scheme: "sanpix".to_string(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 800,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            user_agent: MOBILE_SAFARI_UA.to_string(),
            layout_threads: 0,
            cache_size: 50_000,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Loads configuration from the first file found. Never fails: an
    /// unreadable or invalid file falls back to defaults.
    pub fn load() -> Self {
        match find_config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                info!("No config file found, using defaults");
                Config::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str::<Config>(&content) {
                Ok(config) => {
                    info!(path = %path.display(), "Configuration loaded");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Invalid config, using defaults");
                    Config::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot read config, using defaults");
                Config::default()
            }
        }
    }
}

fn find_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        let p = PathBuf::from(path);
        if p.is_file() {
            return Some(p);
        }
        warn!(path = %p.display(), "{CONFIG_ENV} does not point to a file");
    }

    if let Ok(exe) = std::env::current_exe()
        && let Some(dir) = exe.parent()
    {
        let p = dir.join(CONFIG_FILE);
        if p.is_file() {
            return Some(p);
        }
    }

    if let Some(dir) = platform_config_dir() {
        let p = dir.join(CONFIG_FILE);
        if p.is_file() {
            return Some(p);
        }
    }

    let p = PathBuf::from(CONFIG_FILE);
    p.is_file().then_some(p)
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(windows)]
    {
        std::env::var("APPDATA")
            .ok()
            .map(|appdata| PathBuf::from(appdata).join("SanPix"))
    }
    #[cfg(not(windows))]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .or_else(|| std::env::var("HOME").ok().map(|h| format!("{h}/.config")))
            .map(|dir| PathBuf::from(dir).join("sanpix"))
    }
}
