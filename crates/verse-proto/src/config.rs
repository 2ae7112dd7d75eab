use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::platform;
use super::protocol::{DEFAULT_PAGE_SIZE, WILDCARD_QUERY};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Where the versefind API lives.  All endpoint paths are joined onto `origin`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_origin")]
    pub origin: String,
    #[serde(default = "default_search_path")]
    pub search_path: String,
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
    #[serde(default = "default_auth_path")]
    pub auth_path: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Quiet period after the last keystroke before a search is issued.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_query")]
    pub default_query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewConfig {
    #[serde(default = "default_preview_enabled")]
    pub enabled: bool,
    #[serde(default = "default_volume")]
    pub volume: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Cookie-equivalent session token file.
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            search_path: default_search_path(),
            ws_path: default_ws_path(),
            auth_path: default_auth_path(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            page_size: default_page_size(),
            default_query: default_query(),
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            enabled: default_preview_enabled(),
            volume: default_volume(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            session_file: default_session_file(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl SearchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Page size, never zero.
    pub fn effective_page_size(&self) -> usize {
        self.page_size.max(1)
    }
}

fn default_origin() -> String {
    "http://127.0.0.1:3001".to_string()
}

fn default_search_path() -> String {
    "/search".to_string()
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_auth_path() -> String {
    "/auth".to_string()
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_query() -> String {
    WILDCARD_QUERY.to_string()
}

fn default_preview_enabled() -> bool {
    true
}

fn default_volume() -> f32 {
    0.5
}

fn default_session_file() -> PathBuf {
    platform::data_dir().join("session")
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load from `path`, writing the defaults there first if it does not exist.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.origin, "http://127.0.0.1:3001");
        assert_eq!(config.server.search_path, "/search");
        assert_eq!(config.server.ws_path, "/ws");
        assert_eq!(config.server.auth_path, "/auth");
        assert_eq!(config.search.debounce(), Duration::from_millis(300));
        assert_eq!(config.search.page_size, 20);
        assert_eq!(config.search.default_query, "*");
        assert!(config.preview.enabled);
        assert!(config.paths.session_file.ends_with("versefind/session"));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            origin = "https://versefind.com"

            [search]
            page_size = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.server.origin, "https://versefind.com");
        assert_eq!(config.server.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.search.debounce_ms, 300);
        assert_eq!(config.search.effective_page_size(), 1);
        assert_eq!(config.preview.volume, 0.5);
    }

    #[test]
    fn test_load_writes_defaults_on_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.search.page_size, 20);

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.server.origin, config.server.origin);
    }
}
