use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::error;

const DEFAULT_PORT: u16 = 8000;
const DEFAULT_PAGE_SIZE: u64 = 6;
const MAX_PAGE_SIZE: u64 = 100;

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

// ─── TOML config file ─────────────────────────────────────────────────────────

/// `{data_dir}/config.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    /// HTTP server port (default: 8000).
    port: Option<u16>,
    /// Bind address (default: "127.0.0.1"; use "0.0.0.0" for LAN access).
    bind_address: Option<String>,
    /// Log level filter string, e.g. "debug", "info,ladle=trace" (default: "info").
    log: Option<String>,
    /// Log output format: "pretty" (default) | "json" (for log aggregators).
    log_format: Option<String>,
    /// Public base URL used when rendering short links
    /// (default: "http://{bind_address}:{port}").
    site_url: Option<String>,
    /// Directory for uploaded images (default: {data_dir}/media).
    media_dir: Option<PathBuf>,
    /// Default page size for paginated endpoints (default: 6, max: 100).
    page_size: Option<u64>,
    /// Log SQLite queries slower than this many milliseconds (0 = off, default: 100).
    slow_query_threshold_ms: Option<u64>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

// ─── AppConfig ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub bind_address: String,
    pub data_dir: PathBuf,
    pub media_dir: PathBuf,
    pub log: String,
    /// "pretty" | "json"
    pub log_format: String,
    /// Base URL rendered into short links, no trailing slash.
    pub site_url: String,
    pub page_size: u64,
    pub max_page_size: u64,
    pub slow_query_threshold_ms: u64,
}

impl AppConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap
    ///   2. TOML file at `{data_dir}/config.toml`
    ///   3. Built-in defaults
    pub fn new(
        port: Option<u16>,
        data_dir: Option<PathBuf>,
        log: Option<String>,
        bind_address: Option<String>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);
        let toml = load_toml(&data_dir).unwrap_or_default();

        let port = port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());

        let bind_address = bind_address
            .or(std::env::var("LADLE_BIND").ok().filter(|s| !s.is_empty()))
            .or(toml.bind_address)
            .unwrap_or_else(default_bind_address);

        let log_format = std::env::var("LADLE_LOG_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.log_format)
            .unwrap_or_else(|| "pretty".to_string());

        let site_url = std::env::var("LADLE_SITE_URL")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.site_url)
            .unwrap_or_else(|| format!("http://{bind_address}:{port}"))
            .trim_end_matches('/')
            .to_string();

        let media_dir = toml.media_dir.unwrap_or_else(|| data_dir.join("media"));
        let page_size = toml
            .page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let slow_query_threshold_ms = toml.slow_query_threshold_ms.unwrap_or(100);

        Self {
            port,
            bind_address,
            data_dir,
            media_dir,
            log,
            log_format,
            site_url,
            page_size,
            max_page_size: MAX_PAGE_SIZE,
            slow_query_threshold_ms,
        }
    }
}

fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("ladle");
        }
    }
    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("ladle");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("ladle");
        }
    }
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("ladle");
        }
    }
    PathBuf::from(".ladle")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_toml() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AppConfig::new(None, Some(dir.path().to_path_buf()), None, None);
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(cfg.media_dir, dir.path().join("media"));
        assert!(!cfg.site_url.ends_with('/'));
    }

    #[test]
    fn cli_overrides_toml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "port = 9999\nsite_url = \"https://example.org/\"\n",
        )
        .unwrap();
        let cfg = AppConfig::new(Some(1234), Some(dir.path().to_path_buf()), None, None);
        assert_eq!(cfg.port, 1234);
        assert_eq!(cfg.site_url, "https://example.org");
    }

    #[test]
    fn toml_applies_when_cli_absent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "port = 9999\npage_size = 20\n").unwrap();
        let cfg = AppConfig::new(None, Some(dir.path().to_path_buf()), None, None);
        assert_eq!(cfg.port, 9999);
        assert_eq!(cfg.page_size, 20);
    }

    #[test]
    fn page_size_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), "page_size = 5000\n").unwrap();
        let cfg = AppConfig::new(None, Some(dir.path().to_path_buf()), None, None);
        assert_eq!(cfg.page_size, MAX_PAGE_SIZE);
    }
}
