use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// User configuration, stored as TOML in the application data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Quiet window before a live-edit refresh recomputes the diff
    pub rebuild_quiet_ms: u64,
    /// Maximum number of pull request sessions kept alive
    pub session_cache_size: usize,
    /// Context lines around changes in locally computed diffs
    pub diff_context_lines: usize,
    /// Explicit `git` binary, otherwise looked up on `PATH`
    pub git_path: Option<String>,
    /// Explicit `gh` binary, otherwise looked up on `PATH`
    pub gh_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            rebuild_quiet_ms: 500,
            session_cache_size: 8,
            diff_context_lines: 3,
            git_path: None,
            gh_path: None,
        }
    }
}

impl AppConfig {
    pub fn rebuild_quiet(&self) -> Duration {
        Duration::from_millis(self.rebuild_quiet_ms)
    }
}

pub fn load_config() -> AppConfig {
    let path = config_path();
    let Ok(contents) = std::fs::read_to_string(&path) else {
        return AppConfig::default();
    };
    parse_config(&contents)
}

/// Parse config text; unreadable config falls back to defaults.
pub fn parse_config(contents: &str) -> AppConfig {
    match toml::from_str(contents) {
        Ok(config) => config,
        Err(err) => {
            log::warn!("Ignoring invalid config: {err}");
            AppConfig::default()
        }
    }
}

pub fn save_config(config: &AppConfig) -> std::io::Result<()> {
    let path = config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = toml::to_string_pretty(config).unwrap_or_default();
    std::fs::write(path, contents)
}

pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("INLINE_REVIEWS_CONFIG_PATH") {
        return PathBuf::from(path);
    }

    app_data_dir().join("config.toml")
}

fn app_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var("INLINE_REVIEWS_DATA_HOME") {
        return PathBuf::from(path);
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = home::home_dir() {
            return home
                .join("Library")
                .join("Application Support")
                .join("InlineReviews");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("InlineReviews");
        }
    }

    #[cfg(target_os = "linux")]
    {
        if let Some(xdg) = std::env::var_os("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("inline-reviews");
        }
        if let Some(home) = home::home_dir() {
            return home.join(".local").join("share").join("inline-reviews");
        }
    }

    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".inline-reviews")
}
