use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::extract::ExtractRules;

pub const DEFAULT_URL: &str = "https://www.passiton.com/inspirational-quotes";
pub const DEFAULT_OUTPUT: &str = "web_scraped.csv";
const DEFAULT_CONFIG_FILE: &str = "quote_scraper.toml";
const ENV_PREFIX: &str = "QUOTES";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub fetch: FetchSettings,
    pub rules: ExtractRules,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub user_agent: String,
    /// Per-attempt timeout.
    pub timeout_secs: u64,
    /// Total attempts, including the first one.
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            user_agent: format!("quote_scraper/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
            max_retries: 3,
            backoff_base_ms: 500,
        }
    }
}

impl FetchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }
}

impl Settings {
    /// Layered load: defaults, then the TOML file, then `QUOTES_*` env vars.
    ///
    /// With no explicit path, `quote_scraper.toml` in the working directory is
    /// read if it exists. An explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => File::from(p).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to load settings")?;

        settings
            .try_deserialize()
            .context("Invalid settings")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Settings::load reads the process environment.
    static ENV: Mutex<()> = Mutex::new(());

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        ENV.lock().unwrap_or_else(|e| e.into_inner())
    }

    #[test]
    fn defaults_target_passiton() {
        let s = Settings::default();
        assert_eq!(s.fetch.max_retries, 3);
        assert_eq!(s.fetch.backoff_base(), Duration::from_millis(500));
        assert!(s.fetch.user_agent.starts_with("quote_scraper/"));
        assert_eq!(s.rules.container, "div#all_items");
        assert_eq!(s.rules.lines_marker, " #");
    }

    #[test]
    fn file_overrides_defaults() {
        let _env = env_lock();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[fetch]\nmax_retries = 7\n\n[rules]\ncontainer = \"section#quotes\"\n",
        )
        .unwrap();

        let s = Settings::load(Some(&path)).unwrap();
        assert_eq!(s.fetch.max_retries, 7);
        assert_eq!(s.fetch.timeout_secs, 30);
        assert_eq!(s.rules.container, "section#quotes");
        assert_eq!(s.rules.item, "div.text-center.mb-8");
    }

    #[test]
    fn env_overrides_file() {
        let _env = env_lock();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[fetch]\nmax_retries = 7\ntimeout_secs = 10\n").unwrap();

        std::env::set_var("QUOTES_FETCH__MAX_RETRIES", "9");
        let loaded = Settings::load(Some(&path));
        std::env::remove_var("QUOTES_FETCH__MAX_RETRIES");

        let s = loaded.unwrap();
        assert_eq!(s.fetch.max_retries, 9);
        assert_eq!(s.fetch.timeout_secs, 10);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
