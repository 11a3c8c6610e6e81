use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::reconcile::TargetSet;
use crate::source::BrowserConfig;

const DEFAULT_STATE_FILE: &str = "stock_status.json";
const DEFAULT_NTFY_SERVER: &str = "https://ntfy.sh";
const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";
const DEFAULT_WAIT_TIMEOUT_SECS: u64 = 10;

/// Settings for a single stock check, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub pincode: String,
    pub targets: TargetSet,
    pub ntfy_topic: Option<String>,
    pub ntfy_server: String,
    pub state_file: PathBuf,
    pub webdriver_url: String,
    pub wait_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let wait_timeout = match lookup("WAIT_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse()
                .context("WAIT_TIMEOUT_SECS must be a whole number of seconds")?,
            None => DEFAULT_WAIT_TIMEOUT_SECS,
        };

        Ok(Self {
            pincode: lookup("PINCODE").unwrap_or_default(),
            targets: TargetSet::parse(&lookup("TARGET_PRODUCTS").unwrap_or_default()),
            ntfy_topic: lookup("NTFY_TOPIC").filter(|topic| !topic.trim().is_empty()),
            ntfy_server: lookup("NTFY_SERVER").unwrap_or_else(|| DEFAULT_NTFY_SERVER.to_string()),
            state_file: lookup("STATE_FILE")
                .unwrap_or_else(|| DEFAULT_STATE_FILE.to_string())
                .into(),
            webdriver_url: lookup("WEBDRIVER_URL")
                .unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.to_string()),
            wait_timeout: Duration::from_secs(wait_timeout),
        })
    }

    pub fn browser(&self) -> BrowserConfig {
        BrowserConfig {
            webdriver_url: self.webdriver_url.clone(),
            wait_timeout: self.wait_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = config(&[]).unwrap();
        assert_eq!(config.pincode, "");
        assert!(config.targets.is_empty());
        assert_eq!(config.ntfy_topic, None);
        assert_eq!(config.ntfy_server, "https://ntfy.sh");
        assert_eq!(config.state_file, PathBuf::from("stock_status.json"));
        assert_eq!(config.webdriver_url, "http://localhost:9515");
        assert_eq!(config.wait_timeout, Duration::from_secs(10));
    }

    #[test]
    fn reads_targets_and_topic() {
        let config = config(&[
            ("PINCODE", "110001"),
            ("TARGET_PRODUCTS", "Amul Whey, amul paneer"),
            ("NTFY_TOPIC", "drops"),
            ("WAIT_TIMEOUT_SECS", " 25 "),
        ])
        .unwrap();
        assert_eq!(config.pincode, "110001");
        assert_eq!(config.targets.iter().count(), 2);
        assert!(config.targets.contains("amul whey"));
        assert_eq!(config.ntfy_topic.as_deref(), Some("drops"));
        assert_eq!(config.browser().wait_timeout, Duration::from_secs(25));
    }

    #[test]
    fn blank_topic_disables_notifications() {
        assert_eq!(config(&[("NTFY_TOPIC", "  ")]).unwrap().ntfy_topic, None);
    }

    #[test]
    fn rejects_bad_timeout() {
        assert!(config(&[("WAIT_TIMEOUT_SECS", "soon")]).is_err());
    }
}
