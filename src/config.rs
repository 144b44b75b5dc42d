use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::RelayError;

pub const DEFAULT_CONFIG_FILE: &str = "otp-relay.json";

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub portal: PortalSettings,
    pub cookies: CookieSettings,
    pub relay: RelaySettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PortalSettings {
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl PortalSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            base_url: "https://www.ivasms.com".to_string(),
            timeout_secs: 15,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CookieSettings {
    pub env_var: String,
    pub file: Utf8PathBuf,
}

impl Default for CookieSettings {
    fn default() -> Self {
        Self {
            env_var: "COOKIES_JSON".to_string(),
            file: Utf8PathBuf::from("cookies.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelaySettings {
    pub listen: String,
    pub workers: usize,
    /// Upper bound on stage 3 lookups per range; `None` queries every number.
    pub numbers_per_range: Option<usize>,
    /// Wall-time budget for one query; `None` lets it run to completion.
    pub budget_secs: Option<u64>,
}

impl RelaySettings {
    pub fn budget(&self) -> Option<Duration> {
        self.budget_secs.map(Duration::from_secs)
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:5000".to_string(),
            workers: 4,
            numbers_per_range: Some(5),
            budget_secs: Some(60),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the config at `path`, or `otp-relay.json` in the working
    /// directory. Only an explicitly named file is required to exist.
    pub fn resolve(path: Option<&str>) -> Result<Config, RelayError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| RelayError::ConfigRead(config_path.clone()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Config, RelayError> {
        let config: Config =
            serde_json::from_str(content).map_err(|err| RelayError::ConfigParse(err.to_string()))?;
        if config.relay.workers == 0 {
            return Err(RelayError::ConfigParse(
                "relay.workers must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }
}
