use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::download::CollisionPolicy;
use crate::error::ConfigError;
use crate::poller::PollSettings;

pub const ACCESS_KEY_ENV: &str = "KLING_ACCESS_KEY";
pub const SECRET_KEY_ENV: &str = "KLING_SECRET";
pub const BASE_URL_ENV: &str = "KLING_BASE_URL";

pub const DEFAULT_BASE_URL: &str = "https://api-singapore.klingai.com/v1";

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub access_key: String,
    pub secret_key: String,
    pub base_url: String,
    pub results_dir: PathBuf,
    pub request_timeout_secs: u64,
    pub poll: PollSettings,
    pub collision: CollisionPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            access_key: String::new(),
            secret_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            results_dir: PathBuf::from("results"),
            request_timeout_secs: 60,
            poll: PollSettings::default(),
            collision: CollisionPolicy::default(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("results_dir", &self.results_dir)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("poll", &self.poll)
            .field("collision", &self.collision)
            .finish()
    }
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Fills credentials and base URL from the process environment. Values
    /// already set (from a config file) are replaced only by non-empty variables.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty(ACCESS_KEY_ENV) {
            self.access_key = v;
        }
        if let Some(v) = non_empty(SECRET_KEY_ENV) {
            self.secret_key = v;
        }
        if let Some(v) = non_empty(BASE_URL_ENV) {
            self.base_url = v;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Must pass before a client is built or anything is submitted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.access_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential {
                name: "access key",
                env: ACCESS_KEY_ENV,
            });
        }
        if self.secret_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential {
                name: "secret key",
                env: SECRET_KEY_ENV,
            });
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: "base_url",
                message: format!("'{}' is not an http(s) URL", self.base_url),
            });
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "request_timeout_secs",
                message: "must be greater than zero".into(),
            });
        }
        self.poll.validate()
    }
}
