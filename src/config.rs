use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    /// PostgreSQL connection URL
    pub postgres_url: String,
    #[serde(default = "default_max_connections")]
    pub db_max_connections: u32,
    /// HS256 signing key, at least 32 characters
    pub token_symmetric_key: String,
    pub access_token_duration_secs: u64,
    /// Deadline for a single atomic scope; unset means no deadline
    #[serde(default)]
    pub tx_timeout_ms: Option<u64>,
    #[serde(default = "default_verify_email_ttl")]
    pub verify_email_ttl_secs: u64,
    #[serde(default)]
    pub task: TaskConfig,
}

/// Options for tasks enqueued after user creation
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TaskConfig {
    pub queue: String,
    pub delay_secs: u64,
    pub max_retry: i32,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            queue: "critical".to_string(),
            delay_secs: 10,
            max_retry: 10,
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_verify_email_ttl() -> u64 {
    15 * 60
}

impl AppConfig {
    /// Load `config/<env>.yaml`
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", config_path))
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn access_token_duration(&self) -> Duration {
        Duration::from_secs(self.access_token_duration_secs)
    }

    pub fn tx_timeout(&self) -> Option<Duration> {
        self.tx_timeout_ms.map(Duration::from_millis)
    }

    pub fn verify_email_ttl(&self) -> Duration {
        Duration::from_secs(self.verify_email_ttl_secs)
    }
}
