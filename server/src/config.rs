//! Server configuration

use serde::Deserialize;

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP server host
    #[serde(default = "default_http_host")]
    pub http_host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Database URL (SQLite)
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Whether the remote development feature is licensed for this installation
    #[serde(default = "default_licensed")]
    pub licensed: bool,
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_database_url() -> String {
    "sqlite:data/reconciler.db?mode=rwc".to_string()
}

fn default_licensed() -> bool {
    true
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Config::default();

        if let Ok(val) = std::env::var("RECONCILER_HTTP_HOST") {
            config.http_host = val;
        }
        if let Ok(val) = std::env::var("RECONCILER_HTTP_PORT") {
            if let Ok(port) = val.parse() {
                config.http_port = port;
            }
        }
        if let Ok(val) = std::env::var("RECONCILER_DATABASE_URL") {
            config.database_url = val;
        }
        if let Ok(val) = std::env::var("RECONCILER_LICENSED") {
            if let Ok(licensed) = val.parse() {
                config.licensed = licensed;
            }
        }

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_host: default_http_host(),
            http_port: default_http_port(),
            database_url: default_database_url(),
            licensed: default_licensed(),
        }
    }
}
