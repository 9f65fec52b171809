//! Daemon configuration.
//!
//! Settings come from an optional YAML file named by `WARDEN_CONFIG`.
//! `DATABASE_URL`, `HOST` and `PORT` override the file.

use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;
use warden_spooler::SpoolerConfig;

use crate::error::AppError;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_VAR: &str = "WARDEN_CONFIG";

/// Complete daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DaemonConfig {
    /// Connection settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// HTTP listener.
    #[serde(default)]
    pub http: HttpConfig,
    /// Spooler tuning.
    #[serde(default)]
    pub spooler: SpoolerConfig,
    /// Built-in projections.
    #[serde(default)]
    pub projections: ProjectionsConfig,
}

/// Connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection string.
    #[serde(default)]
    pub url: Option<String>,
    /// Upper bound of the connection pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

/// HTTP listener.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Built-in projections.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectionsConfig {
    /// Aggregate types followed by the `aggregate_heads` view. The view is
    /// not registered when empty.
    #[serde(default)]
    pub aggregate_heads: Vec<String>,
}

fn default_max_connections() -> u32 {
    10
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl DaemonConfig {
    /// Parses a YAML document.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the document is not valid.
    pub fn from_yaml(text: &str) -> Result<Self, AppError> {
        serde_yaml::from_str(text).map_err(|e| AppError::Config(format!("invalid config: {e}")))
    }

    /// Reads the file named by `WARDEN_CONFIG` (defaults if unset) and
    /// applies the environment overrides. `lookup` resolves environment
    /// variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or parsed, or
    /// an override is invalid.
    pub fn load<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(CONFIG_PATH_VAR) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_yaml(&text)
    }

    /// Applies `DATABASE_URL`, `HOST` and `PORT`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `PORT` is not a valid port.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(host) = lookup("HOST") {
            self.http.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.http.port = port
                .parse()
                .map_err(|e| AppError::Config(format!("PORT must be a valid u16: {e}")))?;
        }
        Ok(())
    }

    /// The connection string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if neither the file nor `DATABASE_URL`
    /// provides one.
    pub fn database_url(&self) -> Result<&str, AppError> {
        self.database
            .url
            .as_deref()
            .ok_or_else(|| AppError::Config("DATABASE_URL must be set".into()))
    }

    /// The socket address to listen on.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if host and port do not form an address.
    pub fn listen_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.http.host, self.http.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }
}
