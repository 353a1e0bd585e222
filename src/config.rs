//! Configuration for eventrelay.
//!
//! Loads configuration from a TOML file with `${VAR}` environment variable
//! substitution. A missing file is not an error; defaults apply.
//!
//! # Example
//!
//! ```toml
//! [server]
//! port = 3000
//! api_key = "${EVENTRELAY_API_KEY}"
//!
//! [dispatcher]
//! max_concurrent_workers = 16
//! drain_timeout_secs = 10
//!
//! [routes]
//! "CREATE" = ["log"]
//! "audit.*" = ["log:audit"]
//!
//! [handlers.log.audit]
//! prefix = "audit"
//! ```

use crate::handlers::{Handler, LogHandler, UnknownTypeHandler};
use crate::router::Router;
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Event routing rules: pattern -> [handler refs], kept sorted by pattern
    #[serde(default)]
    pub routes: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub handlers: HandlersConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer token required on `/event`; unauthenticated when unset
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            api_key: None,
        }
    }
}

fn default_port() -> u16 {
    3000
}

#[derive(Debug, Deserialize, Clone)]
pub struct DispatcherConfig {
    /// Upper bound on concurrently processing workers; unbounded when unset
    #[serde(default)]
    pub max_concurrent_workers: Option<usize>,

    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workers: None,
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

fn default_drain_timeout_secs() -> u64 {
    crate::shutdown::DEFAULT_SHUTDOWN_TIMEOUT
}

impl DispatcherConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct HandlersConfig {
    #[serde(default)]
    pub log: HashMap<String, LogHandlerConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogHandlerConfig {
    #[serde(default = "default_log_prefix")]
    pub prefix: String,
}

fn default_log_prefix() -> String {
    "event".to_string()
}

impl RelayConfig {
    /// Build a Router from the configuration.
    ///
    /// Starts from the built-in routes (`CREATE`, `UPDATE`, unknown-type
    /// default) and registers every configured route on top of them.
    /// Routes are registered in pattern order, so overlapping wildcards run
    /// in the same order on every start.
    pub fn build_router(&self) -> Router {
        let mut router = Router::with_defaults();

        let log_handlers: HashMap<&str, Arc<dyn Handler>> = self
            .handlers
            .log
            .iter()
            .map(|(name, config)| {
                let handler: Arc<dyn Handler> = Arc::new(LogHandler::with_prefix(&config.prefix));
                (name.as_str(), handler)
            })
            .collect();

        for (pattern, handler_refs) in &self.routes {
            for handler_ref in handler_refs {
                match handler_ref.split_once(':') {
                    Some(("log", name)) => match log_handlers.get(name) {
                        Some(handler) => router.on(pattern, handler.clone()),
                        None => warn!(
                            pattern = %pattern,
                            handler = %handler_ref,
                            "Log handler '{}' not found in config",
                            name
                        ),
                    },
                    Some((kind, _)) => warn!(
                        pattern = %pattern,
                        handler = %handler_ref,
                        "Unknown handler type: {}",
                        kind
                    ),
                    None if handler_ref == "log" => router.on(pattern, Arc::new(LogHandler::new())),
                    None if handler_ref == "unknown" => {
                        router.on(pattern, Arc::new(UnknownTypeHandler::new()))
                    }
                    None => warn!(
                        pattern = %pattern,
                        handler = %handler_ref,
                        "Invalid handler reference format"
                    ),
                }
            }
        }

        router
    }

    /// Load configuration from `$EVENTRELAY_CONFIG` or `config/eventrelay.toml`.
    ///
    /// `PORT` and `EVENTRELAY_API_KEY` override the file when set.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = env::var("EVENTRELAY_CONFIG")
            .unwrap_or_else(|_| "config/eventrelay.toml".to_string());

        Self::load_from(&config_path)?
            .with_overrides(env::var("PORT").ok(), env::var("EVENTRELAY_API_KEY").ok())
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            info!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        info!(path = %path.display(), "Loading configuration");

        let content = fs::read_to_string(path)?;
        let config = Self::parse(&content)?;

        info!(
            routes = config.routes.len(),
            log_handlers = config.handlers.log.len(),
            port = config.server.port,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Parse and validate TOML text after `${VAR}` substitution.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let content = substitute_env_vars(content);

        debug!("Parsing TOML configuration");
        let config: RelayConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PORT` / `EVENTRELAY_API_KEY` values and validate the result.
    fn with_overrides(
        mut self,
        port: Option<String>,
        api_key: Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(port) = port {
            self.server.port = port
                .parse()
                .map_err(|_| ConfigError::ValidationError(format!("PORT '{}' is not a valid port", port)))?;
        }
        if let Some(api_key) = api_key {
            self.server.api_key = Some(api_key);
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatcher.max_concurrent_workers == Some(0) {
            return Err(ConfigError::ValidationError(
                "dispatcher.max_concurrent_workers must be at least 1".to_string(),
            ));
        }

        if let Some(api_key) = &self.server.api_key {
            if api_key.is_empty() {
                return Err(ConfigError::ValidationError(
                    "server.api_key must not be empty".to_string(),
                ));
            }
            if api_key.contains("${") {
                warn!("server.api_key contains an unsubstituted environment variable");
            }
        }

        for pattern in self.routes.keys() {
            if pattern.is_empty() {
                return Err(ConfigError::ValidationError(
                    "route pattern must not be empty".to_string(),
                ));
            }
        }

        for (pattern, handler_refs) in &self.routes {
            for handler_ref in handler_refs {
                if !self.handler_exists(handler_ref) {
                    warn!(
                        pattern = %pattern,
                        handler = %handler_ref,
                        "Route references undefined handler (it will be skipped)"
                    );
                }
            }
        }

        Ok(())
    }

    fn handler_exists(&self, handler_ref: &str) -> bool {
        match handler_ref.split_once(':') {
            Some(("log", name)) => self.handlers.log.contains_key(name),
            Some(_) => false,
            None => handler_ref == "log" || handler_ref == "unknown",
        }
    }
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("env var pattern is a valid regex")
    })
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(content: &str) -> String {
    env_var_pattern()
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            match env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    debug!(var = %var_name, "Environment variable not set, keeping placeholder");
                    caps[0].to_string()
                }
            }
        })
        .to_string()
}
