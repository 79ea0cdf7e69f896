//! Relay configuration.
//!
//! Loaded from a TOML file with `${VAR}` substitution, then selected settings
//! are overridden from `RELAY_*` environment variables.

use std::env;
use std::path::Path;

use regex::Regex;
use relay_state::NOTIFICATION_QUEUE_CAPACITY;
use relay_upstream::SecretKey;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Full relay configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Seconds a tracked intent's solutions live after the last update.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Notifications buffered per solver subscription before new ones are dropped.
    #[serde(default = "default_notification_queue_capacity")]
    pub notification_queue_capacity: usize,

    /// Seconds in-flight HTTP requests get to finish on shutdown.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    pub upstream: UpstreamConfig,

    /// Present when this relay submits intents on behalf of a dApp.
    #[serde(default)]
    pub dapp: Option<DappConfig>,

    /// Present when this relay serves solvers.
    #[serde(default)]
    pub solver: Option<SolverConfig>,
}

/// How to reach the upstream network.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub ws_url: Option<String>,

    #[serde(default)]
    pub grpc_url: Option<String>,

    #[serde(default)]
    pub auth_header: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DappConfig {
    pub address: String,
    pub private_key: SecretKey,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolverConfig {
    pub private_key: SecretKey,

    /// The dApp whose intents this solver works on.
    pub dapp_address: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_cache_ttl_secs() -> u64 {
    60
}

fn default_notification_queue_capacity() -> usize {
    NOTIFICATION_QUEUE_CAPACITY
}

fn default_shutdown_grace_secs() -> u64 {
    5
}

impl RelayConfig {
    /// Parse a TOML document without substitution or overrides.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let has_url = |url: &Option<String>| url.as_deref().is_some_and(|u| !u.is_empty());

        if !has_url(&self.upstream.ws_url) && !has_url(&self.upstream.grpc_url) {
            return Err(ConfigError::ValidationError(
                "either upstream.ws_url or upstream.grpc_url must be set".to_string(),
            ));
        }

        if self.dapp.is_none() && self.solver.is_none() {
            return Err(ConfigError::ValidationError(
                "at least one of [dapp] or [solver] must be configured".to_string(),
            ));
        }

        if let Some(dapp) = &self.dapp {
            if dapp.address.is_empty() || dapp.private_key.is_empty() {
                return Err(ConfigError::ValidationError(
                    "dapp.address and dapp.private_key are required".to_string(),
                ));
            }
        }

        if let Some(solver) = &self.solver {
            if solver.private_key.is_empty() {
                return Err(ConfigError::ValidationError(
                    "solver.private_key is required".to_string(),
                ));
            }
            if solver.dapp_address.is_empty() {
                return Err(ConfigError::ValidationError(
                    "solver.dapp_address is required".to_string(),
                ));
            }
        }

        if self.notification_queue_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "notification_queue_capacity must be greater than zero".to_string(),
            ));
        }

        if self.cache_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "cache_ttl_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration loader with environment variable substitution.
#[derive(Default)]
pub struct ConfigLoader {
    file_path: Option<String>,
    env_prefix: String,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            file_path: None,
            env_prefix: "RELAY_".to_string(),
        }
    }

    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.file_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub async fn load(&self) -> Result<RelayConfig, ConfigError> {
        let Some(file_path) = &self.file_path else {
            return Err(ConfigError::FileNotFound(
                "No configuration file specified".to_string(),
            ));
        };

        if !Path::new(file_path).exists() {
            return Err(ConfigError::FileNotFound(file_path.clone()));
        }

        let content = tokio::fs::read_to_string(file_path).await?;
        let mut config = self.parse(&content)?;

        self.apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    /// Substitute `${VAR}` references and parse.
    pub fn parse(&self, content: &str) -> Result<RelayConfig, ConfigError> {
        let substituted = substitute_env_vars(content)?;
        RelayConfig::from_toml_str(&substituted)
    }

    fn apply_env_overrides(&self, config: &mut RelayConfig) -> Result<(), ConfigError> {
        if let Ok(log_level) = env::var(format!("{}LOG_LEVEL", self.env_prefix)) {
            config.log_level = log_level;
        }

        if let Ok(http_port) = env::var(format!("{}HTTP_PORT", self.env_prefix)) {
            config.http_port = http_port
                .parse()
                .map_err(|e| ConfigError::ValidationError(format!("Invalid HTTP port: {}", e)))?;
        }

        if let Ok(auth_header) = env::var(format!("{}AUTH_HEADER", self.env_prefix)) {
            config.upstream.auth_header = Some(auth_header);
        }

        Ok(())
    }
}

fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| ConfigError::ParseError(e.to_string()))?;
    let mut result = content.to_string();

    for cap in re.captures_iter(content) {
        let full_match = &cap[0];
        let var_name = &cap[1];

        let env_value =
            env::var(var_name).map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;

        result = result.replace(full_match, &env_value);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        http_port = 9090

        [upstream]
        ws_url = "ws://localhost:28333/ws"
        auth_header = "secret"

        [dapp]
        address = "0xdapp"
        private_key = "dapp-key"

        [solver]
        private_key = "solver-key"
        dapp_address = "0xdapp"
    "#;

    #[test]
    fn test_parse_full_config() {
        let config = RelayConfig::from_toml_str(FULL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.http_port, 9090);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.cache_ttl_secs, 60);
        assert_eq!(config.shutdown_grace_secs, 5);
        assert_eq!(config.notification_queue_capacity, 10_000);
        assert_eq!(config.dapp.unwrap().address, "0xdapp");
        assert_eq!(config.solver.unwrap().dapp_address, "0xdapp");
    }

    #[test]
    fn test_requires_upstream_url() {
        let config = RelayConfig::from_toml_str(
            r#"
            [upstream]
            [dapp]
            address = "0xdapp"
            private_key = "k"
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_requires_a_role() {
        let config = RelayConfig::from_toml_str(
            r#"
            [upstream]
            grpc_url = "grpc://localhost:50051"
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_solver_requires_dapp_address() {
        let config = RelayConfig::from_toml_str(
            r#"
            [upstream]
            ws_url = "ws://localhost:28333/ws"
            [solver]
            private_key = "k"
            dapp_address = ""
            "#,
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("dapp_address"));
    }

    #[test]
    fn test_env_substitution() {
        env::set_var("RELAY_TEST_SUBST_KEY", "from-env");
        let config = ConfigLoader::new()
            .parse(
                r#"
                [upstream]
                ws_url = "ws://localhost/ws"
                [dapp]
                address = "0xdapp"
                private_key = "${RELAY_TEST_SUBST_KEY}"
                "#,
            )
            .unwrap();
        assert_eq!(config.dapp.unwrap().private_key.expose(), "from-env");
    }

    #[test]
    fn test_missing_env_var_is_reported() {
        let err = ConfigLoader::new()
            .parse(r#"[upstream]
ws_url = "${RELAY_TEST_DEFINITELY_UNSET}""#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::EnvVarNotFound(name) if name == "RELAY_TEST_DEFINITELY_UNSET"));
    }

    #[test]
    fn test_env_overrides_use_prefix() {
        env::set_var("RELAYPREFIXTEST_HTTP_PORT", "9191");
        env::set_var("RELAYPREFIXTEST_AUTH_HEADER", "token");

        let loader = ConfigLoader::new().with_env_prefix("RELAYPREFIXTEST_");
        let mut config = loader.parse(FULL).unwrap();
        loader.apply_env_overrides(&mut config).unwrap();

        assert_eq!(config.http_port, 9191);
        assert_eq!(config.upstream.auth_header.as_deref(), Some("token"));
    }

    #[test]
    fn test_invalid_port_override() {
        env::set_var("RELAYBADPORTTEST_HTTP_PORT", "not-a-port");

        let loader = ConfigLoader::new().with_env_prefix("RELAYBADPORTTEST_");
        let mut config = loader.parse(FULL).unwrap();
        let err = loader.apply_env_overrides(&mut config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        let config =
            RelayConfig::from_toml_str(&format!("notification_queue_capacity = 0\n{}", FULL))
                .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = ConfigLoader::new()
            .with_file("/nonexistent/relay.toml")
            .load()
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
