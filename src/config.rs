//! Configuration management for RAX Workspace Server
//!
//! All values are startup configuration: they are loaded once, validated, and
//! then shared read-only for the lifetime of the server.

use config::{Config, Environment, File};
use serde::Deserialize;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Complete server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub server: NetworkConfig,
    pub sandbox: SandboxConfig,
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub users: Vec<UserConfig>,
}

/// Listener and storage settings
#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    /// IP address to bind the HTTP listener
    pub bind_address: String,

    /// Port for the HTTP listener
    pub port: u16,

    /// Shared directory holding one subdirectory per user
    pub storage_root: String,

    /// Largest request body accepted (uploads included)
    pub max_body_bytes: usize,
}

/// Script execution settings
#[derive(Debug, Deserialize, Clone)]
pub struct SandboxConfig {
    /// Interpreter program, looked up on PATH
    pub interpreter: String,

    /// Arguments placed before the script path
    #[serde(default)]
    pub interpreter_args: Vec<String>,

    /// Extension given to temporary script files
    pub script_extension: String,

    /// Wall-clock budget per execution
    pub timeout_secs: u64,

    /// Cap on captured bytes per output stream
    pub max_output_bytes: usize,

    /// Executions allowed to run at once
    pub max_concurrent: usize,

    /// Overrides `timeout_secs` at sub-second precision; never read from file.
    #[serde(skip)]
    pub timeout_override: Option<Duration>,
}

/// Source-address allow-list for the execution and listing endpoints
#[derive(Debug, Deserialize, Clone)]
pub struct AdmissionConfig {
    pub allowed_ips: Vec<String>,

    #[serde(default)]
    pub trusted_proxies: Vec<String>,

    #[serde(default = "default_forwarded_header")]
    pub forwarded_header: String,
}

/// One provisioned account of the static credential table
#[derive(Debug, Deserialize, Clone)]
pub struct UserConfig {
    pub username: String,
    pub token: String,
    pub dir_name: String,
}

fn default_forwarded_header() -> String {
    "x-forwarded-for".to_string()
}

impl ServerConfig {
    /// Load configuration from config.toml with environment overrides
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_paths = [
            "rax-workspace-server/config", // Container layout: /app/rax-workspace-server/config.toml
            "config",                      // Local development: ./config.toml
        ];

        let mut last_error = None;

        for config_path in &config_paths {
            match Config::builder()
                .add_source(File::with_name(config_path))
                .add_source(Environment::with_prefix("RAX").separator("__"))
                .build()
            {
                Ok(settings) => {
                    let config: ServerConfig = settings.try_deserialize()?;
                    config.validate()?;
                    return Ok(config);
                }
                Err(e) => {
                    last_error = Some(e);
                    continue;
                }
            }
        }

        Err(config::ConfigError::Message(format!(
            "Failed to load config.toml from any location. Tried: {config_paths:?}. Last error: {last_error:?}"
        )))
    }

    /// Validation for all configuration values
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.server.port == 0 {
            return Err(config::ConfigError::Message("Port cannot be 0".into()));
        }

        if self.server.storage_root.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "storage_root cannot be empty".into(),
            ));
        }

        if self.server.max_body_bytes == 0 {
            return Err(config::ConfigError::Message(
                "max_body_bytes must be greater than 0".into(),
            ));
        }

        if self.sandbox.interpreter.trim().is_empty() {
            return Err(config::ConfigError::Message(
                "sandbox interpreter cannot be empty".into(),
            ));
        }

        if self.sandbox.timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.sandbox.max_output_bytes == 0 {
            return Err(config::ConfigError::Message(
                "max_output_bytes must be greater than 0".into(),
            ));
        }

        if self.sandbox.max_concurrent == 0 {
            return Err(config::ConfigError::Message(
                "max_concurrent must be greater than 0".into(),
            ));
        }

        for ip in self
            .admission
            .allowed_ips
            .iter()
            .chain(&self.admission.trusted_proxies)
        {
            if ip.trim().parse::<IpAddr>().is_err() {
                return Err(config::ConfigError::Message(format!(
                    "Invalid IP address in admission config: {ip}"
                )));
            }
        }

        if axum::http::HeaderName::from_bytes(self.admission.forwarded_header.as_bytes()).is_err()
        {
            return Err(config::ConfigError::Message(format!(
                "Invalid forwarded header name: {}",
                self.admission.forwarded_header
            )));
        }

        for user in &self.users {
            if user.token.is_empty() {
                return Err(config::ConfigError::Message(format!(
                    "User {} has an empty token",
                    user.username
                )));
            }
        }

        Ok(())
    }
}

impl NetworkConfig {
    /// Get bind address and port as socket address
    pub fn socket_address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn storage_root_path(&self) -> PathBuf {
        PathBuf::from(&self.storage_root)
    }
}

impl SandboxConfig {
    pub fn timeout(&self) -> Duration {
        self.timeout_override
            .unwrap_or_else(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_override = Some(timeout);
        self
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            interpreter_args: Vec::new(),
            script_extension: "py".to_string(),
            timeout_secs: 30,
            max_output_bytes: 1024 * 1024,
            max_concurrent: 8,
            timeout_override: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ServerConfig {
        let settings = Config::builder()
            .add_source(File::from_str(
                r#"
                [server]
                bind_address = "127.0.0.1"
                port = 8080
                storage_root = "./storage_root"
                max_body_bytes = 1024

                [sandbox]
                interpreter = "sh"
                script_extension = "sh"
                timeout_secs = 5
                max_output_bytes = 4096
                max_concurrent = 2

                [admission]
                allowed_ips = ["127.0.0.1"]

                [[users]]
                username = "alice"
                token = "t0k3n"
                dir_name = "alice"
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        settings.try_deserialize().unwrap()
    }

    #[test]
    fn test_parse_and_defaults() {
        let config = sample();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.socket_address(), "127.0.0.1:8080");
        assert_eq!(config.admission.forwarded_header, "x-forwarded-for");
        assert!(config.admission.trusted_proxies.is_empty());
        assert_eq!(config.sandbox.timeout(), Duration::from_secs(5));
        assert_eq!(config.users.len(), 1);
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = sample();
        config.admission.allowed_ips.push("not-an-ip".into());
        assert!(config.validate().is_err());

        let mut config = sample();
        config.sandbox.timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = sample();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_override() {
        let sandbox = SandboxConfig::default().with_timeout(Duration::from_millis(250));
        assert_eq!(sandbox.timeout(), Duration::from_millis(250));
    }
}
