//! Provider configuration
//!
//! Credentials and endpoint come from the manifest's `provider` block, with
//! `PROFITBRICKS_*` environment variables as fallback.

use std::collections::HashMap;
use std::time::Duration;

use brickyard_core::resource::{Value, get_string};
use thiserror::Error;

/// Default Cloud API endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.profitbricks.com/cloudapi/v3";

/// Default time to wait for a provisioning request (10 minutes)
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Default delay between request status polls
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

pub const ENV_USERNAME: &str = "PROFITBRICKS_USERNAME";
pub const ENV_PASSWORD: &str = "PROFITBRICKS_PASSWORD";
pub const ENV_ENDPOINT: &str = "PROFITBRICKS_API_URL";
pub const ENV_TIMEOUT: &str = "PROFITBRICKS_TIMEOUT";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing provider setting '{attribute}' (or environment variable {env})")]
    Missing {
        attribute: &'static str,
        env: &'static str,
    },

    #[error("Invalid provider setting '{attribute}': {message}")]
    Invalid {
        attribute: &'static str,
        message: String,
    },
}

/// Settings needed to talk to the Cloud API
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub username: String,
    pub password: String,
    pub endpoint: String,
    /// Hard limit for a single provisioning wait
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl ProviderConfig {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Build from the provider block, falling back to the process environment
    pub fn from_attributes(attributes: &HashMap<String, Value>) -> Result<Self, ConfigError> {
        Self::from_attributes_with_env(attributes, |key| std::env::var(key).ok())
    }

    /// Build from the provider block with an explicit environment lookup
    pub fn from_attributes_with_env(
        attributes: &HashMap<String, Value>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let lookup = |attribute: &'static str, var: &'static str| -> Option<String> {
            get_string(attributes, attribute)
                .map(str::to_string)
                .or_else(|| env(var))
                .filter(|s| !s.is_empty())
        };

        let username = lookup("username", ENV_USERNAME).ok_or(ConfigError::Missing {
            attribute: "username",
            env: ENV_USERNAME,
        })?;
        let password = lookup("password", ENV_PASSWORD).ok_or(ConfigError::Missing {
            attribute: "password",
            env: ENV_PASSWORD,
        })?;

        let mut config = Self::new(username, password);

        if let Some(endpoint) = lookup("endpoint", ENV_ENDPOINT) {
            config.endpoint = endpoint.trim_end_matches('/').to_string();
        }

        let timeout = match attributes.get("timeout") {
            Some(Value::Int(secs)) => Some(*secs),
            Some(_) => {
                return Err(ConfigError::Invalid {
                    attribute: "timeout",
                    message: "expected an integer number of seconds".to_string(),
                });
            }
            None => match env(ENV_TIMEOUT) {
                Some(raw) => Some(raw.parse::<i64>().map_err(|e| ConfigError::Invalid {
                    attribute: "timeout",
                    message: e.to_string(),
                })?),
                None => None,
            },
        };
        if let Some(secs) = timeout {
            if secs <= 0 {
                return Err(ConfigError::Invalid {
                    attribute: "timeout",
                    message: "must be positive".to_string(),
                });
            }
            config.timeout = Duration::from_secs(secs as u64);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_from_attributes() {
        let mut attrs = HashMap::new();
        attrs.insert("username".to_string(), Value::String("admin".to_string()));
        attrs.insert("password".to_string(), Value::String("secret".to_string()));
        attrs.insert("timeout".to_string(), Value::Int(30));

        let config = ProviderConfig::from_attributes_with_env(&attrs, no_env).unwrap();
        assert_eq!(config.username, "admin");
        assert_eq!(config.password, "secret");
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(
            config.poll_interval,
            Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS)
        );
    }

    #[test]
    fn test_env_fallback() {
        let env = |key: &str| match key {
            ENV_USERNAME => Some("env-user".to_string()),
            ENV_PASSWORD => Some("env-pass".to_string()),
            ENV_ENDPOINT => Some("http://localhost:8080/cloudapi/v3/".to_string()),
            ENV_TIMEOUT => Some("120".to_string()),
            _ => None,
        };

        let config = ProviderConfig::from_attributes_with_env(&HashMap::new(), env).unwrap();
        assert_eq!(config.username, "env-user");
        assert_eq!(config.password, "env-pass");
        assert_eq!(config.endpoint, "http://localhost:8080/cloudapi/v3");
        assert_eq!(config.timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_attribute_wins_over_env() {
        let mut attrs = HashMap::new();
        attrs.insert("username".to_string(), Value::String("block-user".to_string()));
        let env = |key: &str| match key {
            ENV_USERNAME => Some("env-user".to_string()),
            ENV_PASSWORD => Some("env-pass".to_string()),
            _ => None,
        };

        let config = ProviderConfig::from_attributes_with_env(&attrs, env).unwrap();
        assert_eq!(config.username, "block-user");
    }

    #[test]
    fn test_missing_credentials() {
        let result = ProviderConfig::from_attributes_with_env(&HashMap::new(), no_env);
        assert_eq!(
            result.unwrap_err(),
            ConfigError::Missing {
                attribute: "username",
                env: ENV_USERNAME,
            }
        );
    }

    #[test]
    fn test_invalid_timeout() {
        let mut attrs = HashMap::new();
        attrs.insert("username".to_string(), Value::String("admin".to_string()));
        attrs.insert("password".to_string(), Value::String("secret".to_string()));
        attrs.insert("timeout".to_string(), Value::Int(0));

        let err = ProviderConfig::from_attributes_with_env(&attrs, no_env).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { attribute: "timeout", .. }));
    }
}
