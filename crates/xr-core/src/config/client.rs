//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::serde_utils::{duration_secs, option_duration_secs};
use crate::error::ConfigError;
use crate::types::{EndpointPool, LoginMethod};

/// TLS certificate verification mode for `https` endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TlsVerify {
    /// Verify the peer against the system trust store
    #[default]
    #[serde(rename = "peer")]
    VerifyPeer,
    /// Accept any certificate (lab use only)
    #[serde(rename = "none")]
    VerifyNone,
}

/// Configuration for a session client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Endpoint URIs, tried in order. Listing several pool members lets the
    /// client find the master even when the first one is down.
    pub endpoints: Vec<String>,

    /// Maximum time to wait for one API response
    #[serde(with = "duration_secs")]
    pub timeout: Duration,

    /// Certificate verification for `https` endpoints
    pub tls_verify: TlsVerify,

    /// Force this API version at login
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Authenticate locally against a slave host (emergency mode)
    pub slave_login: bool,

    /// Do not log out when a scoped session helper returns
    pub keep_session: bool,

    /// Retry bounds for session calls
    pub retry: RetryConfig,

    /// Asynchronous task polling
    pub task: TaskConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![],
            timeout: Duration::from_secs(10),
            tls_verify: TlsVerify::VerifyPeer,
            api_version: None,
            slave_login: false,
            keep_session: false,
            retry: RetryConfig::default(),
            task: TaskConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Config for the given endpoints with everything else defaulted
    pub fn with_endpoints<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoints: endpoints.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Parsed, de-duplicated endpoint pool
    pub fn endpoint_pool(&self) -> Result<EndpointPool, ConfigError> {
        EndpointPool::parse(&self.endpoints)
    }

    /// Login variant selected by `slave_login`
    pub fn login_method(&self) -> LoginMethod {
        if self.slave_login {
            LoginMethod::SlaveLocal
        } else {
            LoginMethod::WithPassword
        }
    }

    /// Check the configuration before building a client
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint_pool()?;
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("timeout must be positive".into()));
        }
        if self.task.poll_interval.is_zero() {
            return Err(ConfigError::Invalid("task.poll_interval must be positive".into()));
        }
        Ok(())
    }
}

/// Bounds of the session-call retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Re-logins after `SESSION_INVALID` before a reconnection is forced
    pub relogin_attempts: u32,

    /// Same-endpoint retries per transient failure kind (timeout, EOF, broken pipe)
    pub transient_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            relogin_attempts: 2,
            transient_retries: 1,
        }
    }
}

/// Task polling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Delay between status checks
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,

    /// Give up waiting after this long (unbounded when absent)
    #[serde(with = "option_duration_secs", skip_serializing_if = "Option::is_none")]
    pub deadline: Option<Duration>,

    /// Destroy tasks that end in failure
    pub destroy_on_failure: bool,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            deadline: None,
            destroy_on_failure: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.tls_verify, TlsVerify::VerifyPeer);
        assert_eq!(config.retry.relogin_attempts, 2);
        assert_eq!(config.retry.transient_retries, 1);
        assert_eq!(config.task.poll_interval, Duration::from_secs(1));
        assert!(config.task.deadline.is_none());
        assert!(config.task.destroy_on_failure);
        assert_eq!(config.login_method(), LoginMethod::WithPassword);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: ClientConfig = toml::from_str(
            r#"
            endpoints = ["https://xen1.lab", "https://xen2.lab"]
            tls_verify = "none"
            slave_login = true
            api_version = "1.2"

            [task]
            deadline = 900
            "#,
        )
        .unwrap();

        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.tls_verify, TlsVerify::VerifyNone);
        assert_eq!(config.login_method(), LoginMethod::SlaveLocal);
        assert_eq!(config.api_version.as_deref(), Some("1.2"));
        assert_eq!(config.task.deadline, Some(Duration::from_secs(900)));
        assert_eq!(config.task.poll_interval, Duration::from_secs(1));
        assert_eq!(config.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_validate_requires_endpoints() {
        let err = ClientConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(_)));

        let err = ClientConfig::with_endpoints(["not a uri"]).validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint { .. }));

        assert!(ClientConfig::with_endpoints(["https://xen1/"]).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = ClientConfig {
            timeout: Duration::ZERO,
            ..ClientConfig::with_endpoints(["https://xen1/"])
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_endpoint_pool_dedups() {
        let config = ClientConfig::with_endpoints(["https://XEN1", "https://xen1/"]);
        assert_eq!(config.endpoint_pool().unwrap().len(), 1);
    }
}
