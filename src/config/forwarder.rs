//! Forwarder configuration types
//!
//! Defines the SOCKS5 proxy settings and the endpoint every forwarded
//! connection is tunnelled to.

use super::TcpConfig;
use crate::error::Socks5Error;
use crate::socks::consts::MAX_FIELD_LEN;
use crate::socks::{Credentials, Endpoint};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default connect timeout in seconds
fn default_connect_timeout() -> u64 {
    crate::helper::DEFAULT_CONNECT_TIMEOUT_SECS
}

/// Default half-close linger in milliseconds
fn default_half_close_timeout_ms() -> u64 {
    crate::helper::DEFAULT_HALF_CLOSE_TIMEOUT_MS
}

/// Remote SOCKS5 proxy settings
///
/// Username and password must be given together. A configuration holding
/// only one of them fails every connection with
/// [`Socks5Error::InvalidCredentials`] instead of silently falling back to
/// unauthenticated access.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Socks5Configuration {
    /// Address of the SOCKS5 proxy
    pub proxy_endpoint: Endpoint,

    /// Username for RFC 1929 authentication
    #[serde(default)]
    pub username: Option<String>,

    /// Password for RFC 1929 authentication
    #[serde(default)]
    pub password: Option<String>,
}

impl Socks5Configuration {
    /// Configuration without authentication
    pub fn new(proxy_endpoint: Endpoint) -> Self {
        Socks5Configuration {
            proxy_endpoint,
            username: None,
            password: None,
        }
    }

    /// Attach username/password credentials
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Check if any credential field is configured
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() || self.password.is_some()
    }

    /// Resolve the configured credentials
    ///
    /// `Ok(None)` when neither field is set, an error when only one is set or
    /// either is longer than 255 bytes.
    pub fn credentials(&self) -> Result<Option<Credentials>, Socks5Error> {
        match (&self.username, &self.password) {
            (None, None) => Ok(None),
            (Some(username), Some(password)) => {
                Credentials::new(username.as_str(), password.as_str()).map(Some)
            }
            _ => Err(Socks5Error::InvalidCredentials),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ForwarderConfig {
    /// Remote server the SOCKS5 proxy is asked to CONNECT to
    pub remote_endpoint: Endpoint,

    /// SOCKS5 proxy settings
    pub socks: Socks5Configuration,

    /// Timeout for connecting to the SOCKS5 proxy, in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    /// How long the remaining direction may run after the other hit EOF, in
    /// milliseconds
    #[serde(default = "default_half_close_timeout_ms")]
    pub half_close_timeout_ms: u64,

    /// Socket options
    #[serde(default)]
    pub tcp: TcpConfig,
}

impl ForwarderConfig {
    /// Configuration with default timeouts and socket options
    pub fn new(socks: Socks5Configuration, remote_endpoint: Endpoint) -> Self {
        ForwarderConfig {
            remote_endpoint,
            socks,
            connect_timeout: default_connect_timeout(),
            half_close_timeout_ms: default_half_close_timeout_ms(),
            tcp: TcpConfig::default(),
        }
    }

    /// Connect timeout as a duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Half-close linger as a duration
    pub fn half_close_timeout(&self) -> Duration {
        Duration::from_millis(self.half_close_timeout_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        match (&self.socks.username, &self.socks.password) {
            (Some(_), None) => return Err("Username configured without password".to_string()),
            (None, Some(_)) => return Err("Password configured without username".to_string()),
            (Some(username), Some(password)) => {
                if username.len() > MAX_FIELD_LEN || password.len() > MAX_FIELD_LEN {
                    return Err(format!(
                        "Credentials must be at most {} bytes each",
                        MAX_FIELD_LEN
                    ));
                }
            }
            (None, None) => {}
        }

        if self.connect_timeout == 0 {
            return Err("connect_timeout must be greater than zero".to_string());
        }

        Ok(())
    }
}
