//! Client configuration.

use crate::schema::FieldSchema;
use std::fmt;
use std::path::PathBuf;

/// Options for the HTTP transport and the resource graph.
///
/// # Examples
///
/// ```
/// use manageiq_client::client::ClientConfig;
///
/// let config = ClientConfig {
///     max_retries: 5,
///     retry_delay_ms: 200,
///     ..Default::default()
/// };
/// assert_eq!(config.request_timeout_ms, 30_000);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Additional attempts after a connection failure (not total attempts).
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries. Zero retries immediately.
    pub retry_delay_ms: u64,
    /// Whole-request timeout.
    pub request_timeout_ms: u64,
    /// TCP connect timeout.
    pub connect_timeout_ms: u64,
    /// Reject invalid server certificates.
    pub verify_ssl: bool,
    /// PEM bundle that replaces the system's trusted roots.
    pub ca_bundle_path: Option<PathBuf>,
    /// Proxy for all requests; empty means none.
    pub proxy_url: String,
    /// Emit request/response tracing events.
    pub enable_logging: bool,
    /// Field tables used when materializing entities.
    pub schema: FieldSchema,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay_ms: 0,
            request_timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            verify_ssl: true,
            ca_bundle_path: None,
            proxy_url: String::new(),
            enable_logging: true,
            schema: FieldSchema::default(),
        }
    }
}

/// User/password pair sent as HTTP basic auth.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login name.
    pub user: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// Build a credential pair.
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl<U: Into<String>, P: Into<String>> From<(U, P)> for Credentials {
    fn from((user, password): (U, P)) -> Self {
        Self::new(user, password)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_retry_budget() {
        let config = ClientConfig::default();
        assert_eq!(config.max_retries, 2);
        assert!(config.verify_ssl);
        assert!(config.enable_logging);
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::from(("admin", "smartvm"));
        let printed = format!("{:?}", creds);
        assert!(printed.contains("admin"));
        assert!(!printed.contains("smartvm"));
    }
}
