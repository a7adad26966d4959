//! JSON REST transport.
//!
//! Provides [`RestClient`], the only component that touches the network. It
//! issues GET/POST/DELETE calls with basic auth, retries connection-level
//! failures, decodes JSON bodies and turns error payloads into
//! [`ApiError::Domain`].
//!
//! # Examples
//!
//! ```ignore
//! use manageiq_client::client::{ClientConfig, Credentials, RestClient};
//!
//! #[tokio::main]
//! async fn main() -> manageiq_client::Result<()> {
//!     let rest = RestClient::with_config(Credentials::new("admin", "smartvm"), ClientConfig::default())?;
//!     let root = rest.get("https://miq.example.com/api", &[]).await?;
//!     println!("{}", root["version"]);
//!     Ok(())
//! }
//! ```

use crate::client::config::{ClientConfig, Credentials};
use crate::client::utils::exponential_backoff;
use crate::error::{ApiError, DomainError, Result};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Query parameters; keys may repeat (`filter[]`).
pub type QueryParams = [(String, String)];

/// The HTTP transport.
///
/// Cheap to clone; clones share the connection pool and configuration.
#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    credentials: Arc<Credentials>,
    config: Arc<ClientConfig>,
}

impl RestClient {
    /// Create a transport with default configuration.
    pub fn new(credentials: Credentials) -> Result<Self> {
        Self::with_config(credentials, ClientConfig::default())
    }

    /// Create a transport with custom configuration.
    pub fn with_config(credentials: Credentials, config: ClientConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json; charset=utf-8"),
        );

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .pool_idle_timeout(Duration::from_secs(90));

        if !config.verify_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        } else if let Some(path) = &config.ca_bundle_path {
            let pem = std::fs::read(path)
                .map_err(|e| ApiError::Config(format!("cannot read CA bundle {}: {}", path.display(), e)))?;
            let certs = reqwest::Certificate::from_pem_bundle(&pem)
                .map_err(|e| ApiError::Config(format!("invalid CA bundle {}: {}", path.display(), e)))?;
            builder = builder.tls_built_in_root_certs(false);
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        if !config.proxy_url.is_empty() {
            let proxy = reqwest::Proxy::all(&config.proxy_url)
                .map_err(|e| ApiError::Config(format!("invalid proxy {}: {}", config.proxy_url, e)))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| ApiError::Config(e.to_string()))?;

        Ok(RestClient {
            client,
            credentials: Arc::new(credentials),
            config: Arc::new(config),
        })
    }

    /// GET `url` and decode the JSON body. A non-JSON body is always an error.
    pub async fn get(&self, url: &str, params: &QueryParams) -> Result<Value> {
        if self.config.enable_logging {
            tracing::info!("[RESTAPI] GET {} {:?}", url, params);
        }
        let text = self
            .send_with_retries(|| self.send(reqwest::Method::GET, url, params, None))
            .await?;
        let data = serde_json::from_str(&text).map_err(|_| ApiError::Decode(text.clone()))?;
        process_result(data)
    }

    /// POST `payload` as JSON. An empty response body yields `None`.
    pub async fn post(&self, url: &str, payload: &Map<String, Value>) -> Result<Option<Value>> {
        self.send_payload(reqwest::Method::POST, url, payload).await
    }

    /// DELETE with `payload` as JSON body. An empty response body yields `None`.
    pub async fn delete(&self, url: &str, payload: &Map<String, Value>) -> Result<Option<Value>> {
        self.send_payload(reqwest::Method::DELETE, url, payload).await
    }

    /// Get the client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the credentials this transport authenticates with.
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    async fn send_payload(
        &self,
        method: reqwest::Method,
        url: &str,
        payload: &Map<String, Value>,
    ) -> Result<Option<Value>> {
        if self.config.enable_logging {
            tracing::info!("[RESTAPI] {} {} {:?}", method, url, payload);
        }
        let body = Value::Object(payload.clone()).to_string();
        let text = self
            .send_with_retries(|| self.send(method.clone(), url, &[], Some(body.clone())))
            .await?;
        decode_optional(&text)
    }

    async fn send_with_retries<F, Fut>(&self, op: F) -> Result<String>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        with_retries(self.config.max_retries, self.config.retry_delay_ms, op).await
    }

    async fn send(
        &self,
        method: reqwest::Method,
        url: &str,
        params: &QueryParams,
        body: Option<String>,
    ) -> Result<String> {
        let mut req_builder = self
            .client
            .request(method.clone(), url)
            .basic_auth(&self.credentials.user, Some(&self.credentials.password));

        if !params.is_empty() {
            req_builder = req_builder.query(params);
        }
        if let Some(body) = body {
            req_builder = req_builder.body(body);
        }

        let response = req_builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        if self.config.enable_logging {
            tracing::info!("[RESTAPI] RESPONSE {} {} status={}", method, url, status);
        }
        Ok(text)
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("credentials", &self.credentials)
            .field("config", &self.config)
            .finish()
    }
}

/// Run `op`, retrying up to `max_retries` more times while it fails with a
/// connection error. Exhausting the budget returns the last connection error.
pub(crate) async fn with_retries<T, F, Fut>(max_retries: u32, retry_delay_ms: u64, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_retries => {
                let delay = exponential_backoff(attempt, retry_delay_ms);
                tracing::warn!(
                    "Request failed (attempt {}), retrying after {:?}: {}",
                    attempt + 1,
                    delay,
                    e
                );
                if !delay.is_zero() {
                    sleep(delay).await;
                }
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Decode a POST/DELETE body: blank means no content, anything else must be JSON.
fn decode_optional(text: &str) -> Result<Option<Value>> {
    match serde_json::from_str(text) {
        Ok(data) => process_result(data).map(Some),
        Err(_) if text.trim().is_empty() => Ok(None),
        Err(_) => Err(ApiError::Decode(text.to_string())),
    }
}

/// Translate an error payload into [`ApiError::Domain`]; pass anything else through.
pub(crate) fn process_result(data: Value) -> Result<Value> {
    let Some(error) = data.as_object().and_then(|obj| obj.get("error")) else {
        return Ok(data);
    };

    let domain = match error {
        Value::Object(detail) => DomainError::with_kind(
            text_of(detail.get("klass")),
            text_of(detail.get("message")),
        ),
        other => DomainError::with_status(
            data.get("status").and_then(Value::as_i64),
            text_of(Some(other)),
        ),
    };
    Err(domain.into())
}

fn text_of(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => "None".to_string(),
        Some(other) => other.to_string(),
    }
}
