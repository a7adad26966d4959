//! HTTP transport for the ManageIQ REST API.
//!
//! This module provides the JSON client the resource graph is built on:
//!
//! - **Basic auth** on every request
//! - **Retry** of connection-level failures with a fixed budget
//! - **JSON decoding**, with blank POST/DELETE bodies treated as "no content"
//! - **Error payloads** (`{"error": ..}`) turned into [`ApiError::Domain`](crate::ApiError::Domain)
//!
//! # Module Organization
//!
//! ```text
//! client/
//! ├── fetch   - RestClient and retry loop
//! ├── config  - ClientConfig and Credentials
//! └── utils   - backoff, href joining, version ordering
//! ```
//!
//! # Examples
//!
//! ```
//! use manageiq_client::client::{ClientConfig, Credentials, RestClient};
//!
//! let config = ClientConfig {
//!     max_retries: 5,
//!     retry_delay_ms: 100,
//!     ..Default::default()
//! };
//! let rest = RestClient::with_config(Credentials::new("admin", "smartvm"), config).unwrap();
//! assert_eq!(rest.config().max_retries, 5);
//! ```

mod config;
mod fetch;
mod utils;

pub use config::{ClientConfig, Credentials};
pub use fetch::{QueryParams, RestClient};
pub use utils::*;
