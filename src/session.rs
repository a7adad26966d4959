//! Shared handle every graph object carries.
//!
//! A [`Session`] bundles the transport, the entry point and the collection
//! manifest from the root payload. Entities, collections and actions hold a
//! clone of it instead of pointers to each other, so the graph has no
//! ownership cycles.

use crate::client::{join_href, QueryParams, RestClient};
use crate::error::{ApiError, Result};
use crate::schema::FieldSchema;
use crate::types::CollectionRef;
use serde_json::{Map, Value};
use std::sync::Arc;
use url::Url;

/// Transport plus the root context needed to resolve hrefs and collection names.
#[derive(Debug, Clone)]
pub struct Session {
    rest: RestClient,
    base: Arc<Url>,
    entry_point: Arc<str>,
    collections: Arc<Vec<CollectionRef>>,
}

impl Session {
    /// Create a session rooted at `entry_point` with an empty collection manifest.
    pub fn new(rest: RestClient, entry_point: &str) -> Result<Self> {
        let entry_point = entry_point.trim_end_matches('/');
        let base = Url::parse(entry_point).map_err(|e| ApiError::InvalidUrl {
            url: entry_point.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            rest,
            base: Arc::new(base),
            entry_point: Arc::from(entry_point),
            collections: Arc::new(Vec::new()),
        })
    }

    pub(crate) fn with_collections(mut self, collections: Vec<CollectionRef>) -> Self {
        self.collections = Arc::new(collections);
        self
    }

    /// The entry point without a trailing slash.
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// The underlying transport.
    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    /// Field tables from the client configuration.
    pub fn schema(&self) -> &FieldSchema {
        &self.rest.config().schema
    }

    /// Collection advertised by the root manifest under `name`.
    pub fn collection(&self, name: &str) -> Option<&CollectionRef> {
        self.collections.iter().find(|c| c.name == name)
    }

    /// Reference to collection `name`: the manifest entry when known,
    /// otherwise `<entry point>/<name>`.
    pub fn collection_or_synthesized(&self, name: &str) -> CollectionRef {
        self.collection(name)
            .cloned()
            .unwrap_or_else(|| CollectionRef::new(name, join_href(&self.entry_point, name)))
    }

    /// Turn a possibly relative href into an absolute URL.
    pub fn resolve(&self, href: &str) -> Result<String> {
        match Url::parse(href) {
            Ok(url) => Ok(url.into()),
            Err(url::ParseError::RelativeUrlWithoutBase) => self
                .base
                .join(href)
                .map(String::from)
                .map_err(|e| ApiError::InvalidUrl {
                    url: href.to_string(),
                    reason: e.to_string(),
                }),
            Err(e) => Err(ApiError::InvalidUrl {
                url: href.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// GET an href.
    pub async fn get(&self, href: &str, params: &QueryParams) -> Result<Value> {
        let url = self.resolve(href)?;
        self.rest.get(&url, params).await
    }

    /// POST to an href.
    pub async fn post(&self, href: &str, payload: &Map<String, Value>) -> Result<Option<Value>> {
        let url = self.resolve(href)?;
        self.rest.post(&url, payload).await
    }

    /// DELETE an href.
    pub async fn delete(&self, href: &str, payload: &Map<String, Value>) -> Result<Option<Value>> {
        let url = self.resolve(href)?;
        self.rest.delete(&url, payload).await
    }
}
