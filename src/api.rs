//! The root of the object graph.
//!
//! [`Client::connect`] performs the single bootstrap GET against the entry
//! point and builds the [`CollectionsIndex`] from the root manifest. Every
//! other root field is kept as a plain attribute.
//!
//! # Examples
//!
//! ```ignore
//! use manageiq_client::{Client, Credentials};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> manageiq_client::Result<()> {
//!     let client = Client::connect("https://miq.example.com/api", Credentials::new("admin", "smartvm")).await?;
//!     println!("API {:?} (latest {:?})", client.version(), client.latest_version());
//!
//!     let vms = client.collection("vms")?;
//!     let mut vm = vms.get([("name", json!("db-01"))]).await?;
//!     println!("{:?}", vm.get("power_state").await?);
//!     Ok(())
//! }
//! ```

use crate::client::{compare_versions, join_href, ClientConfig, Credentials, QueryParams, RestClient};
use crate::error::{ApiError, Result};
use crate::resource::{Collection, Entity, ReloadOptions};
use crate::session::Session;
use crate::types::CollectionRef;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;

#[derive(Debug, Deserialize)]
struct CollectionEntry {
    name: String,
    href: String,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VersionEntry {
    name: String,
    href: String,
}

fn take_list<T: serde::de::DeserializeOwned>(data: &mut Map<String, Value>, key: &str) -> Result<Vec<T>> {
    match data.remove(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value)
            .map_err(|e| ApiError::MalformedData(format!("root {}: {}", key, e))),
    }
}

/// Bootstrapped API root.
#[derive(Debug, Clone)]
pub struct Client {
    session: Session,
    version: Option<String>,
    versions: BTreeMap<String, String>,
    attributes: Map<String, Value>,
    collections: CollectionsIndex,
}

impl Client {
    /// Bootstrap with the default configuration.
    pub async fn connect(entry_point: &str, credentials: Credentials) -> Result<Self> {
        Self::connect_with_config(entry_point, credentials, ClientConfig::default()).await
    }

    /// Bootstrap with a custom configuration.
    pub async fn connect_with_config(
        entry_point: &str,
        credentials: Credentials,
        config: ClientConfig,
    ) -> Result<Self> {
        let rest = RestClient::with_config(credentials, config)?;
        Self::bootstrap(rest, entry_point).await
    }

    async fn bootstrap(rest: RestClient, entry_point: &str) -> Result<Self> {
        let session = Session::new(rest, entry_point)?;
        let mut data = match session.get(session.entry_point(), &[]).await? {
            Value::Object(data) => data,
            other => return Err(ApiError::MalformedData(format!("root payload {}", other))),
        };

        let entries: Vec<CollectionEntry> = take_list(&mut data, "collections")?;
        let version = match data.remove("version") {
            Some(Value::String(version)) => Some(version),
            Some(Value::Number(version)) => Some(version.to_string()),
            None | Some(Value::Null) => None,
            Some(other) => return Err(ApiError::MalformedData(format!("root version {}", other))),
        };
        let versions = take_list::<VersionEntry>(&mut data, "versions")?
            .into_iter()
            .map(|v| (v.name, v.href))
            .collect();

        let session = session.with_collections(
            entries
                .iter()
                .map(|e| CollectionRef::new(e.name.clone(), e.href.clone()))
                .collect(),
        );
        let collections = CollectionsIndex::new(&session, entries);

        tracing::debug!(
            "Connected to {} (version {:?}, {} collections)",
            session.entry_point(),
            version,
            collections.len()
        );

        Ok(Self {
            session,
            version,
            versions,
            attributes: data,
            collections,
        })
    }

    /// Shared session handed to every graph object.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Entry point without a trailing slash.
    pub fn entry_point(&self) -> &str {
        self.session.entry_point()
    }

    /// Current API version, if the root reported one.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Known version names, newest first.
    pub fn versions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.versions.keys().cloned().collect();
        names.sort_by(|a, b| compare_versions(b, a));
        names
    }

    /// Newest known version, if the root advertised any.
    pub fn latest_version(&self) -> Option<String> {
        self.versions().into_iter().next()
    }

    /// Whether the current version is the newest advertised one.
    ///
    /// A root that reports neither a version nor a version list counts as latest.
    pub fn on_latest_version(&self) -> bool {
        self.latest_version() == self.version
    }

    /// Bootstrap a new client against another version's href, same credentials.
    pub async fn api_version(&self, name: &str) -> Result<Client> {
        let href = self
            .versions
            .get(name)
            .ok_or_else(|| ApiError::NotFound(format!("No such API version {}", name)))?;
        let href = self.session.resolve(href)?;
        Self::bootstrap(self.session.rest().clone(), &href).await
    }

    /// Plain root field.
    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    /// All plain root fields.
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// The collection index.
    pub fn collections(&self) -> &CollectionsIndex {
        &self.collections
    }

    /// A fresh handle on collection `name`.
    pub fn collection(&self, name: &str) -> Result<Collection> {
        self.collections
            .get(name)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("No such collection {}", name)))
    }

    /// GET an href relative to, or outside of, the entry point.
    pub async fn get(&self, href: &str, params: &QueryParams) -> Result<Value> {
        self.session.get(href, params).await
    }

    /// POST a JSON payload.
    pub async fn post(&self, href: &str, payload: &Map<String, Value>) -> Result<Option<Value>> {
        self.session.post(href, payload).await
    }

    /// DELETE with a JSON payload.
    pub async fn delete(&self, href: &str, payload: &Map<String, Value>) -> Result<Option<Value>> {
        self.session.delete(href, payload).await
    }

    /// Entity `<collection href>/<id>`.
    ///
    /// Without `attributes` no request is made; with them, only those fields
    /// are fetched.
    pub async fn get_entity<'a>(
        &self,
        target: impl Into<CollectionTarget<'a>>,
        id: impl Display,
        attributes: Option<&[&str]>,
    ) -> Result<Entity> {
        let reference = match target.into() {
            CollectionTarget::Name(name) => self
                .collections
                .get(name)
                .map(Collection::reference)
                .unwrap_or_else(|| CollectionRef::new(name, join_href(self.entry_point(), name))),
            CollectionTarget::Collection(collection) => collection.reference(),
        };

        let href = join_href(&reference.href, &id.to_string());
        let mut entity = Entity::from_reference(self.session.clone(), reference, href);
        if let Some(attributes) = attributes {
            entity
                .reload_with(ReloadOptions::new().attributes(attributes.iter().copied()))
                .await?;
        }
        Ok(entity)
    }
}

impl std::fmt::Display for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(version) => write!(f, "<Client {} v{}>", self.entry_point(), version),
            None => write!(f, "<Client {}>", self.entry_point()),
        }
    }
}

/// Collection argument of [`Client::get_entity`]: a name or a collection.
#[derive(Debug, Clone, Copy)]
pub enum CollectionTarget<'a> {
    /// Looked up in the index, synthesized if unknown.
    Name(&'a str),
    /// Used as-is.
    Collection(&'a Collection),
}

impl<'a> From<&'a str> for CollectionTarget<'a> {
    fn from(name: &'a str) -> Self {
        CollectionTarget::Name(name)
    }
}

impl<'a> From<&'a String> for CollectionTarget<'a> {
    fn from(name: &'a String) -> Self {
        CollectionTarget::Name(name)
    }
}

impl<'a> From<&'a Collection> for CollectionTarget<'a> {
    fn from(collection: &'a Collection) -> Self {
        CollectionTarget::Collection(collection)
    }
}

/// Ordered collections from the root manifest, with lookup by name.
#[derive(Debug, Clone, Default)]
pub struct CollectionsIndex {
    collections: Vec<Collection>,
    by_name: HashMap<String, usize>,
}

impl CollectionsIndex {
    fn new(session: &Session, entries: Vec<CollectionEntry>) -> Self {
        let mut index = Self::default();
        for entry in entries {
            let collection = Collection::new(session.clone(), entry.href, entry.name.clone(), entry.description);
            index.by_name.insert(entry.name, index.collections.len());
            index.collections.push(collection);
        }
        index
    }

    /// Every collection, in manifest order.
    pub fn all(&self) -> &[Collection] {
        &self.collections
    }

    /// Every collection name, in manifest order.
    pub fn names(&self) -> Vec<&str> {
        self.collections.iter().map(Collection::name).collect()
    }

    /// Collection registered under `name`.
    pub fn get(&self, name: &str) -> Option<&Collection> {
        self.by_name.get(name).map(|&i| &self.collections[i])
    }

    /// Mutable access, e.g. to reload the index's own copy.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Collection> {
        let i = *self.by_name.get(name)?;
        self.collections.get_mut(i)
    }

    /// Membership by name.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Membership by identity (name and href).
    pub fn contains_collection(&self, collection: &Collection) -> bool {
        self.get(collection.name())
            .is_some_and(|c| c.href() == collection.href())
    }

    /// Number of collections.
    pub fn len(&self) -> usize {
        self.collections.len()
    }

    /// True when the manifest listed no collections.
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}
