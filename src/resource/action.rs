//! Server-advertised actions.
//!
//! Entities and collections carry an `actions` manifest in their payload.
//! [`ActionContainer`] turns that manifest into a registry of callable
//! [`Action`]s; the [`Actionable`] trait gives both owners the same
//! lookup-or-rediscover-or-fail surface.
//!
//! # Request shapes
//!
//! | Arguments | Body |
//! |-----------|------|
//! | resources (+ fields) | `{"action": n, "resources": [resource ∪ fields, ..]}` |
//! | fields only | `{"action": n, "resource": fields}` |
//! | nothing | `{"action": n}` |
//!
//! # Examples
//!
//! ```ignore
//! use manageiq_client::{ActionArgs, Actionable};
//!
//! let mut vm = client.get_entity("vms", 42, None).await?;
//! if vm.has_action("start").await? {
//!     vm.execute_action("start", ActionArgs::new()).await?;
//! }
//!
//! let mut vms = client.collection("vms")?;
//! let outcome = vms
//!     .execute_action("stop", ActionArgs::new().resource(&vm).resource(&other))
//!     .await?;
//! ```

use crate::client::join_href;
use crate::error::{ApiError, Result};
use crate::resource::entity::{id_text, Entity};
use crate::schema::SERVICE_REQUESTS;
use crate::session::Session;
use crate::types::{ActionDescriptor, ActionMethod, CollectionRef};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Parse the `actions` manifest stripped from a payload. Absent means none.
pub(crate) fn parse_manifest(actions: Option<Value>) -> Result<Vec<ActionDescriptor>> {
    match actions {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value)
            .map_err(|e| ApiError::MalformedData(format!("actions manifest: {}", e))),
    }
}

/// Registry of the actions advertised for one entity or collection.
#[derive(Debug, Clone)]
pub struct ActionContainer {
    session: Session,
    collection: CollectionRef,
    manifest: Option<Vec<ActionDescriptor>>,
    registry: BTreeMap<String, Action>,
}

impl ActionContainer {
    pub(crate) fn new(session: Session, collection: CollectionRef) -> Self {
        Self {
            session,
            collection,
            manifest: None,
            registry: BTreeMap::new(),
        }
    }

    pub(crate) fn set_manifest(&mut self, manifest: Vec<ActionDescriptor>) {
        self.manifest = Some(manifest);
    }

    /// Whether the owner has ever delivered a manifest.
    pub fn is_discovered(&self) -> bool {
        self.manifest.is_some()
    }

    /// Rebuild the registry from the current manifest.
    pub(crate) fn register(&mut self) {
        self.registry = self
            .manifest
            .iter()
            .flatten()
            .map(|descriptor| {
                let action = Action::new(self.session.clone(), self.collection.clone(), descriptor);
                (descriptor.name.clone(), action)
            })
            .collect();
    }

    /// A registered action, without triggering discovery.
    pub fn get(&self, name: &str) -> Option<&Action> {
        self.registry.get(name)
    }

    /// Advertised action names, in manifest order.
    pub fn names(&self) -> Vec<String> {
        self.manifest
            .iter()
            .flatten()
            .map(|d| d.name.clone())
            .collect()
    }

    /// Collection that results of these actions belong to.
    pub fn collection(&self) -> &CollectionRef {
        &self.collection
    }
}

/// Owners of an [`ActionContainer`]: entities and collections.
#[async_trait]
pub trait Actionable: Send {
    /// The owner's container.
    fn actions(&self) -> &ActionContainer;

    /// The owner's container, mutably.
    fn actions_mut(&mut self) -> &mut ActionContainer;

    /// Make sure the owner has fetched its manifest.
    async fn load_owner(&mut self) -> Result<()>;

    /// Load the owner if needed and register every advertised action.
    async fn discover_actions(&mut self) -> Result<()> {
        self.load_owner().await?;
        self.actions_mut().register();
        Ok(())
    }

    /// Look up an action, rediscovering once before giving up.
    async fn action(&mut self, name: &str) -> Result<Action> {
        if let Some(action) = self.actions().get(name) {
            return Ok(action.clone());
        }
        self.discover_actions().await?;
        self.actions()
            .get(name)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("No such action {}", name)))
    }

    /// Rediscover and list the advertised action names.
    async fn all_actions(&mut self) -> Result<Vec<String>> {
        self.discover_actions().await?;
        Ok(self.actions().names())
    }

    /// Whether `name` is currently advertised.
    async fn has_action(&mut self, name: &str) -> Result<bool> {
        Ok(self.all_actions().await?.iter().any(|n| n == name))
    }

    /// Invoke an action by name. Works for names like `import` too.
    async fn execute_action(&mut self, name: &str, args: ActionArgs) -> Result<ActionOutcome> {
        let action = self.action(name).await?;
        action.invoke(args).await
    }
}

/// One resource argument of an action.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    /// An entity, sent as `{"href": ..}`.
    Reference(String),
    /// A raw mapping sent as-is.
    Raw(Map<String, Value>),
}

impl Resource {
    fn to_map(&self) -> Map<String, Value> {
        match self {
            Resource::Reference(href) => {
                let mut map = Map::new();
                map.insert("href".to_string(), Value::String(href.clone()));
                map
            }
            Resource::Raw(map) => map.clone(),
        }
    }
}

impl From<&Entity> for Resource {
    fn from(entity: &Entity) -> Self {
        Resource::Reference(entity.href().to_string())
    }
}

impl From<Map<String, Value>> for Resource {
    fn from(map: Map<String, Value>) -> Self {
        Resource::Raw(map)
    }
}

/// Arguments of an action call: resources plus fields applied to each.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionArgs {
    resources: Vec<Resource>,
    fields: Map<String, Value>,
}

impl ActionArgs {
    /// No resources, no fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a resource argument.
    pub fn resource(mut self, resource: impl Into<Resource>) -> Self {
        self.resources.push(resource.into());
        self
    }

    /// Add a field value.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

/// A callable bound to one advertised server operation.
#[derive(Debug, Clone)]
pub struct Action {
    session: Session,
    collection: CollectionRef,
    name: String,
    method: ActionMethod,
    href: String,
}

impl Action {
    pub(crate) fn new(session: Session, collection: CollectionRef, descriptor: &ActionDescriptor) -> Self {
        Self {
            session,
            collection,
            name: descriptor.name.clone(),
            method: ActionMethod::from(descriptor.method.as_str()),
            href: descriptor.href.clone(),
        }
    }

    /// Action name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Advertised method.
    pub fn method(&self) -> &ActionMethod {
        &self.method
    }

    /// Target href.
    pub fn href(&self) -> &str {
        &self.href
    }

    /// The JSON body [`invoke`](Self::invoke) sends for `args`.
    pub fn request_body(&self, args: &ActionArgs) -> Map<String, Value> {
        let mut body = Map::new();
        body.insert("action".to_string(), Value::String(self.name.clone()));

        if !args.resources.is_empty() {
            let resources = args
                .resources
                .iter()
                .map(|resource| {
                    let mut entry = resource.to_map();
                    entry.extend(args.fields.clone());
                    Value::Object(entry)
                })
                .collect();
            body.insert("resources".to_string(), Value::Array(resources));
        } else if !args.fields.is_empty() {
            body.insert("resource".to_string(), Value::Object(args.fields.clone()));
        }
        body
    }

    /// Send the action and normalize the response.
    pub async fn invoke(&self, args: ActionArgs) -> Result<ActionOutcome> {
        let body = self.request_body(&args);
        let response = match &self.method {
            ActionMethod::Post => self.session.post(&self.href, &body).await?,
            ActionMethod::Delete => self.session.delete(&self.href, &body).await?,
            ActionMethod::Other(method) => {
                return Err(ApiError::Unimplemented(format!(
                    "action {} uses method {}",
                    self.name, method
                )))
            }
        };

        let normalizer = Normalizer {
            session: self.session.clone(),
            collection: self.collection.clone(),
        };
        normalizer.outcome(response)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Action {} {}#{}>", self.method, self.href, self.name)
    }
}

/// What an action call produced.
#[derive(Debug)]
pub enum ActionOutcome {
    /// Blank response body.
    Empty,
    /// Single-result response.
    Single(ActionResult),
    /// `results` response, normalized as it is consumed.
    Many(ActionResults),
}

impl ActionOutcome {
    /// Normalize everything into a list, aborting on the first failure.
    pub fn into_results(self) -> Result<Vec<ActionResult>> {
        match self {
            ActionOutcome::Empty => Ok(Vec::new()),
            ActionOutcome::Single(result) => Ok(vec![result]),
            ActionOutcome::Many(results) => results.collect(),
        }
    }
}

/// One normalized action result.
#[derive(Debug, Clone)]
pub enum ActionResult {
    /// A resource, returned as a new entity.
    Entity(Entity),
    /// A bare `{"message": ..}` style payload.
    Message(Map<String, Value>),
}

impl ActionResult {
    /// The entity, if the result is one.
    pub fn into_entity(self) -> Option<Entity> {
        match self {
            ActionResult::Entity(entity) => Some(entity),
            ActionResult::Message(_) => None,
        }
    }

    /// The raw message payload, if the result is one.
    pub fn message(&self) -> Option<&Map<String, Value>> {
        match self {
            ActionResult::Message(payload) => Some(payload),
            ActionResult::Entity(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Normalizer {
    session: Session,
    collection: CollectionRef,
}

impl Normalizer {
    fn outcome(self, response: Option<Value>) -> Result<ActionOutcome> {
        let Some(response) = response else {
            return Ok(ActionOutcome::Empty);
        };

        if let Some(results) = response.get("results") {
            let Value::Array(items) = results else {
                return Err(ApiError::MalformedData(format!("results is not a list: {}", results)));
            };
            return Ok(ActionOutcome::Many(ActionResults {
                normalizer: self,
                items: items.clone().into_iter(),
            }));
        }

        self.normalize(response).map(ActionOutcome::Single)
    }

    fn normalize(&self, result: Value) -> Result<ActionResult> {
        let Value::Object(mut record) = result else {
            return Err(ApiError::Unimplemented(format!("action result {}", result)));
        };

        if record.contains_key("href") {
            let entity = Entity::from_record(self.session.clone(), self.collection.clone(), record, true)?;
            return Ok(ActionResult::Entity(entity));
        }

        if let Some(id) = record.get("id").and_then(id_text) {
            record.insert("href".to_string(), Value::String(join_href(&self.collection.href, &id)));
            let entity = Entity::from_record(self.session.clone(), self.collection.clone(), record, true)?;
            return Ok(ActionResult::Entity(entity));
        }

        // Request-shaped results land in service_requests whatever collection ran the action.
        if record.contains_key("request_state") && record.contains_key("requester_id") {
            let collection = self.session.collection(SERVICE_REQUESTS).cloned().ok_or_else(|| {
                ApiError::NotFound(format!("No such collection {}", SERVICE_REQUESTS))
            })?;
            if let Some(id) = record.get("id").and_then(id_text) {
                record.insert("href".to_string(), Value::String(join_href(&collection.href, &id)));
            }
            let entity = Entity::from_record(self.session.clone(), collection, record, false)?;
            return Ok(ActionResult::Entity(entity));
        }

        if record.contains_key("message") {
            return Ok(ActionResult::Message(record));
        }

        Err(ApiError::Unimplemented(format!(
            "action result {}",
            Value::Object(record)
        )))
    }
}

/// Lazily normalized `results` of a bulk action.
#[derive(Debug)]
pub struct ActionResults {
    normalizer: Normalizer,
    items: std::vec::IntoIter<Value>,
}

impl Iterator for ActionResults {
    type Item = Result<ActionResult>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.items.next()?;
        Some(self.normalizer.normalize(item))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}
