//! Lazily loaded single resources.
//!
//! An [`Entity`] is either built from a full record (it has an `id`) and
//! materialized immediately, or from a bare `{"href": ..}` reference and
//! marked incomplete. Every accessor that may need data awaits
//! [`Entity::ensure_loaded`] first, so the network round-trip is always an
//! explicit `.await`.
//!
//! # Materialization
//!
//! Each raw field becomes one [`Attribute`]:
//!
//! | Field | Attribute |
//! |-------|-----------|
//! | time field (`created_on`, ..) | [`Attribute::Timestamp`] |
//! | reference field (`zone_id`) | raw value kept, plus `zone` as [`Attribute::Reference`] |
//! | `{"count": .., "resources": [..]}` | [`Attribute::Collection`] at `<href>/<field>` |
//! | bare list in an extended collection | [`Attribute::Collection`] at `<href>/<field>` |
//! | anything else | [`Attribute::Value`] |
//!
//! # Examples
//!
//! ```ignore
//! let mut vm = client.get_entity("vms", 42, None).await?;
//! let name = vm.get("name").await?;              // one GET, then cached
//! let host = vm.linked("host").await?;           // lazy entity in `hosts`
//! let mut tags = vm.subcollection("tags").await?; // fetched from /vms/42/tags
//! println!("{:?} on {} with {} tags", name, host.href(), tags.count().await?);
//! ```

use crate::client::join_href;
use crate::error::{ApiError, Result};
use crate::resource::action::{parse_manifest, ActionContainer, Actionable};
use crate::resource::collection::Collection;
use crate::schema::link_name;
use crate::session::Session;
use crate::types::{ActionDescriptor, Attribute, CollectionRef, EntityRef};
use crate::wait::{Poller, WaitConfig};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// String form of an id field. Null and structured values have none.
pub(crate) fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse an ISO 8601 timestamp. Values without an offset are taken as UTC.
pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<FixedOffset>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc().fixed_offset());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().fixed_offset())
        .ok_or_else(|| ApiError::MalformedData(format!("invalid timestamp {:?}", value)))
}

/// What an entity reload asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadOptions {
    /// Names sent as `expand=<a,b>`; empty sends nothing.
    pub expand: Vec<String>,
    /// Names sent as `attributes=<a,b>`.
    pub attributes: Option<Vec<String>>,
    /// Fetch from the server; `false` only re-derives attributes from cached data.
    pub fetch: bool,
}

impl Default for ReloadOptions {
    fn default() -> Self {
        Self {
            expand: Vec::new(),
            attributes: None,
            fetch: true,
        }
    }
}

impl ReloadOptions {
    /// Fetch everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the server to expand these names.
    pub fn expand<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expand = names.into_iter().map(Into::into).collect();
        self
    }

    /// Fetch only these attributes.
    pub fn attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Skip the network and re-derive from cached data.
    pub fn without_fetch(mut self) -> Self {
        self.fetch = false;
        self
    }

    fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();
        if !self.expand.is_empty() {
            params.push(("expand".to_string(), self.expand.join(",")));
        }
        if let Some(attributes) = &self.attributes {
            params.push(("attributes".to_string(), attributes.join(",")));
        }
        params
    }
}

/// One addressable resource.
#[derive(Debug, Clone)]
pub struct Entity {
    session: Session,
    collection: CollectionRef,
    href: String,
    data: Map<String, Value>,
    attributes: BTreeMap<String, Attribute>,
    action: ActionContainer,
    incomplete: bool,
}

impl Entity {
    /// Build an entity from a server record.
    ///
    /// A record with an `id` is materialized immediately (an href is
    /// synthesized from the collection if missing). A record with only an
    /// `href` is deferred and marked incomplete. Anything else is malformed.
    pub fn from_record(
        session: Session,
        collection: CollectionRef,
        mut data: Map<String, Value>,
        incomplete: bool,
    ) -> Result<Self> {
        let href = match (data.get("id").cloned(), data.get("href").cloned()) {
            (Some(_), Some(Value::String(href))) => href,
            (Some(id), None) => {
                let id = id_text(&id)
                    .ok_or_else(|| ApiError::MalformedData(format!("unusable id {}", id)))?;
                let href = join_href(&collection.href, &id);
                data.insert("href".to_string(), Value::String(href.clone()));
                href
            }
            (None, Some(Value::String(href))) => {
                return Ok(Self::blank(session, collection, href, data, true));
            }
            _ => return Err(ApiError::MalformedData(format!("{}", Value::Object(data)))),
        };

        let mut entity = Self::blank(session, collection, href, data, incomplete);
        entity.materialize()?;
        Ok(entity)
    }

    /// Build an incomplete entity from its href alone.
    pub fn from_reference(session: Session, collection: CollectionRef, href: impl Into<String>) -> Self {
        let href = href.into();
        let mut data = Map::new();
        data.insert("href".to_string(), Value::String(href.clone()));
        Self::blank(session, collection, href, data, true)
    }

    fn blank(
        session: Session,
        collection: CollectionRef,
        href: String,
        data: Map<String, Value>,
        incomplete: bool,
    ) -> Self {
        let action = ActionContainer::new(session.clone(), collection.clone());
        Self {
            session,
            collection,
            href,
            data,
            attributes: BTreeMap::new(),
            action,
            incomplete,
        }
    }

    /// Stable locator.
    pub fn href(&self) -> &str {
        &self.href
    }

    /// Owning collection.
    pub fn collection(&self) -> &CollectionRef {
        &self.collection
    }

    /// Whether the fields still need fetching.
    pub fn is_incomplete(&self) -> bool {
        self.incomplete
    }

    /// Reference form used as an action argument: `{"href": ..}`.
    pub fn reference(&self) -> Value {
        let mut map = Map::new();
        map.insert("href".to_string(), Value::String(self.href.clone()));
        Value::Object(map)
    }

    /// Raw merged field map.
    pub fn raw(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Materialized attributes, without fetching.
    pub fn attributes(&self) -> &BTreeMap<String, Attribute> {
        &self.attributes
    }

    /// A materialized attribute, without fetching.
    pub fn field(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    /// Fetch everything and re-derive the attributes.
    pub async fn reload(&mut self) -> Result<()> {
        self.reload_with(ReloadOptions::default()).await
    }

    /// Fetch (optionally scoped) fresh data, merge it into the cache and
    /// re-derive the attributes.
    ///
    /// Nothing is committed if the merged data fails to materialize.
    pub async fn reload_with(&mut self, options: ReloadOptions) -> Result<()> {
        let mut data = self.data.clone();
        if options.fetch {
            let params = options.to_params();
            tracing::debug!("Reloading entity {} {:?}", self.href, params);
            let fresh = match self.session.get(&self.href, &params).await? {
                Value::Object(fresh) => fresh,
                other => {
                    return Err(ApiError::MalformedData(format!(
                        "entity {} returned {}",
                        self.href, other
                    )))
                }
            };
            data.extend(fresh);
        }

        let derived = self.derive(data)?;
        self.commit(derived);
        if options.fetch {
            self.incomplete = false;
        }
        Ok(())
    }

    fn needs_reload(&self) -> bool {
        self.incomplete || !self.action.is_discovered()
    }

    /// Reload unless fields and actions are already known.
    pub async fn reload_if_needed(&mut self) -> Result<()> {
        if self.needs_reload() {
            self.reload().await?;
        }
        Ok(())
    }

    /// Gate awaited before every field accessor.
    pub async fn ensure_loaded(&mut self) -> Result<()> {
        self.reload_if_needed().await
    }

    fn materialize(&mut self) -> Result<()> {
        let derived = self.derive(self.data.clone())?;
        self.commit(derived);
        Ok(())
    }

    fn commit(&mut self, derived: Derived) {
        self.href = derived.href;
        self.data = derived.data;
        self.attributes = derived.attributes;
        self.action.set_manifest(derived.manifest);
    }

    fn derive(&self, mut data: Map<String, Value>) -> Result<Derived> {
        let href = match data.get("href") {
            Some(Value::String(href)) => href.clone(),
            _ => self.href.clone(),
        };
        let manifest = parse_manifest(data.remove("actions"))?;

        let schema = self.session.schema();
        let mut attributes = BTreeMap::new();
        for (key, value) in &data {
            if schema.is_time_field(key) {
                let attribute = match value {
                    Value::String(s) => Attribute::Timestamp(parse_timestamp(s)?),
                    Value::Null => Attribute::Value(Value::Null),
                    other => {
                        return Err(ApiError::MalformedData(format!(
                            "time field {} holds {}",
                            key, other
                        )))
                    }
                };
                attributes.insert(key.clone(), attribute);
            } else if let Some(target) = schema.reference_target(key) {
                if let Some(id) = id_text(value) {
                    let collection = self.session.collection_or_synthesized(target);
                    let link = EntityRef {
                        href: join_href(&collection.href, &id),
                        collection,
                    };
                    attributes.insert(link_name(key).to_string(), Attribute::Reference(link));
                }
                attributes.insert(key.clone(), Attribute::Value(value.clone()));
            } else if is_embedded_page(value)
                || (value.is_array() && schema.is_extended_collection(&self.collection.name, key))
            {
                let nested = CollectionRef::new(key.clone(), join_href(&href, key));
                attributes.insert(key.clone(), Attribute::Collection(nested));
            } else {
                attributes.insert(key.clone(), Attribute::Value(value.clone()));
            }
        }

        Ok(Derived {
            href,
            data,
            manifest,
            attributes,
        })
    }

    /// Attribute `name`, fetching as needed.
    ///
    /// Loads the entity if incomplete; an unknown name forces one full
    /// reload unless that load just happened. A name still unknown after
    /// that only resolves if it is a declared subcollection of this entity's
    /// collection that answers a GET at `<href>/<name>`.
    pub async fn get(&mut self, name: &str) -> Result<Attribute> {
        let fetched = self.needs_reload();
        self.ensure_loaded().await?;
        if let Some(attribute) = self.attributes.get(name) {
            return Ok(attribute.clone());
        }

        if !fetched {
            self.reload().await?;
            if let Some(attribute) = self.attributes.get(name) {
                return Ok(attribute.clone());
            }
        }

        let missing = || ApiError::NotFound(format!("No such attribute/subcollection {}", name));
        if !self.session.schema().is_subcollection(&self.collection.name, name) {
            return Err(missing());
        }

        let mut nested = Collection::new(self.session.clone(), join_href(&self.href, name), name, None);
        match nested.reload().await {
            Ok(()) => Ok(Attribute::Collection(nested.reference())),
            Err(ApiError::Domain(_)) => Err(missing()),
            Err(e) => Err(e),
        }
    }

    /// Plain value of attribute `name`.
    pub async fn value(&mut self, name: &str) -> Result<Value> {
        match self.get(name).await? {
            Attribute::Value(value) => Ok(value),
            _ => Err(ApiError::NotFound(format!("{} is not a plain value", name))),
        }
    }

    /// The entity a reference attribute (e.g. `zone`) points at, unloaded.
    pub async fn linked(&mut self, name: &str) -> Result<Entity> {
        match self.get(name).await? {
            Attribute::Reference(link) => Ok(Entity::from_reference(
                self.session.clone(),
                link.collection,
                link.href,
            )),
            _ => Err(ApiError::NotFound(format!("{} is not a reference", name))),
        }
    }

    /// A nested collection attribute or declared subcollection, unloaded.
    pub async fn subcollection(&mut self, name: &str) -> Result<Collection> {
        match self.get(name).await? {
            Attribute::Collection(nested) => Ok(Collection::from_ref(self.session.clone(), &nested)),
            _ => Err(ApiError::NotFound(format!("{} is not a subcollection", name))),
        }
    }

    /// True iff a reload succeeds; a server error payload means false.
    pub async fn exists(&mut self) -> Result<bool> {
        match self.reload().await {
            Ok(()) => Ok(true),
            Err(ApiError::Domain(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Poll [`exists`](Self::exists) until it equals `existence`.
    pub async fn wait_for_existence(&mut self, existence: bool, config: WaitConfig) -> Result<Duration> {
        let mut poller = Poller::new(config);
        loop {
            if self.exists().await? == existence {
                return Ok(poller.elapsed());
            }
            poller.tick().await?;
        }
    }

    /// Wait until the entity can be fetched.
    pub async fn wait_exists(&mut self, config: WaitConfig) -> Result<Duration> {
        self.wait_for_existence(true, config).await
    }

    /// Wait until fetching the entity reports an error.
    pub async fn wait_not_exists(&mut self, config: WaitConfig) -> Result<Duration> {
        self.wait_for_existence(false, config).await
    }
}

struct Derived {
    href: String,
    data: Map<String, Value>,
    manifest: Vec<ActionDescriptor>,
    attributes: BTreeMap<String, Attribute>,
}

fn is_embedded_page(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| obj.contains_key("count") && obj.contains_key("resources"))
}

#[async_trait]
impl Actionable for Entity {
    fn actions(&self) -> &ActionContainer {
        &self.action
    }

    fn actions_mut(&mut self) -> &mut ActionContainer {
        &mut self.action
    }

    async fn load_owner(&mut self) -> Result<()> {
        self.reload_if_needed().await
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Entity {:?}>", self.href)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::offline_session;
    use serde_json::json;

    fn vms() -> CollectionRef {
        CollectionRef::new("vms", "http://miq.example.com/api/vms")
    }

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_reference_field_yields_id_and_link() {
        let entity = Entity::from_record(
            offline_session(),
            vms(),
            record(json!({"id": "1", "href": "http://miq.example.com/api/vms/1", "zone_id": "7"})),
            false,
        )
        .unwrap();

        assert_eq!(entity.field("zone_id"), Some(&Attribute::Value(json!("7"))));
        let link = entity.field("zone").and_then(Attribute::as_reference).unwrap();
        assert_eq!(link.collection.name, "zones");
        assert_eq!(link.href, "http://miq.example.com/api/zones/7");
    }

    #[test]
    fn test_time_fields_and_nested_collections() {
        let entity = Entity::from_record(
            offline_session(),
            CollectionRef::new("roles", "http://miq.example.com/api/roles"),
            record(json!({
                "id": 3,
                "href": "http://miq.example.com/api/roles/3",
                "created_on": "2017-01-12T10:14:56Z",
                "features": [{"identifier": "vm"}],
                "tags": {"count": 2, "resources": []},
                "settings": [1, 2]
            })),
            false,
        )
        .unwrap();

        let created = entity.field("created_on").and_then(Attribute::as_timestamp).unwrap();
        assert_eq!(created.to_rfc3339(), "2017-01-12T10:14:56+00:00");
        assert_eq!(
            entity.field("features").and_then(Attribute::as_collection).unwrap().href,
            "http://miq.example.com/api/roles/3/features"
        );
        assert_eq!(
            entity.field("tags").and_then(Attribute::as_collection).unwrap().href,
            "http://miq.example.com/api/roles/3/tags"
        );
        assert_eq!(entity.field("settings"), Some(&Attribute::Value(json!([1, 2]))));
    }

    #[test]
    fn test_record_shapes() {
        let entity = Entity::from_record(
            offline_session(),
            vms(),
            record(json!({"href": "http://miq.example.com/api/vms/5"})),
            false,
        )
        .unwrap();
        assert!(entity.is_incomplete());
        assert!(entity.attributes().is_empty());

        let entity = Entity::from_record(offline_session(), vms(), record(json!({"id": 8, "name": "db"})), false).unwrap();
        assert_eq!(entity.href(), "http://miq.example.com/api/vms/8");
        assert!(!entity.is_incomplete());

        let err = Entity::from_record(offline_session(), vms(), record(json!({"name": "orphan"})), false).unwrap_err();
        assert!(matches!(err, ApiError::MalformedData(_)));
    }

    #[test]
    fn test_actions_manifest_is_stripped() {
        let entity = Entity::from_record(
            offline_session(),
            vms(),
            record(json!({
                "id": 1,
                "href": "http://miq.example.com/api/vms/1",
                "actions": [{"name": "start", "method": "post", "href": "http://miq.example.com/api/vms/1"}]
            })),
            false,
        )
        .unwrap();
        assert!(entity.field("actions").is_none());
        assert!(!entity.raw().contains_key("actions"));
        assert_eq!(entity.actions().names(), vec!["start".to_string()]);
    }

    #[test]
    fn test_reference_form() {
        let entity = Entity::from_reference(offline_session(), vms(), "http://miq.example.com/api/vms/2");
        assert_eq!(entity.reference(), json!({"href": "http://miq.example.com/api/vms/2"}));
    }

    #[test]
    fn test_parse_timestamp_variants() {
        assert!(parse_timestamp("2020-05-01T08:00:00.123+02:00").is_ok());
        assert_eq!(
            parse_timestamp("2020-05-01T08:00:00").unwrap().to_rfc3339(),
            "2020-05-01T08:00:00+00:00"
        );
        assert_eq!(
            parse_timestamp("2020-05-01").unwrap().to_rfc3339(),
            "2020-05-01T00:00:00+00:00"
        );
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_reload_options_params() {
        let params = ReloadOptions::new().expand(["tags"]).attributes(["name", "vendor"]).to_params();
        assert_eq!(
            params,
            vec![
                ("expand".to_string(), "tags".to_string()),
                ("attributes".to_string(), "name,vendor".to_string())
            ]
        );
        assert!(ReloadOptions::new().to_params().is_empty());
    }
}
