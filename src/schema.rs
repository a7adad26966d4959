//! Field tables that drive entity materialization.
//!
//! The server describes resources dynamically, but a few conventions are
//! fixed on the client side:
//!
//! | Table | Effect |
//! |-------|--------|
//! | time fields | value parsed into a timestamp |
//! | reference fields | `zone_id: "7"` also yields `zone` linked into `zones` |
//! | subcollections | names fetched lazily under `<entity href>/<name>` |
//! | extended collections | bare lists promoted to nested collections |
//!
//! [`FieldSchema::default`] carries the stock tables. Callers can add entries
//! through [`ClientConfig::schema`](crate::client::ClientConfig::schema).

use std::collections::{BTreeMap, BTreeSet};

const TIME_FIELDS: &[&str] = &[
    "updated_on",
    "created_on",
    "last_scan_attempt_on",
    "state_changed_on",
    "lastlogon",
    "updated_at",
    "created_at",
    "last_scan_on",
    "last_sync_on",
    "last_refresh_date",
    "retires_on",
];

const REFERENCE_FIELDS: &[(&str, &str)] = &[
    ("ems_id", "providers"),
    ("storage_id", "data_stores"),
    ("zone_id", "zones"),
    ("host_id", "hosts"),
    ("current_group_id", "groups"),
    ("miq_user_role_id", "roles"),
    ("evm_owner_id", "users"),
    ("task_id", "tasks"),
];

const SUBCOLLECTIONS: &[(&str, &[&str])] = &[
    ("service_catalogs", &["service_templates"]),
    ("roles", &["features"]),
    ("providers", &["tags"]),
    ("hosts", &["tags"]),
    ("data_stores", &["tags"]),
    ("resource_pools", &["tags"]),
    ("clusters", &["tags"]),
    ("services", &["tags"]),
    ("service_templates", &["tags"]),
    ("tenants", &["tags"]),
    ("vms", &["tags"]),
];

const EXTENDED_COLLECTIONS: &[(&str, &[&str])] = &[("roles", &["features"])];

/// Collection that request/task shaped action results are routed into.
pub const SERVICE_REQUESTS: &str = "service_requests";

/// Client-side field conventions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    time_fields: BTreeSet<String>,
    reference_fields: BTreeMap<String, String>,
    subcollections: BTreeMap<String, BTreeSet<String>>,
    extended_collections: BTreeMap<String, BTreeSet<String>>,
}

fn table(entries: &[(&str, &[&str])]) -> BTreeMap<String, BTreeSet<String>> {
    entries
        .iter()
        .map(|(collection, names)| {
            (
                collection.to_string(),
                names.iter().map(|n| n.to_string()).collect(),
            )
        })
        .collect()
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self {
            time_fields: TIME_FIELDS.iter().map(|f| f.to_string()).collect(),
            reference_fields: REFERENCE_FIELDS
                .iter()
                .map(|(field, target)| (field.to_string(), target.to_string()))
                .collect(),
            subcollections: table(SUBCOLLECTIONS),
            extended_collections: table(EXTENDED_COLLECTIONS),
        }
    }
}

impl FieldSchema {
    /// Schema with every table empty.
    pub fn empty() -> Self {
        Self {
            time_fields: BTreeSet::new(),
            reference_fields: BTreeMap::new(),
            subcollections: BTreeMap::new(),
            extended_collections: BTreeMap::new(),
        }
    }

    /// Treat `field` as a timestamp.
    pub fn with_time_field(mut self, field: impl Into<String>) -> Self {
        self.time_fields.insert(field.into());
        self
    }

    /// Resolve `field` into an entity of `collection`.
    pub fn with_reference(mut self, field: impl Into<String>, collection: impl Into<String>) -> Self {
        self.reference_fields.insert(field.into(), collection.into());
        self
    }

    /// Declare `name` as a lazily fetched subcollection of entities in `collection`.
    pub fn with_subcollection(mut self, collection: impl Into<String>, name: impl Into<String>) -> Self {
        self.subcollections
            .entry(collection.into())
            .or_default()
            .insert(name.into());
        self
    }

    /// Promote bare-list field `name` of entities in `collection` to a nested collection.
    pub fn with_extended_collection(mut self, collection: impl Into<String>, name: impl Into<String>) -> Self {
        self.extended_collections
            .entry(collection.into())
            .or_default()
            .insert(name.into());
        self
    }

    /// Whether `field` holds a timestamp.
    pub fn is_time_field(&self, field: &str) -> bool {
        self.time_fields.contains(field)
    }

    /// Target collection of a reference field.
    pub fn reference_target(&self, field: &str) -> Option<&str> {
        self.reference_fields.get(field).map(String::as_str)
    }

    /// Whether entities of `collection` declare subcollection `name`.
    pub fn is_subcollection(&self, collection: &str, name: &str) -> bool {
        self.subcollections
            .get(collection)
            .is_some_and(|names| names.contains(name))
    }

    /// Whether a bare list in `name` of a `collection` entity becomes a nested collection.
    pub fn is_extended_collection(&self, collection: &str, name: &str) -> bool {
        self.extended_collections
            .get(collection)
            .is_some_and(|names| names.contains(name))
    }
}

/// Attribute name a reference field links under: `zone_id` becomes `zone`.
pub fn link_name(field: &str) -> &str {
    field.strip_suffix("_id").unwrap_or(field)
}
