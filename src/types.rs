//! Core value types of the resource graph.
//!
//! Entities and collections never own each other. They point at one another
//! through the plain identifiers below, and turn them back into live objects
//! through the shared [`Session`](crate::session::Session).

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Non-owning identity of a collection: `(name, href)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionRef {
    /// Collection name, e.g. `vms`.
    pub name: String,
    /// Collection locator, absolute or relative to the entry point.
    pub href: String,
}

impl CollectionRef {
    /// Build a collection reference.
    pub fn new(name: impl Into<String>, href: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            href: href.into(),
        }
    }
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.href)
    }
}

/// Non-owning link to an entity living in another collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    /// Collection the entity belongs to.
    pub collection: CollectionRef,
    /// Entity locator.
    pub href: String,
}

/// A materialized entity field.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    /// Plain JSON value.
    Value(Value),
    /// Parsed time field.
    Timestamp(DateTime<FixedOffset>),
    /// Reference field resolved into another collection.
    Reference(EntityRef),
    /// Nested collection rooted under the entity href.
    Collection(CollectionRef),
}

impl Attribute {
    /// The plain JSON value, if this is one.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Attribute::Value(v) => Some(v),
            _ => None,
        }
    }

    /// The plain value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        self.as_value().and_then(Value::as_str)
    }

    /// The parsed timestamp, if this is a time field.
    pub fn as_timestamp(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            Attribute::Timestamp(t) => Some(t),
            _ => None,
        }
    }

    /// The linked entity, if this is a reference field.
    pub fn as_reference(&self) -> Option<&EntityRef> {
        match self {
            Attribute::Reference(r) => Some(r),
            _ => None,
        }
    }

    /// The nested collection, if this is one.
    pub fn as_collection(&self) -> Option<&CollectionRef> {
        match self {
            Attribute::Collection(c) => Some(c),
            _ => None,
        }
    }
}

/// HTTP method an action is advertised with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionMethod {
    /// `post`
    Post,
    /// `delete`
    Delete,
    /// Anything else; invoking it fails with `Unimplemented`.
    Other(String),
}

impl From<&str> for ActionMethod {
    fn from(method: &str) -> Self {
        if method.eq_ignore_ascii_case("post") {
            ActionMethod::Post
        } else if method.eq_ignore_ascii_case("delete") {
            ActionMethod::Delete
        } else {
            ActionMethod::Other(method.to_string())
        }
    }
}

impl fmt::Display for ActionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionMethod::Post => write!(f, "post"),
            ActionMethod::Delete => write!(f, "delete"),
            ActionMethod::Other(m) => write!(f, "{}", m),
        }
    }
}

/// One entry of a server `actions` manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    /// Action name, e.g. `start`.
    pub name: String,
    /// Advertised HTTP method.
    pub method: String,
    /// Where to send the request.
    pub href: String,
}

/// What a collection reload asks the server to expand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Expand {
    /// References only.
    #[default]
    None,
    /// `expand=resources`: full records.
    Resources,
    /// `expand=<a,b,..>`.
    Fields(Vec<String>),
}

impl Expand {
    pub(crate) fn to_params(&self) -> Vec<(String, String)> {
        match self {
            Expand::None => Vec::new(),
            Expand::Resources => vec![("expand".to_string(), "resources".to_string())],
            Expand::Fields(fields) => vec![("expand".to_string(), fields.join(","))],
        }
    }
}

impl From<bool> for Expand {
    fn from(expand: bool) -> Self {
        if expand {
            Expand::Resources
        } else {
            Expand::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_method_parsing() {
        assert_eq!(ActionMethod::from("post"), ActionMethod::Post);
        assert_eq!(ActionMethod::from("DELETE"), ActionMethod::Delete);
        assert_eq!(ActionMethod::from("patch"), ActionMethod::Other("patch".into()));
    }

    #[test]
    fn test_expand_params() {
        assert!(Expand::None.to_params().is_empty());
        assert_eq!(Expand::from(true).to_params(), vec![("expand".into(), "resources".into())]);
        assert_eq!(
            Expand::Fields(vec!["tags".into(), "vms".into()]).to_params(),
            vec![("expand".into(), "tags,vms".into())]
        );
    }

    #[test]
    fn test_attribute_accessors() {
        let attr = Attribute::Value(json!("running"));
        assert_eq!(attr.as_str(), Some("running"));
        assert!(attr.as_timestamp().is_none());

        let attr = Attribute::Collection(CollectionRef::new("tags", "/api/vms/1/tags"));
        assert_eq!(attr.as_collection().map(|c| c.name.as_str()), Some("tags"));
    }
}
