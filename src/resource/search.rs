//! Results of filtered queries.

use crate::error::{ApiError, Result};
use crate::resource::collection::{count_field, resource_records};
use crate::resource::entity::Entity;
use crate::session::Session;
use crate::types::CollectionRef;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;

/// Ordered entities matched by a filter, plus the server's counts.
///
/// Entities usually arrive as bare references; each one is fully reloaded
/// when taken out with [`nth`](Self::nth) or [`into_stream`](Self::into_stream).
#[derive(Debug, Clone)]
pub struct SearchResult {
    collection: CollectionRef,
    name: String,
    count: u64,
    subcount: u64,
    resources: Vec<Entity>,
}

impl SearchResult {
    pub(crate) fn from_payload(session: Session, collection: CollectionRef, data: Value) -> Result<Self> {
        let mut data = match data {
            Value::Object(data) => data,
            other => return Err(ApiError::MalformedData(format!("search result {}", other))),
        };

        let count = count_field(&data, "count")?;
        let subcount = count_field(&data, "subcount")?;
        let name = data
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(&collection.name)
            .to_string();
        let resources = resource_records(&mut data)?
            .into_iter()
            .map(|record| Entity::from_record(session.clone(), collection.clone(), record, false))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            collection,
            name,
            count,
            subcount,
            resources,
        })
    }

    /// Collection the query ran against.
    pub fn collection(&self) -> &CollectionRef {
        &self.collection
    }

    /// Collection name reported by the server.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of the whole collection.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Number of matches.
    pub fn subcount(&self) -> u64 {
        self.subcount
    }

    /// True when the returned page holds no entities.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// The matched entities as returned, without reloading.
    pub fn entities(&self) -> &[Entity] {
        &self.resources
    }

    /// Match at `position`, fully reloaded.
    pub async fn nth(&mut self, position: usize) -> Result<Entity> {
        let entity = self.resources.get_mut(position).ok_or_else(|| {
            ApiError::NotFound(format!("No {} result at index {}", self.name, position))
        })?;
        entity.reload().await?;
        Ok(entity.clone())
    }

    /// Every match, each fully reloaded as it is consumed.
    pub fn into_stream(self) -> BoxStream<'static, Result<Entity>> {
        stream::iter(self.resources)
            .then(|mut entity| async move {
                entity.reload().await?;
                Ok::<Entity, ApiError>(entity)
            })
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::offline_session;
    use serde_json::json;

    #[test]
    fn test_from_payload() {
        let result = SearchResult::from_payload(
            offline_session(),
            CollectionRef::new("vms", "http://miq.example.com/api/vms"),
            json!({
                "name": "vms",
                "count": 10,
                "subcount": 2,
                "resources": [
                    {"href": "http://miq.example.com/api/vms/1"},
                    {"href": "http://miq.example.com/api/vms/2"}
                ]
            }),
        )
        .unwrap();

        assert_eq!(result.count(), 10);
        assert_eq!(result.subcount(), 2);
        assert!(!result.is_empty());
        assert_eq!(result.entities()[1].href(), "http://miq.example.com/api/vms/2");
        assert!(result.entities().iter().all(Entity::is_incomplete));
    }

    #[test]
    fn test_from_payload_rejects_missing_counts() {
        let err = SearchResult::from_payload(
            offline_session(),
            CollectionRef::new("vms", "http://miq.example.com/api/vms"),
            json!({"name": "vms", "resources": []}),
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::MalformedData(_)));
    }
}
