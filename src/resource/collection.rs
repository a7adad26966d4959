//! Named, queryable sets of entities.
//!
//! A [`Collection`] caches the last page it fetched (`count`, `subcount`,
//! raw resource records, actions manifest). The cache stays until the next
//! explicit [`reload`](Collection::reload); accessors that need it call
//! [`reload_if_needed`](Collection::reload_if_needed) first.
//!
//! # Access patterns
//!
//! | Call | Network |
//! |------|---------|
//! | [`all`](Collection::all) | one reload if never loaded; entities built from the cached page |
//! | [`stream`](Collection::stream) | one `expand=resources` reload, then one reload per entity |
//! | [`nth`](Collection::nth) | one reload if never loaded, then one entity reload |
//! | [`filter`](Collection::filter) / [`find_by`](Collection::find_by) | one filtered GET |
//! | [`get`](Collection::get) | one filtered GET, then one entity reload |

use crate::client::join_href;
use crate::error::{ApiError, Result};
use crate::filters::Q;
use crate::resource::action::{parse_manifest, ActionContainer, Actionable};
use crate::resource::entity::{Entity, ReloadOptions};
use crate::resource::search::SearchResult;
use crate::session::Session;
use crate::types::{CollectionRef, Expand};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{Map, Value};
use std::fmt::Display;

#[derive(Debug, Clone)]
struct Page {
    count: u64,
    subcount: u64,
    resources: Vec<Map<String, Value>>,
}

pub(crate) fn count_field(data: &Map<String, Value>, key: &str) -> Result<u64> {
    data.get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| ApiError::MalformedData(format!("missing or invalid {}", key)))
}

pub(crate) fn resource_records(data: &mut Map<String, Value>) -> Result<Vec<Map<String, Value>>> {
    match data.remove("resources") {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(record) => Ok(record),
                other => Err(ApiError::MalformedData(format!("resource record {}", other))),
            })
            .collect(),
        Some(other) => Err(ApiError::MalformedData(format!("resources is not a list: {}", other))),
        None => Err(ApiError::MalformedData("missing resources".to_string())),
    }
}

/// A named set of entities at a fixed href.
#[derive(Debug, Clone)]
pub struct Collection {
    session: Session,
    name: String,
    href: String,
    description: Option<String>,
    page: Option<Page>,
    action: ActionContainer,
}

impl Collection {
    /// Unloaded collection.
    pub fn new(session: Session, href: impl Into<String>, name: impl Into<String>, description: Option<String>) -> Self {
        let name = name.into();
        let href = href.into();
        let action = ActionContainer::new(session.clone(), CollectionRef::new(name.clone(), href.clone()));
        Self {
            session,
            name,
            href,
            description,
            page: None,
            action,
        }
    }

    /// Unloaded collection from its identity.
    pub fn from_ref(session: Session, reference: &CollectionRef) -> Self {
        Self::new(session, reference.href.clone(), reference.name.clone(), None)
    }

    /// Collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Collection locator.
    pub fn href(&self) -> &str {
        &self.href
    }

    /// Description from the root manifest.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Identity as a plain reference.
    pub fn reference(&self) -> CollectionRef {
        CollectionRef::new(self.name.clone(), self.href.clone())
    }

    /// Whether any page has been fetched.
    pub fn is_loaded(&self) -> bool {
        self.page.is_some()
    }

    /// Fetch the collection without expansion.
    pub async fn reload(&mut self) -> Result<()> {
        self.reload_with(Expand::None).await
    }

    /// Fetch the collection and replace the cached page.
    ///
    /// Fails with [`ApiError::NameMismatch`] if the payload names another
    /// collection; the cache is left untouched in that case.
    pub async fn reload_with(&mut self, expand: impl Into<Expand>) -> Result<()> {
        let params = expand.into().to_params();
        tracing::debug!("Reloading collection {} {:?}", self.name, params);

        let mut data = match self.session.get(&self.href, &params).await? {
            Value::Object(data) => data,
            other => {
                return Err(ApiError::MalformedData(format!(
                    "collection {} returned {}",
                    self.name, other
                )))
            }
        };

        let actual = data.get("name").and_then(Value::as_str).unwrap_or_default();
        if actual != self.name {
            return Err(ApiError::NameMismatch {
                expected: self.name.clone(),
                actual: actual.to_string(),
            });
        }

        let count = count_field(&data, "count")?;
        let subcount = count_field(&data, "subcount")?;
        let resources = resource_records(&mut data)?;
        let manifest = parse_manifest(data.remove("actions"))?;

        self.page = Some(Page {
            count,
            subcount,
            resources,
        });
        self.action.set_manifest(manifest);
        Ok(())
    }

    /// Reload only if never loaded.
    pub async fn reload_if_needed(&mut self) -> Result<()> {
        if self.page.is_none() {
            self.reload().await?;
        }
        Ok(())
    }

    fn loaded_page(&self) -> Result<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| ApiError::NotFound(format!("collection {} has not been loaded", self.name)))
    }

    /// Total number of entities.
    pub async fn count(&mut self) -> Result<u64> {
        self.reload_if_needed().await?;
        Ok(self.loaded_page()?.count)
    }

    /// Number of entities in the last fetched subset.
    pub async fn subcount(&mut self) -> Result<u64> {
        self.reload_if_needed().await?;
        Ok(self.loaded_page()?.subcount)
    }

    /// Entities of the cached page, built as they are consumed.
    ///
    /// Only the last-loaded page is covered; clone the iterator to restart it.
    pub async fn all(&mut self) -> Result<Entities> {
        self.reload_if_needed().await?;
        let records = self.loaded_page()?.resources.clone();
        Ok(Entities {
            session: self.session.clone(),
            collection: self.reference(),
            records: records.into_iter(),
        })
    }

    /// Reload with `expand=resources`, then yield each entity fully reloaded.
    pub async fn stream(&mut self) -> Result<BoxStream<'static, Result<Entity>>> {
        self.reload_with(Expand::Resources).await?;
        let records = self.loaded_page()?.resources.clone();
        let session = self.session.clone();
        let collection = self.reference();

        Ok(stream::iter(records)
            .then(move |record| {
                let session = session.clone();
                let collection = collection.clone();
                async move {
                    let mut entity = Entity::from_record(session, collection, record, false)?;
                    entity.reload().await?;
                    Ok::<Entity, ApiError>(entity)
                }
            })
            .boxed())
    }

    /// Entity at `position` of the cached page, fully reloaded.
    pub async fn nth(&mut self, position: usize) -> Result<Entity> {
        self.reload_if_needed().await?;
        let record = self
            .loaded_page()?
            .resources
            .get(position)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("No {} at index {}", self.name, position)))?;
        let mut entity = Entity::from_record(self.session.clone(), self.reference(), record, false)?;
        entity.reload().await?;
        Ok(entity)
    }

    /// Entity `<href>/<id>`; with `attributes`, reload just those fields.
    pub async fn entity(&self, id: impl Display, attributes: Option<&[&str]>) -> Result<Entity> {
        let href = join_href(&self.href, &id.to_string());
        let mut entity = Entity::from_reference(self.session.clone(), self.reference(), href);
        if let Some(attributes) = attributes {
            entity
                .reload_with(ReloadOptions::new().attributes(attributes.iter().copied()))
                .await?;
        }
        Ok(entity)
    }

    /// Send filter expressions verbatim as repeated `filter[]` parameters.
    pub async fn raw_filter<S: AsRef<str>>(&self, filters: &[S]) -> Result<SearchResult> {
        let params: Vec<(String, String)> = filters
            .iter()
            .map(|f| ("filter[]".to_string(), f.as_ref().to_string()))
            .collect();
        let data = self.session.get(&self.href, &params).await?;
        SearchResult::from_payload(self.session.clone(), self.reference(), data)
    }

    /// Filter by a structured query.
    pub async fn filter(&self, q: &Q) -> Result<SearchResult> {
        self.raw_filter(&q.as_filters()).await
    }

    /// Filter by equality constraints, all AND-ed.
    pub async fn find_by<K, I>(&self, constraints: I) -> Result<SearchResult>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let q = Q::from_pairs(constraints);
        self.filter(&q).await
    }

    /// First match of [`find_by`](Self::find_by), fully reloaded.
    pub async fn get<K, I>(&self, constraints: I) -> Result<Entity>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let q = Q::from_pairs(constraints);
        let mut result = self.filter(&q).await?;
        if result.is_empty() {
            return Err(ApiError::NotFound(format!(
                "No such '{}' matching query {:?}!",
                self.name,
                q.as_filters()
            )));
        }
        result.nth(0).await
    }
}

#[async_trait]
impl Actionable for Collection {
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

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Collection {:?} ({:?})>", self.name, self.description)
    }
}

/// Entities built from a cached page. Restartable by cloning.
#[derive(Debug, Clone)]
pub struct Entities {
    session: Session,
    collection: CollectionRef,
    records: std::vec::IntoIter<Map<String, Value>>,
}

impl Iterator for Entities {
    type Item = Result<Entity>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        Some(Entity::from_record(
            self.session.clone(),
            self.collection.clone(),
            record,
            false,
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.records.size_hint()
    }
}
