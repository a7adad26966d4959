#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! # manageiq_client: a lazy object model for the ManageIQ REST API
//!
//! The ManageIQ API is hypermedia driven: responses embed references to other
//! resources, nested collections and the actions the caller may invoke. This
//! crate turns those payloads into a graph of [`Collection`]s and [`Entity`]s
//! that fetch their data only when it is first needed.
//!
//! ## Overview
//!
//! - **Transport** - [`RestClient`] issues GET/POST/DELETE with basic auth,
//!   retries connection failures and turns error payloads into [`ApiError::Domain`]
//! - **Root** - [`Client`] bootstraps from the entry point and indexes the collections
//! - **Collections** - lazy count, listing and `filter[]` search
//! - **Entities** - lazily loaded fields, typed timestamps, links to other
//!   collections and nested subcollections
//! - **Actions** - discovered from each payload's `actions` manifest and
//!   invoked with a normalized request body
//!
//! ## Fetch rules
//!
//! | Operation | Requests |
//! |-----------|----------|
//! | [`Client::connect`] | 1 |
//! | [`Client::get_entity`] without attributes | 0 |
//! | first [`Entity::get`] on an incomplete entity | 1 |
//! | [`Entity::get`] of an unknown name | 1 more, plus a subcollection GET if declared |
//! | [`Collection::count`] | 1 on first use |
//!
//! ## Usage
//!
//! ```ignore
//! use manageiq_client::{ActionArgs, Actionable, Client, Credentials, Q};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> manageiq_client::Result<()> {
//!     let client = Client::connect("https://miq.example.com/api", Credentials::new("admin", "smartvm")).await?;
//!
//!     let vms = client.collection("vms")?;
//!     let found = vms.filter(&Q::eq("vendor", json!("vmware")).and(Q::new("id", ">", json!(10)))).await?;
//!     println!("{} of {} vms match", found.subcount(), found.count());
//!
//!     let mut vm = client.get_entity("vms", 42, None).await?;
//!     vm.execute_action("start", ActionArgs::new()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Structure
//!
//! - **[client]** - transport, configuration and helpers
//! - **[api]** - the bootstrapped root and its collection index
//! - **[resource]** - collections, entities, actions, search results
//! - **[types]** - references, attributes and action descriptors
//! - **[schema]** - field tables driving attribute materialization
//! - **[filters]** - filter expression builder
//! - **[wait]** - polling helper
//! - **[error]** - error types and result handling

pub mod api;
pub mod client;
pub mod error;
pub mod filters;
pub mod resource;
pub mod schema;
pub mod session;
pub mod types;
pub mod wait;

pub use api::{Client, CollectionTarget, CollectionsIndex};
pub use client::{ClientConfig, Credentials, RestClient};
pub use error::{ApiError, DomainError, Result};
pub use filters::Q;
pub use resource::{
    Action, ActionArgs, ActionOutcome, ActionResult, Actionable, Collection, Entity, ReloadOptions, Resource,
    SearchResult,
};
pub use schema::FieldSchema;
pub use session::Session;
pub use types::{Attribute, CollectionRef, EntityRef, Expand};
pub use wait::WaitConfig;

#[cfg(test)]
mod tests;
