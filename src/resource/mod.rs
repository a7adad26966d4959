//! The lazy resource graph: collections, entities and their actions.
//!
//! ```text
//! resource/
//! ├── collection - Collection, Entities
//! ├── entity     - Entity, ReloadOptions
//! ├── action     - ActionContainer, Actionable, Action, ActionArgs, results
//! └── search     - SearchResult
//! ```
//!
//! Objects in the graph refer to each other through [`CollectionRef`] and
//! [`EntityRef`] values and share one [`Session`]; none owns another.
//!
//! [`CollectionRef`]: crate::types::CollectionRef
//! [`EntityRef`]: crate::types::EntityRef
//! [`Session`]: crate::session::Session

mod action;
mod collection;
mod entity;
mod search;

pub use action::{
    Action, ActionArgs, ActionContainer, ActionOutcome, ActionResult, ActionResults, Actionable, Resource,
};
pub use collection::{Collection, Entities};
pub use entity::{Entity, ReloadOptions};
pub use search::SearchResult;
