//! Backing-store seam
//!
//! Repositories never talk to storage directly. They queue [`Change`]s in a
//! unit of work, which hands them to a [`Store`] as one batch. A store must
//! apply a batch atomically: either every change becomes visible or none does.
//!
//! Documents are JSON values keyed by the entity identifier's `Display` form.

mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::repository::RepositoryResult;

pub use memory::MemoryStore;

/// A stored document and its key
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Entity identifier in `Display` form
    pub key: String,
    /// Serialized entity
    pub document: Value,
}

/// One pending mutation of a collection
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Add a document under a key that must not exist yet
    Insert {
        collection: String,
        key: String,
        document: Value,
    },
    /// Replace the document under a key that must exist
    Update {
        collection: String,
        key: String,
        document: Value,
    },
    /// Remove the document under a key; missing keys are ignored
    Delete { collection: String, key: String },
}

impl Change {
    /// Collection the change targets
    pub fn collection(&self) -> &str {
        match self {
            Self::Insert { collection, .. }
            | Self::Update { collection, .. }
            | Self::Delete { collection, .. } => collection,
        }
    }

    /// Key the change targets
    pub fn key(&self) -> &str {
        match self {
            Self::Insert { key, .. } | Self::Update { key, .. } | Self::Delete { key, .. } => key,
        }
    }

    /// Document written by the change, `None` for deletes
    pub fn document(&self) -> Option<&Value> {
        match self {
            Self::Insert { document, .. } | Self::Update { document, .. } => Some(document),
            Self::Delete { .. } => None,
        }
    }
}

/// Durable storage for entity documents
///
/// Implementations report failures as `RepositoryError`s: store-level
/// invariant violations as `Validation`, updates of missing keys as
/// `NotFound` and anything else as `Persistence`.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch one document
    async fn get(&self, collection: &str, key: &str) -> RepositoryResult<Option<Value>>;

    /// Fetch every document of a collection, in no particular order
    async fn scan(&self, collection: &str) -> RepositoryResult<Vec<Record>>;

    /// Check that `changes` would apply cleanly without applying them
    async fn validate(&self, changes: &[Change]) -> RepositoryResult<()>;

    /// Apply `changes` atomically, in order
    async fn apply(&self, changes: Vec<Change>) -> RepositoryResult<()>;
}
