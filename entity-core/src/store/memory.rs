//! In-process store
//!
//! Batches are staged against copies of the collections they touch; the
//! copies replace the originals only after every change and every registered
//! constraint has passed, all under one write lock.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{Change, Record, Store};
use crate::repository::{
    Entity, FieldValue, RepositoryError, RepositoryOperation, RepositoryResult,
};

type Collection = BTreeMap<String, Value>;
type ConstraintCheck = Arc<dyn Fn(&Collection) -> RepositoryResult<()> + Send + Sync>;

/// Thread-safe, in-memory [`Store`]
///
/// Cloning shares the underlying data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<RwLock<HashMap<String, Collection>>>,
    constraints: Arc<HashMap<String, ConstraintCheck>>,
}

impl MemoryStore {
    /// Create an empty store with no constraints
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enforce the `unique` and `required` fields of `T`'s schema on its collection
    #[must_use]
    pub fn register<T: Entity>(mut self) -> Self {
        let collection = T::schema().collection().to_string();
        let mut constraints = (*self.constraints).clone();
        constraints.insert(collection, constraint_check::<T>());
        self.constraints = Arc::new(constraints);
        self
    }

    /// Number of documents currently stored in `collection`
    pub async fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    /// Whether `collection` holds no documents
    pub async fn is_empty(&self, collection: &str) -> bool {
        self.len(collection).await == 0
    }

    fn stage(
        &self,
        current: &HashMap<String, Collection>,
        changes: &[Change],
    ) -> RepositoryResult<HashMap<String, Collection>> {
        let mut staged: HashMap<String, Collection> = HashMap::new();

        for change in changes {
            let name = change.collection();
            let collection = staged
                .entry(name.to_string())
                .or_insert_with(|| current.get(name).cloned().unwrap_or_default());

            match change {
                Change::Insert { key, document, .. } => {
                    if collection.contains_key(key) {
                        return Err(RepositoryError::validation(format!(
                            "Key '{}' already exists in {}",
                            key, name
                        ))
                        .with_entity(name, key.as_str()));
                    }
                    collection.insert(key.clone(), document.clone());
                }
                Change::Update { key, document, .. } => match collection.get_mut(key) {
                    Some(slot) => *slot = document.clone(),
                    None => {
                        return Err(RepositoryError::not_found(name, key.as_str())
                            .with_operation(RepositoryOperation::Update))
                    }
                },
                Change::Delete { key, .. } => {
                    collection.remove(key);
                }
            }
        }

        for (name, documents) in &staged {
            if let Some(check) = self.constraints.get(name) {
                check(documents)?;
            }
        }

        Ok(staged)
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("constrained_collections", &self.constraints.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, collection: &str, key: &str) -> RepositoryResult<Option<Value>> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(key))
            .cloned())
    }

    async fn scan(&self, collection: &str) -> RepositoryResult<Vec<Record>> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(key, document)| Record {
                        key: key.clone(),
                        document: document.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn validate(&self, changes: &[Change]) -> RepositoryResult<()> {
        let current = self.collections.read().await;
        self.stage(&current, changes).map(|_| ())
    }

    async fn apply(&self, changes: Vec<Change>) -> RepositoryResult<()> {
        let mut current = self.collections.write().await;
        let staged = self.stage(&current, &changes)?;
        let touched = staged.len();
        current.extend(staged);
        tracing::debug!(changes = changes.len(), collections = touched, "Applied change batch");
        Ok(())
    }
}

fn constraint_check<T: Entity>() -> ConstraintCheck {
    Arc::new(|documents: &Collection| {
        let schema = T::schema();
        let fields: Vec<_> = schema.constrained_fields().collect();
        if fields.is_empty() {
            return Ok(());
        }

        let entities = documents
            .values()
            .map(|doc| serde_json::from_value::<T>(doc.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        for field in fields {
            if field.is_required() {
                if let Some(entity) = entities.iter().find(|e| field.value(e).is_null()) {
                    return Err(RepositoryError::validation(format!(
                        "Field '{}' is required",
                        field.name()
                    ))
                    .with_entity(schema.entity_name(), entity.id().to_string()));
                }
            }

            if field.is_unique() {
                let mut values: Vec<(FieldValue, &T)> = entities
                    .iter()
                    .map(|e| (field.value(e), e))
                    .filter(|(v, _)| !v.is_null())
                    .collect();
                values.sort_by(|(a, _), (b, _)| a.compare(b, field.collation()));

                let duplicate = values
                    .windows(2)
                    .find(|w| w[0].0.compare(&w[1].0, field.collation()) == Ordering::Equal);
                if let Some(pair) = duplicate {
                    return Err(RepositoryError::validation(format!(
                        "Value {} of unique field '{}' is already taken",
                        pair[1].0,
                        field.name()
                    ))
                    .with_entity(schema.entity_name(), pair[1].1.id().to_string()));
                }
            }
        }
        Ok(())
    })
}
