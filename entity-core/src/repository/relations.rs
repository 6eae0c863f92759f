//! Eager-loading relation descriptors
//!
//! A relation is registered on the parent schema under a name that callers
//! pass in `ListQuery::include`. Loading is type-erased: the repository hands
//! the descriptor the raw documents of the target collection and the
//! descriptor decodes, matches and attaches them through a typed setter.
//!
//! Target schemas are resolved only when a relation is loaded, so two
//! schemas may reference each other.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use super::error::RepositoryOperation;
use super::schema::{Entity, FieldValue};
use super::traits::RepositoryResult;

type Loader<T> = Box<dyn Fn(&mut [T], Vec<Value>) -> RepositoryResult<()> + Send + Sync>;

/// Shape of a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Many target entities reference the parent by a foreign-key field
    HasMany,
    /// The parent references a single target entity by its identifier
    BelongsTo,
}

/// A named relation from `T` to another entity type
pub struct RelationDescriptor<T> {
    name: String,
    kind: RelationKind,
    target: fn() -> &'static str,
    loader: Loader<T>,
}

fn target_collection<R: Entity>() -> &'static str {
    R::schema().collection()
}

fn decode_all<R: Entity>(documents: Vec<Value>) -> RepositoryResult<Vec<R>> {
    documents
        .into_iter()
        .map(|doc| {
            serde_json::from_value(doc).map_err(|e| {
                crate::repository::RepositoryError::from(e)
                    .with_operation(RepositoryOperation::LoadRelations)
            })
        })
        .collect()
}

impl<T: Entity> RelationDescriptor<T> {
    /// Relation where every `R` whose `foreign_key` field equals the parent's
    /// identifier is attached to the parent, ordered by `R`'s identifier
    ///
    /// `foreign_key` must be registered in `R`'s schema; otherwise loading
    /// fails with `UnknownField`.
    pub fn has_many<R, F>(name: impl Into<String>, foreign_key: impl Into<String>, attach: F) -> Self
    where
        R: Entity,
        F: Fn(&mut T, Vec<R>) + Send + Sync + 'static,
    {
        let foreign_key = foreign_key.into();
        let loader: Loader<T> = Box::new(move |parents, documents| {
            let field = R::schema()
                .field(&foreign_key)
                .map_err(|e| e.with_operation(RepositoryOperation::LoadRelations))?;

            let mut related: Vec<(FieldValue, R)> = decode_all::<R>(documents)?
                .into_iter()
                .map(|r| (field.value(&r), r))
                .collect();
            related.sort_by(|(_, a), (_, b)| a.id().cmp(b.id()));

            for parent in parents.iter_mut() {
                let parent_id: FieldValue = parent.id().clone().into();
                let children = related
                    .iter()
                    .filter(|(fk, _)| *fk == parent_id)
                    .map(|(_, r)| r.clone())
                    .collect();
                attach(parent, children);
            }
            Ok(())
        });

        Self {
            name: name.into(),
            kind: RelationKind::HasMany,
            target: target_collection::<R>,
            loader,
        }
    }

    /// Relation where the parent holds the identifier of one `R`
    ///
    /// The setter receives `None` when the parent has no reference or the
    /// referenced entity does not exist.
    pub fn belongs_to<R, K, F>(name: impl Into<String>, local_key: K, attach: F) -> Self
    where
        R: Entity,
        K: Fn(&T) -> Option<R::Id> + Send + Sync + 'static,
        F: Fn(&mut T, Option<R>) + Send + Sync + 'static,
    {
        let loader: Loader<T> = Box::new(move |parents, documents| {
            let by_id: BTreeMap<R::Id, R> = decode_all::<R>(documents)?
                .into_iter()
                .map(|r| (r.id().clone(), r))
                .collect();

            for parent in parents.iter_mut() {
                let target = local_key(parent).and_then(|id| by_id.get(&id).cloned());
                attach(parent, target);
            }
            Ok(())
        });

        Self {
            name: name.into(),
            kind: RelationKind::BelongsTo,
            target: target_collection::<R>,
            loader,
        }
    }

    /// The name callers use to request this relation
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Relation shape
    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    /// Collection holding the related entities
    pub fn target_collection(&self) -> &'static str {
        (self.target)()
    }

    /// Attach related entities to `parents` from the target collection's documents
    pub fn attach(&self, parents: &mut [T], documents: Vec<Value>) -> RepositoryResult<()> {
        if parents.is_empty() {
            return Ok(());
        }
        (self.loader)(parents, documents)
    }
}

impl<T> fmt::Debug for RelationDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
