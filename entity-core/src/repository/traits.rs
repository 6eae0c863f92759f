//! Repository trait definitions
//!
//! This module provides the generic CRUD capability trait using RPITIT
//! (Return Position Impl Trait In Traits), available since Rust 1.75, plus
//! the [`ListQuery`] that bundles raw listing input.
//!
//! # Overview
//!
//! - [`Repository`]: CRUD, counting and paged listing for one entity type
//! - [`ListQuery`]: filter, sort, eager-load and pagination input for `list`
//! - [`WriteMode`]: whether a write is validated at once or left to the commit
//!
//! # Example
//!
//! ```rust,ignore
//! use entity_core::repository::{ListQuery, Repository, WriteMode};
//!
//! let page = areas
//!     .list(
//!         ListQuery::new()
//!             .with_sort("name", "desc")
//!             .include("applications")
//!             .with_page(2)
//!             .with_page_size(10),
//!     )
//!     .await?;
//!
//! areas.create(new_area, WriteMode::Deferred).await?;
//! uow.commit().await?;
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;

use tokio_util::sync::CancellationToken;

use super::error::RepositoryError;
use super::filter::Filter;
use super::pagination::Page;
use super::schema::Entity;

/// Result type for repository operations
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// When a write is checked against the backing store
///
/// Either way the change is applied only when the unit of work commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// Validate all pending changes against the store as part of the call
    #[default]
    Immediate,
    /// Only queue the change
    Deferred,
}

/// Base repository trait for one entity type
///
/// Writes are expressed as full-record operations keyed by [`Entity::id`].
/// Every operation runs inside the owning unit of work; once that unit of
/// work has committed or rolled back, all operations fail with
/// `InvalidState`.
pub trait Repository<T: Entity>: Send + Sync {
    /// Fetch an entity by identifier
    ///
    /// Returns `Ok(None)` if it does not exist.
    fn get_by_id(&self, id: &T::Id) -> impl Future<Output = RepositoryResult<Option<T>>> + Send;

    /// Filter, order and paginate entities
    ///
    /// All arguments are validated before the store is touched.
    ///
    /// # Errors
    ///
    /// - `UnknownField` / `InvalidDirection` for bad sort input
    /// - `InvalidPagination` / `PageOutOfRange` for bad page input
    /// - `UnknownRelation` for an unregistered include name
    /// - `Cancelled` if the query's cancellation token fires
    fn list(&self, query: ListQuery<T>) -> impl Future<Output = RepositoryResult<Page<T>>> + Send;

    /// Count entities matching a filter
    fn count(&self, filter: &Filter<T>) -> impl Future<Output = RepositoryResult<u64>> + Send;

    /// Check if an entity exists by its identifier
    fn exists(&self, id: &T::Id) -> impl Future<Output = RepositoryResult<bool>> + Send;

    /// Insert a new entity
    ///
    /// # Errors
    ///
    /// `Validation` if the identifier is taken or a store constraint fails.
    fn create(&self, entity: T, mode: WriteMode) -> impl Future<Output = RepositoryResult<T>> + Send;

    /// Insert several entities, in order
    fn create_many(
        &self,
        entities: Vec<T>,
        mode: WriteMode,
    ) -> impl Future<Output = RepositoryResult<Vec<T>>> + Send;

    /// Replace an existing entity
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no entity has this identifier.
    fn update(&self, entity: T, mode: WriteMode) -> impl Future<Output = RepositoryResult<T>> + Send;

    /// Replace several entities
    ///
    /// Every identifier is checked before any change is queued.
    fn update_many(
        &self,
        entities: Vec<T>,
        mode: WriteMode,
    ) -> impl Future<Output = RepositoryResult<Vec<T>>> + Send;

    /// Delete an entity by identifier
    ///
    /// Returns `true` if it existed. Deleting a missing entity is not an error.
    fn delete(&self, id: &T::Id, mode: WriteMode) -> impl Future<Output = RepositoryResult<bool>> + Send;

    /// Delete several entities, returning how many existed
    fn delete_many(
        &self,
        ids: &[T::Id],
        mode: WriteMode,
    ) -> impl Future<Output = RepositoryResult<u64>> + Send;
}

/// Raw listing input for [`Repository::list`]
///
/// Sort input stays as strings until the repository resolves it, so values
/// straight from a query string can be passed through unchecked.
pub struct ListQuery<T> {
    /// Composed predicates; empty matches everything
    pub filter: Filter<T>,
    /// Field to sort on; `None` sorts by identifier
    pub sort_field: Option<String>,
    /// `asc`/`desc`; `None` means ascending
    pub sort_direction: Option<String>,
    /// Relations to eagerly attach
    pub include: BTreeSet<String>,
    /// 1-based page; `None` means the first page
    pub page: Option<u64>,
    /// Page size; `None` means the configured default
    pub page_size: Option<u64>,
    /// Aborts the query with `Cancelled` when fired
    pub cancellation: Option<CancellationToken>,
}

impl<T> ListQuery<T> {
    /// Query for the first page of everything, ordered by identifier
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the filter
    #[must_use]
    pub fn with_filter(mut self, filter: Filter<T>) -> Self {
        self.filter = filter;
        self
    }

    /// Sort on `field` in `direction`
    #[must_use]
    pub fn with_sort(mut self, field: impl Into<String>, direction: impl Into<String>) -> Self {
        self.sort_field = Some(field.into());
        self.sort_direction = Some(direction.into());
        self
    }

    /// Set only the sort direction
    #[must_use]
    pub fn with_direction(mut self, direction: impl Into<String>) -> Self {
        self.sort_direction = Some(direction.into());
        self
    }

    /// Eagerly attach a registered relation
    #[must_use]
    pub fn include(mut self, relation: impl Into<String>) -> Self {
        self.include.insert(relation.into());
        self
    }

    /// Request a 1-based page
    #[must_use]
    pub fn with_page(mut self, page: u64) -> Self {
        self.page = Some(page);
        self
    }

    /// Request a page size
    #[must_use]
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Attach a cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

impl<T> Default for ListQuery<T> {
    fn default() -> Self {
        Self {
            filter: Filter::default(),
            sort_field: None,
            sort_direction: None,
            include: BTreeSet::new(),
            page: None,
            page_size: None,
            cancellation: None,
        }
    }
}

impl<T> Clone for ListQuery<T> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            sort_field: self.sort_field.clone(),
            sort_direction: self.sort_direction.clone(),
            include: self.include.clone(),
            page: self.page,
            page_size: self.page_size,
            cancellation: self.cancellation.clone(),
        }
    }
}

impl<T> fmt::Debug for ListQuery<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListQuery")
            .field("filter", &self.filter)
            .field("sort_field", &self.sort_field)
            .field("sort_direction", &self.sort_direction)
            .field("include", &self.include)
            .field("page", &self.page)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}
