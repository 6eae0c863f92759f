//! Generic repository engine
//!
//! This module provides the pieces every entity repository is assembled
//! from, independent of any particular entity shape or storage backend.
//!
//! # Features
//!
//! - **Schemas**: [`EntitySchema`] allow-lists the fields and relations of an [`Entity`]
//! - **Filtering**: [`Filter`] composes optional predicates; [`FilterCondition`] names fields by string
//! - **Ordering**: [`SortSpec`] resolves `(field, direction)` input with an identifier tiebreak
//! - **Pagination**: [`paginate`] slices ordered results into a [`Page`]
//! - **Relations**: [`RelationDescriptor`] eagerly attaches related entities
//! - **CRUD**: [`Repository`], implemented for every entity by [`EntityRepository`]
//!
//! # Example
//!
//! ```rust,ignore
//! use entity_core::repository::{Filter, FilterCondition, ListQuery, Repository};
//!
//! let filter = Filter::<Area>::all()
//!     .and_if(params.name, |needle| move |a: &Area| contains_ignore_case(&a.name, &needle))
//!     .and_condition(&FilterCondition::gte("created_at", cutoff))?;
//!
//! let page = uow
//!     .repository::<Area>()
//!     .list(
//!         ListQuery::new()
//!             .with_filter(filter)
//!             .with_sort(params.sort.unwrap_or_default(), params.dir.unwrap_or_default())
//!             .with_page(params.page.unwrap_or(1)),
//!     )
//!     .await?;
//! ```

mod entity;
mod error;
mod filter;
mod ordering;
mod pagination;
mod relations;
mod schema;
mod traits;

// Re-export all public types
pub use entity::EntityRepository;
pub use error::{RepositoryError, RepositoryErrorKind, RepositoryOperation};
pub use filter::{contains_ignore_case, Filter, FilterCondition, FilterOperator, FilterValue};
pub use ordering::{SortDirection, SortSpec};
pub use pagination::{paginate, Page, PageRequest, DEFAULT_PAGE_SIZE};
pub use relations::{RelationDescriptor, RelationKind};
pub use schema::{
    Entity, EntitySchema, EntitySchemaBuilder, FieldDescriptor, FieldValue, TextCollation,
    CREATED_AT_FIELD, ID_FIELD,
};
pub use traits::{ListQuery, Repository, RepositoryResult, WriteMode};
