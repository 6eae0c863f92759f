//! # entity-core
//!
//! Generic data-access core shared by every entity type of an application.
//! Entity types register a schema once; the core then provides safe,
//! validated listing and atomic multi-repository writes for all of them.
//!
//! ## Features
//!
//! - **Allow-listed fields**: sort and filter input is resolved against each entity's schema, never reflected
//! - **Filter composition**: optional predicates ANDed into one reusable [`Filter`](repository::Filter)
//! - **Deterministic ordering**: any field, either direction, identifier as tiebreak
//! - **Consistent pagination**: 1-based pages whose `total` counts the whole filtered set
//! - **Unit of work**: per-request repositories sharing one atomic set of pending changes
//! - **Pluggable storage**: any [`Store`](store::Store); an in-memory store ships with the crate
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use entity_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let store = MemoryStore::new().register::<Area>();
//!     let context = DataContext::new(Arc::new(store), &config);
//!
//!     let uow = context.unit_of_work();
//!     let page = uow
//!         .repository::<Area>()
//!         .list(ListQuery::new().with_sort("name", "asc").with_page_size(10))
//!         .await?;
//!     println!("{} of {} areas", page.items.len(), page.total);
//!     uow.commit().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod observability;
pub mod repository;
pub mod store;
pub mod unit_of_work;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::{Error, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, RepositoryConfig, ServiceConfig, UnitOfWorkConfig};
    pub use crate::error::{Error, Result};
    pub use crate::observability::{init_tracing, shutdown_tracing};
    pub use crate::repository::{
        contains_ignore_case, Entity, EntityRepository, EntitySchema, FieldDescriptor, FieldValue,
        Filter, FilterCondition, FilterOperator, FilterValue, ListQuery, Page, PageRequest,
        RelationDescriptor, Repository, RepositoryError, RepositoryErrorKind,
        RepositoryOperation, RepositoryResult, SortDirection, SortSpec, WriteMode,
    };
    pub use crate::store::{Change, MemoryStore, Record, Store};
    pub use crate::unit_of_work::{
        DataContext, RepositoryHandle, TransactionState, UnitOfWork,
    };
}
