//! Unit of work coordination
//!
//! A [`DataContext`] is built once per application from a [`Store`] and the
//! loaded [`Config`]; it hands out one [`UnitOfWork`] per request. All
//! repositories obtained from a unit of work share its pending-change set,
//! so writes to several entity types commit together or not at all.
//!
//! # Example
//!
//! ```rust,ignore
//! use entity_core::prelude::*;
//!
//! let context = DataContext::new(Arc::new(MemoryStore::new()), &Config::default());
//!
//! let uow = context.unit_of_work();
//! uow.begin_transaction()?;
//! let areas = uow.repository::<Area>();
//! let applications = uow.repository::<Application>();
//! areas.create(area, WriteMode::Deferred).await?;
//! applications.create(application, WriteMode::Deferred).await?;
//! uow.commit().await?;
//! ```

mod scope;
mod uow;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::{Config, RepositoryConfig};
use crate::store::Store;

pub use scope::{TransactionScope, TransactionState};
pub use uow::{RepositoryHandle, UnitOfWork};

/// Factory for request-scoped units of work
///
/// Cloning is cheap and shares the store.
#[derive(Clone)]
pub struct DataContext {
    store: Arc<dyn Store>,
    repository: Arc<RepositoryConfig>,
    store_timeout: Duration,
}

impl DataContext {
    /// Create a context over `store` using the repository and unit-of-work settings of `config`
    pub fn new(store: Arc<dyn Store>, config: &Config) -> Self {
        Self {
            store,
            repository: Arc::new(config.repository.clone()),
            store_timeout: config.unit_of_work.store_timeout(),
        }
    }

    /// Start a unit of work
    pub fn unit_of_work(&self) -> UnitOfWork {
        self.unit_of_work_with_cancellation(CancellationToken::new())
    }

    /// Start a unit of work that fails with `Cancelled` once `token` fires
    pub fn unit_of_work_with_cancellation(&self, token: CancellationToken) -> UnitOfWork {
        let scope = TransactionScope::new(self.store.clone(), self.store_timeout, token);
        tracing::debug!(scope = %scope.id(), "Unit of work created");
        UnitOfWork::new(Arc::new(scope), self.repository.clone())
    }

    /// The backing store
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }
}

impl fmt::Debug for DataContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataContext")
            .field("repository", &self.repository)
            .field("store_timeout", &self.store_timeout)
            .finish_non_exhaustive()
    }
}
