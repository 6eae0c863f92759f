//! Request-scoped unit of work

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use uuid::Uuid;

use super::scope::{TransactionScope, TransactionState};
use crate::config::RepositoryConfig;
use crate::repository::{Entity, EntityRepository, RepositoryOperation, RepositoryResult};

/// Shared handle to the repository for `T` within one unit of work
pub type RepositoryHandle<T> = Arc<EntityRepository<T>>;

/// Coordinates repositories under one atomic set of pending changes
///
/// The transaction opens on the first write, or earlier through
/// [`begin_transaction`](Self::begin_transaction). No change reaches the
/// store before [`commit`](Self::commit), so a rolled-back unit of work has
/// applied nothing.
///
/// Lifecycle: `Active` until [`commit`](Self::commit) succeeds (`Committed`)
/// or the work is rolled back explicitly, by a failed flush or by dropping
/// the unit of work (`RolledBack`). Both end states are terminal; handles
/// retained past them fail with `InvalidState`.
///
/// A unit of work serves one logical operation at a time. It is `Send` and
/// `Sync` so it can cross await points, not so it can be shared between
/// concurrent tasks.
pub struct UnitOfWork {
    scope: Arc<TransactionScope>,
    config: Arc<RepositoryConfig>,
    repositories: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl UnitOfWork {
    pub(crate) fn new(scope: Arc<TransactionScope>, config: Arc<RepositoryConfig>) -> Self {
        Self {
            scope,
            config,
            repositories: Mutex::new(HashMap::new()),
        }
    }

    /// Repository for entity type `T`
    ///
    /// Repeated calls return the same handle.
    pub fn repository<T: Entity>(&self) -> RepositoryHandle<T> {
        let mut cache = self
            .repositories
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(handle) = cache
            .get(&TypeId::of::<T>())
            .and_then(|h| h.clone().downcast::<EntityRepository<T>>().ok())
        {
            return handle;
        }

        let handle = Arc::new(EntityRepository::<T>::new(self.scope.clone(), self.config.clone()));
        cache.insert(TypeId::of::<T>(), handle.clone());
        handle
    }

    /// Open the transaction explicitly
    ///
    /// Writes open it implicitly, so this is only needed to mark the start
    /// of the work before anything is written.
    ///
    /// # Errors
    ///
    /// `InvalidState` if called twice or after the unit of work has ended.
    pub fn begin_transaction(&self) -> RepositoryResult<()> {
        self.scope.begin()
    }

    /// Validate pending changes against the store without applying them
    ///
    /// A store failure rolls the unit of work back before the error is
    /// returned.
    pub async fn save_changes(&self) -> RepositoryResult<()> {
        self.scope.flush(RepositoryOperation::SaveChanges).await
    }

    /// Apply every pending change atomically and end the unit of work
    ///
    /// On failure nothing is applied and the unit of work is rolled back
    /// before the error is returned.
    pub async fn commit(&self) -> RepositoryResult<()> {
        self.scope.commit().await
    }

    /// Discard pending changes and end the unit of work
    pub fn rollback(&self) -> RepositoryResult<()> {
        self.scope.rollback()
    }

    /// Current lifecycle state
    pub fn state(&self) -> TransactionState {
        self.scope.state()
    }

    /// Number of queued changes
    pub fn pending_changes(&self) -> usize {
        self.scope.pending_changes()
    }

    /// Whether the transaction has been opened
    pub fn in_transaction(&self) -> bool {
        self.scope.in_transaction()
    }

    /// Identifier used in log lines for this unit of work
    pub fn id(&self) -> Uuid {
        self.scope.id()
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        self.scope.discard_on_drop();
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}
