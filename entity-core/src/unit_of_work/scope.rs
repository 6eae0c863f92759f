//! Transaction scope shared by a unit of work and its repositories

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::repository::{
    RepositoryError, RepositoryErrorKind, RepositoryOperation, RepositoryResult,
};
use crate::store::{Change, Record, Store};

/// Lifecycle of a unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    /// Accepting operations
    Active,
    /// Pending changes were applied; terminal
    Committed,
    /// Pending changes were discarded; terminal
    RolledBack,
}

impl TransactionState {
    /// Whether no further operations are accepted
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Committed => write!(f, "committed"),
            Self::RolledBack => write!(f, "rolled_back"),
        }
    }
}

#[derive(Debug)]
struct ScopeState {
    state: TransactionState,
    explicit: bool,
    open: bool,
    pending: Vec<Change>,
}

/// Pending changes and lifecycle state of one unit of work
///
/// Every repository handle of a unit of work holds the same scope, so they
/// all observe one pending-change set. The transaction opens explicitly with
/// `begin` or implicitly on the first write, and nothing reaches the store
/// before `commit`. The lock is never held across an await point.
pub struct TransactionScope {
    id: Uuid,
    store: Arc<dyn Store>,
    timeout: Duration,
    cancellation: CancellationToken,
    inner: Mutex<ScopeState>,
}

impl TransactionScope {
    pub(crate) fn new(store: Arc<dyn Store>, timeout: Duration, cancellation: CancellationToken) -> Self {
        Self {
            id: Uuid::now_v7(),
            store,
            timeout,
            cancellation,
            inner: Mutex::new(ScopeState {
                state: TransactionState::Active,
                explicit: false,
                open: false,
                pending: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ScopeState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Scope identifier, used to correlate log lines
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current lifecycle state
    pub fn state(&self) -> TransactionState {
        self.lock().state
    }

    /// Number of queued changes
    pub fn pending_changes(&self) -> usize {
        self.lock().pending.len()
    }

    /// Whether a transaction is open, explicitly or by a first write
    pub fn in_transaction(&self) -> bool {
        self.lock().open
    }

    /// Fail with `InvalidState` unless the scope is active
    pub fn ensure_active(&self, operation: RepositoryOperation) -> RepositoryResult<()> {
        check_active(&self.lock(), operation)
    }

    pub(crate) fn begin(&self) -> RepositoryResult<()> {
        let mut inner = self.lock();
        check_active(&inner, RepositoryOperation::BeginTransaction)?;
        if inner.explicit {
            return Err(RepositoryError::invalid_state(
                RepositoryOperation::BeginTransaction,
                "A transaction is already open on this unit of work",
            ));
        }
        inner.explicit = true;
        if !inner.open {
            inner.open = true;
            tracing::info!(scope = %self.id, "Transaction started");
        }
        Ok(())
    }

    /// Queue changes; all of them or, on error, none
    pub(crate) fn enqueue(&self, operation: RepositoryOperation, changes: Vec<Change>) -> RepositoryResult<()> {
        if self.cancellation.is_cancelled() {
            return Err(RepositoryError::cancelled(operation));
        }
        let mut inner = self.lock();
        check_active(&inner, operation)?;
        if !inner.open {
            inner.open = true;
            tracing::debug!(scope = %self.id, %operation, "Transaction opened by first write");
        }
        inner.pending.extend(changes);
        Ok(())
    }

    /// Read one document as this scope sees it
    pub(crate) async fn fetch(
        &self,
        operation: RepositoryOperation,
        collection: &str,
        key: &str,
    ) -> RepositoryResult<Option<Value>> {
        let overlaid = {
            let inner = self.lock();
            check_active(&inner, operation)?;
            inner
                .pending
                .iter()
                .rev()
                .find(|c| c.collection() == collection && c.key() == key)
                .map(|c| c.document().cloned())
        };

        match overlaid {
            Some(document) => Ok(document),
            None => {
                self.call_store(operation, None, self.store.get(collection, key))
                    .await
            }
        }
    }

    /// Read a whole collection as this scope sees it
    pub(crate) async fn scan(
        &self,
        operation: RepositoryOperation,
        collection: &str,
        cancellation: Option<&CancellationToken>,
    ) -> RepositoryResult<Vec<Record>> {
        self.ensure_active(operation)?;
        let records = self
            .call_store(operation, cancellation, self.store.scan(collection))
            .await?;

        let inner = self.lock();
        check_active(&inner, operation)?;
        let mut view: BTreeMap<String, Value> = records
            .into_iter()
            .map(|r| (r.key, r.document))
            .collect();
        for change in inner.pending.iter().filter(|c| c.collection() == collection) {
            match change.document() {
                Some(document) => {
                    view.insert(change.key().to_string(), document.clone());
                }
                None => {
                    view.remove(change.key());
                }
            }
        }

        Ok(view
            .into_iter()
            .map(|(key, document)| Record { key, document })
            .collect())
    }

    /// Validate pending changes against the store
    ///
    /// The changes stay queued for the commit; nothing is applied.
    pub(crate) async fn flush(&self, operation: RepositoryOperation) -> RepositoryResult<()> {
        let changes = {
            let inner = self.lock();
            check_active(&inner, operation)?;
            if inner.pending.is_empty() {
                return Ok(());
            }
            inner.pending.clone()
        };

        match self
            .call_store(operation, None, self.store.validate(&changes))
            .await
        {
            Ok(()) => {
                tracing::debug!(scope = %self.id, changes = changes.len(), "Validated pending changes");
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    pub(crate) async fn commit(&self) -> RepositoryResult<()> {
        let changes = {
            let mut inner = self.lock();
            check_active(&inner, RepositoryOperation::Commit)?;
            std::mem::take(&mut inner.pending)
        };

        let count = changes.len();
        if !changes.is_empty() {
            self.call_store(RepositoryOperation::Commit, None, self.store.apply(changes))
                .await
                .map_err(|err| self.fail(err))?;
        }

        let mut inner = self.lock();
        check_active(&inner, RepositoryOperation::Commit)?;
        inner.state = TransactionState::Committed;
        tracing::info!(scope = %self.id, changes = count, "Unit of work committed");
        Ok(())
    }

    /// Discard pending changes
    ///
    /// Rolling back twice is allowed; rolling back after a commit is not.
    pub(crate) fn rollback(&self) -> RepositoryResult<()> {
        let mut inner = self.lock();
        match inner.state {
            TransactionState::RolledBack => Ok(()),
            TransactionState::Committed => Err(RepositoryError::invalid_state(
                RepositoryOperation::Rollback,
                "Unit of work has already been committed",
            )),
            TransactionState::Active => {
                let discarded = inner.pending.len();
                inner.pending.clear();
                inner.state = TransactionState::RolledBack;
                tracing::warn!(scope = %self.id, discarded, "Unit of work rolled back");
                Ok(())
            }
        }
    }

    pub(crate) fn discard_on_drop(&self) {
        let mut inner = self.lock();
        if inner.state != TransactionState::Active {
            return;
        }
        let discarded = inner.pending.len();
        inner.pending.clear();
        inner.state = TransactionState::RolledBack;
        if discarded > 0 {
            tracing::warn!(
                scope = %self.id,
                discarded,
                "Unit of work dropped without commit; pending changes discarded"
            );
        }
    }

    /// Roll back after a store-level failure and return the error to raise
    fn fail(&self, err: RepositoryError) -> RepositoryError {
        {
            let mut inner = self.lock();
            if inner.state == TransactionState::Active {
                inner.pending.clear();
                inner.state = TransactionState::RolledBack;
            }
        }
        match err.kind {
            RepositoryErrorKind::Cancelled => {
                tracing::warn!(scope = %self.id, operation = %err.operation, "Store call cancelled; unit of work rolled back");
            }
            _ => {
                tracing::warn!(scope = %self.id, error = %err, "Store call failed; unit of work rolled back");
            }
        }
        err
    }

    /// Run a store call bounded by the scope timeout and cancellation tokens
    async fn call_store<R, F>(
        &self,
        operation: RepositoryOperation,
        cancellation: Option<&CancellationToken>,
        call: F,
    ) -> RepositoryResult<R>
    where
        F: Future<Output = RepositoryResult<R>>,
    {
        let query_token = cancellation.cloned().unwrap_or_default();

        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => Err(RepositoryError::cancelled(operation)),
            _ = query_token.cancelled() => Err(RepositoryError::cancelled(operation)),
            result = tokio::time::timeout(self.timeout, call) => match result {
                Ok(inner) => inner.map_err(|e| e.with_operation(operation)),
                Err(_) => Err(RepositoryError::persistence(
                    operation,
                    format!("Store call timed out after {}s", self.timeout.as_secs_f64()),
                )),
            },
        }
    }
}

fn check_active(inner: &ScopeState, operation: RepositoryOperation) -> RepositoryResult<()> {
    match inner.state {
        TransactionState::Active => Ok(()),
        state => Err(RepositoryError::invalid_state(
            operation,
            format!("Unit of work is {} and accepts no further operations", state),
        )),
    }
}

impl fmt::Debug for TransactionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("TransactionScope")
            .field("id", &self.id)
            .field("state", &inner.state)
            .field("explicit", &inner.explicit)
            .field("open", &inner.open)
            .field("pending", &inner.pending.len())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::test_support::{FaultyStore, SlowStore};
    use serde_json::json;

    fn scope_over(store: Arc<dyn Store>) -> TransactionScope {
        TransactionScope::new(store, Duration::from_secs(5), CancellationToken::new())
    }

    fn insert(key: &str) -> Change {
        Change::Insert {
            collection: "things".to_string(),
            key: key.to_string(),
            document: json!({ "key": key }),
        }
    }

    #[tokio::test]
    async fn test_reads_see_pending_changes() {
        let store = MemoryStore::new();
        store.apply(vec![insert("1"), insert("2")]).await.unwrap();
        let scope = scope_over(Arc::new(store));

        scope
            .enqueue(
                RepositoryOperation::Delete,
                vec![Change::Delete {
                    collection: "things".to_string(),
                    key: "1".to_string(),
                }],
            )
            .unwrap();
        scope.enqueue(RepositoryOperation::Create, vec![insert("3")]).unwrap();

        let keys: Vec<String> = scope
            .scan(RepositoryOperation::List, "things", None)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.key)
            .collect();
        assert_eq!(keys, vec!["2", "3"]);
        assert!(scope
            .fetch(RepositoryOperation::GetById, "things", "1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_begin_twice_is_invalid_state() {
        let scope = scope_over(Arc::new(MemoryStore::new()));
        scope.begin().unwrap();
        assert!(scope.in_transaction());
        let err = scope.begin().unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::InvalidState);
        assert_eq!(scope.state(), TransactionState::Active);
    }

    #[tokio::test]
    async fn test_first_write_opens_transaction() {
        let store = MemoryStore::new();
        let scope = scope_over(Arc::new(store.clone()));
        assert!(!scope.in_transaction());

        scope.enqueue(RepositoryOperation::Create, vec![insert("1")]).unwrap();
        assert!(scope.in_transaction());
        scope.flush(RepositoryOperation::SaveChanges).await.unwrap();

        assert!(store.is_empty("things").await);
        assert_eq!(scope.pending_changes(), 1);
        assert_eq!(scope.state(), TransactionState::Active);

        scope.begin().unwrap();
        let err = scope.begin().unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::InvalidState);

        scope.commit().await.unwrap();
        assert_eq!(store.len("things").await, 1);
    }

    #[tokio::test]
    async fn test_flush_inside_transaction_only_validates() {
        let store = MemoryStore::new();
        let scope = scope_over(Arc::new(store.clone()));
        scope.begin().unwrap();
        scope.enqueue(RepositoryOperation::Create, vec![insert("1")]).unwrap();
        scope.flush(RepositoryOperation::SaveChanges).await.unwrap();

        assert!(store.is_empty("things").await);
        assert_eq!(scope.pending_changes(), 1);

        scope.commit().await.unwrap();
        assert_eq!(store.len("things").await, 1);
        assert_eq!(scope.state(), TransactionState::Committed);
    }

    #[tokio::test]
    async fn test_failed_commit_rolls_back() {
        let scope = scope_over(Arc::new(FaultyStore::default()));
        scope.enqueue(RepositoryOperation::Create, vec![insert("1")]).unwrap();

        let err = scope.commit().await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::Persistence);
        assert_eq!(err.operation, RepositoryOperation::Commit);
        assert_eq!(scope.state(), TransactionState::RolledBack);
        assert_eq!(scope.pending_changes(), 0);
    }

    #[tokio::test]
    async fn test_terminal_scope_rejects_operations() {
        let scope = scope_over(Arc::new(MemoryStore::new()));
        scope.commit().await.unwrap();

        let err = scope
            .enqueue(RepositoryOperation::Create, vec![insert("1")])
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::InvalidState);
        let err = scope.rollback().unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::InvalidState);
        let err = scope.commit().await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_rollback_is_repeatable() {
        let scope = scope_over(Arc::new(MemoryStore::new()));
        scope.enqueue(RepositoryOperation::Create, vec![insert("1")]).unwrap();
        scope.rollback().unwrap();
        scope.rollback().unwrap();
        assert_eq!(scope.state(), TransactionState::RolledBack);
        assert_eq!(scope.pending_changes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_timeout_is_persistence_error() {
        let scope = TransactionScope::new(
            Arc::new(SlowStore::new(Duration::from_secs(60))),
            Duration::from_secs(1),
            CancellationToken::new(),
        );
        let err = scope
            .scan(RepositoryOperation::List, "things", None)
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::Persistence);
        assert!(err.message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_cancelled_query_token() {
        let scope = scope_over(Arc::new(SlowStore::new(Duration::from_secs(60))));
        let token = CancellationToken::new();
        token.cancel();
        let err = scope
            .scan(RepositoryOperation::List, "things", Some(&token))
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::Cancelled);
        assert_eq!(scope.state(), TransactionState::Active);
    }

    #[tokio::test]
    async fn test_cancelled_scope_rejects_writes() {
        let token = CancellationToken::new();
        let scope = TransactionScope::new(Arc::new(MemoryStore::new()), Duration::from_secs(5), token.clone());
        token.cancel();
        let err = scope
            .enqueue(RepositoryOperation::Create, vec![insert("1")])
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::Cancelled);
        assert_eq!(scope.pending_changes(), 0);
    }
}
