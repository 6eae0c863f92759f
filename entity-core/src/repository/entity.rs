//! Generic repository over the transaction scope

use std::collections::BTreeSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::error::{RepositoryError, RepositoryOperation};
use super::filter::Filter;
use super::ordering::SortSpec;
use super::pagination::{paginate, Page};
use super::relations::RelationDescriptor;
use super::schema::Entity;
use super::traits::{ListQuery, Repository, RepositoryResult, WriteMode};
use crate::config::RepositoryConfig;
use crate::store::Change;
use crate::unit_of_work::{TransactionScope, TransactionState};

/// [`Repository`] implementation for any registered entity type
///
/// Obtained from `UnitOfWork::repository`; every handle of one unit of work
/// shares its scope.
pub struct EntityRepository<T> {
    scope: Arc<TransactionScope>,
    config: Arc<RepositoryConfig>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> EntityRepository<T> {
    pub(crate) fn new(scope: Arc<TransactionScope>, config: Arc<RepositoryConfig>) -> Self {
        Self {
            scope,
            config,
            _entity: PhantomData,
        }
    }

    /// State of the owning unit of work
    pub fn state(&self) -> TransactionState {
        self.scope.state()
    }

    fn collection() -> &'static str {
        T::schema().collection()
    }

    fn entity_name() -> &'static str {
        T::schema().entity_name()
    }

    fn decode(document: Value, operation: RepositoryOperation) -> RepositoryResult<T> {
        serde_json::from_value(document)
            .map_err(|e| RepositoryError::from(e).with_operation(operation))
    }

    fn encode(entity: &T, operation: RepositoryOperation) -> RepositoryResult<Value> {
        serde_json::to_value(entity).map_err(|e| {
            RepositoryError::from(e)
                .with_operation(operation)
                .with_entity(Self::entity_name(), entity.id().to_string())
        })
    }

    fn upsert_changes(
        entities: &[T],
        operation: RepositoryOperation,
        update: bool,
    ) -> RepositoryResult<Vec<Change>> {
        entities
            .iter()
            .map(|entity| {
                let collection = Self::collection().to_string();
                let key = entity.id().to_string();
                let document = Self::encode(entity, operation)?;
                Ok(if update {
                    Change::Update {
                        collection,
                        key,
                        document,
                    }
                } else {
                    Change::Insert {
                        collection,
                        key,
                        document,
                    }
                })
            })
            .collect()
    }

    async fn fetch(&self, operation: RepositoryOperation, id: &T::Id) -> RepositoryResult<Option<T>> {
        self.scope
            .fetch(operation, Self::collection(), &id.to_string())
            .await?
            .map(|doc| Self::decode(doc, operation))
            .transpose()
    }

    async fn load_all(
        &self,
        operation: RepositoryOperation,
        cancellation: Option<&CancellationToken>,
    ) -> RepositoryResult<Vec<T>> {
        self.scope
            .scan(operation, Self::collection(), cancellation)
            .await?
            .into_iter()
            .map(|record| Self::decode(record.document, operation))
            .collect()
    }

    async fn attach_relations(
        &self,
        items: &mut [T],
        relations: &[&'static RelationDescriptor<T>],
        cancellation: Option<&CancellationToken>,
    ) -> RepositoryResult<()> {
        if items.is_empty() || relations.is_empty() {
            return Ok(());
        }

        let loads = relations.iter().map(|relation| {
            self.scope.scan(
                RepositoryOperation::LoadRelations,
                relation.target_collection(),
                cancellation,
            )
        });
        let collections = try_join_all(loads).await?;

        for (relation, records) in relations.iter().zip(collections) {
            let documents = records.into_iter().map(|record| record.document).collect();
            relation.attach(items, documents)?;
        }
        Ok(())
    }

    /// Queue changes and validate them if the caller asked for it
    async fn write(
        &self,
        operation: RepositoryOperation,
        changes: Vec<Change>,
        mode: WriteMode,
    ) -> RepositoryResult<()> {
        self.scope.enqueue(operation, changes)?;
        if mode == WriteMode::Immediate {
            self.scope.flush(operation).await?;
        }
        Ok(())
    }
}

impl<T: Entity> Repository<T> for EntityRepository<T> {
    async fn get_by_id(&self, id: &T::Id) -> RepositoryResult<Option<T>> {
        self.fetch(RepositoryOperation::GetById, id).await
    }

    async fn list(&self, query: ListQuery<T>) -> RepositoryResult<Page<T>> {
        let ListQuery {
            filter,
            sort_field,
            sort_direction,
            include,
            page,
            page_size,
            cancellation,
        } = query;

        self.scope.ensure_active(RepositoryOperation::List)?;
        let request = self.config.page_request(page, page_size)?;
        let sort = SortSpec::<T>::resolve(sort_field.as_deref(), sort_direction.as_deref())?;
        let relations = include
            .iter()
            .map(|name| T::schema().relation(name))
            .collect::<RepositoryResult<Vec<_>>>()?;

        if cancellation.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Err(RepositoryError::cancelled(RepositoryOperation::List));
        }

        let entities = self
            .load_all(RepositoryOperation::List, cancellation.as_ref())
            .await?;
        let ordered = sort.sort(filter.apply(entities));
        let mut page = paginate(ordered, request)?;
        self.attach_relations(&mut page.items, &relations, cancellation.as_ref())
            .await?;

        tracing::debug!(
            entity = Self::entity_name(),
            sort = %sort.field_name(),
            direction = %sort.direction(),
            page = page.page,
            page_size = page.page_size,
            total = page.total,
            "Listed entities"
        );
        Ok(page)
    }

    async fn count(&self, filter: &Filter<T>) -> RepositoryResult<u64> {
        let entities = self.load_all(RepositoryOperation::Count, None).await?;
        Ok(entities.iter().filter(|e| filter.matches(e)).count() as u64)
    }

    async fn exists(&self, id: &T::Id) -> RepositoryResult<bool> {
        Ok(self
            .scope
            .fetch(RepositoryOperation::Exists, Self::collection(), &id.to_string())
            .await?
            .is_some())
    }

    async fn create(&self, entity: T, mode: WriteMode) -> RepositoryResult<T> {
        let changes = Self::upsert_changes(std::slice::from_ref(&entity), RepositoryOperation::Create, false)?;
        self.write(RepositoryOperation::Create, changes, mode).await?;
        Ok(entity)
    }

    async fn create_many(&self, entities: Vec<T>, mode: WriteMode) -> RepositoryResult<Vec<T>> {
        let changes = Self::upsert_changes(&entities, RepositoryOperation::Create, false)?;
        self.write(RepositoryOperation::Create, changes, mode).await?;
        Ok(entities)
    }

    async fn update(&self, entity: T, mode: WriteMode) -> RepositoryResult<T> {
        let mut updated = self.update_many(vec![entity], mode).await?;
        updated
            .pop()
            .ok_or_else(|| RepositoryError::persistence(RepositoryOperation::Update, "Update returned no entity"))
    }

    async fn update_many(&self, entities: Vec<T>, mode: WriteMode) -> RepositoryResult<Vec<T>> {
        for entity in &entities {
            let exists = self
                .scope
                .fetch(RepositoryOperation::Update, Self::collection(), &entity.id().to_string())
                .await?
                .is_some();
            if !exists {
                return Err(RepositoryError::not_found(Self::entity_name(), entity.id().to_string())
                    .with_operation(RepositoryOperation::Update));
            }
        }

        let changes = Self::upsert_changes(&entities, RepositoryOperation::Update, true)?;
        self.write(RepositoryOperation::Update, changes, mode).await?;
        Ok(entities)
    }

    async fn delete(&self, id: &T::Id, mode: WriteMode) -> RepositoryResult<bool> {
        let deleted = self.delete_many(std::slice::from_ref(id), mode).await?;
        Ok(deleted > 0)
    }

    async fn delete_many(&self, ids: &[T::Id], mode: WriteMode) -> RepositoryResult<u64> {
        let keys: BTreeSet<String> = ids.iter().map(ToString::to_string).collect();

        let mut changes = Vec::with_capacity(keys.len());
        for key in keys {
            let present = self
                .scope
                .fetch(RepositoryOperation::Delete, Self::collection(), &key)
                .await?
                .is_some();
            if present {
                changes.push(Change::Delete {
                    collection: Self::collection().to_string(),
                    key,
                });
            }
        }

        let deleted = changes.len() as u64;
        self.write(RepositoryOperation::Delete, changes, mode).await?;
        Ok(deleted)
    }
}

impl<T> fmt::Debug for EntityRepository<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRepository")
            .field("entity", &std::any::type_name::<T>())
            .field("scope", &self.scope.id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{contains_ignore_case, FilterCondition, RepositoryErrorKind};
    use crate::store::{MemoryStore, Store};
    use crate::test_support::{application, area, context, seeded_context, Application, Area};

    fn names(page: &Page<Area>) -> Vec<&str> {
        page.items.iter().map(|a| a.name.as_str()).collect()
    }

    fn name_contains(needle: &str) -> Filter<Area> {
        let needle = needle.to_string();
        Filter::all().and(move |a: &Area| contains_ignore_case(&a.name, &needle))
    }

    #[tokio::test]
    async fn test_seven_areas_paged_by_three() {
        let (_, ctx) = seeded_context(7).await;
        let uow = ctx.unit_of_work();
        let areas = uow.repository::<Area>();

        let query = ListQuery::new()
            .with_filter(name_contains("A"))
            .with_sort("name", "asc")
            .with_page_size(3);

        let page = areas.list(query.clone().with_page(2)).await.unwrap();
        assert_eq!(names(&page), vec!["A3", "A4", "A5"]);
        assert_eq!(page.total, 7);
        assert_eq!(page.page, 2);
        assert_eq!(page.page_size, 3);

        let page = areas.list(query.clone().with_page(3)).await.unwrap();
        assert_eq!(names(&page), vec!["A6"]);
        assert_eq!(page.total, 7);

        let err = areas.list(query.with_page(4)).await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::PageOutOfRange);
    }

    #[tokio::test]
    async fn test_empty_result_is_page_one_total_zero() {
        let (_, ctx) = seeded_context(3).await;
        let uow = ctx.unit_of_work();
        let page = uow
            .repository::<Area>()
            .list(ListQuery::new().with_filter(name_contains("zzz")))
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 0);
        assert_eq!(page.page, 1);
    }

    #[tokio::test]
    async fn test_argument_errors_are_reported_before_io() {
        let (_, ctx) = seeded_context(3).await;
        let uow = ctx.unit_of_work();
        let areas = uow.repository::<Area>();

        let err = areas
            .list(ListQuery::new().with_sort("password", "asc"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::UnknownField);

        let err = areas
            .list(ListQuery::new().with_sort("name", "upward"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::InvalidDirection);

        let err = areas
            .list(ListQuery::new().with_page(0))
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::InvalidPagination);

        let err = areas
            .list(ListQuery::new().with_page_size(1_000))
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::InvalidPagination);

        let err = areas
            .list(ListQuery::new().include("owners"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::UnknownRelation);

        assert_eq!(uow.state(), TransactionState::Active);
    }

    #[tokio::test]
    async fn test_filter_conditions_through_schema() {
        let (_, ctx) = seeded_context(7).await;
        let uow = ctx.unit_of_work();
        let filter = Filter::from_conditions(&[FilterCondition::in_list("id", [1_i64, 3, 5])]).unwrap();

        let page = uow
            .repository::<Area>()
            .list(ListQuery::new().with_filter(filter.clone()).with_direction("desc"))
            .await
            .unwrap();
        let ids: Vec<i64> = page.items.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![5, 3, 1]);
        assert_eq!(uow.repository::<Area>().count(&filter).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_include_attaches_relations() {
        let (store, ctx) = seeded_context(2).await;
        {
            let uow = ctx.unit_of_work();
            uow.repository::<Application>()
                .create_many(
                    vec![
                        application(10, "billing", Some(0)),
                        application(11, "intake", Some(0)),
                        application(12, "payroll", Some(1)),
                    ],
                    WriteMode::Deferred,
                )
                .await
                .unwrap();
            uow.commit().await.unwrap();
        }
        assert_eq!(store.len("applications").await, 3);

        let uow = ctx.unit_of_work();
        let page = uow
            .repository::<Area>()
            .list(ListQuery::new().include("applications"))
            .await
            .unwrap();
        assert_eq!(page.items[0].applications.len(), 2);
        assert_eq!(page.items[1].applications.len(), 1);

        let apps = uow
            .repository::<Application>()
            .list(ListQuery::new().include("area"))
            .await
            .unwrap();
        assert!(apps.items.iter().all(|a| a.area.is_some()));
    }

    #[tokio::test]
    async fn test_reads_observe_pending_writes() {
        let (_, ctx) = seeded_context(2).await;
        let uow = ctx.unit_of_work();
        let areas = uow.repository::<Area>();

        areas.create(area(9, "Z9"), WriteMode::Deferred).await.unwrap();
        areas.delete(&0, WriteMode::Deferred).await.unwrap();

        assert!(areas.exists(&9).await.unwrap());
        assert!(areas.get_by_id(&0).await.unwrap().is_none());
        assert_eq!(areas.count(&Filter::all()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_missing_entity_is_not_found() {
        let (_, ctx) = seeded_context(2).await;
        let uow = ctx.unit_of_work();
        let areas = uow.repository::<Area>();

        let err = areas
            .update_many(vec![area(1, "renamed"), area(42, "ghost")], WriteMode::Deferred)
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::NotFound);
        assert_eq!(err.entity_id.as_deref(), Some("42"));
        assert_eq!(uow.pending_changes(), 0);
        assert_eq!(uow.state(), TransactionState::Active);

        areas.update(area(1, "renamed"), WriteMode::Immediate).await.unwrap();
        assert_eq!(areas.get_by_id(&1).await.unwrap().unwrap().name, "renamed");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (store, ctx) = seeded_context(3).await;
        let uow = ctx.unit_of_work();
        let areas = uow.repository::<Area>();

        assert!(areas.delete(&1, WriteMode::Immediate).await.unwrap());
        assert!(!areas.delete(&1, WriteMode::Immediate).await.unwrap());
        assert_eq!(areas.delete_many(&[0, 0, 77], WriteMode::Immediate).await.unwrap(), 1);
        assert_eq!(store.len("areas").await, 3);

        uow.commit().await.unwrap();
        assert_eq!(store.len("areas").await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_unique_value_fails_validation_on_flush() {
        let (store, ctx) = seeded_context(1).await;
        let uow = ctx.unit_of_work();
        let err = uow
            .repository::<Area>()
            .create(area(5, "A0"), WriteMode::Immediate)
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::Validation);
        assert_eq!(uow.state(), TransactionState::RolledBack);
        assert_eq!(store.len("areas").await, 1);
    }

    #[tokio::test]
    async fn test_cancelled_list_queues_nothing() {
        let (_, ctx) = seeded_context(3).await;
        let uow = ctx.unit_of_work();
        let token = CancellationToken::new();
        token.cancel();

        let err = uow
            .repository::<Area>()
            .list(ListQuery::new().with_cancellation(token))
            .await
            .unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::Cancelled);
        assert_eq!(uow.pending_changes(), 0);
        assert_eq!(uow.state(), TransactionState::Active);
    }

    #[tokio::test]
    async fn test_undecodable_document_is_persistence_error() {
        let store = MemoryStore::new();
        store
            .apply(vec![Change::Insert {
                collection: "areas".to_string(),
                key: "1".to_string(),
                document: serde_json::json!({"id": "not a number"}),
            }])
            .await
            .unwrap();
        let ctx = context(store);
        let uow = ctx.unit_of_work();

        let err = uow.repository::<Area>().get_by_id(&1).await.unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::Persistence);
        assert_eq!(err.operation, RepositoryOperation::GetById);
    }
}
