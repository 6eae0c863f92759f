//! Shared test fixtures

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;
use crate::repository::{
    Entity, EntitySchema, FieldDescriptor, RelationDescriptor, RepositoryError,
    RepositoryOperation, RepositoryResult,
};
use crate::store::{Change, MemoryStore, Record, Store};
use crate::unit_of_work::DataContext;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Area {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing)]
    pub applications: Vec<Application>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub name: String,
    pub area_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing)]
    pub area: Option<Area>,
}

static AREA_SCHEMA: Lazy<EntitySchema<Area>> = Lazy::new(|| {
    EntitySchema::builder("Area", "areas")
        .with_field(
            FieldDescriptor::new("name", |a: &Area| a.name.clone())
                .unique()
                .required(),
        )
        .relation(RelationDescriptor::has_many::<Application, _>(
            "applications",
            "area_id",
            |area: &mut Area, apps: Vec<Application>| area.applications = apps,
        ))
        .build()
});

static APPLICATION_SCHEMA: Lazy<EntitySchema<Application>> = Lazy::new(|| {
    EntitySchema::builder("Application", "applications")
        .with_field(FieldDescriptor::new("name", |a: &Application| a.name.clone()).case_insensitive())
        .field("area_id", |a: &Application| a.area_id)
        .relation(RelationDescriptor::belongs_to::<Area, _, _>(
            "area",
            |app: &Application| app.area_id,
            |app: &mut Application, area: Option<Area>| app.area = area,
        ))
        .build()
});

impl Entity for Area {
    type Id = i64;

    fn id(&self) -> &i64 {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn schema() -> &'static EntitySchema<Self> {
        &AREA_SCHEMA
    }
}

impl Entity for Application {
    type Id = i64;

    fn id(&self) -> &i64 {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn schema() -> &'static EntitySchema<Self> {
        &APPLICATION_SCHEMA
    }
}

fn timestamp(id: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + id, 0).unwrap()
}

pub fn area(id: i64, name: &str) -> Area {
    Area {
        id,
        name: name.to_string(),
        created_at: timestamp(id),
        applications: Vec::new(),
    }
}

pub fn application(id: i64, name: &str, area_id: Option<i64>) -> Application {
    Application {
        id,
        name: name.to_string(),
        area_id,
        created_at: timestamp(id),
        area: None,
    }
}

pub fn context(store: MemoryStore) -> DataContext {
    DataContext::new(Arc::new(store), &Config::default())
}

/// A constrained store holding areas `A0..A{n-1}` with ids `0..n`
pub async fn seeded_context(n: i64) -> (MemoryStore, DataContext) {
    let store = MemoryStore::new()
        .register::<Area>()
        .register::<Application>();
    let changes = (0..n)
        .map(|i| Change::Insert {
            collection: "areas".to_string(),
            key: i.to_string(),
            document: serde_json::to_value(area(i, &format!("A{}", i))).unwrap(),
        })
        .collect();
    store.apply(changes).await.unwrap();
    (store.clone(), context(store))
}

/// Reads succeed empty; every write fails with a persistence error
#[derive(Debug, Default)]
pub struct FaultyStore;

#[async_trait]
impl Store for FaultyStore {
    async fn get(&self, _collection: &str, _key: &str) -> RepositoryResult<Option<Value>> {
        Ok(None)
    }

    async fn scan(&self, _collection: &str) -> RepositoryResult<Vec<Record>> {
        Ok(Vec::new())
    }

    async fn validate(&self, _changes: &[Change]) -> RepositoryResult<()> {
        Err(RepositoryError::persistence(
            RepositoryOperation::SaveChanges,
            "connection reset by peer",
        ))
    }

    async fn apply(&self, _changes: Vec<Change>) -> RepositoryResult<()> {
        Err(RepositoryError::persistence(
            RepositoryOperation::SaveChanges,
            "connection reset by peer",
        ))
    }
}

/// Every call takes `delay` before returning an empty result
#[derive(Debug)]
pub struct SlowStore {
    delay: Duration,
}

impl SlowStore {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Store for SlowStore {
    async fn get(&self, _collection: &str, _key: &str) -> RepositoryResult<Option<Value>> {
        tokio::time::sleep(self.delay).await;
        Ok(None)
    }

    async fn scan(&self, _collection: &str) -> RepositoryResult<Vec<Record>> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }

    async fn validate(&self, _changes: &[Change]) -> RepositoryResult<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn apply(&self, _changes: Vec<Change>) -> RepositoryResult<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}
