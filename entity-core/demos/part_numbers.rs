//! Part-number catalogue on the in-memory store
//!
//! Registers two entity types, writes them in one unit of work and lists
//! them with filtering, ordering, pagination and eager loading.
//!
//! Run with: `cargo run --example part-numbers`

use std::sync::Arc;

use chrono::{DateTime, Utc};
use entity_core::prelude::*;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Supplier {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing)]
    parts: Vec<PartNumber>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PartNumber {
    id: i64,
    code: String,
    unit_price: f64,
    supplier_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

static SUPPLIER_SCHEMA: Lazy<EntitySchema<Supplier>> = Lazy::new(|| {
    EntitySchema::builder("Supplier", "suppliers")
        .with_field(
            FieldDescriptor::new("name", |s: &Supplier| s.name.clone())
                .case_insensitive()
                .unique()
                .required(),
        )
        .relation(RelationDescriptor::has_many::<PartNumber, _>(
            "parts",
            "supplier_id",
            |supplier: &mut Supplier, parts: Vec<PartNumber>| supplier.parts = parts,
        ))
        .build()
});

static PART_SCHEMA: Lazy<EntitySchema<PartNumber>> = Lazy::new(|| {
    EntitySchema::builder("PartNumber", "part_numbers")
        .with_field(FieldDescriptor::new("code", |p: &PartNumber| p.code.clone()).unique())
        .field("unit_price", |p: &PartNumber| p.unit_price)
        .field("supplier_id", |p: &PartNumber| p.supplier_id)
        .build()
});

impl Entity for Supplier {
    type Id = Uuid;

    fn id(&self) -> &Uuid {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn schema() -> &'static EntitySchema<Self> {
        &SUPPLIER_SCHEMA
    }
}

impl Entity for PartNumber {
    type Id = i64;

    fn id(&self) -> &i64 {
        &self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn schema() -> &'static EntitySchema<Self> {
        &PART_SCHEMA
    }
}

fn supplier(name: &str) -> Supplier {
    Supplier {
        id: Uuid::now_v7(),
        name: name.to_string(),
        created_at: Utc::now(),
        parts: Vec::new(),
    }
}

fn part(id: i64, code: &str, unit_price: f64, supplier_id: Uuid) -> PartNumber {
    PartNumber {
        id,
        code: code.to_string(),
        unit_price,
        supplier_id: Some(supplier_id),
        created_at: Utc::now(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::default();
    init_tracing(&config)?;

    let store = MemoryStore::new()
        .register::<Supplier>()
        .register::<PartNumber>();
    let context = DataContext::new(Arc::new(store), &config);

    let acme = supplier("Acme");
    let globex = supplier("Globex");
    {
        let uow = context.unit_of_work();
        uow.begin_transaction()?;
        uow.repository::<Supplier>()
            .create_many(vec![acme.clone(), globex.clone()], WriteMode::Deferred)
            .await?;
        uow.repository::<PartNumber>()
            .create_many(
                vec![
                    part(1, "AC-100", 4.5, acme.id),
                    part(2, "AC-200", 12.0, acme.id),
                    part(3, "GX-010", 0.75, globex.id),
                    part(4, "GX-020", 3.2, globex.id),
                    part(5, "AC-300", 9.9, acme.id),
                ],
                WriteMode::Deferred,
            )
            .await?;
        uow.commit().await?;
    }

    let uow = context.unit_of_work();

    let min_price: Option<f64> = Some(1.0);
    let filter = Filter::<PartNumber>::all()
        .and_if(min_price, |min| move |p: &PartNumber| p.unit_price >= min)
        .and_condition(&FilterCondition::contains("code", "ac"))?;

    let page = uow
        .repository::<PartNumber>()
        .list(
            ListQuery::new()
                .with_filter(filter)
                .with_sort("unit_price", "desc")
                .with_page_size(2),
        )
        .await?;
    println!(
        "page {} of {} ({} matching parts)",
        page.page,
        page.total_pages(),
        page.total
    );
    for p in &page.items {
        println!("  {} @ {:.2}", p.code, p.unit_price);
    }

    let suppliers = uow
        .repository::<Supplier>()
        .list(ListQuery::new().with_sort("name", "asc").include("parts"))
        .await?;
    for s in &suppliers.items {
        println!("{} supplies {} parts", s.name, s.parts.len());
    }

    match uow
        .repository::<Supplier>()
        .create(supplier("ACME"), WriteMode::Immediate)
        .await
    {
        Err(err) if err.kind == RepositoryErrorKind::Validation => println!("rejected: {}", err),
        other => println!("unexpected: {:?}", other.map(|s| s.name)),
    }
    println!("unit of work is now {}", uow.state());

    shutdown_tracing();
    Ok(())
}
