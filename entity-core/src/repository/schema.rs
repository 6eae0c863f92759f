//! Entity schemas and allow-listed field access
//!
//! Every entity type registers, once, the fields that callers may sort or
//! filter on. Field names coming from untrusted input are resolved against
//! that allow-list (case-insensitively) into a typed [`FieldDescriptor`];
//! anything else fails with `UnknownField`. There is no reflection over
//! arbitrary members.
//!
//! # Example
//!
//! ```rust
//! use chrono::{DateTime, Utc};
//! use entity_core::repository::{Entity, EntitySchema, FieldDescriptor};
//! use once_cell::sync::Lazy;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! struct Supplier {
//!     id: i64,
//!     name: String,
//!     created_at: DateTime<Utc>,
//! }
//!
//! static SUPPLIER_SCHEMA: Lazy<EntitySchema<Supplier>> = Lazy::new(|| {
//!     EntitySchema::builder("Supplier", "suppliers")
//!         .with_field(FieldDescriptor::new("name", |s: &Supplier| s.name.clone()).unique())
//!         .build()
//! });
//!
//! impl Entity for Supplier {
//!     type Id = i64;
//!     fn id(&self) -> &i64 { &self.id }
//!     fn created_at(&self) -> DateTime<Utc> { self.created_at }
//!     fn schema() -> &'static EntitySchema<Self> { &SUPPLIER_SCHEMA }
//! }
//!
//! let schema = Supplier::schema();
//! assert_eq!(schema.field("NAME").unwrap().name(), "name");
//! assert!(schema.field("password").is_err());
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{RepositoryError, RepositoryOperation};
use super::relations::RelationDescriptor;
use super::traits::RepositoryResult;

/// Name under which every schema registers the entity identifier
pub const ID_FIELD: &str = "id";

/// Name under which every schema registers the creation timestamp
pub const CREATED_AT_FIELD: &str = "created_at";

/// A record type managed by the data-access core
///
/// The core only relies on an identifier, a creation timestamp and the
/// registered schema; business shape is opaque to it. Entities are stored as
/// JSON documents, hence the serde bounds.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Opaque unique identifier; its `Display` form is the storage key
    type Id: Ord + Clone + fmt::Display + fmt::Debug + Send + Sync + Into<FieldValue> + 'static;

    /// The entity identifier
    fn id(&self) -> &Self::Id;

    /// When the entity was created
    fn created_at(&self) -> DateTime<Utc>;

    /// The schema registered for this entity type
    fn schema() -> &'static EntitySchema<Self>;
}

/// Comparable value produced by a field accessor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    /// Absent value; sorts before everything else
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit integer value
    Integer(i64),
    /// 64-bit floating point value
    Float(f64),
    /// Text value
    Text(String),
    /// UTC timestamp
    Timestamp(DateTime<Utc>),
    /// UUID value
    Uuid(Uuid),
}

/// How text values compare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextCollation {
    /// Byte-wise ordinal comparison
    #[default]
    Ordinal,
    /// Ordinal comparison after lower-casing both sides
    CaseInsensitive,
}

impl FieldValue {
    fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Integer(_) | Self::Float(_) => 2,
            Self::Text(_) => 3,
            Self::Timestamp(_) => 4,
            Self::Uuid(_) => 5,
        }
    }

    /// Check if the value is [`FieldValue::Null`]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrow the text content, if this is a text value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Compare two values of compatible types
    ///
    /// Returns `None` when the values cannot be meaningfully compared (for
    /// example text against a timestamp, or anything against `Null`).
    /// Integers and floats compare numerically.
    pub fn partial_compare(&self, other: &Self, collation: TextCollation) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => Some(a.total_cmp(b)),
            (Self::Integer(a), Self::Float(b)) => Some((*a as f64).total_cmp(b)),
            (Self::Float(a), Self::Integer(b)) => Some(a.total_cmp(&(*b as f64))),
            (Self::Text(a), Self::Text(b)) => Some(match collation {
                TextCollation::Ordinal => a.cmp(b),
                TextCollation::CaseInsensitive => a.to_lowercase().cmp(&b.to_lowercase()),
            }),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            (Self::Uuid(a), Self::Uuid(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total order used for sorting
    ///
    /// `Null` sorts first; values of unrelated types fall back to a fixed
    /// type rank so the order stays total.
    pub fn compare(&self, other: &Self, collation: TextCollation) -> Ordering {
        self.partial_compare(other, collation)
            .unwrap_or_else(|| self.rank().cmp(&other.rank()))
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Integer(n) => write!(f, "{}", n),
            Self::Float(n) => write!(f, "{}", n),
            Self::Text(s) => write!(f, "{}", s),
            Self::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            Self::Uuid(id) => write!(f, "{}", id),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for FieldValue {
    fn from(n: i32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<u32> for FieldValue {
    fn from(n: u32) -> Self {
        Self::Integer(i64::from(n))
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        Self::Float(n)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts)
    }
}

impl From<Uuid> for FieldValue {
    fn from(id: Uuid) -> Self {
        Self::Uuid(id)
    }
}

impl<V: Into<FieldValue>> From<Option<V>> for FieldValue {
    fn from(value: Option<V>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

type Accessor<T> = Box<dyn Fn(&T) -> FieldValue + Send + Sync>;

/// A named, typed accessor for one sortable/filterable attribute
///
/// Descriptors are immutable once their schema is built. The `unique` and
/// `required` flags are store-level constraints enforced when changes are
/// flushed.
pub struct FieldDescriptor<T> {
    name: String,
    collation: TextCollation,
    unique: bool,
    required: bool,
    accessor: Accessor<T>,
}

impl<T> FieldDescriptor<T> {
    /// Create a descriptor from a name and an accessor
    pub fn new<V, F>(name: impl Into<String>, accessor: F) -> Self
    where
        V: Into<FieldValue>,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            collation: TextCollation::Ordinal,
            unique: false,
            required: false,
            accessor: Box::new(move |entity| accessor(entity).into()),
        }
    }

    /// Compare text values of this field case-insensitively
    #[must_use]
    pub fn case_insensitive(mut self) -> Self {
        self.collation = TextCollation::CaseInsensitive;
        self
    }

    /// No two stored entities may share a non-null value of this field
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Stored entities must have a non-null value for this field
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// The registered field name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Text collation used when comparing values of this field
    pub fn collation(&self) -> TextCollation {
        self.collation
    }

    /// Whether the field carries a uniqueness constraint
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Whether the field carries a not-null constraint
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Read the field from an entity
    pub fn value(&self, entity: &T) -> FieldValue {
        (self.accessor)(entity)
    }

    /// Compare two entities by this field using its natural ordering
    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        self.value(a).compare(&self.value(b), self.collation)
    }
}

impl<T> fmt::Debug for FieldDescriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("collation", &self.collation)
            .field("unique", &self.unique)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

/// The allow-list of fields and relations for one entity type
pub struct EntitySchema<T> {
    entity_name: String,
    collection: String,
    fields: Vec<FieldDescriptor<T>>,
    field_index: HashMap<String, usize>,
    relations: Vec<RelationDescriptor<T>>,
    relation_index: HashMap<String, usize>,
}

impl<T: Entity> EntitySchema<T> {
    /// Start building a schema
    ///
    /// `id` and `created_at` are registered automatically.
    pub fn builder(
        entity_name: impl Into<String>,
        collection: impl Into<String>,
    ) -> EntitySchemaBuilder<T> {
        EntitySchemaBuilder::new(entity_name.into(), collection.into())
    }

    /// Human-readable entity type name (e.g. "Area")
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    /// Collection the entity is stored in
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Resolve a field name against the allow-list
    ///
    /// Lookup is case-insensitive and ignores surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns `UnknownField` if the name was never registered.
    pub fn field(&self, name: &str) -> RepositoryResult<&FieldDescriptor<T>> {
        self.try_field(name).ok_or_else(|| {
            RepositoryError::unknown_field(RepositoryOperation::List, &self.entity_name, name)
        })
    }

    /// Resolve a field name, returning `None` if it is not registered
    pub fn try_field(&self, name: &str) -> Option<&FieldDescriptor<T>> {
        self.field_index
            .get(&normalize(name))
            .map(|&idx| &self.fields[idx])
    }

    /// All registered fields in registration order
    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor<T>> {
        self.fields.iter()
    }

    /// Fields carrying store-level constraints
    pub fn constrained_fields(&self) -> impl Iterator<Item = &FieldDescriptor<T>> {
        self.fields.iter().filter(|f| f.unique || f.required)
    }

    /// Resolve an eager-load relation name
    ///
    /// # Errors
    ///
    /// Returns `UnknownRelation` if the name was never registered.
    pub fn relation(&self, name: &str) -> RepositoryResult<&RelationDescriptor<T>> {
        self.relation_index
            .get(&normalize(name))
            .map(|&idx| &self.relations[idx])
            .ok_or_else(|| RepositoryError::unknown_relation(&self.entity_name, name))
    }

    /// All registered relations
    pub fn relations(&self) -> impl Iterator<Item = &RelationDescriptor<T>> {
        self.relations.iter()
    }
}

impl<T> fmt::Debug for EntitySchema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySchema")
            .field("entity_name", &self.entity_name)
            .field("collection", &self.collection)
            .field("fields", &self.fields)
            .field("relations", &self.relations)
            .finish()
    }
}

/// Builder for [`EntitySchema`]
pub struct EntitySchemaBuilder<T> {
    entity_name: String,
    collection: String,
    fields: Vec<FieldDescriptor<T>>,
    relations: Vec<RelationDescriptor<T>>,
}

impl<T: Entity> EntitySchemaBuilder<T> {
    fn new(entity_name: String, collection: String) -> Self {
        let builder = Self {
            entity_name,
            collection,
            fields: Vec::new(),
            relations: Vec::new(),
        };
        builder
            .with_field(FieldDescriptor::new(ID_FIELD, |e: &T| e.id().clone()))
            .with_field(FieldDescriptor::new(CREATED_AT_FIELD, |e: &T| e.created_at()))
    }

    /// Register a field with ordinal comparison and no constraints
    #[must_use]
    pub fn field<V, F>(self, name: impl Into<String>, accessor: F) -> Self
    where
        V: Into<FieldValue>,
        F: Fn(&T) -> V + Send + Sync + 'static,
    {
        self.with_field(FieldDescriptor::new(name, accessor))
    }

    /// Register a fully configured descriptor
    ///
    /// Registering a name twice replaces the earlier descriptor.
    #[must_use]
    pub fn with_field(mut self, descriptor: FieldDescriptor<T>) -> Self {
        let key = normalize(descriptor.name());
        match self.fields.iter().position(|f| normalize(f.name()) == key) {
            Some(idx) => self.fields[idx] = descriptor,
            None => self.fields.push(descriptor),
        }
        self
    }

    /// Register an eager-load relation
    #[must_use]
    pub fn relation(mut self, relation: RelationDescriptor<T>) -> Self {
        let key = normalize(relation.name());
        match self.relations.iter().position(|r| normalize(r.name()) == key) {
            Some(idx) => self.relations[idx] = relation,
            None => self.relations.push(relation),
        }
        self
    }

    /// Freeze the allow-list
    pub fn build(self) -> EntitySchema<T> {
        let field_index = self
            .fields
            .iter()
            .enumerate()
            .map(|(idx, f)| (normalize(f.name()), idx))
            .collect();
        let relation_index = self
            .relations
            .iter()
            .enumerate()
            .map(|(idx, r)| (normalize(r.name()), idx))
            .collect();

        EntitySchema {
            entity_name: self.entity_name,
            collection: self.collection,
            fields: self.fields,
            field_index,
            relations: self.relations,
            relation_index,
        }
    }
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::RepositoryErrorKind;
    use crate::test_support::{area, Area};

    #[test]
    fn test_lookup_is_case_insensitive() {
        let schema = Area::schema();
        assert_eq!(schema.field("name").unwrap().name(), "name");
        assert_eq!(schema.field("NAME").unwrap().name(), "name");
        assert_eq!(schema.field("  Name ").unwrap().name(), "name");
    }

    #[test]
    fn test_unregistered_field_is_rejected() {
        let err = Area::schema().field("internal_notes").unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::UnknownField);
        assert_eq!(err.entity_type, Some("Area".to_string()));
    }

    #[test]
    fn test_id_and_created_at_are_always_registered() {
        let schema = Area::schema();
        let a = area(3, "A3");
        assert_eq!(schema.field(ID_FIELD).unwrap().value(&a), FieldValue::Integer(3));
        assert_eq!(
            schema.field(CREATED_AT_FIELD).unwrap().value(&a),
            FieldValue::Timestamp(a.created_at)
        );
    }

    #[test]
    fn test_constrained_fields() {
        let names: Vec<&str> = Area::schema()
            .constrained_fields()
            .map(FieldDescriptor::name)
            .collect();
        assert_eq!(names, vec!["name"]);
    }

    #[test]
    fn test_text_is_ordinal_unless_configured() {
        let upper = FieldValue::from("B");
        let lower = FieldValue::from("a");
        assert_eq!(upper.compare(&lower, TextCollation::Ordinal), Ordering::Less);
        assert_eq!(
            upper.compare(&lower, TextCollation::CaseInsensitive),
            Ordering::Greater
        );
    }

    #[test]
    fn test_numeric_values_compare_across_widths() {
        assert_eq!(
            FieldValue::Integer(2).partial_compare(&FieldValue::Float(2.5), TextCollation::Ordinal),
            Some(Ordering::Less)
        );
        assert_eq!(
            FieldValue::Float(3.0).partial_compare(&FieldValue::Integer(3), TextCollation::Ordinal),
            Some(Ordering::Equal)
        );
    }

    #[test]
    fn test_null_sorts_first_and_is_not_comparable() {
        let null = FieldValue::Null;
        let text = FieldValue::from("x");
        assert_eq!(null.partial_compare(&text, TextCollation::Ordinal), None);
        assert_eq!(null.compare(&text, TextCollation::Ordinal), Ordering::Less);
        assert_eq!(FieldValue::from(None::<i64>), FieldValue::Null);
    }

    #[test]
    fn test_re_registering_a_field_replaces_it() {
        let schema: EntitySchema<Area> = EntitySchema::builder("Area", "areas")
            .field("name", |a: &Area| a.name.clone())
            .field("Name", |a: &Area| a.name.to_uppercase())
            .build();
        assert_eq!(schema.fields().count(), 3);
        assert_eq!(
            schema.field("name").unwrap().value(&area(1, "abc")),
            FieldValue::from("ABC")
        );
    }

    #[test]
    fn test_unknown_relation_is_rejected() {
        let err = Area::schema().relation("owners").unwrap_err();
        assert_eq!(err.kind, RepositoryErrorKind::UnknownRelation);
        assert!(Area::schema().relation("Applications").is_ok());
    }
}
