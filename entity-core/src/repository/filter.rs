//! Filter composition
//!
//! A [`Filter`] starts out matching everything and is narrowed by ANDing in
//! sub-predicates, typically only when the input that triggers them is
//! present. Composition is side-effect free and filters are cheap to clone, so
//! one filter can back several queries.
//!
//! Predicates come from two places: typed closures written against the
//! entity, and [`FilterCondition`]s naming a field by string. The latter are
//! resolved through the entity's schema allow-list.
//!
//! # Example
//!
//! ```rust,ignore
//! use entity_core::repository::{contains_ignore_case, Filter, FilterCondition};
//!
//! let name: Option<String> = params.name;
//! let filter = Filter::<Area>::all()
//!     .and_if(name, |needle| move |a: &Area| contains_ignore_case(&a.name, &needle))
//!     .and_condition(&FilterCondition::gte("created_at", cutoff))?;
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::schema::{Entity, FieldValue, TextCollation};
use super::traits::RepositoryResult;

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// A composed boolean condition over an entity's fields
pub struct Filter<T> {
    predicates: Vec<Predicate<T>>,
}

impl<T> Clone for Filter<T> {
    fn clone(&self) -> Self {
        Self {
            predicates: self.predicates.clone(),
        }
    }
}

impl<T> Default for Filter<T> {
    fn default() -> Self {
        Self {
            predicates: Vec::new(),
        }
    }
}

impl<T> fmt::Debug for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("predicates", &self.predicates.len())
            .finish()
    }
}

impl<T> Filter<T> {
    /// A filter with no sub-conditions; matches every entity
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// AND in one more predicate
    #[must_use]
    pub fn and<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.predicates.push(Arc::new(predicate));
        self
    }

    /// AND in a predicate built from `input`, only when `input` is present
    #[must_use]
    pub fn and_if<V, B, F>(self, input: Option<V>, build: B) -> Self
    where
        B: FnOnce(V) -> F,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        match input {
            Some(value) => self.and(build(value)),
            None => self,
        }
    }

    /// AND together all sub-conditions of `self` and `other`
    #[must_use]
    pub fn merge(mut self, other: Filter<T>) -> Self {
        self.predicates.extend(other.predicates);
        self
    }

    /// Check whether an entity satisfies every sub-condition
    pub fn matches(&self, entity: &T) -> bool {
        self.predicates.iter().all(|p| p(entity))
    }

    /// Keep only the matching entities, preserving their order
    pub fn apply(&self, entities: Vec<T>) -> Vec<T> {
        entities.into_iter().filter(|e| self.matches(e)).collect()
    }

    /// Number of sub-conditions
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Whether the filter has no sub-conditions
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

impl<T: Entity> Filter<T> {
    /// AND in a field condition resolved through `T`'s schema
    ///
    /// # Errors
    ///
    /// Returns `UnknownField` if the condition names a field outside the
    /// allow-list.
    pub fn and_condition(self, condition: &FilterCondition) -> RepositoryResult<Self> {
        let field = T::schema().field(&condition.field)?;
        let operator = condition.operator;
        let value = condition.value.clone();
        let collation = field.collation();
        Ok(self.and(move |entity: &T| {
            evaluate(operator, &field.value(entity), &value, collation)
        }))
    }

    /// Build a filter from a list of field conditions
    pub fn from_conditions(conditions: &[FilterCondition]) -> RepositoryResult<Self> {
        conditions
            .iter()
            .try_fold(Self::all(), |filter, condition| filter.and_condition(condition))
    }
}

/// Case-insensitive substring test used by text filters
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn evaluate(
    operator: FilterOperator,
    actual: &FieldValue,
    value: &FilterValue,
    collation: TextCollation,
) -> bool {
    use std::cmp::Ordering;

    let compare = |expected: &FieldValue| actual.partial_compare(expected, collation);

    match (operator, value) {
        (FilterOperator::IsNull, _) => actual.is_null(),
        (FilterOperator::IsNotNull, _) => !actual.is_null(),
        (FilterOperator::Equal, FilterValue::Single(v)) => compare(v) == Some(Ordering::Equal),
        (FilterOperator::NotEqual, FilterValue::Single(v)) => {
            matches!(compare(v), Some(Ordering::Less | Ordering::Greater))
        }
        (FilterOperator::GreaterThan, FilterValue::Single(v)) => {
            compare(v) == Some(Ordering::Greater)
        }
        (FilterOperator::GreaterThanOrEqual, FilterValue::Single(v)) => {
            matches!(compare(v), Some(Ordering::Greater | Ordering::Equal))
        }
        (FilterOperator::LessThan, FilterValue::Single(v)) => compare(v) == Some(Ordering::Less),
        (FilterOperator::LessThanOrEqual, FilterValue::Single(v)) => {
            matches!(compare(v), Some(Ordering::Less | Ordering::Equal))
        }
        (FilterOperator::Contains, FilterValue::Single(FieldValue::Text(needle))) => actual
            .as_text()
            .is_some_and(|text| contains_ignore_case(text, needle)),
        (FilterOperator::In, FilterValue::List(values)) => {
            values.iter().any(|v| compare(v) == Some(Ordering::Equal))
        }
        _ => false,
    }
}

/// Comparison operators for filter conditions
///
/// # Example
///
/// ```rust
/// use entity_core::repository::FilterOperator;
///
/// assert_eq!(format!("{}", FilterOperator::Equal), "=");
/// assert_eq!(format!("{}", FilterOperator::Contains), "CONTAINS");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    /// Equal to (=)
    Equal,
    /// Not equal to (!=)
    NotEqual,
    /// Greater than (>)
    GreaterThan,
    /// Greater than or equal to (>=)
    GreaterThanOrEqual,
    /// Less than (<)
    LessThan,
    /// Less than or equal to (<=)
    LessThanOrEqual,
    /// Case-insensitive substring match on text fields
    Contains,
    /// Value is in a list (IN)
    In,
    /// Value is null (IS NULL)
    IsNull,
    /// Value is not null (IS NOT NULL)
    IsNotNull,
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "="),
            Self::NotEqual => write!(f, "!="),
            Self::GreaterThan => write!(f, ">"),
            Self::GreaterThanOrEqual => write!(f, ">="),
            Self::LessThan => write!(f, "<"),
            Self::LessThanOrEqual => write!(f, "<="),
            Self::Contains => write!(f, "CONTAINS"),
            Self::In => write!(f, "IN"),
            Self::IsNull => write!(f, "IS NULL"),
            Self::IsNotNull => write!(f, "IS NOT NULL"),
        }
    }
}

/// Right-hand side of a filter condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterValue {
    /// A single comparison value
    Single(FieldValue),
    /// A list of values (for IN)
    List(Vec<FieldValue>),
    /// No value (for IS NULL / IS NOT NULL)
    None,
}

impl From<FieldValue> for FilterValue {
    fn from(value: FieldValue) -> Self {
        Self::Single(value)
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        Self::Single(FieldValue::from(s))
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        Self::Single(FieldValue::Text(s))
    }
}

impl From<i64> for FilterValue {
    fn from(n: i64) -> Self {
        Self::Single(FieldValue::Integer(n))
    }
}

impl From<f64> for FilterValue {
    fn from(n: f64) -> Self {
        Self::Single(FieldValue::Float(n))
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        Self::Single(FieldValue::Bool(b))
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Single(FieldValue::Timestamp(ts))
    }
}

impl From<Uuid> for FilterValue {
    fn from(id: Uuid) -> Self {
        Self::Single(FieldValue::Uuid(id))
    }
}

impl From<Vec<FieldValue>> for FilterValue {
    fn from(values: Vec<FieldValue>) -> Self {
        Self::List(values)
    }
}

/// A single field condition, resolved against a schema when composed
///
/// # Example
///
/// ```rust
/// use entity_core::repository::{FilterCondition, FilterOperator};
///
/// let by_status = FilterCondition::eq("status", "active");
/// let by_name = FilterCondition::contains("name", "north");
/// assert_eq!(by_name.operator, FilterOperator::Contains);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    /// The field name to filter on
    pub field: String,
    /// The comparison operator
    pub operator: FilterOperator,
    /// The value to compare against
    pub value: FilterValue,
}

impl FilterCondition {
    /// Create a new filter condition
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: FilterValue) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Equality filter (field = value)
    pub fn eq(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FilterOperator::Equal, FilterValue::Single(value.into()))
    }

    /// Not-equal filter (field != value)
    pub fn ne(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FilterOperator::NotEqual, FilterValue::Single(value.into()))
    }

    /// Greater-than filter (field > value)
    pub fn gt(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FilterOperator::GreaterThan, FilterValue::Single(value.into()))
    }

    /// Greater-than-or-equal filter (field >= value)
    pub fn gte(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(
            field,
            FilterOperator::GreaterThanOrEqual,
            FilterValue::Single(value.into()),
        )
    }

    /// Less-than filter (field < value)
    pub fn lt(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(field, FilterOperator::LessThan, FilterValue::Single(value.into()))
    }

    /// Less-than-or-equal filter (field <= value)
    pub fn lte(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new(
            field,
            FilterOperator::LessThanOrEqual,
            FilterValue::Single(value.into()),
        )
    }

    /// Case-insensitive substring filter
    pub fn contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::new(
            field,
            FilterOperator::Contains,
            FilterValue::Single(FieldValue::Text(needle.into())),
        )
    }

    /// IN list filter
    pub fn in_list<V, I>(field: impl Into<String>, values: I) -> Self
    where
        V: Into<FieldValue>,
        I: IntoIterator<Item = V>,
    {
        Self::new(
            field,
            FilterOperator::In,
            FilterValue::List(values.into_iter().map(Into::into).collect()),
        )
    }

    /// IS NULL filter
    pub fn is_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::IsNull, FilterValue::None)
    }

    /// IS NOT NULL filter
    pub fn is_not_null(field: impl Into<String>) -> Self {
        Self::new(field, FilterOperator::IsNotNull, FilterValue::None)
    }
}
