//! Ordering of query results
//!
//! A caller-supplied `(field, direction)` pair is resolved into a [`SortSpec`]
//! that compares entities through an allow-listed [`FieldDescriptor`]. The
//! entity identifier (ascending) always breaks ties, so the same input sorts
//! identically on every call and pagination stays deterministic.
//!
//! # Example
//!
//! ```rust
//! use entity_core::repository::SortDirection;
//!
//! assert_eq!("DESC".parse::<SortDirection>().unwrap(), SortDirection::Descending);
//! assert!("sideways".parse::<SortDirection>().is_err());
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::RepositoryError;
use super::schema::{Entity, FieldDescriptor, FieldValue, ID_FIELD};
use super::traits::RepositoryResult;

/// Direction for ordering results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Sort in ascending order (A-Z, 0-9, oldest first)
    #[default]
    Ascending,
    /// Sort in descending order (Z-A, 9-0, newest first)
    Descending,
}

impl SortDirection {
    /// Orient a natural-order comparison
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Ascending => ordering,
            Self::Descending => ordering.reverse(),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ascending => write!(f, "asc"),
            Self::Descending => write!(f, "desc"),
        }
    }
}

impl FromStr for SortDirection {
    type Err = RepositoryError;

    /// Accepts `asc`, `ascending`, `desc` and `descending` in any case
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Ascending),
            "desc" | "descending" => Ok(Self::Descending),
            _ => Err(RepositoryError::invalid_direction(s)),
        }
    }
}

/// A resolved ordering for entity type `T`
pub struct SortSpec<T: 'static> {
    field: &'static FieldDescriptor<T>,
    direction: SortDirection,
}

impl<T: 'static> Clone for SortSpec<T> {
    fn clone(&self) -> Self {
        Self {
            field: self.field,
            direction: self.direction,
        }
    }
}

impl<T: 'static> fmt::Debug for SortSpec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortSpec")
            .field("field", &self.field.name())
            .field("direction", &self.direction)
            .finish()
    }
}

impl<T: Entity> SortSpec<T> {
    /// Resolve raw sort input
    ///
    /// A missing or blank field name sorts by identifier, ascending unless a
    /// direction is given. A supplied direction is validated either way.
    ///
    /// # Errors
    ///
    /// - `InvalidDirection` if `direction` is not asc/desc
    /// - `UnknownField` if `field` is not in the allow-list
    pub fn resolve(field: Option<&str>, direction: Option<&str>) -> RepositoryResult<Self> {
        let direction = direction
            .map(str::parse::<SortDirection>)
            .transpose()?
            .unwrap_or_default();

        let name = field.map(str::trim).filter(|f| !f.is_empty()).unwrap_or(ID_FIELD);
        Self::new(name, direction)
    }

    /// Resolve a typed ordering
    pub fn new(field: &str, direction: SortDirection) -> RepositoryResult<Self> {
        Ok(Self {
            field: T::schema().field(field)?,
            direction,
        })
    }

    /// Name of the field being sorted on
    pub fn field_name(&self) -> &str {
        self.field.name()
    }

    /// Sort direction
    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    /// Compare two entities: requested field first, then identifier ascending
    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        self.direction
            .apply(self.field.compare(a, b))
            .then_with(|| a.id().cmp(b.id()))
    }

    /// Sort entities, reading each sort key once
    pub fn sort(&self, entities: Vec<T>) -> Vec<T> {
        let collation = self.field.collation();
        let mut keyed: Vec<(FieldValue, T)> = entities
            .into_iter()
            .map(|e| (self.field.value(&e), e))
            .collect();

        keyed.sort_by(|(ka, a), (kb, b)| {
            self.direction
                .apply(ka.compare(kb, collation))
                .then_with(|| a.id().cmp(b.id()))
        });

        keyed.into_iter().map(|(_, e)| e).collect()
    }
}
