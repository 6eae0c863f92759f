//! Repository error types
//!
//! Every failure the data-access core reports carries a [`RepositoryErrorKind`]
//! discriminant plus a human-readable message. Messages are not localized or
//! formatted for end users; translating kinds into responses is the caller's job.
//!
//! # Example
//!
//! ```rust
//! use entity_core::repository::{RepositoryError, RepositoryErrorKind};
//!
//! let error = RepositoryError::not_found("Area", "42");
//! assert!(matches!(error.kind, RepositoryErrorKind::NotFound));
//! assert!(error.entity_id.is_some());
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Operation being performed when the repository error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryOperation {
    /// Finding a single entity by ID
    GetById,
    /// Listing entities with filter, ordering and pagination
    List,
    /// Counting entities matching a filter
    Count,
    /// Checking if an entity exists
    Exists,
    /// Creating one or more entities
    Create,
    /// Replacing one or more entities
    Update,
    /// Deleting one or more entities
    Delete,
    /// Eagerly loading related entities
    LoadRelations,
    /// Opening an explicit transaction
    BeginTransaction,
    /// Flushing pending changes to the store
    SaveChanges,
    /// Committing the unit of work
    Commit,
    /// Rolling back the unit of work
    Rollback,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GetById => write!(f, "get_by_id"),
            Self::List => write!(f, "list"),
            Self::Count => write!(f, "count"),
            Self::Exists => write!(f, "exists"),
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
            Self::LoadRelations => write!(f, "load_relations"),
            Self::BeginTransaction => write!(f, "begin_transaction"),
            Self::SaveChanges => write!(f, "save_changes"),
            Self::Commit => write!(f, "commit"),
            Self::Rollback => write!(f, "rollback"),
        }
    }
}

/// Category of repository error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryErrorKind {
    /// Sort or filter referenced a field outside the entity's allow-list
    UnknownField,
    /// Sort direction was neither ascending nor descending
    InvalidDirection,
    /// Page or page size below 1 (or above the configured maximum)
    InvalidPagination,
    /// Requested page lies beyond the last page of the filtered result
    PageOutOfRange,
    /// Requested eager-load relation is not registered for the entity
    UnknownRelation,
    /// Operation target does not exist
    NotFound,
    /// Entity failed a store-level invariant (uniqueness, required field)
    Validation,
    /// Underlying store failure unrelated to business rules
    Persistence,
    /// Operation was cancelled before completion
    Cancelled,
    /// Unit of work or repository handle used after reaching a terminal state
    InvalidState,
}

impl fmt::Display for RepositoryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownField => write!(f, "unknown_field"),
            Self::InvalidDirection => write!(f, "invalid_direction"),
            Self::InvalidPagination => write!(f, "invalid_pagination"),
            Self::PageOutOfRange => write!(f, "page_out_of_range"),
            Self::UnknownRelation => write!(f, "unknown_relation"),
            Self::NotFound => write!(f, "not_found"),
            Self::Validation => write!(f, "validation"),
            Self::Persistence => write!(f, "persistence"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::InvalidState => write!(f, "invalid_state"),
        }
    }
}

/// Structured repository error with operation context
///
/// Provides detailed information about what operation failed, why it failed,
/// and which entity was involved.
///
/// # Example
///
/// ```rust
/// use entity_core::repository::{RepositoryError, RepositoryOperation};
///
/// let error = RepositoryError::unknown_field(RepositoryOperation::List, "Area", "password");
/// assert_eq!(
///     error.to_string(),
///     "Repository unknown_field error during list: Field 'password' is not registered for Area"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryError {
    /// The operation being performed when the error occurred
    pub operation: RepositoryOperation,
    /// The category of error
    pub kind: RepositoryErrorKind,
    /// Human-readable error message
    pub message: String,
    /// The type of entity involved (e.g., "Area", "Supplier")
    pub entity_type: Option<String>,
    /// The ID of the entity involved
    pub entity_id: Option<String>,
}

impl RepositoryError {
    /// Create a new repository error
    pub fn new(
        operation: RepositoryOperation,
        kind: RepositoryErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            kind,
            message: message.into(),
            entity_type: None,
            entity_id: None,
        }
    }

    /// Create an "unknown field" error for a sort or filter field name
    pub fn unknown_field(
        operation: RepositoryOperation,
        entity_type: impl Into<String>,
        field: &str,
    ) -> Self {
        let entity_type = entity_type.into();
        Self {
            operation,
            kind: RepositoryErrorKind::UnknownField,
            message: format!("Field '{}' is not registered for {}", field, entity_type),
            entity_type: Some(entity_type),
            entity_id: None,
        }
    }

    /// Create an "invalid direction" error for an unparseable sort direction
    pub fn invalid_direction(direction: &str) -> Self {
        Self::new(
            RepositoryOperation::List,
            RepositoryErrorKind::InvalidDirection,
            format!(
                "Sort direction '{}' is invalid; expected 'asc' or 'desc'",
                direction
            ),
        )
    }

    /// Create an "invalid pagination" error
    pub fn invalid_pagination(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::List,
            RepositoryErrorKind::InvalidPagination,
            message,
        )
    }

    /// Create a "page out of range" error
    ///
    /// # Example
    ///
    /// ```rust
    /// use entity_core::repository::{RepositoryError, RepositoryErrorKind};
    ///
    /// let error = RepositoryError::page_out_of_range(4, 3, 7);
    /// assert_eq!(error.kind, RepositoryErrorKind::PageOutOfRange);
    /// ```
    pub fn page_out_of_range(page: u64, page_size: u64, total: u64) -> Self {
        Self::new(
            RepositoryOperation::List,
            RepositoryErrorKind::PageOutOfRange,
            format!(
                "Page {} does not exist (page size {}, {} matching entities)",
                page, page_size, total
            ),
        )
    }

    /// Create an "unknown relation" error
    pub fn unknown_relation(entity_type: impl Into<String>, relation: &str) -> Self {
        let entity_type = entity_type.into();
        Self {
            operation: RepositoryOperation::LoadRelations,
            kind: RepositoryErrorKind::UnknownRelation,
            message: format!("Relation '{}' is not registered for {}", relation, entity_type),
            entity_type: Some(entity_type),
            entity_id: None,
        }
    }

    /// Create a "not found" error with entity context
    ///
    /// # Example
    ///
    /// ```rust
    /// use entity_core::repository::RepositoryError;
    ///
    /// let error = RepositoryError::not_found("Supplier", "sup_123");
    /// assert_eq!(error.entity_type, Some("Supplier".to_string()));
    /// ```
    pub fn not_found(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            operation: RepositoryOperation::GetById,
            kind: RepositoryErrorKind::NotFound,
            message: "Entity not found".to_string(),
            entity_type: Some(entity_type.into()),
            entity_id: Some(entity_id.into()),
        }
    }

    /// Create a validation error raised by a store-level invariant
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(
            RepositoryOperation::Create,
            RepositoryErrorKind::Validation,
            message,
        )
    }

    /// Create a persistence error for a lower-level store failure
    pub fn persistence(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::Persistence, message)
    }

    /// Create a cancellation error
    pub fn cancelled(operation: RepositoryOperation) -> Self {
        Self::new(
            operation,
            RepositoryErrorKind::Cancelled,
            "Operation was cancelled before completion",
        )
    }

    /// Create an "invalid state" error for use after a terminal transition
    pub fn invalid_state(operation: RepositoryOperation, message: impl Into<String>) -> Self {
        Self::new(operation, RepositoryErrorKind::InvalidState, message)
    }

    /// Add entity context to an existing error
    #[must_use]
    pub fn with_entity(
        mut self,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
    ) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    /// Set the operation that caused the error
    #[must_use]
    pub fn with_operation(mut self, operation: RepositoryOperation) -> Self {
        self.operation = operation;
        self
    }

    /// Check if this error is transient and may succeed if the caller retries
    ///
    /// The core never retries on its own.
    ///
    /// # Example
    ///
    /// ```rust
    /// use entity_core::repository::{RepositoryError, RepositoryOperation};
    ///
    /// assert!(RepositoryError::persistence(RepositoryOperation::Commit, "reset").is_retriable());
    /// assert!(!RepositoryError::not_found("Area", "1").is_retriable());
    /// ```
    pub fn is_retriable(&self) -> bool {
        matches!(self.kind, RepositoryErrorKind::Persistence)
    }
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {} error during {}: {}",
            self.kind, self.operation, self.message
        )?;
        if let (Some(ref entity_type), Some(ref entity_id)) = (&self.entity_type, &self.entity_id) {
            write!(f, " [{}: {}]", entity_type, entity_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for RepositoryError {}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::persistence(
            RepositoryOperation::GetById,
            format!("Stored document could not be decoded: {}", err),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_operation_display() {
        assert_eq!(format!("{}", RepositoryOperation::GetById), "get_by_id");
        assert_eq!(format!("{}", RepositoryOperation::List), "list");
        assert_eq!(
            format!("{}", RepositoryOperation::LoadRelations),
            "load_relations"
        );
        assert_eq!(
            format!("{}", RepositoryOperation::SaveChanges),
            "save_changes"
        );
        assert_eq!(format!("{}", RepositoryOperation::Commit), "commit");
    }

    #[test]
    fn test_repository_error_kind_display() {
        assert_eq!(
            format!("{}", RepositoryErrorKind::UnknownField),
            "unknown_field"
        );
        assert_eq!(
            format!("{}", RepositoryErrorKind::InvalidDirection),
            "invalid_direction"
        );
        assert_eq!(
            format!("{}", RepositoryErrorKind::InvalidPagination),
            "invalid_pagination"
        );
        assert_eq!(
            format!("{}", RepositoryErrorKind::PageOutOfRange),
            "page_out_of_range"
        );
        assert_eq!(
            format!("{}", RepositoryErrorKind::UnknownRelation),
            "unknown_relation"
        );
        assert_eq!(format!("{}", RepositoryErrorKind::NotFound), "not_found");
        assert_eq!(format!("{}", RepositoryErrorKind::Validation), "validation");
        assert_eq!(
            format!("{}", RepositoryErrorKind::Persistence),
            "persistence"
        );
        assert_eq!(format!("{}", RepositoryErrorKind::Cancelled), "cancelled");
        assert_eq!(
            format!("{}", RepositoryErrorKind::InvalidState),
            "invalid_state"
        );
    }

    #[test]
    fn test_unknown_field_carries_entity_type() {
        let error = RepositoryError::unknown_field(RepositoryOperation::List, "Area", "secret");
        assert_eq!(error.kind, RepositoryErrorKind::UnknownField);
        assert_eq!(error.entity_type, Some("Area".to_string()));
        assert!(error.message.contains("secret"));
        assert!(error.entity_id.is_none());
    }

    #[test]
    fn test_invalid_direction_message() {
        let error = RepositoryError::invalid_direction("sideways");
        assert_eq!(error.kind, RepositoryErrorKind::InvalidDirection);
        assert!(error.message.contains("sideways"));
    }

    #[test]
    fn test_not_found_convenience() {
        let error = RepositoryError::not_found("Vehicle", "veh_9");
        assert_eq!(error.operation, RepositoryOperation::GetById);
        assert_eq!(error.kind, RepositoryErrorKind::NotFound);
        assert_eq!(error.entity_id, Some("veh_9".to_string()));
    }

    #[test]
    fn test_with_entity_and_operation() {
        let error = RepositoryError::validation("Duplicate name")
            .with_entity("Supplier", "sup_1")
            .with_operation(RepositoryOperation::Commit);

        assert_eq!(error.operation, RepositoryOperation::Commit);
        assert_eq!(error.entity_type, Some("Supplier".to_string()));
        assert_eq!(error.entity_id, Some("sup_1".to_string()));
    }

    #[test]
    fn test_only_persistence_is_retriable() {
        assert!(RepositoryError::persistence(RepositoryOperation::List, "timeout").is_retriable());
        assert!(!RepositoryError::validation("dup").is_retriable());
        assert!(!RepositoryError::cancelled(RepositoryOperation::List).is_retriable());
        assert!(
            !RepositoryError::invalid_state(RepositoryOperation::Commit, "done").is_retriable()
        );
        assert!(!RepositoryError::page_out_of_range(4, 3, 7).is_retriable());
    }

    #[test]
    fn test_display_without_entity() {
        let error = RepositoryError::invalid_pagination("page must be at least 1");
        let display = format!("{}", error);
        assert!(display.contains("invalid_pagination"));
        assert!(display.contains("list"));
        assert!(!display.contains('['));
    }

    #[test]
    fn test_display_with_entity() {
        let error = RepositoryError::not_found("Incident", "inc_7");
        let display = format!("{}", error);
        assert!(display.contains("not_found"));
        assert!(display.contains("[Incident: inc_7]"));
    }

    #[test]
    fn test_serde_error_maps_to_persistence() {
        let err = serde_json::from_str::<u32>("\"nope\"").unwrap_err();
        let error: RepositoryError = err.into();
        assert_eq!(error.kind, RepositoryErrorKind::Persistence);
    }

    #[test]
    fn test_kind_and_operation_serialize_as_snake_case() {
        assert_eq!(
            serde_json::to_value(RepositoryErrorKind::PageOutOfRange).unwrap(),
            serde_json::json!("page_out_of_range")
        );
        assert_eq!(
            serde_json::from_value::<RepositoryOperation>(serde_json::json!("save_changes")).unwrap(),
            RepositoryOperation::SaveChanges
        );
    }

    #[test]
    fn test_error_is_error_trait() {
        let error: Box<dyn std::error::Error> = Box::new(RepositoryError::not_found("Area", "1"));
        assert!(error.to_string().contains("not_found"));
    }
}
