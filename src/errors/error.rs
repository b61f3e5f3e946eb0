use std::fmt;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Database errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Connection pool error: {0}")]
    ConnectionPool(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Conflict error: {0}")]
    Conflict(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Database error: {0}")]
    Other(String),
}

impl DbError {
    /// Map a sqlx error, turning unique-constraint violations into `Conflict`.
    pub fn from_sqlx_with_conflict(err: sqlx::Error, what: &str) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.message().contains("UNIQUE constraint failed") => {
                DbError::Conflict(format!("{} already exists", what))
            }
            _ => DbError::Sqlx(err),
        }
    }

    /// True when the store could not be reached at all, as opposed to a
    /// statement being rejected.
    pub fn is_connectivity(&self) -> bool {
        match self {
            DbError::ConnectionPool(_) => true,
            DbError::Sqlx(err) => matches!(
                err,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            _ => false,
        }
    }
}

impl Serialize for DbError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let kind = match self {
            DbError::Sqlx(_) => "Sqlx",
            DbError::ConnectionPool(_) => "ConnectionPool",
            DbError::Transaction(_) => "Transaction",
            DbError::Conflict(_) => "Conflict",
            DbError::Migration(_) => "Migration",
            DbError::Other(_) => "Other",
        };
        let mut state = serializer.serialize_struct("DbError", 2)?;
        state.serialize_field("type", kind)?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Manual Clone implementation for DbError
impl Clone for DbError {
    fn clone(&self) -> Self {
        match self {
            // sqlx::Error is not Clone; keep the connectivity classification
            DbError::Sqlx(err) if self.is_connectivity() => DbError::ConnectionPool(err.to_string()),
            DbError::Sqlx(err) => DbError::Other(format!("SQLx error: {}", err)),
            DbError::ConnectionPool(s) => DbError::ConnectionPool(s.clone()),
            DbError::Transaction(s) => DbError::Transaction(s.clone()),
            DbError::Conflict(s) => DbError::Conflict(s.clone()),
            DbError::Migration(s) => DbError::Migration(s.clone()),
            DbError::Other(s) => DbError::Other(s.clone()),
        }
    }
}

/// Domain-level errors
#[derive(Debug, Error, Clone, Serialize)]
pub enum DomainError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Entity not found: {0} with ID {1}")]
    EntityNotFound(String, Uuid),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Concurrent modification of {entity_type} {id}")]
    ConcurrentModification {
        entity_type: String,
        id: Uuid,
    },

    #[error("Invalid status transition for {entity_type} {id}: {from} -> {to}")]
    InvalidTransition {
        entity_type: String,
        id: Uuid,
        from: String,
        to: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, DomainError::Database(db) if db.is_connectivity())
    }
}

/// Why a conversation refused a read or a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    NotParticipant,
    Archived,
    Expired,
    ReadOnlyAdminOnly,
    AdoptionPending,
    AdoptionRejected,
    ApplicationNew,
    ApplicationRejected,
    BroadcastAudienceMismatch,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::NotParticipant => "not_participant",
            DenialReason::Archived => "archived",
            DenialReason::Expired => "expired",
            DenialReason::ReadOnlyAdminOnly => "read_only_admin_only",
            DenialReason::AdoptionPending => "adoption_pending",
            DenialReason::AdoptionRejected => "adoption_rejected",
            DenialReason::ApplicationNew => "application_new",
            DenialReason::ApplicationRejected => "application_rejected",
            DenialReason::BroadcastAudienceMismatch => "broadcast_audience_mismatch",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            DenialReason::NotParticipant => "you are not a participant of this conversation",
            DenialReason::Archived => "this conversation has ended and is read-only",
            DenialReason::Expired => "this conversation has expired",
            DenialReason::ReadOnlyAdminOnly => "this conversation is read-only; only administrators can post",
            DenialReason::AdoptionPending => "waiting for the student to answer the adoption request",
            DenialReason::AdoptionRejected => "the adoption request was rejected; the conversation is read-only",
            DenialReason::ApplicationNew => "wait until the application status changes from NEW",
            DenialReason::ApplicationRejected => "the application was rejected; the conversation is read-only",
            DenialReason::BroadcastAudienceMismatch => "this broadcast is not addressed to your role",
        };
        f.write_str(message)
    }
}

/// Service-level errors (application specific)
#[derive(Debug, Error, Clone, Serialize)]
pub enum ServiceError {
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Access denied: {0}")]
    AccessDenied(DenialReason),

    #[error("Broadcast target has no active recipients")]
    NoRecipients,

    #[error("Broadcast failed: {failed_batches} of {total_batches} participant batches failed")]
    BroadcastFailed {
        failed_batches: usize,
        total_batches: usize,
        details: Vec<String>,
    },

    #[error("Store unreachable: {0}")]
    Connectivity(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ServiceError {
    /// Whether the caller may retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::BroadcastFailed { .. } | ServiceError::Connectivity(_) => true,
            ServiceError::Domain(e) => e.is_connectivity(),
            _ => false,
        }
    }

    pub fn denial_reason(&self) -> Option<DenialReason> {
        match self {
            ServiceError::AccessDenied(reason) => Some(*reason),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::Domain(DomainError::EntityNotFound(_, _)))
    }

    /// Lift a domain error, promoting store outages to `Connectivity`.
    pub fn from_domain(err: DomainError) -> Self {
        if err.is_connectivity() {
            ServiceError::Connectivity(err.to_string())
        } else {
            ServiceError::Domain(err)
        }
    }
}

impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        ServiceError::from_domain(DomainError::Database(err))
    }
}

/// Validation errors
#[derive(Debug, Error, Clone, Serialize)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required {
        field: String,
    },

    #[error("Field '{field}' must be at least {min} characters")]
    MinLength {
        field: String,
        min: usize,
    },

    #[error("Field '{field}' cannot exceed {max} characters")]
    MaxLength {
        field: String,
        max: usize,
    },

    #[error("Field '{field}' contains an invalid value: {reason}")]
    InvalidValue {
        field: String,
        reason: String,
    },
}

impl ValidationError {
    pub fn required(field: &str) -> Self {
        Self::Required {
            field: field.to_string(),
        }
    }

    pub fn min_length(field: &str, min: usize) -> Self {
        Self::MinLength {
            field: field.to_string(),
            min,
        }
    }

    pub fn max_length(field: &str, max: usize) -> Self {
        Self::MaxLength {
            field: field.to_string(),
            max,
        }
    }

    pub fn invalid_value(field: &str, reason: &str) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let partial = ServiceError::BroadcastFailed {
            failed_batches: 1,
            total_batches: 3,
            details: vec!["batch 2: timed out".to_string()],
        };
        assert!(partial.is_retryable());
        assert!(ServiceError::Connectivity("pool closed".to_string()).is_retryable());
        assert!(!ServiceError::AccessDenied(DenialReason::Archived).is_retryable());
        assert!(!ServiceError::NoRecipients.is_retryable());
    }

    #[test]
    fn test_connectivity_survives_clone() {
        let err = DbError::Sqlx(sqlx::Error::PoolTimedOut);
        assert!(err.is_connectivity());
        assert!(err.clone().is_connectivity());
        assert!(!DbError::Conflict("x".to_string()).is_connectivity());
    }

    #[test]
    fn test_from_domain_promotes_connectivity() {
        let err = ServiceError::from(DbError::Sqlx(sqlx::Error::PoolClosed));
        assert!(matches!(err, ServiceError::Connectivity(_)));

        let err = ServiceError::from(DbError::Conflict("participant already exists".to_string()));
        assert!(matches!(err, ServiceError::Domain(DomainError::Database(DbError::Conflict(_)))));

        let err = ServiceError::from_domain(DomainError::EntityNotFound("Conversation".to_string(), Uuid::nil()));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_denial_reason_is_exposed() {
        let err = ServiceError::AccessDenied(DenialReason::AdoptionPending);
        assert_eq!(err.denial_reason(), Some(DenialReason::AdoptionPending));
        assert_eq!(DenialReason::AdoptionPending.as_str(), "adoption_pending");
    }

    #[test]
    fn test_denial_reason_wire_name_matches_as_str() {
        for reason in [
            DenialReason::NotParticipant,
            DenialReason::ReadOnlyAdminOnly,
            DenialReason::BroadcastAudienceMismatch,
        ] {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{}\"", reason.as_str()));
        }

        let json = serde_json::to_value(ServiceError::AccessDenied(DenialReason::Expired)).unwrap();
        assert_eq!(json, serde_json::json!({ "AccessDenied": "expired" }));
    }
}
