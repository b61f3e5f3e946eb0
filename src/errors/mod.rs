mod error;

pub use error::{DomainError, DbError, DenialReason, ServiceError, ValidationError};

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

/// Result type for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
