use crate::errors::DomainResult;
use async_trait::async_trait;
use uuid::Uuid;

/// Trait for finding entities by ID
#[async_trait]
pub trait FindById<T> {
    /// Find an entity by ID, failing with `EntityNotFound` when absent
    async fn find_by_id(&self, id: Uuid) -> DomainResult<T>;
}
