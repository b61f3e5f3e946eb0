use crate::domains::adoption::types::{AdoptionRequest, AdoptionRequestRow, AdoptionRequestStatus};
use crate::errors::{DbError, DomainResult};
use crate::types::db_timestamp;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{query, query_as, SqlitePool};
use uuid::Uuid;

/// Read access to adoption requests
#[async_trait]
pub trait AdoptionRequestRepository: Send + Sync {
    /// Returns `None` when the request was hard-deleted
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<AdoptionRequest>>;
}

/// The narrow write capability the lifecycle coordinator holds on adoption requests
#[async_trait]
pub trait AdoptionStatusWriter: Send + Sync {
    /// Compare-and-swap on the status column. Returns false when the stored
    /// status no longer equals `expected`.
    async fn set_adoption_request_status(
        &self,
        id: Uuid,
        expected: AdoptionRequestStatus,
        status: AdoptionRequestStatus,
    ) -> DomainResult<bool>;
}

/// SQLite implementation for the adoption request store
#[derive(Debug, Clone)]
pub struct SqliteAdoptionRequestRepository {
    pool: SqlitePool,
}

impl SqliteAdoptionRequestRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AdoptionRequestRepository for SqliteAdoptionRequestRepository {
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<AdoptionRequest>> {
        let row = query_as::<_, AdoptionRequestRow>(
            "SELECT id, company_id, student_id, status, created_at, updated_at FROM adoption_requests WHERE id = ?"
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?;

        row.map(AdoptionRequestRow::into_entity).transpose()
    }
}

#[async_trait]
impl AdoptionStatusWriter for SqliteAdoptionRequestRepository {
    async fn set_adoption_request_status(
        &self,
        id: Uuid,
        expected: AdoptionRequestStatus,
        status: AdoptionRequestStatus,
    ) -> DomainResult<bool> {
        let result = query(
            "UPDATE adoption_requests SET status = ?, updated_at = ? WHERE id = ? AND status = ?"
        )
        .bind(status.as_str())
        .bind(db_timestamp(&Utc::now()))
        .bind(id.to_string())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(DbError::from)?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[tokio::test]
    async fn test_status_swap_only_from_expected() {
        let pool = test_support::test_pool().await;
        let company = test_support::seed_user(&pool, crate::types::UserRole::Company).await;
        let student = test_support::seed_user(&pool, crate::types::UserRole::Student).await;
        let request_id = test_support::seed_adoption_request(&pool, company, student).await;
        let repo = SqliteAdoptionRequestRepository::new(pool);

        let request = repo.find_by_id(request_id).await.unwrap().unwrap();
        assert_eq!(request.status, AdoptionRequestStatus::Pending);
        assert_eq!(request.company_id, company);

        assert!(repo
            .set_adoption_request_status(request_id, AdoptionRequestStatus::Pending, AdoptionRequestStatus::Accepted)
            .await
            .unwrap());
        // A second swap from PENDING loses: the row has moved on
        assert!(!repo
            .set_adoption_request_status(request_id, AdoptionRequestStatus::Pending, AdoptionRequestStatus::Rejected)
            .await
            .unwrap());

        let request = repo.find_by_id(request_id).await.unwrap().unwrap();
        assert_eq!(request.status, AdoptionRequestStatus::Accepted);
    }

    #[tokio::test]
    async fn test_missing_request_is_none() {
        let pool = test_support::test_pool().await;
        let repo = SqliteAdoptionRequestRepository::new(pool);
        assert!(repo.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }
}
