use crate::domains::application::types::{Application, ApplicationRow, ApplicationStatus};
use crate::errors::{DbError, DomainError, DomainResult};
use crate::types::db_timestamp;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{query, query_as, SqlitePool};
use uuid::Uuid;

/// Store of applications, read by the context resolver and the lifecycle coordinator
#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    /// Returns `None` when the application was hard-deleted
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Application>>;

    async fn update_status(&self, id: Uuid, status: ApplicationStatus) -> DomainResult<Application>;
}

/// SQLite implementation for ApplicationRepository
#[derive(Debug, Clone)]
pub struct SqliteApplicationRepository {
    pool: SqlitePool,
}

impl SqliteApplicationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApplicationRepository for SqliteApplicationRepository {
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Application>> {
        let row = query_as::<_, ApplicationRow>(
            r#"
            SELECT id, offer_id, offer_title, student_id, company_id, status, created_at, updated_at
            FROM applications WHERE id = ?
            "#
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::from)?;

        row.map(ApplicationRow::into_entity).transpose()
    }

    async fn update_status(&self, id: Uuid, status: ApplicationStatus) -> DomainResult<Application> {
        let result = query("UPDATE applications SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(db_timestamp(&Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;

        if result.rows_affected() == 0 {
            return Err(DomainError::EntityNotFound("Application".to_string(), id));
        }

        self.find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::EntityNotFound("Application".to_string(), id))
    }
}
