use crate::errors::{DbError, DomainResult};
use crate::types::UserRole;
use crate::types::parse_db_uuid;
use async_trait::async_trait;
use sqlx::{query_scalar, SqlitePool};
use uuid::Uuid;

/// Directory of platform users, used to resolve broadcast cohorts
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Ids of active users with the given role, or of every active user when `role` is `None`
    async fn list_active_ids_by_role(&self, role: Option<UserRole>) -> DomainResult<Vec<Uuid>>;
}

/// SQLite implementation of UserDirectory
#[derive(Debug, Clone)]
pub struct SqliteUserDirectory {
    pool: SqlitePool,
}

impl SqliteUserDirectory {
    /// Create a new directory instance
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for SqliteUserDirectory {
    async fn list_active_ids_by_role(&self, role: Option<UserRole>) -> DomainResult<Vec<Uuid>> {
        let ids: Vec<String> = match role {
            Some(role) => query_scalar(
                "SELECT id FROM users WHERE active = 1 AND role = ? ORDER BY created_at ASC, rowid ASC"
            )
            .bind(role.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::from)?,
            None => query_scalar("SELECT id FROM users WHERE active = 1 ORDER BY created_at ASC, rowid ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(DbError::from)?,
        };

        ids.iter().map(|id| parse_db_uuid(id, "User.id")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[tokio::test]
    async fn test_cohort_filters_role_and_inactive_users() {
        let pool = test_support::test_pool().await;
        let s1 = test_support::seed_user(&pool, UserRole::Student).await;
        let s2 = test_support::seed_user(&pool, UserRole::Student).await;
        let c1 = test_support::seed_user(&pool, UserRole::Company).await;
        let gone = test_support::seed_user(&pool, UserRole::Student).await;
        test_support::deactivate_user(&pool, gone).await;
        let directory = SqliteUserDirectory::new(pool);

        let students = directory.list_active_ids_by_role(Some(UserRole::Student)).await.unwrap();
        assert_eq!(students, vec![s1, s2]);

        let everyone = directory.list_active_ids_by_role(None).await.unwrap();
        assert_eq!(everyone.len(), 3);
        assert!(everyone.contains(&c1));
        assert!(!everyone.contains(&gone));
    }
}
