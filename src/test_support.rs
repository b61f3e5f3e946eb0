//! Fixtures shared by the in-crate tests.

use crate::domains::adoption::SqliteAdoptionRequestRepository;
use crate::domains::application::{ApplicationStatus, SqliteApplicationRepository};
use crate::domains::conversation::broadcast::BroadcastSettings;
use crate::domains::conversation::participant_repository::{
    ConversationParticipantRepository, SqliteConversationParticipantRepository,
};
use crate::domains::conversation::repository::{SqliteConversationRepository, SqliteMessageRepository};
use crate::domains::conversation::service::ConversationServiceImpl;
use crate::domains::conversation::types::ConversationParticipant;
use crate::domains::user::SqliteUserDirectory;
use crate::errors::{DbError, DomainError, DomainResult};
use crate::types::{db_timestamp, UserRole};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// In-memory database with the schema applied. A single connection keeps
/// every query on the same memory database.
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    crate::db_migration::initialize_database(&pool)
        .await
        .expect("schema");
    pool
}

pub async fn seed_user(pool: &SqlitePool, role: UserRole) -> Uuid {
    let id = Uuid::new_v4();
    let now = db_timestamp(&Utc::now());
    sqlx::query(
        "INSERT INTO users (id, email, role, active, created_at, updated_at) VALUES (?, ?, ?, 1, ?, ?)",
    )
    .bind(id.to_string())
    .bind(format!("{}@example.test", id))
    .bind(role.as_str())
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .expect("seed user");
    id
}

pub async fn deactivate_user(pool: &SqlitePool, user_id: Uuid) {
    sqlx::query("UPDATE users SET active = 0 WHERE id = ?")
        .bind(user_id.to_string())
        .execute(pool)
        .await
        .expect("deactivate user");
}

pub async fn seed_adoption_request(pool: &SqlitePool, company_id: Uuid, student_id: Uuid) -> Uuid {
    let id = Uuid::new_v4();
    let now = db_timestamp(&Utc::now());
    sqlx::query(
        "INSERT INTO adoption_requests (id, company_id, student_id, status, created_at, updated_at)
         VALUES (?, ?, ?, 'PENDING', ?, ?)",
    )
    .bind(id.to_string())
    .bind(company_id.to_string())
    .bind(student_id.to_string())
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .expect("seed adoption request");
    id
}

pub async fn seed_application(
    pool: &SqlitePool,
    student_id: Uuid,
    company_id: Uuid,
    status: ApplicationStatus,
) -> Uuid {
    let id = Uuid::new_v4();
    let now = db_timestamp(&Utc::now());
    sqlx::query(
        "INSERT INTO applications (id, offer_id, offer_title, student_id, company_id, status, created_at, updated_at)
         VALUES (?, ?, 'Backend intern', ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(Uuid::new_v4().to_string())
    .bind(student_id.to_string())
    .bind(company_id.to_string())
    .bind(status.as_str())
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await
    .expect("seed application");
    id
}

pub fn conversation_service(pool: &SqlitePool) -> ConversationServiceImpl {
    conversation_service_with(
        pool,
        Arc::new(SqliteConversationParticipantRepository::new(pool.clone())),
        BroadcastSettings::default(),
    )
}

pub fn conversation_service_with(
    pool: &SqlitePool,
    participants: Arc<dyn ConversationParticipantRepository>,
    settings: BroadcastSettings,
) -> ConversationServiceImpl {
    let adoption_requests = Arc::new(SqliteAdoptionRequestRepository::new(pool.clone()));
    ConversationServiceImpl::new(
        Arc::new(SqliteConversationRepository::new(pool.clone())),
        Arc::new(SqliteMessageRepository::new(pool.clone())),
        participants,
        Arc::new(SqliteUserDirectory::new(pool.clone())),
        adoption_requests.clone(),
        adoption_requests,
        Arc::new(SqliteApplicationRepository::new(pool.clone())),
        settings,
    )
}

/// Participant store that fails chosen `add_participants` calls (zero-based)
/// or sleeps before each one.
pub struct FailingParticipantRepository {
    inner: SqliteConversationParticipantRepository,
    failing_calls: Vec<usize>,
    disconnected: bool,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FailingParticipantRepository {
    pub fn failing_batches(pool: SqlitePool, failing_calls: &[usize]) -> Self {
        Self {
            inner: SqliteConversationParticipantRepository::new(pool),
            failing_calls: failing_calls.to_vec(),
            disconnected: false,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Like `failing_batches`, but the chosen calls report a pool timeout
    pub fn disconnected_batches(pool: SqlitePool, failing_calls: &[usize]) -> Self {
        Self {
            disconnected: true,
            ..Self::failing_batches(pool, failing_calls)
        }
    }

    pub fn delayed(pool: SqlitePool, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::failing_batches(pool, &[])
        }
    }
}

#[async_trait]
impl ConversationParticipantRepository for FailingParticipantRepository {
    async fn is_participant(&self, conversation_id: Uuid, user_id: Uuid) -> DomainResult<bool> {
        self.inner.is_participant(conversation_id, user_id).await
    }

    async fn list_participants(&self, conversation_id: Uuid) -> DomainResult<Vec<ConversationParticipant>> {
        self.inner.list_participants(conversation_id).await
    }

    async fn add_participants(&self, conversation_id: Uuid, user_ids: &[Uuid]) -> DomainResult<u64> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_calls.contains(&call) {
            let err = if self.disconnected {
                DbError::Sqlx(sqlx::Error::PoolTimedOut)
            } else {
                DbError::Other("injected failure".to_string())
            };
            return Err(DomainError::Database(err));
        }
        self.inner.add_participants(conversation_id, user_ids).await
    }

    async fn count_participants(&self, conversation_id: Uuid) -> DomainResult<i64> {
        self.inner.count_participants(conversation_id).await
    }
}
