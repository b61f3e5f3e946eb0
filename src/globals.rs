use crate::config::MessagingConfig;
use crate::domains::adoption::SqliteAdoptionRequestRepository;
use crate::domains::application::SqliteApplicationRepository;
use crate::domains::conversation::participant_repository::SqliteConversationParticipantRepository;
use crate::domains::conversation::repository::{SqliteConversationRepository, SqliteMessageRepository};
use crate::domains::conversation::service::{ConversationService, ConversationServiceImpl};
use crate::domains::user::SqliteUserDirectory;
use crate::errors::{ServiceError, ServiceResult};
use lazy_static::lazy_static;
use sqlx::SqlitePool;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

// Global state definitions
lazy_static! {
    static ref INIT_MUTEX: tokio::sync::Mutex<()> = tokio::sync::Mutex::new(());
    static ref INITIALIZED: AtomicBool = AtomicBool::new(false);

    static ref DB_POOL: Mutex<Option<SqlitePool>> = Mutex::new(None);
    static ref CONVERSATION_SERVICE: Mutex<Option<Arc<dyn ConversationService>>> = Mutex::new(None);
}

pub fn get_db_pool() -> ServiceResult<SqlitePool> {
    DB_POOL
        .lock()
        .map_err(|_| ServiceError::Configuration("DB_POOL lock poisoned".to_string()))?
        .clone()
        .ok_or_else(|| ServiceError::Configuration("Database pool not initialized".to_string()))
}

pub fn get_conversation_service() -> ServiceResult<Arc<dyn ConversationService>> {
    CONVERSATION_SERVICE
        .lock()
        .map_err(|_| ServiceError::Configuration("CONVERSATION_SERVICE lock poisoned".to_string()))?
        .clone()
        .ok_or_else(|| ServiceError::Configuration("ConversationService not initialized".to_string()))
}

/// Wire the stores and services. Later calls are no-ops.
pub async fn initialize(config: &MessagingConfig) -> ServiceResult<()> {
    // Acquire the async mutex to ensure single initialization
    let _guard = INIT_MUTEX.lock().await;

    if INITIALIZED.load(Ordering::Acquire) {
        return Ok(());
    }

    let result = initialize_internal(config).await;

    // Mark as initialized only if successful
    if result.is_ok() {
        INITIALIZED.store(true, Ordering::Release);
    }

    result
}

async fn initialize_internal(config: &MessagingConfig) -> ServiceResult<()> {
    // Initialize logging first
    if std::env::var("RUST_LOG").is_err() {
        #[cfg(debug_assertions)]
        std::env::set_var("RUST_LOG", "debug");
        #[cfg(not(debug_assertions))]
        std::env::set_var("RUST_LOG", "info");
    }

    // Initialize env_logger if not already initialized
    let _ = env_logger::try_init();

    log::info!("Starting messaging core initialization");
    log::debug!("Database URL: {}", config.database_url);
    log::debug!(
        "Broadcast batches: {} per batch, {}ms timeout",
        config.broadcast_batch_size,
        config.broadcast_batch_timeout.as_millis()
    );

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .map_err(|e| {
            log::error!("Database connection failed: {}", e);
            ServiceError::Connectivity(format!("Database connection failed: {}", e))
        })?;

    // Run database migrations BEFORE creating services
    crate::db_migration::initialize_database(&pool).await.map_err(|e| {
        log::error!("Database initialization failed: {}", e);
        ServiceError::from(e)
    })?;

    let adoption_requests = Arc::new(SqliteAdoptionRequestRepository::new(pool.clone()));
    let service: Arc<dyn ConversationService> = Arc::new(ConversationServiceImpl::new(
        Arc::new(SqliteConversationRepository::new(pool.clone())),
        Arc::new(SqliteMessageRepository::new(pool.clone())),
        Arc::new(SqliteConversationParticipantRepository::new(pool.clone())),
        Arc::new(SqliteUserDirectory::new(pool.clone())),
        adoption_requests.clone(),
        adoption_requests,
        Arc::new(SqliteApplicationRepository::new(pool.clone())),
        config.broadcast_settings(),
    ));

    *DB_POOL
        .lock()
        .map_err(|_| ServiceError::Configuration("DB_POOL lock poisoned".to_string()))? = Some(pool);
    *CONVERSATION_SERVICE
        .lock()
        .map_err(|_| ServiceError::Configuration("CONVERSATION_SERVICE lock poisoned".to_string()))? = Some(service);

    log::info!("Messaging core initialized");
    Ok(())
}
