// Public modules
pub mod auth;
pub mod config;
pub mod domains;
pub mod errors;
pub mod globals;
pub mod types;
pub mod validation;

// Private modules
mod db_migration;

#[cfg(test)]
mod test_support;

pub use config::MessagingConfig;

/// Initialize the messaging core: logging, database pool, migrations and
/// services. Must be called before `globals::get_conversation_service`.
pub async fn initialize(config: &MessagingConfig) -> errors::ServiceResult<()> {
    globals::initialize(config).await
}

/// Get a reference to the SQLite connection pool
pub fn get_db_pool() -> errors::ServiceResult<sqlx::SqlitePool> {
    globals::get_db_pool()
}
