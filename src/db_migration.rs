use crate::errors::{DbError, DbResult};
use log::{debug, error, info};
use sqlx::SqlitePool;

// Embed all migration SQL files at compile time
const MIGRATION_MESSAGING: &str = include_str!("../migrations/20261016000000_messaging.sql");

// List of migrations with their names and SQL content
const MIGRATIONS: &[(&str, &str)] = &[
    ("20261016000000_messaging.sql", MIGRATION_MESSAGING),
];

/// Bring the schema up to date. Safe to call on every start.
pub async fn initialize_database(pool: &SqlitePool) -> DbResult<()> {
    info!("Starting database migration process");

    create_migrations_table(pool).await?;

    let last_migration = get_last_migration(pool).await?;
    match &last_migration {
        Some(name) => debug!("Last applied migration: {}", name),
        None => debug!("No migrations applied yet"),
    }

    apply_pending_migrations(pool, last_migration).await?;
    info!("Database migration process completed");
    Ok(())
}

/// Create migrations table if it doesn't exist
async fn create_migrations_table(pool: &SqlitePool) -> DbResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )"
    )
    .execute(pool)
    .await
    .map_err(|e| DbError::Migration(format!("Failed to create migrations table: {}", e)))?;

    Ok(())
}

/// Get the last applied migration
async fn get_last_migration(pool: &SqlitePool) -> DbResult<Option<String>> {
    sqlx::query_scalar::<_, String>("SELECT name FROM migrations ORDER BY id DESC LIMIT 1")
        .fetch_optional(pool)
        .await
        .map_err(|e| DbError::Migration(format!("Failed to get last migration: {}", e)))
}

/// Apply pending migrations in one transaction
async fn apply_pending_migrations(pool: &SqlitePool, last_migration: Option<String>) -> DbResult<()> {
    let pending_migrations = get_pending_migrations(last_migration.as_deref());
    if pending_migrations.is_empty() {
        debug!("No pending migrations to apply");
        return Ok(());
    }

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| DbError::Transaction(format!("Failed to begin migration transaction: {}", e)))?;

    for (migration_name, migration_sql) in pending_migrations {
        info!("Applying migration {}", migration_name);

        sqlx::query(migration_sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!("Failed to apply migration {}: {}", migration_name, e);
                DbError::Migration(format!("Failed to apply migration {}: {}", migration_name, e))
            })?;

        sqlx::query("INSERT INTO migrations (name, applied_at) VALUES (?, ?)")
            .bind(migration_name)
            .bind(chrono::Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::Migration(format!("Failed to record migration {}: {}", migration_name, e)))?;
    }

    tx.commit()
        .await
        .map_err(|e| DbError::Transaction(format!("Failed to commit migrations: {}", e)))?;
    Ok(())
}

/// Migrations after the last applied one, in declaration order
fn get_pending_migrations(last_migration: Option<&str>) -> Vec<(&'static str, &'static str)> {
    let mut pending = Vec::new();
    let mut should_include = last_migration.is_none();

    for &(migration_name, migration_sql) in MIGRATIONS {
        if should_include {
            pending.push((migration_name, migration_sql));
        } else if Some(migration_name) == last_migration {
            // Found the last applied migration, include all subsequent ones
            should_include = true;
        }
    }

    pending
}
