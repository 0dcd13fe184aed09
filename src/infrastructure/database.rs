use crate::config::UploadConfig;
use crate::entities::upload_sessions;
use crate::services::session_store::{DatabaseSessionStore, MemorySessionStore, SessionStore};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub async fn setup_session_store(config: &UploadConfig) -> anyhow::Result<Arc<dyn SessionStore>> {
    match &config.database_url {
        Some(url) => {
            let db = setup_database(url).await?;
            Ok(Arc::new(DatabaseSessionStore::new(db)))
        }
        None => {
            warn!("⚠️  DATABASE_URL not set, upload sessions are kept in memory only");
            Ok(Arc::new(MemorySessionStore::new()))
        }
    }
}

pub async fn setup_database(db_url: &str) -> anyhow::Result<DatabaseConnection> {
    info!("📂 Session database: {}", db_url);

    let mut opt = ConnectOptions::new(db_url);
    opt.max_connections(20)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;

    info!("✅ Database connected successfully");

    run_migrations(&db).await?;

    Ok(db)
}

/// Creates the `upload_sessions` table and its sweep index when missing.
pub async fn run_migrations(db: &DatabaseConnection) -> anyhow::Result<()> {
    info!("🔄 Ensuring upload_sessions schema...");
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let table = schema
        .create_table_from_entity(upload_sessions::Entity)
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&table)).await?;

    db.execute(sea_orm::Statement::from_string(
        builder,
        "CREATE INDEX IF NOT EXISTS idx_upload_sessions_last_activity ON upload_sessions(last_activity_at);"
            .to_string(),
    ))
    .await?;

    Ok(())
}
