pub mod database;
pub mod registry;
pub mod user;

use sqlx::PgPool;

use crate::config;
use crate::database::DatabaseManager;

/// Pool for one-shot commands, with the schema applied when configured
pub(crate) async fn connect() -> anyhow::Result<PgPool> {
    let config = config::config();
    let pool = DatabaseManager::connect(&config.database).await?;
    if config.database.apply_schema_on_start {
        DatabaseManager::apply_schema(&pool).await?;
    }
    Ok(pool)
}
