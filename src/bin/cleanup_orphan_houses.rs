//! Deletes houses that no lead references.
//!
//! These are left behind when a lead write fails and the compensating house
//! delete fails too. Houses younger than one hour are kept so that in-flight
//! lead creations are not disturbed.

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::env;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    sunready_api::obs::init_tracing();

    let database_url = env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    tracing::info!("Connected to database. Starting cleanup of orphan houses...");

    let query = r#"
        DELETE FROM houses h
        WHERE NOT EXISTS (
            SELECT 1 FROM leads l WHERE l.house_id = h.id
        )
        AND h.created_at < NOW() - INTERVAL '1 hour'
    "#;

    let result = sqlx::query(query).execute(&pool).await?;

    tracing::info!(
        "Cleanup complete. Deleted {} orphan houses.",
        result.rows_affected()
    );

    Ok(())
}
