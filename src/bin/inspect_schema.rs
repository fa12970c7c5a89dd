//! Prints the columns of the service tables.

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::env;

const TABLES: [&str; 4] = ["users", "projects", "houses", "leads"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let database_url = env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new().connect(&database_url).await?;

    for table in TABLES {
        let columns: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT column_name, data_type, is_nullable FROM information_schema.columns \
             WHERE table_schema = 'public' AND table_name = $1 ORDER BY ordinal_position",
        )
        .bind(table)
        .fetch_all(&pool)
        .await?;

        if columns.is_empty() {
            println!("{}: missing", table);
            continue;
        }

        println!("{}:", table);
        for (col, type_, nullable) in columns {
            let null_marker = if nullable == "YES" { " (nullable)" } else { "" };
            println!("  - {}: {}{}", col, type_, null_marker);
        }
        println!();
    }

    Ok(())
}
