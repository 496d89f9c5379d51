use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use crate::models::Settings;

/// Ordered schema migrations. Each one runs once and is recorded in `_migrations`.
const MIGRATIONS: &[(&str, &str)] = &[
    ("001_init", include_str!("../migrations/001_init.sql")),
    (
        "002_booking_guards",
        include_str!("../migrations/002_booking_guards.sql"),
    ),
];

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    // WAL for concurrent readers while a checkout transaction writes
    sqlx::query("PRAGMA journal_mode=WAL").execute(pool).await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS _migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(pool)
    .await?;

    for (name, sql) in MIGRATIONS {
        let applied: bool =
            sqlx::query_scalar("SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?")
                .bind(name)
                .fetch_one(pool)
                .await?;
        if applied {
            continue;
        }

        let mut tx = pool.begin().await?;
        for statement in sql.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed).execute(&mut *tx).await?;
            }
        }
        sqlx::query("INSERT INTO _migrations (name) VALUES (?)")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!("Applied migration: {}", name);
    }

    tracing::info!("Database migrations up to date");
    Ok(())
}

pub async fn load_settings(pool: &SqlitePool) -> Result<Settings, sqlx::Error> {
    let settings = sqlx::query_as::<_, Settings>(
        "SELECT global_discount_percent, global_discount_active, loyalty_threshold, payment_key
         FROM settings WHERE id = 1",
    )
    .fetch_optional(pool)
    .await?;

    match settings {
        Some(s) => Ok(s),
        None => {
            let defaults = Settings::default();
            save_settings(pool, &defaults).await?;
            Ok(defaults)
        }
    }
}

pub async fn save_settings(pool: &SqlitePool, settings: &Settings) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO settings (id, global_discount_percent, global_discount_active, loyalty_threshold, payment_key)
         VALUES (1, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            global_discount_percent = excluded.global_discount_percent,
            global_discount_active = excluded.global_discount_active,
            loyalty_threshold = excluded.loyalty_threshold,
            payment_key = excluded.payment_key",
    )
    .bind(settings.global_discount_percent)
    .bind(settings.global_discount_active)
    .bind(settings.loyalty_threshold)
    .bind(&settings.payment_key)
    .execute(pool)
    .await?;
    Ok(())
}

/// Single-connection in-memory database with the schema applied.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    run_migrations(&pool).await.expect("migrations");
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = test_pool().await;
        run_migrations(&pool).await.unwrap();

        let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _migrations")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(applied, MIGRATIONS.len() as i64);
    }

    #[tokio::test]
    async fn test_settings_seeded_with_defaults() {
        let pool = test_pool().await;
        let settings = load_settings(&pool).await.unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[tokio::test]
    async fn test_save_settings_round_trip() {
        let pool = test_pool().await;
        let updated = Settings {
            global_discount_percent: 7.5,
            global_discount_active: true,
            loyalty_threshold: 8,
            payment_key: "pix@sparkles.com.br".into(),
        };
        save_settings(&pool, &updated).await.unwrap();
        assert_eq!(load_settings(&pool).await.unwrap(), updated);
    }
}
