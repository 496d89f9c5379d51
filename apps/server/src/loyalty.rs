//! Loyalty counter: one purchase per confirmed appointment, keyed by phone.

use sqlx::{SqliteConnection, SqlitePool};

use crate::clock::utc_now;
use crate::models::{Customer, Loyalty, LoyaltyStatus};

const LOYALTY_COLUMNS: &str = "phone, purchases, earned_free, updated_at";

/// Keep digits only, so "(11) 98888-7777" and "11988887777" are one customer.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

pub fn status(record: Option<&Loyalty>, threshold: i64) -> LoyaltyStatus {
    let current = record.map_or(0, |r| r.purchases);
    let earned = record.is_some_and(|r| r.earned_free);
    LoyaltyStatus {
        current_purchases: current,
        purchases_needed: threshold,
        remaining: (threshold - current).max(0),
        earned_free_sparkles: earned,
    }
}

pub async fn find(db: &SqlitePool, phone: &str) -> Result<Option<Loyalty>, sqlx::Error> {
    sqlx::query_as::<_, Loyalty>(&format!(
        "SELECT {LOYALTY_COLUMNS} FROM loyalty WHERE phone = ?"
    ))
    .bind(phone)
    .fetch_optional(db)
    .await
}

pub async fn list(db: &SqlitePool) -> Result<Vec<Loyalty>, sqlx::Error> {
    sqlx::query_as::<_, Loyalty>(&format!(
        "SELECT {LOYALTY_COLUMNS} FROM loyalty ORDER BY purchases DESC, phone ASC"
    ))
    .fetch_all(db)
    .await
}

/// Credit one purchase to `phone` and refresh the customer's auto-fill profile.
///
/// The reward flag turns on once the counter reaches `threshold` and stays on
/// until [`redeem`]. Runs on the caller's connection so it commits or rolls
/// back together with the status change that triggered it.
pub async fn record_confirmation(
    conn: &mut SqliteConnection,
    phone: &str,
    name: &str,
    threshold: i64,
) -> Result<Loyalty, sqlx::Error> {
    let now = utc_now();

    let record = sqlx::query_as::<_, Loyalty>(&format!(
        "INSERT INTO loyalty (phone, purchases, earned_free, updated_at)
         VALUES (?1, 1, 1 >= ?2, ?3)
         ON CONFLICT(phone) DO UPDATE SET
            purchases = purchases + 1,
            earned_free = (earned_free OR purchases + 1 >= ?2),
            updated_at = excluded.updated_at
         RETURNING {LOYALTY_COLUMNS}"
    ))
    .bind(phone)
    .bind(threshold)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    upsert_customer(conn, phone, name).await?;

    tracing::info!(
        phone,
        purchases = record.purchases,
        earned_free = record.earned_free,
        "Loyalty purchase recorded"
    );
    Ok(record)
}

/// Reset the counter after the free service was handed out.
pub async fn redeem(db: &SqlitePool, phone: &str) -> Result<Option<Loyalty>, sqlx::Error> {
    let record = sqlx::query_as::<_, Loyalty>(&format!(
        "UPDATE loyalty SET purchases = 0, earned_free = 0, updated_at = ?
         WHERE phone = ?
         RETURNING {LOYALTY_COLUMNS}"
    ))
    .bind(utc_now())
    .bind(phone)
    .fetch_optional(db)
    .await?;

    if record.is_some() {
        tracing::info!(phone, "Loyalty reward redeemed");
    }
    Ok(record)
}

pub async fn upsert_customer(
    conn: &mut SqliteConnection,
    phone: &str,
    name: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO customers (phone, name, updated_at) VALUES (?, ?, ?)
         ON CONFLICT(phone) DO UPDATE SET name = excluded.name, updated_at = excluded.updated_at",
    )
    .bind(phone)
    .bind(name)
    .bind(utc_now())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn find_customer(db: &SqlitePool, phone: &str) -> Result<Option<Customer>, sqlx::Error> {
    sqlx::query_as::<_, Customer>("SELECT phone, name, updated_at FROM customers WHERE phone = ?")
        .bind(phone)
        .fetch_optional(db)
        .await
}

pub async fn list_customers(db: &SqlitePool) -> Result<Vec<Customer>, sqlx::Error> {
    sqlx::query_as::<_, Customer>("SELECT phone, name, updated_at FROM customers ORDER BY name ASC")
        .fetch_all(db)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    async fn confirm(db: &SqlitePool, phone: &str, threshold: i64) -> Loyalty {
        let mut conn = db.acquire().await.unwrap();
        record_confirmation(&mut *conn, phone, "Ana", threshold)
            .await
            .unwrap()
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("(11) 98888-7777"), "11988887777");
        assert_eq!(normalize_phone("+55 11 98888 7777"), "5511988887777");
    }

    #[test]
    fn test_status_without_record() {
        let s = status(None, 10);
        assert_eq!(s.current_purchases, 0);
        assert_eq!(s.remaining, 10);
        assert!(!s.earned_free_sparkles);
    }

    #[test]
    fn test_status_remaining_never_negative() {
        let record = Loyalty {
            phone: "11988887777".into(),
            purchases: 12,
            earned_free: true,
            updated_at: utc_now(),
        };
        let s = status(Some(&record), 10);
        assert_eq!(s.remaining, 0);
        assert!(s.earned_free_sparkles);
    }

    #[tokio::test]
    async fn test_first_confirmation_creates_record() {
        let db = test_pool().await;
        let record = confirm(&db, "11988887777", 10).await;
        assert_eq!(record.purchases, 1);
        assert!(!record.earned_free);

        let customer = find_customer(&db, "11988887777").await.unwrap().unwrap();
        assert_eq!(customer.name, "Ana");
    }

    #[tokio::test]
    async fn test_threshold_reached_sets_flag() {
        let db = test_pool().await;
        for _ in 0..9 {
            confirm(&db, "11988887777", 10).await;
        }
        let before = find(&db, "11988887777").await.unwrap().unwrap();
        assert_eq!(before.purchases, 9);
        assert!(!before.earned_free);

        let after = confirm(&db, "11988887777", 10).await;
        assert_eq!(after.purchases, 10);
        assert!(after.earned_free);
    }

    #[tokio::test]
    async fn test_flag_sticks_until_redeemed() {
        let db = test_pool().await;
        confirm(&db, "11988887777", 2).await;
        confirm(&db, "11988887777", 2).await;
        // threshold raised afterwards: the earned reward is kept
        let record = confirm(&db, "11988887777", 10).await;
        assert_eq!(record.purchases, 3);
        assert!(record.earned_free);

        let redeemed = redeem(&db, "11988887777").await.unwrap().unwrap();
        assert_eq!(redeemed.purchases, 0);
        assert!(!redeemed.earned_free);

        let next = confirm(&db, "11988887777", 10).await;
        assert_eq!(next.purchases, 1);
        assert!(!next.earned_free);
    }

    #[tokio::test]
    async fn test_threshold_of_one_flags_first_purchase() {
        let db = test_pool().await;
        assert!(confirm(&db, "11988887777", 1).await.earned_free);
    }

    #[tokio::test]
    async fn test_redeem_unknown_phone() {
        let db = test_pool().await;
        assert!(redeem(&db, "000").await.unwrap().is_none());
    }
}
