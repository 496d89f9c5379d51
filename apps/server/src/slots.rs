//! Appointment slot availability.
//!
//! The working day is a fixed grid of 30-minute positions from 09:00 to 19:00
//! (both inclusive) in the shop timezone. A slot is taken when a non-canceled
//! appointment is scheduled at exactly that "HH:MM". Appointments off the grid
//! (e.g. 09:15) block nothing, and a service's duration never blocks the
//! following slots.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use sqlx::SqlitePool;

use crate::clock::shop_tz;
use crate::error::AppError;

const OPENING_MINUTES: u32 = 9 * 60;
const CLOSING_MINUTES: u32 = 19 * 60;
const SLOT_MINUTES: u32 = 30;

/// Every bookable "HH:MM" of a day, in order: 09:00, 09:30, …, 19:00.
pub fn candidate_slots() -> Vec<String> {
    (OPENING_MINUTES..=CLOSING_MINUTES)
        .step_by(SLOT_MINUTES as usize)
        .map(|m| format!("{:02}:{:02}", m / 60, m % 60))
        .collect()
}

/// Parse a `YYYY-MM-DD` query value.
pub fn parse_date(raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::validation("Data inválida, use o formato AAAA-MM-DD"))
}

/// UTC instants bounding a civil day in the shop timezone: `[start, end)`.
pub fn day_bounds_utc(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = shop_tz()
        .from_local_datetime(&date.and_time(NaiveTime::MIN))
        .single()
        .expect("fixed offsets have no ambiguous local times")
        .with_timezone(&Utc);
    (start, start + Duration::days(1))
}

/// "HH:MM" of an instant in the shop timezone.
pub fn slot_label(at: DateTime<Utc>) -> String {
    at.with_timezone(&shop_tz()).format("%H:%M").to_string()
}

/// Identity of the slot an appointment occupies: "YYYY-MM-DD HH:MM" in shop time.
pub fn slot_key(at: DateTime<Utc>) -> String {
    at.with_timezone(&shop_tz())
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

/// Remove occupied slots and, when `date` is today, every slot at or before now.
pub fn free_slots(date: NaiveDate, occupied: &[String], now: DateTime<FixedOffset>) -> Vec<String> {
    let now_local = now.with_timezone(&shop_tz());
    let cutoff = (now_local.date_naive() == date).then(|| now_local.format("%H:%M").to_string());

    candidate_slots()
        .into_iter()
        .filter(|slot| !occupied.iter().any(|taken| taken == slot))
        .filter(|slot| cutoff.as_ref().map_or(true, |c| slot.as_str() > c.as_str()))
        .collect()
}

/// "HH:MM" of every non-canceled appointment on `date`.
pub async fn occupied_slots(db: &SqlitePool, date: NaiveDate) -> Result<Vec<String>, sqlx::Error> {
    let (start, end) = day_bounds_utc(date);

    let scheduled: Vec<DateTime<Utc>> = sqlx::query_scalar(
        "SELECT scheduled_at FROM appointments
         WHERE status <> 'CANCELED' AND scheduled_at >= ? AND scheduled_at < ?
         ORDER BY scheduled_at ASC",
    )
    .bind(start)
    .bind(end)
    .fetch_all(db)
    .await?;

    Ok(scheduled.into_iter().map(slot_label).collect())
}

pub async fn available_slots(
    db: &SqlitePool,
    date: NaiveDate,
    now: DateTime<FixedOffset>,
) -> Result<Vec<String>, AppError> {
    let occupied = occupied_slots(db, date).await?;
    Ok(free_slots(date, &occupied, now))
}

/// Whether `at` is on the grid, in the future and still free.
pub async fn is_bookable(
    db: &SqlitePool,
    at: DateTime<Utc>,
    now: DateTime<FixedOffset>,
) -> Result<bool, AppError> {
    if at <= now.with_timezone(&Utc) {
        return Ok(false);
    }
    let date = at.with_timezone(&shop_tz()).date_naive();
    let free = available_slots(db, date, now).await?;
    Ok(free.contains(&slot_label(at)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn shop_time(raw: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(raw).unwrap()
    }

    fn date(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
    }

    async fn insert_appointment(db: &SqlitePool, at: &str, status: &str) {
        let at = shop_time(at).with_timezone(&Utc);
        sqlx::query(
            "INSERT INTO appointments (items, customer_name, customer_phone, payment_method,
             scheduled_at, slot_key, status, subtotal, total, created_at)
             VALUES ('[]', 'Ana', '11988887777', 'PIX', ?, ?, ?, 0, 0, ?)",
        )
        .bind(at)
        .bind(slot_key(at))
        .bind(status)
        .bind(at)
        .execute(db)
        .await
        .unwrap();
    }

    // ── candidate_slots ──

    #[test]
    fn test_candidates_cover_working_day() {
        let slots = candidate_slots();
        assert_eq!(slots.len(), 21);
        assert_eq!(slots.first().unwrap(), "09:00");
        assert_eq!(slots[1], "09:30");
        assert_eq!(slots.last().unwrap(), "19:00");
    }

    // ── free_slots ──

    #[test]
    fn test_other_day_without_appointments_returns_all() {
        let free = free_slots(date("2024-06-10"), &[], shop_time("2024-06-09T10:00:00-03:00"));
        assert_eq!(free, candidate_slots());
    }

    #[test]
    fn test_occupied_slots_are_excluded() {
        let occupied = vec!["10:00".to_string(), "15:30".to_string()];
        let free = free_slots(date("2024-06-10"), &occupied, shop_time("2024-06-01T08:00:00-03:00"));
        assert_eq!(free.len(), 19);
        for taken in &occupied {
            assert!(!free.contains(taken));
        }
    }

    #[test]
    fn test_today_drops_past_and_current_slots() {
        let occupied = vec!["14:00".to_string()];
        let free = free_slots(date("2024-06-10"), &occupied, shop_time("2024-06-10T14:05:00-03:00"));
        assert!(!free.contains(&"14:00".to_string()));
        assert!(!free.contains(&"13:30".to_string()));
        assert_eq!(free.first().unwrap(), "14:30");
        assert_eq!(free.len(), 10);
    }

    #[test]
    fn test_today_slot_equal_to_now_is_dropped() {
        let free = free_slots(date("2024-06-10"), &[], shop_time("2024-06-10T11:30:00-03:00"));
        assert!(!free.contains(&"11:30".to_string()));
        assert_eq!(free.first().unwrap(), "12:00");
    }

    #[test]
    fn test_today_after_closing_is_empty() {
        let free = free_slots(date("2024-06-10"), &[], shop_time("2024-06-10T19:00:00-03:00"));
        assert!(free.is_empty());
    }

    #[test]
    fn test_today_is_judged_in_shop_timezone() {
        // 01:00 UTC on the 11th is still the 10th at 22:00 in the shop
        let now = DateTime::parse_from_rfc3339("2024-06-11T01:00:00+00:00").unwrap();
        assert!(free_slots(date("2024-06-10"), &[], now).is_empty());
        assert_eq!(free_slots(date("2024-06-11"), &[], now).len(), 21);
    }

    #[test]
    fn test_off_grid_appointment_blocks_nothing() {
        let occupied = vec!["09:15".to_string()];
        let free = free_slots(date("2024-06-10"), &occupied, shop_time("2024-06-01T08:00:00-03:00"));
        assert_eq!(free.len(), 21);
    }

    // ── conversions ──

    #[test]
    fn test_day_bounds_are_shop_midnights() {
        let (start, end) = day_bounds_utc(date("2024-06-10"));
        assert_eq!(start.to_rfc3339(), "2024-06-10T03:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2024-06-11T03:00:00+00:00");
    }

    #[test]
    fn test_slot_label_and_key_use_shop_time() {
        let at = shop_time("2024-06-10T14:00:00-03:00").with_timezone(&Utc);
        assert_eq!(slot_label(at), "14:00");
        assert_eq!(slot_key(at), "2024-06-10 14:00");
    }

    #[test]
    fn test_parse_date_rejects_garbage() {
        assert!(parse_date("2024-06-10").is_ok());
        assert!(parse_date("10/06/2024").is_err());
        assert!(parse_date("").is_err());
    }

    // ── persistence ──

    #[tokio::test]
    async fn test_occupied_ignores_canceled_and_other_days() {
        let db = test_pool().await;
        insert_appointment(&db, "2024-06-10T09:00:00-03:00", "PENDING").await;
        insert_appointment(&db, "2024-06-10T10:30:00-03:00", "CONFIRMED").await;
        insert_appointment(&db, "2024-06-10T11:00:00-03:00", "CANCELED").await;
        insert_appointment(&db, "2024-06-11T09:00:00-03:00", "PENDING").await;
        // 23:30 shop time on the 9th is already the 10th in UTC
        insert_appointment(&db, "2024-06-09T23:30:00-03:00", "PENDING").await;

        let occupied = occupied_slots(&db, date("2024-06-10")).await.unwrap();
        assert_eq!(occupied, vec!["09:00".to_string(), "10:30".to_string()]);
    }

    #[tokio::test]
    async fn test_available_slots_excludes_booked() {
        let db = test_pool().await;
        insert_appointment(&db, "2024-06-10T14:00:00-03:00", "CONFIRMED").await;

        let free = available_slots(&db, date("2024-06-10"), shop_time("2024-06-10T14:05:00-03:00"))
            .await
            .unwrap();
        assert!(!free.contains(&"14:00".to_string()));
        assert!(!free.contains(&"13:30".to_string()));
        assert!(free.contains(&"14:30".to_string()));
    }

    #[tokio::test]
    async fn test_is_bookable() {
        let db = test_pool().await;
        insert_appointment(&db, "2024-06-10T14:00:00-03:00", "PENDING").await;
        let now = shop_time("2024-06-09T12:00:00-03:00");
        let at = |raw: &str| shop_time(raw).with_timezone(&Utc);

        assert!(is_bookable(&db, at("2024-06-10T15:00:00-03:00"), now).await.unwrap());
        assert!(!is_bookable(&db, at("2024-06-10T14:00:00-03:00"), now).await.unwrap());
        assert!(!is_bookable(&db, at("2024-06-10T15:10:00-03:00"), now).await.unwrap());
        assert!(!is_bookable(&db, at("2024-06-10T20:00:00-03:00"), now).await.unwrap());
        assert!(!is_bookable(&db, at("2024-06-08T15:00:00-03:00"), now).await.unwrap());
    }
}
