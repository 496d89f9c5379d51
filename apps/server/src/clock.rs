use chrono::{DateTime, FixedOffset, SubsecRound, Utc};

/// The shop's civil timezone (UTC-3), independent of the server locale.
const SHOP_OFFSET_SECS: i32 = 3 * 3600;

pub fn shop_tz() -> FixedOffset {
    FixedOffset::west_opt(SHOP_OFFSET_SECS).expect("UTC-3 is a valid offset")
}

pub fn shop_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&shop_tz())
}

/// Current UTC time truncated to whole seconds so stored timestamps sort as text.
pub fn utc_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_shop_tz_is_three_hours_behind_utc() {
        let utc = DateTime::parse_from_rfc3339("2024-06-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(utc.with_timezone(&shop_tz()).hour(), 9);
    }

    #[test]
    fn test_utc_now_has_no_subseconds() {
        assert_eq!(utc_now().nanosecond(), 0);
    }
}
