use chrono::{DateTime, SecondsFormat, Utc};

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn utc_now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn iso_from_ms(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_iso_ms(raw: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|date| date.with_timezone(&Utc).timestamp_millis())
}

/// Epoch milliseconds from a provider timestamp given in seconds or milliseconds.
pub fn ms_from_timestamp(timestamp: f64) -> Option<i64> {
    if !timestamp.is_finite() || timestamp <= 0.0 {
        return None;
    }
    let milliseconds = if timestamp > 1_000_000_000_000.0 {
        timestamp
    } else if timestamp > 1_000_000_000.0 {
        timestamp * 1000.0
    } else {
        return None;
    };
    Some(milliseconds.round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_round_trips_through_millis() {
        let ms = 1_770_854_400_123;
        assert_eq!(iso_from_ms(ms), "2026-02-12T00:00:00.123Z");
        assert_eq!(parse_iso_ms("2026-02-12T00:00:00.123Z"), Some(ms));
        assert_eq!(parse_iso_ms("yesterday"), None);
    }

    #[test]
    fn timestamps_accept_seconds_or_millis() {
        assert_eq!(ms_from_timestamp(1_770_000_000.0), Some(1_770_000_000_000));
        assert_eq!(ms_from_timestamp(1_770_000_000_000.0), Some(1_770_000_000_000));
        assert_eq!(ms_from_timestamp(42.0), None);
        assert_eq!(ms_from_timestamp(f64::NAN), None);
    }
}
