use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{MeshflowError, Result};

pub fn parse_time_or_relative(input: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }

    if let Ok(duration) = humantime::parse_duration(input) {
        return Ok(Utc::now()
            - chrono::Duration::from_std(duration).map_err(|e| {
                MeshflowError::Parse(format!("failed to parse duration to chrono: {e}"))
            })?);
    }

    Err(MeshflowError::Parse(format!(
        "expected RFC3339 time or duration, got {input}"
    )))
}

pub fn parse_duration_str(input: &str) -> Result<Duration> {
    humantime::parse_duration(input)
        .map_err(|e| MeshflowError::Parse(format!("invalid duration {input}: {e}")))
}

pub fn nanos_to_dt(nanos: u64) -> DateTime<Utc> {
    let secs = (nanos / 1_000_000_000) as i64;
    let subnanos = (nanos % 1_000_000_000) as u32;
    Utc.timestamp_opt(secs, subnanos)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

pub fn dt_to_nanos(ts: DateTime<Utc>) -> u64 {
    ts.timestamp_nanos_opt().map(|n| n.max(0) as u64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339() {
        let ts = parse_time_or_relative("2026-01-01T00:00:00Z").unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-01-01T00:00:00+00:00");
    }

    #[test]
    fn parses_duration() {
        let now = Utc::now();
        let ts = parse_time_or_relative("5m").unwrap();
        assert!(ts < now);
    }

    #[test]
    fn rejects_invalid() {
        assert!(parse_time_or_relative("nope").is_err());
    }

    #[test]
    fn nanos_convert_both_ways() {
        let ts = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let nanos = dt_to_nanos(ts);
        assert_eq!(nanos, 1_769_904_000_000_000_000);
        assert_eq!(nanos_to_dt(nanos), ts);
    }
}
