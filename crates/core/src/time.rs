use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::{BridgeError, Result};

pub fn parse_time_or_relative(input: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Ok(ts.with_timezone(&Utc));
    }

    if let Ok(duration) = humantime::parse_duration(input) {
        return Ok(Utc::now()
            - chrono::Duration::from_std(duration).map_err(|e| {
                BridgeError::Parse(format!("failed to parse duration to chrono: {e}"))
            })?);
    }

    Err(BridgeError::Parse(format!(
        "expected RFC3339 time or duration, got {input}"
    )))
}

pub fn parse_duration_str(input: &str) -> Result<Duration> {
    humantime::parse_duration(input)
        .map_err(|e| BridgeError::Parse(format!("invalid duration {input}: {e}")))
}

/// Parses a duration literal as written into span log lines: humantime
/// syntax first, then compact unit sequences with fractional values such
/// as `1.5ms` or `2h45m0.5s`. Negative literals are rejected.
pub fn parse_duration_literal(input: &str) -> Result<Duration> {
    let input = input.trim();
    if input == "0" {
        return Ok(Duration::ZERO);
    }
    if let Ok(d) = humantime::parse_duration(input) {
        return Ok(d);
    }

    let invalid = || BridgeError::Parse(format!("invalid duration literal: {input}"));
    if input.is_empty() || input.starts_with('-') {
        return Err(invalid());
    }

    let mut rest = input.strip_prefix('+').unwrap_or(input);
    let mut total_nanos = 0f64;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .ok_or_else(invalid)?;
        let (number, tail) = rest.split_at(number_len);
        let value: f64 = number.parse().map_err(|_| invalid())?;

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        let scale = match unit {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        total_nanos += value * scale;
        rest = tail;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

/// Renders a duration in the largest whole unit, e.g. `5ms` or `1500us`.
pub fn format_duration_literal(d: Duration) -> String {
    let nanos = d.as_nanos();
    if nanos == 0 {
        "0s".to_string()
    } else if nanos % 1_000_000_000 == 0 {
        format!("{}s", nanos / 1_000_000_000)
    } else if nanos % 1_000_000 == 0 {
        format!("{}ms", nanos / 1_000_000)
    } else if nanos % 1_000 == 0 {
        format!("{}us", nanos / 1_000)
    } else {
        format!("{nanos}ns")
    }
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
    fn parses_duration_literals() {
        assert_eq!(
            parse_duration_literal("5ms").unwrap(),
            Duration::from_millis(5)
        );
        assert_eq!(
            parse_duration_literal("1.5ms").unwrap(),
            Duration::from_micros(1500)
        );
        assert_eq!(
            parse_duration_literal("2h45m0.5s").unwrap(),
            Duration::from_millis((2 * 3600 + 45 * 60) * 1000 + 500)
        );
        assert_eq!(
            parse_duration_literal("250µs").unwrap(),
            Duration::from_micros(250)
        );
        assert_eq!(parse_duration_literal("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn rejects_bad_duration_literals() {
        assert!(parse_duration_literal("").is_err());
        assert!(parse_duration_literal("-5ms").is_err());
        assert!(parse_duration_literal("5").is_err());
        assert!(parse_duration_literal("5parsecs").is_err());
        assert!(parse_duration_literal("ms").is_err());
    }

    #[test]
    fn formats_duration_literals() {
        assert_eq!(format_duration_literal(Duration::from_millis(5)), "5ms");
        assert_eq!(format_duration_literal(Duration::from_secs(2)), "2s");
        assert_eq!(format_duration_literal(Duration::from_micros(1500)), "1500us");
        assert_eq!(format_duration_literal(Duration::from_nanos(7)), "7ns");
        assert_eq!(format_duration_literal(Duration::ZERO), "0s");
    }
}
