//! ISO-8601 durations.
//!
//! Timeout options arrive as ISO-8601 duration strings (`PT20S`, `PT1M30S`) and the
//! result record reports the measured request duration in the same notation, using
//! hours, minutes and fractional seconds the way `PT1H2M3.5S` reads.

use std::time::Duration;

use crate::config::{SECONDS_PER_DAY, SECONDS_PER_HOUR, SECONDS_PER_MINUTE};

/// Parse an ISO-8601 duration such as `PT20S`, `PT1M30S`, `PT0.25S` or `P1DT2H`.
///
/// Only days and time components are accepted (no years, months or weeks), and only
/// the seconds component may carry a fraction. Returns `None` for anything else.
pub fn parse_iso8601(value: &str) -> Option<Duration> {
    let upper = value.trim().to_ascii_uppercase();
    let rest = upper.strip_prefix('P')?;
    let (date, time) = match rest.split_once('T') {
        Some((date, time)) => (date, Some(time)),
        None => (rest, None),
    };

    if date.is_empty() && time.map_or(true, str::is_empty) {
        return None;
    }

    let mut seconds = 0f64;
    for (number, unit) in components(date)? {
        match unit {
            'D' => seconds += number.parse::<u64>().ok()? as f64 * SECONDS_PER_DAY as f64,
            _ => return None,
        }
    }

    if let Some(time) = time {
        if time.is_empty() {
            return None;
        }
        for (number, unit) in components(time)? {
            seconds += match unit {
                'H' => number.parse::<u64>().ok()? as f64 * SECONDS_PER_HOUR as f64,
                'M' => number.parse::<u64>().ok()? as f64 * SECONDS_PER_MINUTE as f64,
                'S' => number.parse::<f64>().ok()?,
                _ => return None,
            };
        }
    }

    Duration::try_from_secs_f64(seconds).ok()
}

/// Split `1H30M` into `[("1", 'H'), ("30", 'M')]`.
fn components(part: &str) -> Option<Vec<(&str, char)>> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, c) in part.char_indices() {
        if c.is_ascii_alphabetic() {
            let number = &part[start..i];
            if number.is_empty() {
                return None;
            }
            out.push((number, c));
            start = i + c.len_utf8();
        }
    }
    // Trailing digits without a unit
    if start != part.len() {
        return None;
    }
    Some(out)
}

/// Format a duration as ISO-8601, e.g. `PT0.153S`, `PT2M`, `PT1H0.5S`.
pub fn format_iso8601(duration: Duration) -> String {
    let total = duration.as_secs();
    let nanos = duration.subsec_nanos();
    if total == 0 && nanos == 0 {
        return "PT0S".to_string();
    }

    let hours = total / SECONDS_PER_HOUR;
    let minutes = (total % SECONDS_PER_HOUR) / SECONDS_PER_MINUTE;
    let seconds = total % SECONDS_PER_MINUTE;

    let mut out = String::from("PT");
    if hours > 0 {
        out.push_str(&format!("{}H", hours));
    }
    if minutes > 0 {
        out.push_str(&format!("{}M", minutes));
    }
    if seconds == 0 && nanos == 0 {
        return out;
    }
    out.push_str(&seconds.to_string());
    if nanos > 0 {
        let fraction = format!("{:09}", nanos);
        out.push('.');
        out.push_str(fraction.trim_end_matches('0'));
    }
    out.push('S');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_iso8601("PT20S"), Some(Duration::from_secs(20)));
        assert_eq!(parse_iso8601("PT120S"), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_parse_mixed_components() {
        assert_eq!(parse_iso8601("PT1M30S"), Some(Duration::from_secs(90)));
        assert_eq!(parse_iso8601("PT1H"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_iso8601("P1DT2H"), Some(Duration::from_secs(93600)));
        assert_eq!(parse_iso8601("P2D"), Some(Duration::from_secs(172800)));
    }

    #[test]
    fn test_parse_fractional_seconds() {
        assert_eq!(parse_iso8601("PT0.25S"), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(parse_iso8601("pt99s"), Some(Duration::from_secs(99)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "P", "PT", "20S", "PT20", "PTS", "PT1.5M", "P1Y", "PT-5S", "nope"] {
            assert_eq!(parse_iso8601(bad), None, "{}", bad);
        }
    }

    #[test]
    fn test_format_zero() {
        assert_eq!(format_iso8601(Duration::ZERO), "PT0S");
    }

    #[test]
    fn test_format_fraction() {
        assert_eq!(format_iso8601(Duration::from_millis(153)), "PT0.153S");
        assert_eq!(format_iso8601(Duration::from_millis(1500)), "PT1.5S");
    }

    #[test]
    fn test_format_components() {
        assert_eq!(format_iso8601(Duration::from_secs(120)), "PT2M");
        assert_eq!(format_iso8601(Duration::from_secs(3723)), "PT1H2M3S");
        assert_eq!(format_iso8601(Duration::from_millis(3_600_500)), "PT1H0.5S");
    }

    #[test]
    fn test_format_parses_back() {
        let duration = Duration::from_millis(61_250);
        assert_eq!(parse_iso8601(&format_iso8601(duration)), Some(duration));
    }
}
