//! Timespans written as `<N><unit>`, such as `30d`, `8h` or `-2w`.

use regex::Regex;
use std::sync::LazyLock;

static PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^(-?[1-9][0-9]*)([smhdwy])$").ok());

fn unit_seconds(unit: char) -> Option<i64> {
    match unit.to_ascii_lowercase() {
        's' => Some(1),
        'm' => Some(60),
        'h' => Some(60 * 60),
        'd' => Some(60 * 60 * 24),
        'w' => Some(60 * 60 * 24 * 7),
        'y' => Some(60 * 60 * 24 * 365),
        _ => None,
    }
}

/// Milliseconds for a timespan string, or `None` when it does not parse.
pub fn parse_millis(subject: &str) -> Option<i64> {
    let re = PATTERN.as_ref()?;
    let captures = re.captures(subject.trim())?;
    let count: i64 = captures.get(1)?.as_str().parse().ok()?;
    let unit = captures.get(2)?.as_str().chars().next()?;
    count.checked_mul(unit_seconds(unit)?)?.checked_mul(1000)
}

/// Like [`parse_millis`], falling back to `default` for absent or invalid input.
pub fn parse_or(subject: Option<&str>, default: &str) -> i64 {
    subject
        .and_then(parse_millis)
        .or_else(|| parse_millis(default))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units() {
        assert_eq!(parse_millis("30d"), Some(30 * 86_400 * 1000));
        assert_eq!(parse_millis("45s"), Some(45_000));
        assert_eq!(parse_millis("8h"), Some(8 * 3_600_000));
        assert_eq!(parse_millis("2W"), Some(2 * 604_800_000));
        assert_eq!(parse_millis("1y"), Some(31_536_000_000));
        assert_eq!(parse_millis("10m"), Some(600_000));
        assert_eq!(parse_millis("-3d"), Some(-3 * 86_400_000));
    }

    #[test]
    fn test_invalid() {
        for bad in ["", "d", "0d", "07d", "3", "3x", "3 d", "3.5d", "d3", "--3d"] {
            assert_eq!(parse_millis(bad), None, "{} should not parse", bad);
        }
    }

    #[test]
    fn test_pattern_compiles_once_and_is_reused() {
        assert!(PATTERN.is_some());
        for _ in 0..3 {
            assert_eq!(parse_millis("30d"), Some(30 * 86_400 * 1000));
            assert_eq!(parse_millis("nope"), None);
        }
    }

    #[test]
    fn test_fallback() {
        assert_eq!(parse_or(Some("bogus"), "30d"), 30 * 86_400_000);
        assert_eq!(parse_or(None, "30d"), 30 * 86_400_000);
        assert_eq!(parse_or(Some("1h"), "30d"), 3_600_000);
        assert_eq!(parse_or(None, "none"), 0);
    }
}
