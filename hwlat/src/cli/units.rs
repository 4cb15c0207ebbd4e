//! Unit-suffixed values accepted on the command line.

use std::time::Duration;

const SECS_PER_DAY: u64 = 86_400;

/// Parse a test duration: `<n>` seconds, or `<n>` with one of `s m h d w`.
pub fn parse_seconds(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    let (digits, multiplier) = match input.char_indices().last() {
        Some((i, 's')) => (&input[..i], 1),
        Some((i, 'm')) => (&input[..i], 60),
        Some((i, 'h')) => (&input[..i], 3600),
        Some((i, 'd')) => (&input[..i], SECS_PER_DAY),
        Some((i, 'w')) => (&input[..i], SECS_PER_DAY * 7),
        Some((_, c)) if c.is_ascii_digit() => (input, 1),
        Some((_, c)) => return Err(format!("unknown suffix for second conversion: '{c}'")),
        None => return Err("empty duration".to_string()),
    };
    let count: u64 = digits.parse().map_err(|_| format!("invalid duration '{input}'"))?;
    count
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration '{input}' is out of range"))
}

/// Parse a latency into microseconds: `<n>`, `<n>us`, `<n>ms` or `<n>s`.
pub fn parse_micros(input: &str) -> Result<u64, String> {
    let input = input.trim();
    let (digits, multiplier) = if let Some(n) = input.strip_suffix("us") {
        (n, 1)
    } else if let Some(n) = input.strip_suffix("ms") {
        (n, 1_000)
    } else if let Some(n) = input.strip_suffix('s') {
        (n, 1_000_000)
    } else if let Some(c) = input.chars().last().filter(char::is_ascii_alphabetic) {
        return Err(format!("unknown suffix for microsecond conversion: '{c}'"));
    } else {
        (input, 1)
    };
    let count: u64 = digits.parse().map_err(|_| format!("invalid time value '{input}'"))?;
    count
        .checked_mul(multiplier)
        .ok_or_else(|| format!("time value '{input}' is out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_seconds("30").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_seconds("45s").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_seconds("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_seconds("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_seconds("1d").unwrap(), Duration::from_secs(86_400));
        assert_eq!(parse_seconds("1w").unwrap(), Duration::from_secs(604_800));
    }

    #[test]
    fn test_parse_seconds_rejects_bad_input() {
        assert!(parse_seconds("").is_err());
        assert!(parse_seconds("10x").is_err());
        assert!(parse_seconds("10ms").is_err());
        assert!(parse_seconds("m").is_err());
    }

    #[test]
    fn test_parse_micros() {
        assert_eq!(parse_micros("10").unwrap(), 10);
        assert_eq!(parse_micros("10us").unwrap(), 10);
        assert_eq!(parse_micros("500ms").unwrap(), 500_000);
        assert_eq!(parse_micros("1s").unwrap(), 1_000_000);
    }

    #[test]
    fn test_parse_micros_rejects_bad_input() {
        assert!(parse_micros("10ns").is_err());
        assert!(parse_micros("10x").is_err());
        assert!(parse_micros("ms").is_err());
    }

    #[test]
    fn test_overflow_is_rejected() {
        let err = parse_micros("18446744073709551615s").unwrap_err();
        assert!(err.contains("out of range"));
        assert!(parse_micros("18446744073709552ms").is_err());
        assert_eq!(parse_micros("18446744073709551615").unwrap(), u64::MAX);

        let err = parse_seconds("18446744073709551615w").unwrap_err();
        assert!(err.contains("out of range"));
        assert!(parse_seconds("30500568904943665d").is_err());
    }
}
