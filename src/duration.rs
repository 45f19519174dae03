//! Human-readable duration parsing for command-line options.

use std::time::Duration;

/// Parse a duration such as `5m`, `30s`, `500ms` or `2h`.
///
/// A bare number is read as seconds.
///
/// # Examples
/// ```
/// use sensorbug_listener::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
/// assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
/// assert_eq!(parse_duration("90").unwrap(), Duration::from_secs(90));
/// ```
pub fn parse_duration(src: &str) -> Result<Duration, String> {
    let src = src.trim();
    if src.is_empty() {
        return Err("empty duration string".to_string());
    }

    // "ms" must be tried before "m" and "s"
    let units: [(&str, fn(u64) -> Option<Duration>); 4] = [
        ("ms", |n| Some(Duration::from_millis(n))),
        ("h", |n| n.checked_mul(3600).map(Duration::from_secs)),
        ("m", |n| n.checked_mul(60).map(Duration::from_secs)),
        ("s", secs),
    ];

    let (num, to_duration) = units
        .iter()
        .find_map(|(suffix, to_duration)| {
            src.strip_suffix(suffix).map(|num| (num, *to_duration))
        })
        .unwrap_or((src, secs));

    let value: u64 = num
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration: {src}"))?;
    to_duration(value).ok_or_else(|| format!("duration too large: {src}"))
}

fn secs(n: u64) -> Option<Duration> {
    Some(Duration::from_secs(n))
}

/// Parse a duration that must be longer than zero.
pub fn parse_interval(src: &str) -> Result<Duration, String> {
    let interval = parse_duration(src)?;
    if interval.is_zero() {
        return Err("interval must be greater than zero".to_string());
    }
    Ok(interval)
}
