use chrono::Duration;

/// Parse a suffixed duration setting such as `"90s"`, `"15m"`, `"48h"`,
/// `"30d"` or `"4w"`.
///
/// A bare number is treated as seconds. Returns an error string suitable for
/// surfacing as a configuration failure.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".into());
    }

    let (value, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => s.split_at(idx),
        None => (s, "s"),
    };

    let value: i64 = value
        .parse()
        .map_err(|_| format!("invalid duration value in '{s}'"))?;

    match unit {
        "s" => Ok(Duration::seconds(value)),
        "m" => Ok(Duration::minutes(value)),
        "h" => Ok(Duration::hours(value)),
        "d" => Ok(Duration::days(value)),
        "w" => Ok(Duration::weeks(value)),
        other => Err(format!("unknown duration unit '{other}' in '{s}'")),
    }
}
