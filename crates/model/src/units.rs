//! Quantity parsing and compact duration formatting.

use chrono::Duration;

const BINARY_SUFFIXES: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

fn numeric_prefix(s: &str) -> (&str, &str) {
    let end = s
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.' || *c == '-' || *c == '+'))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s.split_at(end)
}

/// CPU quantity in cores: `250m` -> 0.25, `10u`, `5n`, or a plain number.
pub fn cpu_units_to_number(cpu: &str) -> f64 {
    let (num, suffix) = numeric_prefix(cpu.trim());
    let value: f64 = num.parse().unwrap_or(0.0);
    match suffix {
        "m" => value / 1e3,
        "u" => value / 1e6,
        "n" => value / 1e9,
        _ => value,
    }
}

/// Memory quantity in bytes; `K`..`E` (with or without `i`) are powers of 1024.
pub fn units_to_bytes(value: &str) -> f64 {
    let (num, suffix) = numeric_prefix(value.trim());
    let n: f64 = num.parse().unwrap_or(0.0);
    match suffix.chars().next().and_then(|c| BINARY_SUFFIXES.iter().position(|s| *s == c)) {
        Some(idx) => (n * 1024f64.powi(idx as i32 + 1)).round(),
        None => n,
    }
}

/// Compact humanized duration (`45s`, `3m20s`, `5h`, `2d3h`, `1y12d`).
/// Zero components are omitted and negative durations render as `0s`.
pub fn format_duration(d: Duration) -> String {
    const MIN: i64 = 60;
    const HOUR: i64 = 60 * MIN;
    const DAY: i64 = 24 * HOUR;
    const YEAR: i64 = 365 * DAY;

    let secs = d.num_seconds().max(0);
    let pair = |major: i64, major_unit: &str, minor: i64, minor_unit: &str| {
        if minor == 0 { format!("{}{}", major, major_unit) } else { format!("{}{}{}{}", major, major_unit, minor, minor_unit) }
    };
    if secs < MIN {
        format!("{}s", secs)
    } else if secs < 10 * MIN {
        pair(secs / MIN, "m", secs % MIN, "s")
    } else if secs < HOUR {
        format!("{}m", secs / MIN)
    } else if secs < 8 * HOUR {
        pair(secs / HOUR, "h", (secs % HOUR) / MIN, "m")
    } else if secs < 48 * HOUR {
        format!("{}h", secs / HOUR)
    } else if secs < 8 * DAY {
        pair(secs / DAY, "d", (secs % DAY) / HOUR, "h")
    } else if secs < YEAR {
        format!("{}d", secs / DAY)
    } else if secs < 8 * YEAR {
        pair(secs / YEAR, "y", (secs % YEAR) / DAY, "d")
    } else {
        format!("{}y", secs / YEAR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_units() {
        assert_eq!(cpu_units_to_number("250m"), 0.25);
        assert_eq!(cpu_units_to_number("4"), 4.0);
        assert_eq!(cpu_units_to_number("1.5"), 1.5);
        assert_eq!(cpu_units_to_number("500000n"), 0.0005);
    }

    #[test]
    fn memory_units() {
        assert_eq!(units_to_bytes("1Ki"), 1024.0);
        assert_eq!(units_to_bytes("2Gi"), 2.0 * 1024.0 * 1024.0 * 1024.0);
        assert_eq!(units_to_bytes("1M"), 1024.0 * 1024.0);
        assert_eq!(units_to_bytes("512"), 512.0);
    }

    #[test]
    fn duration_buckets() {
        let s = Duration::seconds;
        assert_eq!(format_duration(s(-5)), "0s");
        assert_eq!(format_duration(s(45)), "45s");
        assert_eq!(format_duration(s(200)), "3m20s");
        assert_eq!(format_duration(s(120)), "2m");
        assert_eq!(format_duration(s(15 * 60 + 30)), "15m");
        assert_eq!(format_duration(s(2 * 3600 + 5 * 60)), "2h5m");
        assert_eq!(format_duration(s(20 * 3600)), "20h");
        assert_eq!(format_duration(s(3 * 86400 + 4 * 3600)), "3d4h");
        assert_eq!(format_duration(s(40 * 86400)), "40d");
        assert_eq!(format_duration(s(365 * 86400 + 12 * 86400)), "1y12d");
        assert_eq!(format_duration(s(9 * 365 * 86400)), "9y");
    }
}
