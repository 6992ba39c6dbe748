//! Display strings for KPI cards and export cells.

/// `$1.2M`, `$12.3K` or `$12.34`.
#[must_use]
pub fn format_currency(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude >= 1_000_000.0 {
        format!("${:.1}M", value / 1_000_000.0)
    } else if magnitude >= 1_000.0 {
        format!("${:.1}K", value / 1_000.0)
    } else {
        format!("${value:.2}")
    }
}

/// `1.2M`, `12.3K` or a plain integer.
#[must_use]
pub fn format_number(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude >= 1_000_000.0 {
        format!("{:.1}M", value / 1_000_000.0)
    } else if magnitude >= 1_000.0 {
        format!("{:.1}K", value / 1_000.0)
    } else {
        format!("{value:.0}")
    }
}

/// Signed percentage with one decimal, e.g. `+4.2%`.
#[must_use]
pub fn format_change(change: f64) -> String {
    format!("{change:+.1}%")
}

/// Plain percentage with one decimal, e.g. `33.3%`.
#[must_use]
pub fn format_percent(value: f64) -> String {
    format!("{value:.1}%")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(1_234_567.0), "$1.2M");
        assert_eq!(format_currency(12_345.0), "$12.3K");
        assert_eq!(format_currency(12.5), "$12.50");
        assert_eq!(format_currency(0.0), "$0.00");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(2_500_000.0), "2.5M");
        assert_eq!(format_number(1_500.0), "1.5K");
        assert_eq!(format_number(999.0), "999");
    }

    #[test]
    fn test_format_change() {
        assert_eq!(format_change(4.23), "+4.2%");
        assert_eq!(format_change(-10.0), "-10.0%");
        assert_eq!(format_percent(33.333), "33.3%");
    }
}
