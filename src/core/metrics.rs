//! Guarded arithmetic shared by every report.
//!
//! None of these functions can produce NaN, infinity or a panic: every ratio has an
//! explicit zero fallback for an empty or malformed denominator.

#![allow(clippy::cast_precision_loss)]

use serde::Serialize;

/// `numerator / denominator`, or 0 when the denominator is not positive.
#[must_use]
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Share of `part` in `whole`, as a percentage.
#[must_use]
pub fn share_pct(part: u64, whole: u64) -> f64 {
    ratio(part as f64, whole as f64) * 100.0
}

/// Revenue per ticket; exactly 0 when there are no tickets.
#[must_use]
pub fn average_basket(revenue: f64, tickets: u64) -> f64 {
    if tickets == 0 {
        0.0
    } else {
        revenue / tickets as f64
    }
}

/// Items per ticket; exactly 0 when there are no tickets.
#[must_use]
pub fn items_per_ticket(items: u64, tickets: u64) -> f64 {
    share_pct(items, tickets) / 100.0
}

/// `(1 - discount_total / std_price_total) * 100`.
///
/// Defined as 0 when either total is absent or the standard-price total is zero.
#[must_use]
pub fn discount_share(discount_total: Option<f64>, std_price_total: Option<f64>) -> f64 {
    match (discount_total, std_price_total) {
        (Some(discount), Some(std_price)) if std_price != 0.0 => {
            (1.0 - discount / std_price) * 100.0
        }
        _ => 0.0,
    }
}

/// Period-over-period change in percent.
///
/// Returns exactly 0 when `previous` is zero or negative, whatever `current` is.
#[must_use]
pub fn percent_change(current: f64, previous: f64) -> f64 {
    if previous > 0.0 {
        (current - previous) / previous * 100.0
    } else {
        0.0
    }
}

/// Compound growth per period over `periods` steps, as a percentage.
///
/// `None` when the base is not positive or there are no periods to spread over.
#[must_use]
pub fn compound_growth(current: f64, base: f64, periods: u32) -> Option<f64> {
    if base <= 0.0 || periods == 0 || current < 0.0 {
        return None;
    }
    Some(((current / base).powf(1.0 / f64::from(periods)) - 1.0) * 100.0)
}

/// Direction of a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    /// Change above zero
    Positive,
    /// Change below zero
    Negative,
    /// No change
    Neutral,
}

impl Trend {
    /// Classifies a change by its sign.
    #[must_use]
    pub fn of(change: f64) -> Self {
        if change > 0.0 {
            Self::Positive
        } else if change < 0.0 {
            Self::Negative
        } else {
            Self::Neutral
        }
    }

    /// Arrow icon name used by the dashboard.
    #[must_use]
    pub const fn icon(self) -> &'static str {
        match self {
            Self::Positive => "up",
            Self::Negative => "down",
            Self::Neutral => "right",
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp, clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_average_basket_zero_tickets() {
        assert_eq!(average_basket(0.0, 0), 0.0);
        assert_eq!(average_basket(125.5, 0), 0.0);
        assert_eq!(average_basket(0.0, 4), 0.0);
    }

    #[test]
    fn test_average_basket_matches_division() {
        let pairs = [(320.0, 3_u64), (10.0, 1), (99.99, 7), (1_000_000.0, 12_345)];
        for (revenue, tickets) in pairs {
            let basket = average_basket(revenue, tickets);
            assert_eq!(basket, revenue / tickets as f64);
            assert!(basket.is_finite());
        }
    }

    #[test]
    fn test_discount_share_guards() {
        assert_eq!(discount_share(Some(80.0), Some(100.0)), 20.0);
        assert_eq!(discount_share(Some(80.0), Some(0.0)), 0.0);
        assert_eq!(discount_share(None, Some(100.0)), 0.0);
        assert_eq!(discount_share(Some(80.0), None), 0.0);
    }

    #[test]
    fn test_percent_change() {
        assert_eq!(percent_change(150.0, 100.0), 50.0);
        assert_eq!(percent_change(50.0, 100.0), -50.0);
    }

    #[test]
    fn test_percent_change_non_positive_previous() {
        for current in [-10.0, 0.0, 5.0, 1e12] {
            assert_eq!(percent_change(current, 0.0), 0.0);
            assert_eq!(percent_change(current, -3.0), 0.0);
        }
    }

    #[test]
    fn test_compound_growth() {
        let cagr = compound_growth(121.0, 100.0, 2).unwrap();
        assert!((cagr - 10.0).abs() < 1e-9);
        assert!(compound_growth(121.0, 0.0, 2).is_none());
        assert!(compound_growth(121.0, -5.0, 2).is_none());
    }

    #[test]
    fn test_trend() {
        assert_eq!(Trend::of(0.1), Trend::Positive);
        assert_eq!(Trend::of(-0.1), Trend::Negative);
        assert_eq!(Trend::of(0.0), Trend::Neutral);
        assert_eq!(Trend::Negative.icon(), "down");
    }

    #[test]
    fn test_share_pct() {
        assert_eq!(share_pct(1, 4), 25.0);
        assert_eq!(share_pct(3, 0), 0.0);
        assert_eq!(items_per_ticket(6, 3), 2.0);
    }
}
