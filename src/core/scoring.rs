//! Product performance scoring and tiering.
//!
//! Each product gets four 0-100 sub-scores (revenue, frequency, recency and
//! monetary), a weighted composite and a letter tier.

#![allow(clippy::cast_precision_loss)]

use crate::core::aggregate::ProductStats;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Recency assigned to a product with no purchase in the window.
pub const NEVER_PURCHASED_DAYS: i64 = 999;

/// Composite weight of the revenue sub-score.
pub const REVENUE_WEIGHT: f64 = 0.4;
/// Composite weight of the frequency sub-score.
pub const FREQUENCY_WEIGHT: f64 = 0.3;
/// Composite weight of the recency sub-score.
pub const RECENCY_WEIGHT: f64 = 0.2;
/// Composite weight of the monetary sub-score.
pub const MONETARY_WEIGHT: f64 = 0.1;

const LIST_LEN: usize = 15;
const SHORT_LIST_LEN: usize = 10;
const SLOW_MOVER_DAYS: i64 = 30;
const RISING_STAR_RECENCY: f64 = 70.0;

/// Letter grade, best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Tier {
    /// Top Performer
    S,
    /// Strong Seller
    A,
    /// Average
    B,
    /// Weak Seller
    C,
    /// Poor Performer
    D,
}

impl Tier {
    /// Tier for a composite score.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Self::S
        } else if score >= 60.0 {
            Self::A
        } else if score >= 40.0 {
            Self::B
        } else if score >= 20.0 {
            Self::C
        } else {
            Self::D
        }
    }

    /// Human label
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::S => "Top Performer",
            Self::A => "Strong Seller",
            Self::B => "Average",
            Self::C => "Weak Seller",
            Self::D => "Poor Performer",
        }
    }
}

/// A scored product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductScore {
    /// Underlying totals
    pub product: ProductStats,
    /// Whole days since the last purchase, or [`NEVER_PURCHASED_DAYS`]
    pub recency_days: i64,
    /// Revenue relative to the best seller
    pub revenue_score: f64,
    /// Tickets relative to the most frequent product
    pub frequency_score: f64,
    /// `max(0, 100 - recency_days)`
    pub recency_score: f64,
    /// Average value relative to the highest
    pub monetary_score: f64,
    /// Weighted composite
    pub composite: f64,
    /// Tier of `composite`
    pub tier: Tier,
}

/// Whole days between `reference` and `last_sold_at`.
#[must_use]
pub fn recency_days(last_sold_at: Option<DateTime<Utc>>, reference: DateTime<Utc>) -> i64 {
    last_sold_at.map_or(NEVER_PURCHASED_DAYS, |at| (reference - at).num_days().max(0))
}

/// `max(0, 100 - days)`
#[must_use]
pub fn recency_score(days: i64) -> f64 {
    (100 - days).max(0) as f64
}

fn normalized(value: f64, max: f64) -> f64 {
    if max > 0.0 { value / max * 100.0 } else { 0.0 }
}

fn positive_max(values: impl Iterator<Item = f64>) -> f64 {
    values.filter(|v| *v > 0.0).fold(0.0, f64::max)
}

/// Scores every product against the window end `reference`.
///
/// Maxima are taken over strictly positive values only.
#[must_use]
pub fn score_products(products: &[ProductStats], reference: DateTime<Utc>) -> Vec<ProductScore> {
    let max_revenue = positive_max(products.iter().map(|p| p.revenue));
    let max_tickets = positive_max(products.iter().map(|p| p.tickets as f64));
    let max_value = positive_max(products.iter().map(|p| p.avg_value));

    products
        .iter()
        .map(|product| {
            let days = recency_days(product.last_sold_at, reference);
            let revenue_score = normalized(product.revenue, max_revenue);
            let frequency_score = normalized(product.tickets as f64, max_tickets);
            let recency = recency_score(days);
            let monetary_score = normalized(product.avg_value, max_value);
            let composite = REVENUE_WEIGHT * revenue_score
                + FREQUENCY_WEIGHT * frequency_score
                + RECENCY_WEIGHT * recency
                + MONETARY_WEIGHT * monetary_score;
            ProductScore {
                product: product.clone(),
                recency_days: days,
                revenue_score,
                frequency_score,
                recency_score: recency,
                monetary_score,
                composite,
                tier: Tier::from_score(composite),
            }
        })
        .collect()
}

/// Ranked product lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProductLists {
    /// Top 15 by composite score
    pub bestsellers: Vec<ProductScore>,
    /// Bottom 15 by composite score, worst first
    pub least_sellers: Vec<ProductScore>,
    /// Not sold for more than 30 days, stalest first
    pub slow_movers: Vec<ProductScore>,
    /// Recently active, by recency score then tickets
    pub rising_stars: Vec<ProductScore>,
}

fn by_composite(a: &ProductScore, b: &ProductScore) -> std::cmp::Ordering {
    a.composite
        .total_cmp(&b.composite)
        .then_with(|| b.product.name.cmp(&a.product.name))
}

/// Builds the ranked lists; zero-revenue products never appear in them.
#[must_use]
pub fn product_lists(scores: &[ProductScore]) -> ProductLists {
    let selling: Vec<&ProductScore> = scores.iter().filter(|s| s.product.revenue > 0.0).collect();
    let take = |list: Vec<&ProductScore>, n: usize| -> Vec<ProductScore> {
        list.into_iter().take(n).cloned().collect()
    };

    let mut ascending = selling.clone();
    ascending.sort_by(|a, b| by_composite(a, b));
    let mut descending = ascending.clone();
    descending.reverse();

    let mut slow: Vec<&ProductScore> = selling
        .iter()
        .copied()
        .filter(|s| s.recency_days > SLOW_MOVER_DAYS && s.recency_days != NEVER_PURCHASED_DAYS)
        .collect();
    slow.sort_by(|a, b| {
        b.recency_days
            .cmp(&a.recency_days)
            .then_with(|| a.product.name.cmp(&b.product.name))
    });

    let mut rising: Vec<&ProductScore> = selling
        .iter()
        .copied()
        .filter(|s| s.recency_score > RISING_STAR_RECENCY)
        .collect();
    rising.sort_by(|a, b| {
        b.recency_score
            .total_cmp(&a.recency_score)
            .then_with(|| b.product.tickets.cmp(&a.product.tickets))
            .then_with(|| a.product.name.cmp(&b.product.name))
    });

    ProductLists {
        bestsellers: take(descending, LIST_LEN),
        least_sellers: take(ascending, LIST_LEN),
        slow_movers: take(slow, SHORT_LIST_LEN),
        rising_stars: take(rising, SHORT_LIST_LEN),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp, clippy::unwrap_used)]
    use super::*;
    use chrono::TimeDelta;

    fn reference() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-31T23:59:59Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn product(name: &str, revenue: f64, tickets: u64, days_ago: Option<i64>) -> ProductStats {
        ProductStats {
            name: name.to_string(),
            code: None,
            revenue,
            quantity: tickets,
            tickets,
            avg_value: if tickets == 0 { 0.0 } else { revenue / tickets as f64 },
            last_sold_at: days_ago.map(|d| reference() - TimeDelta::days(d)),
        }
    }

    #[test]
    fn test_tier_thresholds() {
        assert_eq!(Tier::from_score(80.0), Tier::S);
        assert_eq!(Tier::from_score(79.99), Tier::A);
        assert_eq!(Tier::from_score(60.0), Tier::A);
        assert_eq!(Tier::from_score(40.0), Tier::B);
        assert_eq!(Tier::from_score(20.0), Tier::C);
        assert_eq!(Tier::from_score(19.9), Tier::D);
        assert_eq!(Tier::D.label(), "Poor Performer");
    }

    #[test]
    fn test_tier_is_monotonic_in_score() {
        let scores: Vec<f64> = (0..=1000).map(|i| f64::from(i) / 10.0).collect();
        for pair in scores.windows(2) {
            // higher score, tier never worse
            assert!(Tier::from_score(pair[1]) <= Tier::from_score(pair[0]));
        }
    }

    #[test]
    fn test_never_purchased_scores_zero_recency() {
        let scored = score_products(&[product("Ghost", 0.0, 0, None)], reference());
        assert_eq!(scored[0].recency_days, NEVER_PURCHASED_DAYS);
        assert_eq!(scored[0].recency_score, 0.0);
        assert_eq!(scored[0].composite, 0.0);
        assert_eq!(scored[0].tier, Tier::D);

        let lists = product_lists(&scored);
        assert!(lists.rising_stars.is_empty());
        assert!(lists.slow_movers.is_empty());
        assert!(lists.bestsellers.is_empty());
    }

    #[test]
    fn test_composite_weights() {
        let products = vec![
            product("Best", 1000.0, 10, Some(0)),
            product("Half", 500.0, 5, Some(50)),
        ];
        let scored = score_products(&products, reference());
        assert!((scored[0].composite - 100.0).abs() < 1e-9);
        assert_eq!(scored[0].tier, Tier::S);
        // 0.4*50 + 0.3*50 + 0.2*50 + 0.1*100
        assert!((scored[1].composite - 55.0).abs() < 1e-9);
        assert_eq!(scored[1].tier, Tier::B);
    }

    #[test]
    fn test_product_lists() {
        let products = vec![
            product("Fresh", 300.0, 6, Some(1)),
            product("Stale", 200.0, 2, Some(80)),
            product("Older", 100.0, 1, Some(45)),
            product("Unsold", 0.0, 0, None),
        ];
        let lists = product_lists(&score_products(&products, reference()));

        assert_eq!(lists.bestsellers[0].product.name, "Fresh");
        assert_eq!(lists.bestsellers.len(), 3);
        assert_eq!(lists.least_sellers[0].product.name, "Older");
        let slow: Vec<&str> = lists.slow_movers.iter().map(|s| s.product.name.as_str()).collect();
        assert_eq!(slow, vec!["Stale", "Older"]);
        assert_eq!(lists.rising_stars.len(), 1);
        assert_eq!(lists.rising_stars[0].product.name, "Fresh");
    }
}
