//! Comparative insights over two or three period summaries.
//!
//! [`narrate`] is a pure function: identical summaries always yield the same
//! insights, in the same order, with the same text and recommendations.

#![allow(clippy::cast_precision_loss)]

use crate::core::{
    aggregate::{CrossSellStats, GroupTotals, SummaryTotals},
    format::{format_change, format_currency, format_number, format_percent},
    metrics::{Trend, compound_growth, percent_change, ratio},
};
use serde::Serialize;

const REVENUE_THRESHOLD: f64 = 1.0;
const BASKET_THRESHOLD: f64 = 3.0;
const CATEGORY_THRESHOLD: f64 = 10.0;
const CROSS_SELL_SWING: f64 = 5.0;
const SINGLE_ITEM_WARNING: f64 = 30.0;
const DECLINE_ALERT: f64 = -5.0;
const LOCATION_SPREAD: f64 = 2.0;
const LONG_TERM_THRESHOLD: f64 = 10.0;
const LONG_TERM_PERIODS: u32 = 2;

/// Everything the narrator needs to know about one period.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PeriodSummary {
    /// Year the period falls in
    pub year: i32,
    /// Revenue, tickets and items
    pub totals: SummaryTotals,
    /// Basket composition
    pub cross_sell: CrossSellStats,
    /// Product groups by revenue, highest first
    pub top_categories: Vec<GroupTotals>,
    /// Locations by revenue, highest first
    pub top_locations: Vec<GroupTotals>,
}

impl PeriodSummary {
    fn revenue(&self) -> f64 {
        self.totals.revenue
    }

    fn tickets(&self) -> f64 {
        self.totals.tickets as f64
    }

    fn basket(&self) -> f64 {
        self.totals.avg_basket()
    }

    fn cross_sell_rate(&self) -> f64 {
        self.cross_sell.cross_sell_pct()
    }

    fn single_item_rate(&self) -> f64 {
        self.cross_sell.single_item_pct()
    }
}

/// One labelled figure inside an insight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsightMetric {
    /// Caption
    pub label: String,
    /// Formatted value
    pub value: String,
    /// Formatted change, if the metric has one
    pub change: Option<String>,
    /// Direction of the change
    pub trend: Option<Trend>,
}

impl InsightMetric {
    fn plain(label: impl Into<String>, value: String) -> Self {
        Self {
            label: label.into(),
            value,
            change: None,
            trend: None,
        }
    }

    fn changed(label: impl Into<String>, value: String, change: f64) -> Self {
        Self {
            label: label.into(),
            value,
            change: Some(format_change(change)),
            trend: Some(Trend::of(change)),
        }
    }
}

/// Headline figures for one year in a long-term insight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YearSnapshot {
    /// Year
    pub year: i32,
    /// Formatted revenue
    pub revenue: String,
    /// Formatted tickets
    pub tickets: String,
    /// Formatted average basket
    pub avg_basket: String,
}

impl YearSnapshot {
    fn of(summary: &PeriodSummary) -> Self {
        Self {
            year: summary.year,
            revenue: format_currency(summary.revenue()),
            tickets: format_number(summary.tickets()),
            avg_basket: format!("${:.2}", summary.basket()),
        }
    }
}

/// A narrated finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Insight {
    /// Grouping label such as `"Revenue Analysis"`
    pub category: String,
    /// Headline
    pub title: String,
    /// Sign of the driving change
    pub trend: Trend,
    /// Explanation
    pub description: String,
    /// Supporting figures
    pub metrics: Vec<InsightMetric>,
    /// Per-year figures for long-term insights
    pub year_comparison: Vec<YearSnapshot>,
}

/// A headline KPI with its change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverviewMetric {
    /// Formatted current value
    pub value: String,
    /// Absolute change, formatted
    pub change: String,
    /// Direction of the change
    pub trend: Trend,
    /// Arrow icon name
    pub icon: String,
}

impl OverviewMetric {
    fn new(value: String, change: f64) -> Self {
        let trend = Trend::of(change);
        Self {
            value,
            change: format_percent(change.abs()),
            trend,
            icon: trend.icon().to_string(),
        }
    }
}

/// Headline block shown above the insights.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Overview {
    /// Revenue
    pub revenue: OverviewMetric,
    /// Tickets
    pub tickets: OverviewMetric,
    /// Average basket
    pub basket: OverviewMetric,
    /// Cross-sell rate
    pub cross_sell: OverviewMetric,
}

/// Narrator output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Narration {
    /// Insights in fixed order
    pub insights: Vec<Insight>,
    /// Flat list of recommendations, in the order their insights produced them
    pub recommendations: Vec<String>,
    /// Headline block
    pub overview: Overview,
}

/// Period-over-period changes shared by several insights.
struct Changes {
    revenue: f64,
    tickets: f64,
    basket: f64,
    cross_sell: f64,
    single_item: f64,
}

impl Changes {
    fn between(current: &PeriodSummary, previous: &PeriodSummary) -> Self {
        Self {
            revenue: percent_change(current.revenue(), previous.revenue()),
            tickets: percent_change(current.tickets(), previous.tickets()),
            basket: percent_change(current.basket(), previous.basket()),
            cross_sell: percent_change(current.cross_sell_rate(), previous.cross_sell_rate()),
            single_item: percent_change(current.single_item_rate(), previous.single_item_rate()),
        }
    }
}

/// Builds insights, recommendations and the overview block.
#[must_use]
pub fn narrate(
    current: &PeriodSummary,
    previous: &PeriodSummary,
    two_back: Option<&PeriodSummary>,
) -> Narration {
    let changes = Changes::between(current, previous);
    let mut insights = Vec::new();
    let mut recommendations = Vec::new();

    let sections = [
        revenue_insight(current, previous, &changes, &mut recommendations),
        cross_sell_insight(current, previous, &changes, &mut recommendations),
        basket_insight(current, previous, &changes, &mut recommendations),
        category_insight(current, previous, &mut recommendations),
        location_insight(current, &mut recommendations),
        two_back.and_then(|older| long_term_insight(current, previous, older)),
    ];
    insights.extend(sections.into_iter().flatten());

    let overview = Overview {
        revenue: OverviewMetric::new(format_currency(current.revenue()), changes.revenue),
        tickets: OverviewMetric::new(format_number(current.tickets()), changes.tickets),
        basket: OverviewMetric::new(format!("${:.2}", current.basket()), changes.basket),
        cross_sell: OverviewMetric::new(
            format!("{:.1}", current.cross_sell_rate()),
            changes.cross_sell,
        ),
    };

    Narration {
        insights,
        recommendations,
        overview,
    }
}

fn revenue_insight(
    current: &PeriodSummary,
    previous: &PeriodSummary,
    changes: &Changes,
    recommendations: &mut Vec<String>,
) -> Option<Insight> {
    let change = changes.revenue;
    if change.abs() <= REVENUE_THRESHOLD {
        return None;
    }

    let description = if change > 0.0 {
        if changes.tickets > changes.basket {
            format!(
                "Your revenue increased by {change:.1}% compared to {}, primarily driven by a {:.1}% increase in transaction volume. This indicates strong customer acquisition or increased purchase frequency.",
                previous.year, changes.tickets
            )
        } else {
            format!(
                "Your revenue grew by {change:.1}% year-over-year, with the average basket size increasing by {:.1}%. Customers are spending more per transaction, suggesting effective upselling or premium product adoption.",
                changes.basket
            )
        }
    } else {
        let lead = format!(
            "Revenue declined by {:.1}% compared to {}. ",
            change.abs(),
            previous.year
        );
        let driver = if changes.tickets < 0.0 && changes.basket < 0.0 {
            format!(
                "Both transaction volume (down {:.1}%) and average basket size (down {:.1}%) decreased, indicating challenges in both customer retention and purchase value.",
                changes.tickets.abs(),
                changes.basket.abs()
            )
        } else if changes.tickets < 0.0 {
            format!(
                "This is primarily due to a {:.1}% decrease in transaction volume, despite average basket size remaining stable.",
                changes.tickets.abs()
            )
        } else {
            format!(
                "While transaction volume increased by {:.1}%, the average basket size decreased by {:.1}%, suggesting customers are purchasing less per visit.",
                changes.tickets,
                changes.basket.abs()
            )
        };
        lead + &driver
    };

    if change < 0.0 {
        if changes.tickets < DECLINE_ALERT {
            recommendations.push("Focus on customer retention and acquisition strategies to reverse the declining transaction volume. Consider loyalty programs or targeted marketing campaigns.".to_string());
        }
        if changes.basket < DECLINE_ALERT {
            recommendations.push("Implement bundle offers or cross-selling strategies to increase average basket size and maximize value per customer visit.".to_string());
        }
    }

    Some(Insight {
        category: "Revenue Analysis".to_string(),
        title: format!(
            "Revenue {} of {:.1}%",
            if change > 0.0 { "Growth" } else { "Decline" },
            change.abs()
        ),
        trend: Trend::of(change),
        description,
        metrics: vec![
            InsightMetric::changed(
                format!("{} Revenue", current.year),
                format_currency(current.revenue()),
                change,
            ),
            InsightMetric::plain(
                format!("{} Revenue", previous.year),
                format_currency(previous.revenue()),
            ),
        ],
        year_comparison: Vec::new(),
    })
}

fn cross_sell_insight(
    current: &PeriodSummary,
    previous: &PeriodSummary,
    changes: &Changes,
    recommendations: &mut Vec<String>,
) -> Option<Insight> {
    let rate = current.cross_sell_rate();
    if rate <= 0.0 {
        return None;
    }
    let change = changes.cross_sell;
    let single = current.single_item_rate();

    let description = if change > CROSS_SELL_SWING {
        recommendations.push("Continue strengthening cross-selling initiatives. Consider training staff on successful bundling techniques and optimizing product placement.".to_string());
        format!(
            "Excellent progress! Your cross-selling rate improved by {change:.1}%, with {rate:.1}% of transactions containing 3+ items. This indicates effective merchandising and sales techniques."
        )
    } else if change < -CROSS_SELL_SWING {
        recommendations.push("Develop strategic product bundles and train staff on cross-selling techniques. Consider implementing 'frequently bought together' displays.".to_string());
        format!(
            "Cross-selling performance declined by {:.1}%. Only {rate:.1}% of customers are purchasing 3+ items per transaction, down from {:.1}% last year.",
            change.abs(),
            previous.cross_sell_rate()
        )
    } else {
        let mut text = format!(
            "Your cross-selling rate is stable at {rate:.1}%, with {} multi-item transactions. There's opportunity to further improve customer basket composition.",
            format_number(current.tickets() * rate / 100.0)
        );
        if single > SINGLE_ITEM_WARNING {
            text.push_str(&format!(
                " However, {single:.1}% of transactions are single-item purchases, representing a significant opportunity for improvement."
            ));
            recommendations.push(format!(
                "With {single:.1}% single-item purchases, focus on bundling strategies and point-of-sale suggestions to increase items per basket."
            ));
        }
        text
    };

    let change_text = |value: f64| {
        if value == 0.0 {
            "No change".to_string()
        } else {
            format_change(value)
        }
    };

    Some(Insight {
        category: "Customer Behavior".to_string(),
        title: format!("Cross-Selling Rate: {rate:.1}%"),
        trend: Trend::of(change),
        description,
        metrics: vec![
            InsightMetric {
                label: "Cross-Sell Rate".to_string(),
                value: format_percent(rate),
                change: Some(change_text(change)),
                trend: Some(Trend::of(change)),
            },
            InsightMetric {
                label: "Single Item Rate".to_string(),
                value: format_percent(single),
                change: Some(change_text(changes.single_item)),
                // more single-item tickets is bad news
                trend: Some(Trend::of(-changes.single_item)),
            },
        ],
        year_comparison: Vec::new(),
    })
}

fn basket_insight(
    current: &PeriodSummary,
    previous: &PeriodSummary,
    changes: &Changes,
    recommendations: &mut Vec<String>,
) -> Option<Insight> {
    let change = changes.basket;
    if change.abs() <= BASKET_THRESHOLD {
        return None;
    }
    let basket = current.basket();
    let items_change = percent_change(
        current.totals.items_per_ticket(),
        previous.totals.items_per_ticket(),
    );

    let description = if change > 0.0 {
        if items_change > change {
            format!(
                "The average basket value increased by {change:.1}% to ${basket:.2}, primarily driven by customers purchasing more items per transaction (up {items_change:.1}%)."
            )
        } else {
            recommendations.push("Capitalize on the premium trend by highlighting high-margin products and creating exclusive bundles.".to_string());
            format!(
                "Average basket size grew by {change:.1}% to ${basket:.2}, indicating customers are trading up to higher-value products or responding well to premium offerings."
            )
        }
    } else {
        let lead = format!(
            "The average basket decreased by {:.1}% to ${basket:.2}. ",
            change.abs()
        );
        if items_change < 0.0 {
            recommendations.push("Investigate causes of smaller baskets - consider customer feedback surveys and analyze product availability during peak periods.".to_string());
            lead + "Customers are purchasing fewer items per visit, suggesting potential issues with product availability, pricing, or shopping experience."
        } else {
            lead + "While customers are buying similar quantities, they're choosing lower-priced options, possibly due to economic factors or competitive pricing pressure."
        }
    };

    Some(Insight {
        category: "Transaction Value".to_string(),
        title: format!(
            "Average Basket {} to ${basket:.2}",
            if change > 0.0 { "Increased" } else { "Decreased" }
        ),
        trend: Trend::of(change),
        description,
        metrics: vec![
            InsightMetric::changed(
                format!("{} Avg Basket", current.year),
                format!("${basket:.2}"),
                change,
            ),
            InsightMetric::plain(
                "Items per Ticket",
                format!("{:.1}", current.totals.items_per_ticket()),
            ),
        ],
        year_comparison: Vec::new(),
    })
}

fn category_insight(
    current: &PeriodSummary,
    previous: &PeriodSummary,
    recommendations: &mut Vec<String>,
) -> Option<Insight> {
    let top = current.top_categories.first()?;
    let prior = previous
        .top_categories
        .iter()
        .find(|c| c.name == top.name)?;
    let change = percent_change(top.revenue, prior.revenue);
    if change.abs() <= CATEGORY_THRESHOLD {
        return None;
    }
    let share = ratio(top.revenue, current.revenue()) * 100.0;
    let name = &top.name;

    let lead = format!(
        "{name} is your top-performing category, generating {} ({share:.1}% of total revenue). ",
        format_currency(top.revenue)
    );
    let description = if change > 0.0 {
        recommendations.push(format!(
            "Invest in expanding the {name} category - increase inventory depth, add complementary products, and feature prominently in marketing."
        ));
        lead + &format!(
            "This category grew by {change:.1}% year-over-year, significantly outpacing overall business growth."
        )
    } else {
        recommendations.push(format!(
            "Investigate the decline in {name} - analyze pricing, competition, and product freshness. Consider category refresh or promotional support."
        ));
        lead + &format!(
            "However, this category declined by {:.1}% compared to last year, which is concerning given its importance to your business.",
            change.abs()
        )
    };

    Some(Insight {
        category: "Category Performance".to_string(),
        title: format!("{name} Leads with {share:.1}% Share"),
        trend: Trend::of(change),
        description,
        metrics: vec![
            InsightMetric::changed("Category Revenue", format_currency(top.revenue), change),
            InsightMetric::plain("Revenue Share", format_percent(share)),
        ],
        year_comparison: Vec::new(),
    })
}

fn location_insight(
    current: &PeriodSummary,
    recommendations: &mut Vec<String>,
) -> Option<Insight> {
    if current.top_locations.len() < 2 {
        return None;
    }
    let top = current.top_locations.first()?;
    let bottom = current.top_locations.last()?;
    if top.revenue <= 0.0 || bottom.revenue <= 0.0 {
        return None;
    }
    let spread = top.revenue / bottom.revenue;
    if spread <= LOCATION_SPREAD {
        return None;
    }

    recommendations.push(format!(
        "Analyze best practices from {} and apply learnings to underperforming locations. Consider staffing, inventory, and local marketing differences.",
        top.name
    ));

    Some(Insight {
        category: "Location Analysis".to_string(),
        title: "Significant Performance Variance Across Locations".to_string(),
        trend: Trend::Negative,
        description: format!(
            "There's significant performance variance across locations. {} generates {}, while {} generates {} - a {spread:.1}x difference.",
            top.name,
            format_currency(top.revenue),
            bottom.name,
            format_currency(bottom.revenue)
        ),
        metrics: vec![
            InsightMetric::plain("Top Location", format_currency(top.revenue)),
            InsightMetric::plain("Performance Spread", format!("{spread:.1}x")),
        ],
        year_comparison: Vec::new(),
    })
}

fn long_term_insight(
    current: &PeriodSummary,
    previous: &PeriodSummary,
    older: &PeriodSummary,
) -> Option<Insight> {
    let growth = percent_change(current.revenue(), older.revenue());
    if growth.abs() <= LONG_TERM_THRESHOLD {
        return None;
    }
    let cagr = compound_growth(current.revenue(), older.revenue(), LONG_TERM_PERIODS)?;
    let span = current.year - older.year;

    let recent = percent_change(current.revenue(), previous.revenue());
    let earlier = percent_change(previous.revenue(), older.revenue());
    let pace = if recent > earlier {
        format!(
            "Growth is accelerating - {} saw {recent:.1}% growth compared to {earlier:.1}% in the prior year.",
            current.year
        )
    } else if recent < earlier {
        format!(
            "Growth is decelerating - {} saw {recent:.1}% growth compared to {earlier:.1}% in the prior year.",
            current.year
        )
    } else {
        format!("Growth is consistent at approximately {recent:.1}% year-over-year.")
    };

    Some(Insight {
        category: "Long-term Trends".to_string(),
        title: format!("{span}-Year Performance Trajectory"),
        trend: Trend::of(growth),
        description: format!(
            "Over the past {span} years, revenue {} by {:.1}% (CAGR: {cagr:+.1}%). {pace}",
            if growth > 0.0 { "grew" } else { "declined" },
            growth.abs()
        ),
        metrics: Vec::new(),
        year_comparison: vec![
            YearSnapshot::of(current),
            YearSnapshot::of(previous),
            YearSnapshot::of(older),
        ],
    })
}
