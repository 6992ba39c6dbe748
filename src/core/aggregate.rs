//! Grouped aggregations over a filtered record set.
//!
//! Every database function here issues exactly one grouped query against the
//! record set it is given. Anything per ticket, per day or per employee that can be
//! derived from those grouped rows is computed in memory, so a report costs a small
//! fixed number of passes no matter how many products or employees it covers.
//!
//! Empty inputs always produce zero-valued structures.

#![allow(clippy::cast_precision_loss)]

use crate::{
    core::{
        filter::CatalogRules,
        metrics::{average_basket, discount_share, items_per_ticket, percent_change, share_pct},
    },
    entities::{SalesRecord, sales_record},
    errors::{Error, Result},
};
use chrono::{DateTime, Datelike, FixedOffset, Utc};
use sea_orm::{
    Condition, DatabaseConnection, FromQueryResult, QueryOrder, QuerySelect, Select,
    prelude::*,
    sea_query::{Expr, Func, SimpleExpr},
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, warn};

/// Label used when a row carries no employee or group name.
pub const UNKNOWN: &str = "Unknown";

/// Minimum qualifying items for a cross-sell ticket.
pub const CROSS_SELL_MIN_ITEMS: u64 = 3;

/// Fixed ticket-value buckets: label, inclusive lower bound, exclusive upper bound.
pub const DISTRIBUTION_BUCKETS: [(&str, f64, Option<f64>); 8] = [
    ("0-50", 0.0, Some(50.0)),
    ("50-100", 50.0, Some(100.0)),
    ("100-150", 100.0, Some(150.0)),
    ("150-200", 150.0, Some(200.0)),
    ("200-300", 200.0, Some(300.0)),
    ("300-500", 300.0, Some(500.0)),
    ("500-1K", 500.0, Some(1000.0)),
    ("1K+", 1000.0, None),
];

pub(crate) fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

pub(crate) fn sum_of(column: sales_record::Column) -> SimpleExpr {
    Func::sum(Expr::col(column)).into()
}

pub(crate) fn distinct_tickets_expr() -> SimpleExpr {
    Func::count_distinct(Expr::col(sales_record::Column::TicketId)).into()
}

/// `SUM(CASE WHEN not_counted THEN 0 ELSE 1 END)`
fn lines_excluding(not_counted: Condition) -> SimpleExpr {
    Func::sum(Expr::case(not_counted, Expr::val(0)).finally(Expr::val(1))).into()
}

fn name_or_unknown(name: Option<String>) -> String {
    name.filter(|n| !n.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

// ---------------------------------------------------------------------------
// Summary totals
// ---------------------------------------------------------------------------

/// Revenue, ticket and item totals for one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SummaryTotals {
    /// Sum of extended amounts
    pub revenue: f64,
    /// Distinct tickets
    pub tickets: u64,
    /// Set when `tickets` is an estimate because the exact count timed out
    pub tickets_estimated: bool,
    /// Line items, excluding non-merchandise codes
    pub items: u64,
    /// Sum of discounted prices
    pub discount_total: Option<f64>,
    /// Sum of standard prices
    pub std_price_total: Option<f64>,
}

impl SummaryTotals {
    /// Revenue per ticket
    #[must_use]
    pub fn avg_basket(&self) -> f64 {
        average_basket(self.revenue, self.tickets)
    }

    /// Items per ticket
    #[must_use]
    pub fn items_per_ticket(&self) -> f64 {
        items_per_ticket(self.items, self.tickets)
    }

    /// Discount share in percent
    #[must_use]
    pub fn discount_share(&self) -> f64 {
        discount_share(self.discount_total, self.std_price_total)
    }

    /// Tickets per hundred items
    #[must_use]
    pub fn conversion_rate(&self) -> f64 {
        share_pct(self.tickets, self.items)
    }
}

#[derive(Debug, FromQueryResult)]
struct LineTotalsRow {
    revenue: Option<f64>,
    items: Option<i64>,
    discount_total: Option<f64>,
    std_price_total: Option<f64>,
}

#[derive(Debug, FromQueryResult)]
struct CountRow {
    value: i64,
}

fn with_line_totals(query: Select<SalesRecord>, rules: &CatalogRules) -> Select<SalesRecord> {
    query
        .column_as(sum_of(sales_record::Column::Amount), "revenue")
        .column_as(lines_excluding(rules.non_merchandise_line()), "items")
        .column_as(sum_of(sales_record::Column::DiscountAmount), "discount_total")
        .column_as(sum_of(sales_record::Column::StdPrice), "std_price_total")
}

async fn distinct_tickets(db: &DatabaseConnection, query: Select<SalesRecord>) -> Result<u64> {
    let row = query
        .select_only()
        .column_as(distinct_tickets_expr(), "value")
        .into_model::<CountRow>()
        .one(db)
        .await?;
    Ok(row.map_or(0, |r| to_count(r.value)))
}

/// Resolves the outcome of the exact ticket count.
///
/// A timeout degrades to `items` as an estimate and flags it; any other error is
/// returned unchanged.
pub fn settle_ticket_count(exact: Result<u64>, items: u64) -> Result<(u64, bool)> {
    match exact {
        Ok(tickets) => Ok((tickets, false)),
        Err(e @ Error::AggregationTimeout { .. }) => {
            warn!("{e}; estimating ticket count from {items} items");
            Ok((items, true))
        }
        Err(e) => Err(e),
    }
}

/// Summary totals for `query`.
///
/// The distinct-ticket count runs under `budget`; on timeout the item count stands
/// in for it and [`SummaryTotals::tickets_estimated`] is set.
pub async fn summary_totals(
    db: &DatabaseConnection,
    query: Select<SalesRecord>,
    rules: &CatalogRules,
    budget: Duration,
) -> Result<SummaryTotals> {
    let row = with_line_totals(query.clone().select_only(), rules)
        .into_model::<LineTotalsRow>()
        .one(db)
        .await?;

    let mut totals = row.map_or_else(SummaryTotals::default, |r| SummaryTotals {
        revenue: r.revenue.unwrap_or_default(),
        items: r.items.map_or(0, to_count),
        discount_total: r.discount_total,
        std_price_total: r.std_price_total,
        ..SummaryTotals::default()
    });

    let exact = tokio::time::timeout(budget, distinct_tickets(db, query))
        .await
        .unwrap_or_else(|_| {
            Err(Error::AggregationTimeout {
                section: "distinct ticket count".to_string(),
            })
        });
    let (tickets, estimated) = settle_ticket_count(exact, totals.items)?;
    totals.tickets = tickets;
    totals.tickets_estimated = estimated;
    Ok(totals)
}

/// Number of distinct locations with rows in `query`.
pub async fn active_location_count(
    db: &DatabaseConnection,
    query: Select<SalesRecord>,
) -> Result<u64> {
    let row = query
        .select_only()
        .column_as(
            SimpleExpr::from(Func::count_distinct(Expr::col(sales_record::Column::Location))),
            "value",
        )
        .into_model::<CountRow>()
        .one(db)
        .await?;
    Ok(row.map_or(0, |r| to_count(r.value)))
}

// ---------------------------------------------------------------------------
// Ticket pass
// ---------------------------------------------------------------------------

/// One ticket within a window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketAggregate {
    /// Ticket identifier
    pub ticket_id: String,
    /// Sum of line amounts
    pub revenue: f64,
    /// All lines on the ticket
    pub lines: u64,
    /// Lines that count as items for this pass
    pub items: u64,
    /// Earliest line timestamp
    pub sold_at: Option<DateTime<Utc>>,
    /// Location of the checkout
    pub location: Option<String>,
    /// Employee who rang it up
    pub employee: Option<String>,
}

#[derive(Debug, FromQueryResult)]
struct TicketRow {
    ticket_id: String,
    revenue: Option<f64>,
    lines: i64,
    items: Option<i64>,
    sold_at: Option<DateTimeUtc>,
    location: Option<String>,
    employee: Option<String>,
}

/// Groups `query` by ticket in a single pass.
///
/// Lines matching `not_counted` still contribute revenue and `lines` but not
/// `items`.
pub async fn ticket_totals(
    db: &DatabaseConnection,
    query: Select<SalesRecord>,
    not_counted: Condition,
) -> Result<Vec<TicketAggregate>> {
    let rows = query
        .select_only()
        .column(sales_record::Column::TicketId)
        .column_as(sum_of(sales_record::Column::Amount), "revenue")
        .column_as(
            SimpleExpr::from(Func::count(Expr::col(sales_record::Column::Id))),
            "lines",
        )
        .column_as(lines_excluding(not_counted), "items")
        .column_as(
            SimpleExpr::from(Func::min(Expr::col(sales_record::Column::SoldAt))),
            "sold_at",
        )
        .column_as(
            SimpleExpr::from(Func::max(Expr::col(sales_record::Column::Location))),
            "location",
        )
        .column_as(
            SimpleExpr::from(Func::max(Expr::col(sales_record::Column::EmployeeName))),
            "employee",
        )
        .group_by(sales_record::Column::TicketId)
        .order_by_asc(sales_record::Column::TicketId)
        .into_model::<TicketRow>()
        .all(db)
        .await?;

    debug!("Ticket pass grouped {} tickets", rows.len());

    Ok(rows
        .into_iter()
        .map(|r| TicketAggregate {
            ticket_id: r.ticket_id,
            revenue: r.revenue.unwrap_or_default(),
            lines: to_count(r.lines),
            items: r.items.map_or(0, to_count),
            sold_at: r.sold_at,
            location: r.location,
            employee: r.employee,
        })
        .collect())
}

/// `(month, day)` of an instant in the report timezone.
pub type DayKey = (u32, u32);

/// `(month, day)` of `at` as seen in `tz`.
#[must_use]
pub fn day_key(at: DateTime<Utc>, tz: FixedOffset) -> DayKey {
    let local = at.with_timezone(&tz);
    (local.month(), local.day())
}

/// Revenue, tickets and items for one calendar day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DayTotals {
    /// Revenue
    pub revenue: f64,
    /// Tickets started that day
    pub tickets: u64,
    /// Items on those tickets
    pub items: u64,
}

impl DayTotals {
    /// Revenue per ticket for the day
    #[must_use]
    pub fn avg_basket(&self) -> f64 {
        average_basket(self.revenue, self.tickets)
    }
}

/// Buckets tickets by `(month, day)`, ascending.
///
/// A ticket belongs to the day of its earliest line, so a ticket whose lines
/// straddle midnight is counted once, on the day it was opened.
#[must_use]
pub fn daily_totals(tickets: &[TicketAggregate], tz: FixedOffset) -> BTreeMap<DayKey, DayTotals> {
    let mut days: BTreeMap<DayKey, DayTotals> = BTreeMap::new();
    for ticket in tickets {
        let Some(sold_at) = ticket.sold_at else {
            continue;
        };
        let day = days.entry(day_key(sold_at, tz)).or_default();
        day.revenue += ticket.revenue;
        day.tickets += 1;
        day.items += ticket.items;
    }
    days
}

/// Per-month tickets and revenue, January first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MonthlySeries {
    /// Tickets per month
    pub tickets: [u64; 12],
    /// Revenue per month
    pub revenue: [f64; 12],
}

impl MonthlySeries {
    /// Average basket per month, zero for empty months.
    #[must_use]
    pub fn basket(&self) -> [f64; 12] {
        let mut out = [0.0; 12];
        for (slot, (revenue, tickets)) in out
            .iter_mut()
            .zip(self.revenue.iter().zip(self.tickets.iter()))
        {
            *slot = average_basket(*revenue, *tickets);
        }
        out
    }
}

/// Buckets tickets into calendar months.
#[must_use]
pub fn monthly_series(tickets: &[TicketAggregate], tz: FixedOffset) -> MonthlySeries {
    let mut series = MonthlySeries::default();
    for ticket in tickets {
        let Some(sold_at) = ticket.sold_at else {
            continue;
        };
        let month = sold_at.with_timezone(&tz).month0() as usize;
        if let (Some(count), Some(revenue)) =
            (series.tickets.get_mut(month), series.revenue.get_mut(month))
        {
            *count += 1;
            *revenue += ticket.revenue;
        }
    }
    series
}

/// The `limit` highest-value tickets, ties broken by ticket id.
#[must_use]
pub fn top_tickets(tickets: &[TicketAggregate], limit: usize) -> Vec<TicketAggregate> {
    let mut sorted = tickets.to_vec();
    sorted.sort_by(|a, b| {
        b.revenue
            .total_cmp(&a.revenue)
            .then_with(|| a.ticket_id.cmp(&b.ticket_id))
    });
    sorted.truncate(limit);
    sorted
}

// ---------------------------------------------------------------------------
// Cross-sell
// ---------------------------------------------------------------------------

/// Ticket counts by number of qualifying items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CrossSellStats {
    /// Tickets with at least one qualifying item
    pub classified_tickets: u64,
    /// Tickets with exactly one item
    pub single_item_tickets: u64,
    /// Tickets with exactly two items
    pub two_item_tickets: u64,
    /// Tickets with three or more items
    pub cross_sell_tickets: u64,
    /// Qualifying items across classified tickets
    pub items: u64,
}

impl CrossSellStats {
    /// Adds one ticket with `items` qualifying items. Tickets with none are ignored.
    pub const fn record(&mut self, items: u64) {
        if items == 0 {
            return;
        }
        self.classified_tickets += 1;
        self.items += items;
        match items {
            1 => self.single_item_tickets += 1,
            2 => self.two_item_tickets += 1,
            _ => self.cross_sell_tickets += 1,
        }
    }

    /// Share of single-item tickets
    #[must_use]
    pub fn single_item_pct(&self) -> f64 {
        share_pct(self.single_item_tickets, self.classified_tickets)
    }

    /// Share of two-item tickets
    #[must_use]
    pub fn two_item_pct(&self) -> f64 {
        share_pct(self.two_item_tickets, self.classified_tickets)
    }

    /// Share of cross-sell tickets
    #[must_use]
    pub fn cross_sell_pct(&self) -> f64 {
        share_pct(self.cross_sell_tickets, self.classified_tickets)
    }

    /// Average qualifying items per classified ticket
    #[must_use]
    pub fn avg_items(&self) -> f64 {
        items_per_ticket(self.items, self.classified_tickets)
    }
}

/// Cross-sell classification of one ticket pass, overall and broken down.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CrossSellBreakdown {
    /// Whole window
    pub overall: CrossSellStats,
    /// Per `(month, day)`
    pub daily: BTreeMap<DayKey, CrossSellStats>,
    /// Per employee name
    pub by_employee: HashMap<String, CrossSellStats>,
}

/// Classifies every ticket once, feeding the overall, daily and per-employee tallies.
#[must_use]
pub fn classify_tickets(tickets: &[TicketAggregate], tz: FixedOffset) -> CrossSellBreakdown {
    let mut breakdown = CrossSellBreakdown::default();
    for ticket in tickets.iter().filter(|t| t.items > 0) {
        breakdown.overall.record(ticket.items);
        if let Some(sold_at) = ticket.sold_at {
            breakdown
                .daily
                .entry(day_key(sold_at, tz))
                .or_default()
                .record(ticket.items);
        }
        breakdown
            .by_employee
            .entry(name_or_unknown(ticket.employee.clone()))
            .or_default()
            .record(ticket.items);
    }
    breakdown
}

// ---------------------------------------------------------------------------
// Daily comparison
// ---------------------------------------------------------------------------

/// Equal-length current and prior arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SeriesPair<T> {
    /// Current period values
    pub current: Vec<T>,
    /// Prior period values
    pub previous: Vec<T>,
}

impl<T> SeriesPair<T> {
    fn push(&mut self, current: T, previous: T) {
        self.current.push(current);
        self.previous.push(previous);
    }
}

/// Day-aligned comparison arrays labelled `"month/day"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DailyComparison {
    /// `"3/14"` style labels, ascending by month then day
    pub labels: Vec<String>,
    /// Revenue per day
    pub revenue: SeriesPair<f64>,
    /// Tickets per day
    pub tickets: SeriesPair<u64>,
    /// Items per day
    pub items: SeriesPair<u64>,
    /// Average basket per day
    pub basket: SeriesPair<f64>,
    /// Cross-sell share per day
    pub cross_sell_pct: SeriesPair<f64>,
    /// Single-item share per day
    pub single_item_pct: SeriesPair<f64>,
}

/// Merges both periods on `(month, day)`; a day missing on either side is zero.
#[must_use]
pub fn align_daily(
    current: &BTreeMap<DayKey, DayTotals>,
    previous: &BTreeMap<DayKey, DayTotals>,
    current_cross_sell: &BTreeMap<DayKey, CrossSellStats>,
    previous_cross_sell: &BTreeMap<DayKey, CrossSellStats>,
) -> DailyComparison {
    let keys: BTreeSet<DayKey> = current
        .keys()
        .chain(previous.keys())
        .chain(current_cross_sell.keys())
        .chain(previous_cross_sell.keys())
        .copied()
        .collect();

    let mut out = DailyComparison::default();
    for key in keys {
        let cur = current.get(&key).copied().unwrap_or_default();
        let prev = previous.get(&key).copied().unwrap_or_default();
        let cur_xs = current_cross_sell.get(&key).copied().unwrap_or_default();
        let prev_xs = previous_cross_sell.get(&key).copied().unwrap_or_default();

        out.labels.push(format!("{}/{}", key.0, key.1));
        out.revenue.push(cur.revenue, prev.revenue);
        out.tickets.push(cur.tickets, prev.tickets);
        out.items.push(cur.items, prev.items);
        out.basket.push(cur.avg_basket(), prev.avg_basket());
        out.cross_sell_pct
            .push(cur_xs.cross_sell_pct(), prev_xs.cross_sell_pct());
        out.single_item_pct
            .push(cur_xs.single_item_pct(), prev_xs.single_item_pct());
    }
    out
}

// ---------------------------------------------------------------------------
// Ticket-value distribution
// ---------------------------------------------------------------------------

/// One value bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionBucket {
    /// Display label such as `"50-100"`
    pub label: String,
    /// Inclusive lower bound
    pub lower: f64,
    /// Exclusive upper bound; `None` for the open top bucket
    pub upper: Option<f64>,
    /// Tickets in range
    pub count: u64,
    /// Share of all tickets
    pub percentage: f64,
}

/// Ticket-value distribution with index-based statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketDistribution {
    /// Fixed buckets in ascending order
    pub buckets: Vec<DistributionBucket>,
    /// All tickets, including any that fall outside every bucket
    pub total_tickets: u64,
    /// Arithmetic mean
    pub mean: f64,
    /// `sorted[n / 2]`
    pub median: f64,
    /// `sorted[n / 4]`
    pub p25: f64,
    /// `sorted[3 * n / 4]`
    pub p75: f64,
}

/// Buckets ticket totals and computes mean, median and quartiles.
///
/// The median is the upper of the two middle values for even counts and the
/// quartiles are plain indices, not interpolations. Downstream consumers rely
/// on these exact values.
#[must_use]
pub fn ticket_distribution(values: &[f64]) -> TicketDistribution {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    let total = n as u64;
    let at = |index: usize| sorted.get(index).copied().unwrap_or_default();

    let buckets = DISTRIBUTION_BUCKETS
        .iter()
        .map(|&(label, lower, upper)| {
            let count = sorted
                .iter()
                .filter(|&&v| v >= lower && upper.is_none_or(|u| v < u))
                .count() as u64;
            DistributionBucket {
                label: label.to_string(),
                lower,
                upper,
                count,
                percentage: share_pct(count, total),
            }
        })
        .collect();

    TicketDistribution {
        buckets,
        total_tickets: total,
        mean: if n == 0 {
            0.0
        } else {
            sorted.iter().sum::<f64>() / n as f64
        },
        median: at(n / 2),
        p25: at(n / 4),
        p75: at(3 * n / 4),
    }
}

// ---------------------------------------------------------------------------
// Employee rollup
// ---------------------------------------------------------------------------

/// Totals for one employee.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeStats {
    /// Employee name
    pub name: String,
    /// A location the employee sold at
    pub location: Option<String>,
    /// Totals computed exactly like the report summary
    pub totals: SummaryTotals,
}

#[derive(Debug, FromQueryResult)]
struct EmployeeRow {
    employee: Option<String>,
    location: Option<String>,
    tickets: i64,
    revenue: Option<f64>,
    items: Option<i64>,
    discount_total: Option<f64>,
    std_price_total: Option<f64>,
}

/// One grouped pass over employees, sorted by revenue descending.
pub async fn employee_rollup(
    db: &DatabaseConnection,
    query: Select<SalesRecord>,
    rules: &CatalogRules,
) -> Result<Vec<EmployeeStats>> {
    let rows = with_line_totals(
        query
            .select_only()
            .column_as(sales_record::Column::EmployeeName, "employee")
            .column_as(
                SimpleExpr::from(Func::max(Expr::col(sales_record::Column::Location))),
                "location",
            )
            .column_as(distinct_tickets_expr(), "tickets"),
        rules,
    )
    .group_by(sales_record::Column::EmployeeName)
    .into_model::<EmployeeRow>()
    .all(db)
    .await?;

    let mut stats: Vec<EmployeeStats> = rows
        .into_iter()
        .map(|r| EmployeeStats {
            name: name_or_unknown(r.employee),
            location: r.location,
            totals: SummaryTotals {
                revenue: r.revenue.unwrap_or_default(),
                tickets: to_count(r.tickets),
                tickets_estimated: false,
                items: r.items.map_or(0, to_count),
                discount_total: r.discount_total,
                std_price_total: r.std_price_total,
            },
        })
        .collect();
    stats.sort_by(|a, b| {
        b.totals
            .revenue
            .total_cmp(&a.totals.revenue)
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(stats)
}

/// An employee's current figures next to the prior period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeComparison {
    /// Employee name
    pub name: String,
    /// A location the employee sold at
    pub location: Option<String>,
    /// Current totals
    pub current: SummaryTotals,
    /// Current average basket
    pub avg_basket: f64,
    /// Current items per ticket
    pub items_per_ticket: f64,
    /// Current discount share
    pub discount_rate: f64,
    /// Prior revenue, zero for new employees
    pub previous_revenue: f64,
    /// Prior tickets, zero for new employees
    pub previous_tickets: u64,
    /// Revenue change in percent
    pub revenue_change_pct: f64,
    /// Ticket change in percent
    pub tickets_change_pct: f64,
    /// Basket composition from the ticket pass
    pub cross_sell: CrossSellStats,
}

/// Joins current and prior employee rollups by name.
#[must_use]
pub fn compare_employees(
    current: &[EmployeeStats],
    previous: &[EmployeeStats],
    cross_sell: &HashMap<String, CrossSellStats>,
) -> Vec<EmployeeComparison> {
    let prior: HashMap<&str, &SummaryTotals> = previous
        .iter()
        .map(|e| (e.name.as_str(), &e.totals))
        .collect();

    current
        .iter()
        .map(|e| {
            let prev = prior.get(e.name.as_str()).copied().copied().unwrap_or_default();
            EmployeeComparison {
                name: e.name.clone(),
                location: e.location.clone(),
                current: e.totals,
                avg_basket: e.totals.avg_basket(),
                items_per_ticket: e.totals.items_per_ticket(),
                discount_rate: e.totals.discount_share(),
                previous_revenue: prev.revenue,
                previous_tickets: prev.tickets,
                revenue_change_pct: percent_change(e.totals.revenue, prev.revenue),
                tickets_change_pct: percent_change(e.totals.tickets as f64, prev.tickets as f64),
                cross_sell: cross_sell.get(&e.name).copied().unwrap_or_default(),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Category and location rollups
// ---------------------------------------------------------------------------

/// Totals for one value of a grouping column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupTotals {
    /// Group value
    pub name: String,
    /// Revenue
    pub revenue: f64,
    /// Distinct tickets
    pub tickets: u64,
    /// Items, excluding non-merchandise codes
    pub items: u64,
}

#[derive(Debug, FromQueryResult)]
struct GroupRow {
    name: Option<String>,
    revenue: Option<f64>,
    tickets: i64,
    items: Option<i64>,
}

async fn group_totals(
    db: &DatabaseConnection,
    query: Select<SalesRecord>,
    column: sales_record::Column,
    rules: &CatalogRules,
) -> Result<Vec<GroupTotals>> {
    let rows = query
        .select_only()
        .column_as(column, "name")
        .column_as(sum_of(sales_record::Column::Amount), "revenue")
        .column_as(distinct_tickets_expr(), "tickets")
        .column_as(lines_excluding(rules.non_merchandise_line()), "items")
        .group_by(column)
        .into_model::<GroupRow>()
        .all(db)
        .await?;

    let mut groups: Vec<GroupTotals> = rows
        .into_iter()
        .map(|r| GroupTotals {
            name: name_or_unknown(r.name),
            revenue: r.revenue.unwrap_or_default(),
            tickets: to_count(r.tickets),
            items: r.items.map_or(0, to_count),
        })
        .collect();
    groups.sort_by(|a, b| {
        b.revenue
            .total_cmp(&a.revenue)
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(groups)
}

/// Revenue per product group, highest first.
pub async fn category_rollup(
    db: &DatabaseConnection,
    query: Select<SalesRecord>,
    rules: &CatalogRules,
) -> Result<Vec<GroupTotals>> {
    group_totals(db, query, sales_record::Column::ProductGroup, rules).await
}

/// Revenue per location, highest first.
pub async fn location_rollup(
    db: &DatabaseConnection,
    query: Select<SalesRecord>,
    rules: &CatalogRules,
) -> Result<Vec<GroupTotals>> {
    group_totals(db, query, sales_record::Column::Location, rules).await
}

/// One group's current figures next to the prior period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupComparison {
    /// Group value
    pub name: String,
    /// Current revenue
    pub revenue: f64,
    /// Prior revenue
    pub previous_revenue: f64,
    /// Absolute revenue change
    pub revenue_change: f64,
    /// Revenue change in percent
    pub revenue_change_pct: f64,
    /// Current tickets
    pub tickets: u64,
    /// Prior tickets
    pub previous_tickets: u64,
    /// Ticket change in percent
    pub tickets_change_pct: f64,
}

/// Joins rollups by name, keeping the current order and at most `limit` groups.
#[must_use]
pub fn compare_groups(
    current: &[GroupTotals],
    previous: &[GroupTotals],
    limit: Option<usize>,
) -> Vec<GroupComparison> {
    let prior: HashMap<&str, &GroupTotals> =
        previous.iter().map(|g| (g.name.as_str(), g)).collect();

    current
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|g| {
            let (previous_revenue, previous_tickets) = prior
                .get(g.name.as_str())
                .map_or((0.0, 0), |p| (p.revenue, p.tickets));
            GroupComparison {
                name: g.name.clone(),
                revenue: g.revenue,
                previous_revenue,
                revenue_change: g.revenue - previous_revenue,
                revenue_change_pct: percent_change(g.revenue, previous_revenue),
                tickets: g.tickets,
                previous_tickets,
                tickets_change_pct: percent_change(g.tickets as f64, previous_tickets as f64),
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Category leaders
// ---------------------------------------------------------------------------

/// Revenue for one (category, employee) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryEmployeeTotals {
    /// Product group
    pub category: String,
    /// Employee name
    pub employee: String,
    /// Revenue
    pub revenue: f64,
    /// Distinct tickets
    pub tickets: u64,
}

#[derive(Debug, FromQueryResult)]
struct CategoryEmployeeRow {
    category: Option<String>,
    employee: Option<String>,
    revenue: Option<f64>,
    tickets: i64,
}

/// One grouped pass over (category, employee).
pub async fn category_employee_totals(
    db: &DatabaseConnection,
    query: Select<SalesRecord>,
) -> Result<Vec<CategoryEmployeeTotals>> {
    let rows = query
        .select_only()
        .column_as(sales_record::Column::ProductGroup, "category")
        .column_as(sales_record::Column::EmployeeName, "employee")
        .column_as(sum_of(sales_record::Column::Amount), "revenue")
        .column_as(distinct_tickets_expr(), "tickets")
        .group_by(sales_record::Column::ProductGroup)
        .group_by(sales_record::Column::EmployeeName)
        .into_model::<CategoryEmployeeRow>()
        .all(db)
        .await?;

    Ok(rows
        .into_iter()
        .map(|r| CategoryEmployeeTotals {
            category: name_or_unknown(r.category),
            employee: name_or_unknown(r.employee),
            revenue: r.revenue.unwrap_or_default(),
            tickets: to_count(r.tickets),
        })
        .collect())
}

/// One employee's standing within a category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryLeader {
    /// Employee name
    pub employee: String,
    /// Current revenue in the category
    pub revenue: f64,
    /// Current tickets in the category
    pub tickets: u64,
    /// Prior revenue in the category
    pub previous_revenue: f64,
    /// Revenue change in percent
    pub revenue_change_pct: f64,
}

/// Top employees for one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryLeaders {
    /// Product group
    pub category: String,
    /// Category revenue
    pub revenue: f64,
    /// Best sellers, highest revenue first
    pub leaders: Vec<CategoryLeader>,
}

/// Top `limit` employees for each of the given categories.
#[must_use]
pub fn category_leaders(
    categories: &[GroupTotals],
    current: &[CategoryEmployeeTotals],
    previous: &[CategoryEmployeeTotals],
    limit: usize,
) -> Vec<CategoryLeaders> {
    let prior: HashMap<(&str, &str), f64> = previous
        .iter()
        .map(|p| ((p.category.as_str(), p.employee.as_str()), p.revenue))
        .collect();

    categories
        .iter()
        .map(|category| {
            let mut rows: Vec<&CategoryEmployeeTotals> = current
                .iter()
                .filter(|row| row.category == category.name)
                .collect();
            rows.sort_by(|a, b| {
                b.revenue
                    .total_cmp(&a.revenue)
                    .then_with(|| a.employee.cmp(&b.employee))
            });
            let leaders = rows
                .into_iter()
                .take(limit)
                .map(|row| {
                    let previous_revenue = prior
                        .get(&(row.category.as_str(), row.employee.as_str()))
                        .copied()
                        .unwrap_or_default();
                    CategoryLeader {
                        employee: row.employee.clone(),
                        revenue: row.revenue,
                        tickets: row.tickets,
                        previous_revenue,
                        revenue_change_pct: percent_change(row.revenue, previous_revenue),
                    }
                })
                .collect();
            CategoryLeaders {
                category: category.name.clone(),
                revenue: category.revenue,
                leaders,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

/// Per-product totals, the input to scoring.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductStats {
    /// Product name
    pub name: String,
    /// A product code seen for this name
    pub code: Option<String>,
    /// Revenue
    pub revenue: f64,
    /// Line items sold
    pub quantity: u64,
    /// Distinct tickets containing the product
    pub tickets: u64,
    /// Average line amount
    pub avg_value: f64,
    /// Most recent sale in the window
    pub last_sold_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromQueryResult)]
struct ProductRow {
    name: Option<String>,
    code: Option<String>,
    revenue: Option<f64>,
    quantity: i64,
    tickets: i64,
    avg_value: Option<f64>,
    last_sold_at: Option<DateTimeUtc>,
}

/// One grouped pass over (product name, product code), sorted by revenue descending.
///
/// Two codes sharing a name stay separate products.
pub async fn product_rollup(
    db: &DatabaseConnection,
    query: Select<SalesRecord>,
) -> Result<Vec<ProductStats>> {
    let rows = query
        .select_only()
        .column_as(sales_record::Column::ProductName, "name")
        .column_as(sales_record::Column::ProductId, "code")
        .column_as(sum_of(sales_record::Column::Amount), "revenue")
        .column_as(
            SimpleExpr::from(Func::count(Expr::col(sales_record::Column::Id))),
            "quantity",
        )
        .column_as(distinct_tickets_expr(), "tickets")
        .column_as(
            SimpleExpr::from(Func::avg(Expr::col(sales_record::Column::Amount))),
            "avg_value",
        )
        .column_as(
            SimpleExpr::from(Func::max(Expr::col(sales_record::Column::SoldAt))),
            "last_sold_at",
        )
        .group_by(sales_record::Column::ProductName)
        .group_by(sales_record::Column::ProductId)
        .into_model::<ProductRow>()
        .all(db)
        .await?;

    let mut products: Vec<ProductStats> = rows
        .into_iter()
        .map(|r| ProductStats {
            name: name_or_unknown(r.name),
            code: r.code,
            revenue: r.revenue.unwrap_or_default(),
            quantity: to_count(r.quantity),
            tickets: to_count(r.tickets),
            avg_value: r.avg_value.unwrap_or_default(),
            last_sold_at: r.last_sold_at,
        })
        .collect();
    products.sort_by(|a, b| {
        b.revenue
            .total_cmp(&a.revenue)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.code.cmp(&b.code))
    });
    Ok(products)
}

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

#[derive(Debug, FromQueryResult)]
struct LatestRow {
    value: Option<DateTimeUtc>,
}

#[derive(Debug, FromQueryResult)]
struct ValueRow {
    value: Option<String>,
}

/// Latest sale timestamp in `query`, if any.
pub async fn latest_sale(
    db: &DatabaseConnection,
    query: Select<SalesRecord>,
) -> Result<Option<DateTime<Utc>>> {
    let row = query
        .select_only()
        .column_as(
            SimpleExpr::from(Func::max(Expr::col(sales_record::Column::SoldAt))),
            "value",
        )
        .into_model::<LatestRow>()
        .one(db)
        .await?;
    Ok(row.and_then(|r| r.value))
}

/// The `limit` most recent line items.
pub async fn recent_records(
    db: &DatabaseConnection,
    query: Select<SalesRecord>,
    limit: u64,
) -> Result<Vec<sales_record::Model>> {
    Ok(query
        .order_by_desc(sales_record::Column::SoldAt)
        .order_by_desc(sales_record::Column::Id)
        .limit(limit)
        .all(db)
        .await?)
}

/// Sorted distinct non-empty values of `column`.
pub async fn distinct_values(
    db: &DatabaseConnection,
    query: Select<SalesRecord>,
    column: sales_record::Column,
) -> Result<Vec<String>> {
    let rows = query
        .select_only()
        .column_as(column, "value")
        .distinct()
        .order_by_asc(column)
        .into_model::<ValueRow>()
        .all(db)
        .await?;
    Ok(rows
        .into_iter()
        .filter_map(|r| r.value.filter(|v| !v.is_empty()))
        .collect())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::float_cmp, clippy::unwrap_used)]
    use super::*;
    use crate::{
        core::access::LocationScope,
        core::period::Period,
        test_utils::{insert_sales, sale, setup_test_db, test_context, three_ticket_sales},
    };

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn round2(value: f64) -> f64 {
        (value * 100.0).round() / 100.0
    }

    fn round1(value: f64) -> f64 {
        (value * 10.0).round() / 10.0
    }

    #[tokio::test]
    async fn test_three_ticket_scenario() -> Result<()> {
        let db = setup_test_db().await?;
        insert_sales(&db, three_ticket_sales()).await?;
        let ctx = test_context(LocationScope::Unrestricted);
        let window = ctx.window(Period::Current).unwrap();

        let totals = summary_totals(
            &db,
            ctx.records(window),
            &ctx.rules,
            Duration::from_secs(5),
        )
        .await?;
        assert_eq!(totals.tickets, 3);
        assert!(!totals.tickets_estimated);
        assert_eq!(totals.items, 6);
        assert_eq!(round2(totals.revenue), 320.0);
        assert_eq!(round2(totals.avg_basket()), 106.67);

        let tickets =
            ticket_totals(&db, ctx.sellable(window), ctx.rules.non_qualifying_line()).await?;
        let breakdown = classify_tickets(&tickets, utc());
        assert_eq!(breakdown.overall.classified_tickets, 3);
        assert_eq!(round1(breakdown.overall.single_item_pct()), 33.3);
        assert_eq!(round1(breakdown.overall.cross_sell_pct()), 33.3);
        assert_eq!(round1(breakdown.overall.two_item_pct()), 33.3);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_window_returns_defaults() -> Result<()> {
        let db = setup_test_db().await?;
        let ctx = test_context(LocationScope::Unrestricted);
        let window = ctx.window(Period::Current).unwrap();

        let totals =
            summary_totals(&db, ctx.records(window), &ctx.rules, Duration::from_secs(5)).await?;
        assert_eq!(totals, SummaryTotals::default());
        assert_eq!(totals.avg_basket(), 0.0);
        assert_eq!(totals.discount_share(), 0.0);
        assert_eq!(totals.conversion_rate(), 0.0);

        let tickets =
            ticket_totals(&db, ctx.sellable(window), ctx.rules.non_qualifying_line()).await?;
        assert!(tickets.is_empty());
        assert_eq!(classify_tickets(&tickets, utc()), CrossSellBreakdown::default());
        assert_eq!(monthly_series(&tickets, utc()), MonthlySeries::default());
        assert!(daily_totals(&tickets, utc()).is_empty());

        let distribution = ticket_distribution(&[]);
        assert_eq!(distribution.total_tickets, 0);
        assert_eq!(distribution.median, 0.0);
        assert!(distribution.buckets.iter().all(|b| b.count == 0 && b.percentage == 0.0));

        assert!(employee_rollup(&db, ctx.records(window), &ctx.rules).await?.is_empty());
        assert!(category_rollup(&db, ctx.records(window), &ctx.rules).await?.is_empty());
        assert!(product_rollup(&db, ctx.merchandise(window)).await?.is_empty());
        assert_eq!(active_location_count(&db, ctx.records(window)).await?, 0);
        assert!(latest_sale(&db, ctx.records(window)).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_non_merchandise_and_promo_lines() -> Result<()> {
        let db = setup_test_db().await?;
        let mut bag = sale(10, "T9", "2025-03-05T12:00:00Z", 0.5);
        bag.product_id = Some("M9157".to_string());
        let mut promo = sale(11, "T9", "2025-03-05T12:00:00Z", 4.0);
        promo.product_group = Some("POP".to_string());
        let lipstick = sale(12, "T9", "2025-03-05T12:00:00Z", 40.0);
        insert_sales(&db, vec![bag, promo, lipstick]).await?;

        let ctx = test_context(LocationScope::Unrestricted);
        let window = ctx.window(Period::Current).unwrap();

        let totals =
            summary_totals(&db, ctx.records(window), &ctx.rules, Duration::from_secs(5)).await?;
        // the bag is revenue but not an item
        assert_eq!(totals.items, 2);
        assert_eq!(round2(totals.revenue), 44.5);

        let tickets =
            ticket_totals(&db, ctx.sellable(window), ctx.rules.non_qualifying_line()).await?;
        assert_eq!(tickets.len(), 1);
        assert_eq!(tickets[0].lines, 3);
        assert_eq!(tickets[0].items, 1);
        assert_eq!(classify_tickets(&tickets, utc()).overall.single_item_tickets, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_excluded_locations_only_hidden_from_aggregates() -> Result<()> {
        let db = setup_test_db().await?;
        let mut test_row = sale(20, "T20", "2025-03-02T09:00:00Z", 99.0);
        test_row.location = "სატესტო".to_string();
        insert_sales(&db, vec![test_row, sale(21, "T21", "2025-03-02T09:00:00Z", 10.0)]).await?;

        let ctx = test_context(LocationScope::Unrestricted);
        let window = ctx.window(Period::Current).unwrap();

        let aggregate =
            summary_totals(&db, ctx.records(window), &ctx.rules, Duration::from_secs(5)).await?;
        let raw = summary_totals(
            &db,
            ctx.unsuppressed(window),
            &ctx.rules,
            Duration::from_secs(5),
        )
        .await?;
        assert_eq!(aggregate.tickets, 1);
        assert_eq!(raw.tickets, 2);
        assert_eq!(active_location_count(&db, ctx.records(window)).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_every_aggregate_honours_location_scope() -> Result<()> {
        let db = setup_test_db().await?;
        let mut elsewhere = sale(30, "T30", "2025-03-03T09:00:00Z", 500.0);
        elsewhere.location = "Batumi".to_string();
        elsewhere.employee_name = Some("Giorgi".to_string());
        let mut rows = three_ticket_sales();
        rows.push(elsewhere);
        insert_sales(&db, rows).await?;

        let ctx = test_context(LocationScope::Only(vec!["Tbilisi Mall".to_string()]));
        let window = ctx.window(Period::Current).unwrap();
        let budget = Duration::from_secs(5);

        let totals = summary_totals(&db, ctx.records(window), &ctx.rules, budget).await?;
        let tickets = ticket_totals(&db, ctx.records(window), ctx.rules.non_merchandise_line())
            .await?;
        let employees = employee_rollup(&db, ctx.records(window), &ctx.rules).await?;
        let locations = location_rollup(&db, ctx.records(window), &ctx.rules).await?;
        let products = product_rollup(&db, ctx.merchandise(window)).await?;

        assert_eq!(round2(totals.revenue), 320.0);
        assert_eq!(tickets.len(), 3);
        assert!(employees.iter().all(|e| e.name != "Giorgi"));
        assert_eq!(locations.len(), 1);
        assert_eq!(round2(products.iter().map(|p| p.revenue).sum::<f64>()), 320.0);
        Ok(())
    }

    #[test]
    fn test_settle_ticket_count_degrades_on_timeout() {
        let timed_out = Err(Error::AggregationTimeout {
            section: "distinct ticket count".to_string(),
        });
        assert_eq!(settle_ticket_count(timed_out, 42).unwrap(), (42, true));
        assert_eq!(settle_ticket_count(Ok(7), 42).unwrap(), (7, false));

        let other = Err(Error::EmptyResult {
            section: "x".to_string(),
        });
        assert!(settle_ticket_count(other, 42).is_err());
    }

    #[test]
    fn test_distribution_index_statistics() {
        let distribution = ticket_distribution(&[40.0, 10.0, 30.0, 20.0]);
        assert_eq!(distribution.median, 30.0);
        assert_eq!(distribution.p25, 20.0);
        assert_eq!(distribution.p75, 40.0);
        assert_eq!(distribution.mean, 25.0);
        assert_eq!(distribution.buckets[0].count, 4);
        assert_eq!(distribution.buckets[0].percentage, 100.0);
    }

    #[test]
    fn test_distribution_bucket_edges() {
        let distribution = ticket_distribution(&[49.99, 50.0, 999.0, 1000.0, 2500.0]);
        let counts: Vec<u64> = distribution.buckets.iter().map(|b| b.count).collect();
        assert_eq!(counts, vec![1, 1, 0, 0, 0, 0, 1, 2]);
    }

    #[test]
    fn test_cross_sell_shares_never_exceed_total() {
        let mut stats = CrossSellStats::default();
        for items in [1, 2, 2, 3, 7, 1, 0, 4, 2] {
            stats.record(items);
            assert!(stats.single_item_pct() + stats.cross_sell_pct() <= 100.0 + 1e-9);
        }
        assert_eq!(stats.classified_tickets, 8);
        assert_eq!(stats.two_item_tickets, 3);
    }

    #[test]
    fn test_align_daily_zero_fills_missing_days() {
        let mut current = BTreeMap::new();
        current.insert(
            (3, 2),
            DayTotals {
                revenue: 100.0,
                tickets: 2,
                items: 5,
            },
        );
        let mut previous = BTreeMap::new();
        previous.insert(
            (2, 28),
            DayTotals {
                revenue: 30.0,
                tickets: 1,
                items: 1,
            },
        );

        let aligned = align_daily(&current, &previous, &BTreeMap::new(), &BTreeMap::new());
        assert_eq!(aligned.labels, vec!["2/28".to_string(), "3/2".to_string()]);
        assert_eq!(aligned.revenue.current, vec![0.0, 100.0]);
        assert_eq!(aligned.revenue.previous, vec![30.0, 0.0]);
        assert_eq!(aligned.basket.current, vec![0.0, 50.0]);
        assert_eq!(aligned.tickets.previous.len(), aligned.labels.len());
    }

    #[test]
    fn test_compare_employees_defaults_new_staff_to_zero() {
        let current = vec![EmployeeStats {
            name: "Nino".to_string(),
            location: None,
            totals: SummaryTotals {
                revenue: 200.0,
                tickets: 4,
                items: 8,
                ..SummaryTotals::default()
            },
        }];
        let compared = compare_employees(&current, &[], &HashMap::new());
        assert_eq!(compared[0].previous_revenue, 0.0);
        assert_eq!(compared[0].revenue_change_pct, 0.0);
        assert_eq!(compared[0].avg_basket, 50.0);
        assert_eq!(compared[0].items_per_ticket, 2.0);
    }

    #[test]
    fn test_compare_groups_limit_and_join() {
        let group = |name: &str, revenue: f64| GroupTotals {
            name: name.to_string(),
            revenue,
            tickets: 1,
            items: 1,
        };
        let current = vec![group("A", 300.0), group("B", 200.0), group("C", 100.0)];
        let previous = vec![group("B", 100.0)];
        let compared = compare_groups(&current, &previous, Some(2));
        assert_eq!(compared.len(), 2);
        assert_eq!(compared[1].revenue_change, 100.0);
        assert_eq!(compared[1].revenue_change_pct, 100.0);
        assert_eq!(compared[0].previous_revenue, 0.0);
    }

    #[test]
    fn test_monthly_series_and_top_tickets() {
        let ticket = |id: &str, at: &str, revenue: f64| TicketAggregate {
            ticket_id: id.to_string(),
            revenue,
            lines: 1,
            items: 1,
            sold_at: Some(DateTime::parse_from_rfc3339(at).unwrap().with_timezone(&Utc)),
            location: None,
            employee: None,
        };
        let tickets = vec![
            ticket("a", "2025-01-10T10:00:00Z", 10.0),
            ticket("b", "2025-01-11T10:00:00Z", 30.0),
            ticket("c", "2025-12-31T10:00:00Z", 30.0),
        ];
        let monthly = monthly_series(&tickets, utc());
        assert_eq!(monthly.tickets[0], 2);
        assert_eq!(monthly.tickets[11], 1);
        assert_eq!(monthly.basket()[0], 20.0);

        let top = top_tickets(&tickets, 2);
        assert_eq!(top[0].ticket_id, "b");
        assert_eq!(top[1].ticket_id, "c");
    }

    #[tokio::test]
    async fn test_ticket_spanning_midnight_counts_on_opening_day() -> Result<()> {
        let db = setup_test_db().await?;
        insert_sales(
            &db,
            vec![
                sale(1, "T1", "2025-03-04T23:58:00Z", 20.0),
                sale(2, "T1", "2025-03-05T00:01:00Z", 30.0),
            ],
        )
        .await?;
        let ctx = test_context(LocationScope::Unrestricted);
        let window = ctx.window(Period::Current).unwrap();

        let tickets =
            ticket_totals(&db, ctx.records(window), ctx.rules.non_merchandise_line()).await?;
        let days = daily_totals(&tickets, utc());
        assert_eq!(days.len(), 1);
        let opened = days[&(3, 4)];
        assert_eq!(opened.tickets, 1);
        assert_eq!(opened.items, 2);
        assert_eq!(round2(opened.revenue), 50.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_products_sharing_a_name_stay_separate() -> Result<()> {
        let db = setup_test_db().await?;
        let mut first = sale(1, "T1", "2025-03-04T10:00:00Z", 20.0);
        first.product_name = Some("Lip Balm".to_string());
        first.product_id = Some("A1".to_string());
        let mut second = sale(2, "T2", "2025-03-05T10:00:00Z", 35.0);
        second.product_name = Some("Lip Balm".to_string());
        second.product_id = Some("B2".to_string());
        insert_sales(&db, vec![first, second]).await?;
        let ctx = test_context(LocationScope::Unrestricted);
        let window = ctx.window(Period::Current).unwrap();

        let products = product_rollup(&db, ctx.merchandise(window)).await?;
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].code.as_deref(), Some("B2"));
        assert_eq!(round2(products[0].revenue), 35.0);
        assert_eq!(products[1].code.as_deref(), Some("A1"));
        assert!(products.iter().all(|p| p.name == "Lip Balm"));
        Ok(())
    }
}
