//! Plan versus actual.
//!
//! Monthly targets per location are spread evenly over the days of their month,
//! then rolled up next to the actual sales into daily, weekly or monthly buckets
//! for the selected year and the one before it.
#![allow(clippy::cast_precision_loss)]

use crate::{
    config::AppConfig,
    core::{
        access::{ALL_LOCATIONS, AccessProfile, LocationScope},
        aggregate::sum_of,
        filter::{CatalogRules, FilterContext, Selector},
        metrics::{average_basket, percent_change, ratio},
        period::{ComparisonYears, ReportPeriod, Window},
    },
    entities::{SalesRecord, sales_record},
    errors::{Error, Result},
};
use chrono::{Datelike, FixedOffset, NaiveDate};
use sea_orm::{
    DatabaseConnection, FromQueryResult, QuerySelect, Select,
    prelude::*,
    sea_query::{Expr, Func, SimpleExpr},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Read;
use tracing::{debug, info, warn};

/// Share of the plan reported as the lower target line.
pub const PLAN_FLOOR: f64 = 0.85;

/// One location's target for one month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanTarget {
    /// Location the target belongs to
    pub location: String,
    /// Calendar year
    pub year: i32,
    /// Month, 1 through 12
    pub month: u32,
    /// Planned revenue for the whole month
    pub turnover: f64,
    /// Planned ticket count for the whole month
    pub tickets: f64,
    /// Planned revenue per ticket
    pub basket: f64,
}

/// Reads targets from CSV with a `location,year,month,turnover,tickets,basket` header.
pub fn load_plan_targets<R: Read>(reader: R) -> Result<Vec<PlanTarget>> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut targets = Vec::new();
    for target in reader.deserialize() {
        targets.push(target?);
    }
    debug!("Loaded {} plan targets", targets.len());
    Ok(targets)
}

/// Bucket size of the plan series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// One bucket per day
    #[default]
    Daily,
    /// One bucket per ISO week
    Weekly,
    /// One bucket per calendar month
    Monthly,
}

impl Granularity {
    /// Parses a granularity token; anything unrecognised is daily.
    #[must_use]
    pub fn parse(token: Option<&str>) -> Self {
        match token.map(str::trim) {
            Some(t) if t.eq_ignore_ascii_case("weekly") => Self::Weekly,
            Some(t) if t.eq_ignore_ascii_case("monthly") => Self::Monthly,
            _ => Self::Daily,
        }
    }

    fn key(self, day: NaiveDate) -> (i32, u32) {
        match self {
            Self::Daily => (day.year(), day.ordinal()),
            Self::Weekly => {
                let week = day.iso_week();
                (week.year(), week.week())
            }
            Self::Monthly => (day.year(), day.month()),
        }
    }

    fn label(self, day: NaiveDate) -> String {
        match self {
            Self::Daily => day.format("%b %d").to_string(),
            Self::Weekly => {
                let week = day.iso_week();
                format!("W{} '{:02}", week.week(), week.year().rem_euclid(100))
            }
            Self::Monthly => format!("{} '{:02}", day.format("%b"), day.year().rem_euclid(100)),
        }
    }
}

/// First and last day of a month, or `None` for an invalid month.
fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first, next.pred_opt()?))
}

fn days_between(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |day| *day <= end)
}

/// A month's target spread onto one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanDay {
    /// Location
    pub location: String,
    /// Day
    pub date: NaiveDate,
    /// Revenue share of the day
    pub turnover: f64,
    /// Ticket share of the day
    pub tickets: f64,
    /// Planned basket, constant over the month
    pub basket: f64,
}

/// Spreads every target in `[start, end]` evenly over the days of its month.
///
/// `location` keeps only that location's targets; `None` keeps all of them.
/// Targets naming an invalid month are skipped.
#[must_use]
pub fn expand_targets(
    targets: &[PlanTarget],
    location: Option<&str>,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<PlanDay> {
    let mut days = Vec::new();
    for target in targets {
        if location.is_some_and(|l| l != target.location) {
            continue;
        }
        let Some((first, last)) = month_bounds(target.year, target.month) else {
            warn!(
                "Skipping plan target for {} with invalid month {}-{}",
                target.location, target.year, target.month
            );
            continue;
        };
        let length = f64::from(last.day());
        days.extend(
            days_between(first.max(start), last.min(end)).map(|date| PlanDay {
                location: target.location.clone(),
                date,
                turnover: target.turnover / length,
                tickets: target.tickets / length,
                basket: target.basket,
            }),
        );
    }
    days
}

/// Sales for one location on one local day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActualDay {
    /// Location
    pub location: String,
    /// Local day
    pub date: NaiveDate,
    /// Revenue
    pub revenue: f64,
    /// Tickets opened that day
    pub tickets: u64,
}

#[derive(Debug, FromQueryResult)]
struct LocationTicketRow {
    location: String,
    revenue: Option<f64>,
    sold_at: Option<DateTimeUtc>,
}

/// Revenue and tickets per (location, local day) in one grouped pass.
///
/// Rows are grouped by (location, ticket) and each ticket lands on the day of
/// its earliest line, the same rule the dashboard's daily series uses.
pub async fn actual_days(
    db: &DatabaseConnection,
    query: Select<SalesRecord>,
    tz: FixedOffset,
) -> Result<Vec<ActualDay>> {
    let rows = query
        .select_only()
        .column(sales_record::Column::Location)
        .column_as(sum_of(sales_record::Column::Amount), "revenue")
        .column_as(
            SimpleExpr::from(Func::min(Expr::col(sales_record::Column::SoldAt))),
            "sold_at",
        )
        .group_by(sales_record::Column::Location)
        .group_by(sales_record::Column::TicketId)
        .into_model::<LocationTicketRow>()
        .all(db)
        .await?;

    debug!("Plan actuals grouped {} location tickets", rows.len());

    let mut days: BTreeMap<(String, NaiveDate), (f64, u64)> = BTreeMap::new();
    for row in rows {
        let Some(sold_at) = row.sold_at else {
            continue;
        };
        let date = sold_at.with_timezone(&tz).date_naive();
        let day = days.entry((row.location, date)).or_default();
        day.0 += row.revenue.unwrap_or_default();
        day.1 += 1;
    }

    Ok(days
        .into_iter()
        .map(|((location, date), (revenue, tickets))| ActualDay {
            location,
            date,
            revenue,
            tickets,
        })
        .collect())
}

/// Plan and actual values for one bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlanBucket {
    /// Display label, e.g. `Mar 05`, `W10 '25` or `Mar '25`
    pub label: String,
    /// Planned revenue
    pub plan: f64,
    /// Lower target line
    pub plan_85: f64,
    /// Actual revenue
    pub actual: f64,
    /// Planned tickets
    pub tickets_plan: f64,
    /// Actual tickets
    pub tickets_actual: u64,
    /// Mean of the planned daily baskets
    pub basket_plan: f64,
    /// Actual revenue per ticket
    pub basket_actual: f64,
}

#[derive(Default)]
struct BucketTotals {
    plan: f64,
    tickets_plan: f64,
    basket_sum: f64,
    basket_days: u32,
    actual: f64,
    tickets_actual: u64,
}

/// Rolls plan and actual days into one bucket per `granularity` step of `[start, end]`.
///
/// Every bucket in the range is present, in order, even when it has no plan or sales.
#[must_use]
pub fn roll_up(
    plan: &[PlanDay],
    actual: &[ActualDay],
    granularity: Granularity,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<PlanBucket> {
    let mut labels = Vec::new();
    let mut index = HashMap::new();
    for day in days_between(start, end) {
        let key = granularity.key(day);
        if !index.contains_key(&key) {
            index.insert(key, labels.len());
            labels.push(granularity.label(day));
        }
    }

    let mut totals: Vec<BucketTotals> = labels.iter().map(|_| BucketTotals::default()).collect();
    for day in plan {
        if let Some(&i) = index.get(&granularity.key(day.date)) {
            let bucket = &mut totals[i];
            bucket.plan += day.turnover;
            bucket.tickets_plan += day.tickets;
            bucket.basket_sum += day.basket;
            bucket.basket_days += 1;
        }
    }
    for day in actual {
        if let Some(&i) = index.get(&granularity.key(day.date)) {
            totals[i].actual += day.revenue;
            totals[i].tickets_actual += day.tickets;
        }
    }

    labels
        .into_iter()
        .zip(totals)
        .map(|(label, t)| PlanBucket {
            label,
            plan: t.plan,
            plan_85: t.plan * PLAN_FLOOR,
            actual: t.actual,
            tickets_plan: t.tickets_plan,
            tickets_actual: t.tickets_actual,
            basket_plan: ratio(t.basket_sum, f64::from(t.basket_days)),
            basket_actual: average_basket(t.actual, t.tickets_actual),
        })
        .collect()
}

/// Revenue against plan and against the lower target line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RevenuePlanKpis {
    /// Planned revenue
    pub plan: f64,
    /// Lower target line
    pub plan_85: f64,
    /// Actual revenue
    pub actual: f64,
    /// Actual as a percentage of plan
    pub achievement_pct: f64,
    /// Actual minus plan
    pub variance: f64,
    /// Actual minus the lower target line
    pub variance_85: f64,
    /// Variance as a percentage of plan
    pub variance_pct: f64,
    /// Lower-line variance as a percentage of the lower line
    pub variance_85_pct: f64,
}

/// A metric's plan against its actual value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PlanKpi {
    /// Planned value
    pub plan: f64,
    /// Actual value
    pub actual: f64,
    /// Actual as a percentage of plan
    pub achievement_pct: f64,
    /// Actual minus plan
    pub variance: f64,
    /// Variance as a percentage of plan
    pub variance_pct: f64,
}

impl PlanKpi {
    fn new(plan: f64, actual: f64) -> Self {
        let variance = actual - plan;
        Self {
            plan,
            actual,
            achievement_pct: ratio(actual, plan) * 100.0,
            variance,
            variance_pct: ratio(variance, plan) * 100.0,
        }
    }
}

/// Headline figures over a whole plan series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PlanKpis {
    /// Revenue
    pub revenue: RevenuePlanKpis,
    /// Tickets
    pub tickets: PlanKpi,
    /// Basket, averaged over buckets
    pub basket: PlanKpi,
}

impl PlanKpis {
    /// Totals revenue and tickets over `buckets`; baskets are the mean over buckets.
    #[must_use]
    pub fn from_buckets(buckets: &[PlanBucket]) -> Self {
        let plan: f64 = buckets.iter().map(|b| b.plan).sum();
        let plan_85: f64 = buckets.iter().map(|b| b.plan_85).sum();
        let actual: f64 = buckets.iter().map(|b| b.actual).sum();
        let variance = actual - plan;
        let variance_85 = actual - plan_85;

        let tickets_plan: f64 = buckets.iter().map(|b| b.tickets_plan).sum();
        let tickets_actual: u64 = buckets.iter().map(|b| b.tickets_actual).sum();

        let count = buckets.len() as f64;
        let basket_plan = ratio(buckets.iter().map(|b| b.basket_plan).sum(), count);
        let basket_actual = ratio(buckets.iter().map(|b| b.basket_actual).sum(), count);

        Self {
            revenue: RevenuePlanKpis {
                plan,
                plan_85,
                actual,
                achievement_pct: ratio(actual, plan) * 100.0,
                variance,
                variance_85,
                variance_pct: ratio(variance, plan) * 100.0,
                variance_85_pct: ratio(variance_85, plan_85) * 100.0,
            },
            tickets: PlanKpi::new(tickets_plan, tickets_actual as f64),
            basket: PlanKpi::new(basket_plan, basket_actual),
        }
    }
}

/// One metric for one location, this year and last.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MetricComparison {
    /// Plan this year
    pub plan: f64,
    /// Actual this year
    pub actual: f64,
    /// Plan last year
    pub plan_previous: f64,
    /// Actual last year
    pub actual_previous: f64,
    /// Actual minus plan
    pub variance: f64,
    /// Actual as a percentage of plan
    pub achievement_pct: f64,
    /// Actual growth over last year's actual
    pub yoy_growth_pct: f64,
    /// Plan growth over last year's plan
    pub plan_yoy_growth_pct: f64,
}

impl MetricComparison {
    fn new(plan: f64, actual: f64, plan_previous: f64, actual_previous: f64) -> Self {
        Self {
            plan,
            actual,
            plan_previous,
            actual_previous,
            variance: actual - plan,
            achievement_pct: ratio(actual, plan) * 100.0,
            yoy_growth_pct: percent_change(actual, actual_previous),
            plan_yoy_growth_pct: percent_change(plan, plan_previous),
        }
    }
}

/// Plan performance of one location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationPlanRow {
    /// Location
    pub location: String,
    /// Revenue
    pub turnover: MetricComparison,
    /// Tickets
    pub tickets: MetricComparison,
    /// Revenue per ticket
    pub basket: MetricComparison,
}

#[derive(Default)]
struct LocationTotals {
    turnover: f64,
    tickets: f64,
    basket_sum: f64,
    basket_days: u32,
    revenue: f64,
    ticket_count: u64,
}

impl LocationTotals {
    fn plan_basket(&self) -> f64 {
        ratio(self.basket_sum, f64::from(self.basket_days))
    }

    fn actual_basket(&self) -> f64 {
        average_basket(self.revenue, self.ticket_count)
    }
}

fn location_totals(plan: &[PlanDay], actual: &[ActualDay]) -> HashMap<String, LocationTotals> {
    let mut totals: HashMap<String, LocationTotals> = HashMap::new();
    for day in plan {
        let t = totals.entry(day.location.clone()).or_default();
        t.turnover += day.turnover;
        t.tickets += day.tickets;
        t.basket_sum += day.basket;
        t.basket_days += 1;
    }
    for day in actual {
        let t = totals.entry(day.location.clone()).or_default();
        t.revenue += day.revenue;
        t.ticket_count += day.tickets;
    }
    totals
}

/// Per-location plan performance for every location planned this year,
/// best revenue achievement first.
#[must_use]
pub fn location_performance(
    plan: &[PlanDay],
    actual: &[ActualDay],
    plan_previous: &[PlanDay],
    actual_previous: &[ActualDay],
) -> Vec<LocationPlanRow> {
    let planned: BTreeSet<&str> = plan.iter().map(|d| d.location.as_str()).collect();
    let current = location_totals(plan, actual);
    let previous = location_totals(plan_previous, actual_previous);
    let empty = LocationTotals::default();

    let mut rows: Vec<LocationPlanRow> = planned
        .into_iter()
        .map(|location| {
            let c = current.get(location).unwrap_or(&empty);
            let p = previous.get(location).unwrap_or(&empty);
            LocationPlanRow {
                location: location.to_string(),
                turnover: MetricComparison::new(c.turnover, c.revenue, p.turnover, p.revenue),
                tickets: MetricComparison::new(
                    c.tickets,
                    c.ticket_count as f64,
                    p.tickets,
                    p.ticket_count as f64,
                ),
                basket: MetricComparison::new(
                    c.plan_basket(),
                    c.actual_basket(),
                    p.plan_basket(),
                    p.actual_basket(),
                ),
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        b.turnover
            .achievement_pct
            .total_cmp(&a.turnover.achievement_pct)
            .then_with(|| a.location.cmp(&b.location))
    });
    rows
}

/// The location a plan request resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSelection {
    /// Selected location; `None` means every location
    pub location: Option<String>,
    /// Advisory message when the requested location was replaced
    pub warning: Option<String>,
}

/// Resolves the single location a plan view shows.
///
/// Only admins may view every location at once. Anyone else asking for `"all"`
/// gets their first permitted location, and a location they may not see is
/// replaced by that same fallback with a warning.
pub fn resolve_plan_location(
    profile: &AccessProfile,
    requested: Option<&str>,
) -> Result<PlanSelection> {
    let requested = requested
        .map(str::trim)
        .filter(|l| !l.is_empty() && *l != ALL_LOCATIONS);
    match requested {
        None if profile.is_admin => Ok(PlanSelection {
            location: None,
            warning: None,
        }),
        Some(location) if profile.can_access_location(location) => Ok(PlanSelection {
            location: Some(location.to_string()),
            warning: None,
        }),
        _ => {
            let fallback = profile
                .allowed_locations
                .first()
                .ok_or_else(|| Error::AccessDenied {
                    reason: "no locations assigned".to_string(),
                })?;
            Ok(PlanSelection {
                location: Some(fallback.clone()),
                warning: requested.map(|l| format!("Access denied to location: {l}")),
            })
        }
    }
}

/// What a plan view asks for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRequest {
    /// Caller
    pub user_id: i64,
    /// Plan year; the latest configured year when absent
    pub year: Option<i32>,
    /// First month, 1 through 12; January when absent or invalid
    pub start_month: Option<u32>,
    /// Last month, 1 through 12; December when absent or invalid
    pub end_month: Option<u32>,
    /// One location, or `"all"`
    pub location: Option<String>,
    /// `daily`, `weekly` or `monthly`
    pub granularity: Option<String>,
}

/// Plan against actuals for a year and the year before it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanReport {
    /// Plan year
    pub year: i32,
    /// Year it is compared against
    pub previous_year: i32,
    /// First day of the first month
    pub start_date: NaiveDate,
    /// Last day of the last month
    pub end_date: NaiveDate,
    /// Selected location; `None` means every location
    pub location: Option<String>,
    /// Bucket size
    pub granularity: Granularity,
    /// Advisory message when the requested location was replaced
    pub warning: Option<String>,
    /// Locations the caller may pick
    pub available_locations: Vec<String>,
    /// This year's buckets
    pub current: Vec<PlanBucket>,
    /// Last year's buckets over the same months
    pub previous: Vec<PlanBucket>,
    /// Headline figures for this year
    pub kpis: PlanKpis,
    /// Per-location rows; only filled when every location is shown
    pub locations: Vec<LocationPlanRow>,
}

fn valid_month(month: Option<u32>, fallback: u32) -> u32 {
    month.filter(|m| (1..=12).contains(m)).unwrap_or(fallback)
}

fn months_of(year: i32, start_month: u32, end_month: u32) -> Result<(NaiveDate, NaiveDate)> {
    let invalid = || Error::InvalidDateInput {
        input: format!("{year}-{start_month:02}..{year}-{end_month:02}"),
    };
    let (start, _) = month_bounds(year, start_month).ok_or_else(invalid)?;
    let (_, end) = month_bounds(year, end_month).ok_or_else(invalid)?;
    Ok((start, end))
}

/// Builds the plan report for `profile` from `targets` and the stored sales.
pub async fn plan_vs_actual(
    db: &DatabaseConnection,
    config: &AppConfig,
    profile: &AccessProfile,
    request: &PlanRequest,
    targets: &[PlanTarget],
) -> Result<PlanReport> {
    let selection = resolve_plan_location(profile, request.location.as_deref())?;
    let granularity = Granularity::parse(request.granularity.as_deref());
    let tz = config.timezone();

    let year = request.year.unwrap_or(config.latest_year);
    let previous_year = year - 1;
    let mut start_month = valid_month(request.start_month, 1);
    let mut end_month = valid_month(request.end_month, 12);
    if start_month > end_month {
        std::mem::swap(&mut start_month, &mut end_month);
    }
    let (start, end) = months_of(year, start_month, end_month)?;
    let (prev_start, prev_end) = months_of(previous_year, start_month, end_month)?;

    let ctx = FilterContext {
        period: ReportPeriod::new(
            ComparisonYears {
                current: year,
                previous: previous_year,
                two_back: None,
            },
            start,
            end,
            tz,
        ),
        scope: selection
            .location
            .clone()
            .map_or(LocationScope::Unrestricted, |l| LocationScope::Only(vec![l])),
        category: Selector::All,
        product: Selector::All,
        campaign: Selector::All,
        employee: Selector::All,
        rules: CatalogRules::from(config),
    };

    let location = selection.location.as_deref();
    let plan = expand_targets(targets, location, start, end);
    let plan_previous = expand_targets(targets, location, prev_start, prev_end);
    let actual = actual_days(db, ctx.located(Window::days(start, end, tz)), tz).await?;
    let actual_previous =
        actual_days(db, ctx.located(Window::days(prev_start, prev_end, tz)), tz).await?;

    let current = roll_up(&plan, &actual, granularity, start, end);
    let previous = roll_up(&plan_previous, &actual_previous, granularity, prev_start, prev_end);
    let kpis = PlanKpis::from_buckets(&current);
    let locations = if location.is_none() {
        location_performance(&plan, &actual, &plan_previous, &actual_previous)
    } else {
        Vec::new()
    };

    let available_locations = if profile.is_admin {
        plan.iter()
            .map(|d| d.location.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    } else {
        profile.allowed_locations.clone()
    };

    info!(
        user_id = profile.user_id,
        year,
        buckets = current.len(),
        "Rendered plan report"
    );
    Ok(PlanReport {
        year,
        previous_year,
        start_date: start,
        end_date: end,
        location: selection.location,
        granularity,
        warning: selection.warning,
        available_locations,
        current,
        previous,
        kpis,
        locations,
    })
}
