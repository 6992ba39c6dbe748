//! The shared reporting pipeline.
//!
//! [`ReportEngine`] resolves one [`FilterContext`] per request and runs every
//! aggregation of a report against it, so the dashboard, employee, insight and
//! export outputs can never disagree about which rows they describe.
//!
//! Each report is split into [`Section`]s. A section that has no rows or whose
//! aggregation fails is marked as such without failing the report; only identity,
//! authorization and console-policy errors abort a request.

#![allow(clippy::cast_precision_loss)]

use crate::{
    config::AppConfig,
    core::{
        access::{AccessProfile, LocationScope, ResolvedLocations, resolve_locations},
        aggregate::{
            self, CategoryLeaders, CrossSellBreakdown, CrossSellStats, DailyComparison,
            EmployeeComparison, GroupComparison, GroupTotals, MonthlySeries, SummaryTotals,
            TicketAggregate, TicketDistribution,
        },
        cache::{CacheKey, ReportCache},
        console,
        export::ExportTable,
        filter::{CatalogRules, FilterContext, Selector},
        format::{format_currency, format_number, format_percent},
        loader::{self, LoadSummary},
        metrics::{Trend, percent_change},
        narrator::{Narration, PeriodSummary, narrate},
        period::{ComparisonMode, ReportPeriod, Window, clamp_end, requested_dates},
        plan::{self, PlanReport, PlanRequest, PlanTarget},
        profile::require_profile,
        scoring::{ProductLists, ProductScore, product_lists, score_products},
    },
    entities::sales_record,
    errors::{Error, Result},
};
use chrono::NaiveDate;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

const CATEGORY_LIMIT: usize = 10;
const NARRATOR_TOP: usize = 5;
const TOP_TICKET_LIMIT: usize = 10;
const RECENT_LIMIT: u64 = 20;
const LEADER_LIMIT: usize = 10;
const LOCATIONS_IN_TITLE: usize = 3;

/// Raw report parameters as received from a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportRequest {
    /// Caller identity
    pub user_id: i64,
    /// Comparison mode token
    pub comparison: Option<String>,
    /// `YYYY-MM-DD`
    pub start_date: Option<String>,
    /// `YYYY-MM-DD`
    pub end_date: Option<String>,
    /// Requested locations; empty or `"all"` means every permitted one
    pub locations: Vec<String>,
    /// Product group selector
    pub category: Option<String>,
    /// Product name selector
    pub product: Option<String>,
    /// Campaign name selector
    pub campaign: Option<String>,
    /// Employee name selector
    pub employee: Option<String>,
}

/// Outcome of one report section.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Section<T> {
    /// Computed
    Ready(T),
    /// The filters matched no rows for this section
    NoData,
    /// The aggregation failed or timed out
    Unavailable(String),
}

impl<T> Section<T> {
    /// Turns an aggregation result into a section.
    ///
    /// Request-fatal errors are passed through; [`Error::EmptyResult`] becomes
    /// [`Section::NoData`]; anything else becomes [`Section::Unavailable`].
    pub fn capture(name: &str, result: Result<T>) -> Result<Self> {
        match result {
            Ok(value) => Ok(Self::Ready(value)),
            Err(Error::EmptyResult { .. }) => {
                debug!("Section {name} has no data");
                Ok(Self::NoData)
            }
            Err(e) if e.is_request_fatal() => Err(e),
            Err(e) => {
                warn!("Section {name} unavailable: {e}");
                Ok(Self::Unavailable(e.to_string()))
            }
        }
    }

    /// The value, if computed.
    #[must_use]
    pub const fn ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            Self::NoData | Self::Unavailable(_) => None,
        }
    }

    /// Whether the aggregation behind this section failed.
    #[must_use]
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Borrows the value.
    #[must_use]
    pub fn as_ref(&self) -> Section<&T> {
        match self {
            Self::Ready(value) => Section::Ready(value),
            Self::NoData => Section::NoData,
            Self::Unavailable(reason) => Section::Unavailable(reason.clone()),
        }
    }

    /// Transforms a ready value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Section<U> {
        match self {
            Self::Ready(value) => Section::Ready(f(value)),
            Self::NoData => Section::NoData,
            Self::Unavailable(reason) => Section::Unavailable(reason),
        }
    }

    /// Ready only if both are; unavailable if either is.
    pub fn zip<U>(self, other: Section<U>) -> Section<(T, U)> {
        match (self, other) {
            (Self::Ready(a), Section::Ready(b)) => Section::Ready((a, b)),
            (Self::Unavailable(reason), _) | (_, Section::Unavailable(reason)) => {
                Section::Unavailable(reason)
            }
            _ => Section::NoData,
        }
    }

    /// Downgrades a ready value that `is_empty` considers empty to [`Section::NoData`].
    #[must_use]
    pub fn non_empty(self, is_empty: impl Fn(&T) -> bool) -> Self {
        match self {
            Self::Ready(value) if is_empty(&value) => Self::NoData,
            other => other,
        }
    }
}

/// A KPI card: current value, display string and change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kpi {
    /// Current value
    pub value: f64,
    /// Formatted current value
    pub display: String,
    /// Prior value
    pub previous: f64,
    /// Change in percent
    pub change_pct: f64,
    /// Direction of the change
    pub trend: Trend,
}

impl Kpi {
    fn new(value: f64, previous: f64, display: String) -> Self {
        let change_pct = percent_change(value, previous);
        Self {
            value,
            display,
            previous,
            change_pct,
            trend: Trend::of(change_pct),
        }
    }
}

/// Headline KPIs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiSummary {
    /// Revenue
    pub revenue: Kpi,
    /// Distinct tickets
    pub tickets: Kpi,
    /// Items
    pub items: Kpi,
    /// Average basket
    pub avg_basket: Kpi,
    /// Tickets per hundred items
    pub conversion_rate: Kpi,
    /// Locations with sales
    pub active_locations: Kpi,
    /// Current discount share
    pub discount_share: f64,
    /// Set when the current ticket count is estimated
    pub tickets_estimated: bool,
}

impl KpiSummary {
    fn new(
        current: &SummaryTotals,
        previous: &SummaryTotals,
        active: u64,
        previous_active: u64,
    ) -> Self {
        let tickets = current.tickets as f64;
        let items = current.items as f64;
        Self {
            revenue: Kpi::new(
                current.revenue,
                previous.revenue,
                format_currency(current.revenue),
            ),
            tickets: Kpi::new(tickets, previous.tickets as f64, format_number(tickets)),
            items: Kpi::new(items, previous.items as f64, format_number(items)),
            avg_basket: Kpi::new(
                current.avg_basket(),
                previous.avg_basket(),
                format!("${:.2}", current.avg_basket()),
            ),
            conversion_rate: Kpi::new(
                current.conversion_rate(),
                previous.conversion_rate(),
                format_percent(current.conversion_rate()),
            ),
            active_locations: Kpi::new(
                active as f64,
                previous_active as f64,
                active.to_string(),
            ),
            discount_share: current.discount_share(),
            tickets_estimated: current.tickets_estimated,
        }
    }
}

/// Monthly arrays for both periods.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyComparison {
    /// Current period
    pub current: MonthlySeries,
    /// Prior period
    pub previous: MonthlySeries,
    /// Current average basket per month
    pub basket_current: [f64; 12],
    /// Prior average basket per month
    pub basket_previous: [f64; 12],
}

/// Basket composition for both periods.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossSellComparison {
    /// Current period
    pub current: CrossSellStats,
    /// Prior period
    pub previous: CrossSellStats,
    /// Change in cross-sell share
    pub cross_sell_change_pct: f64,
    /// Change in single-item share
    pub single_item_change_pct: f64,
}

/// Scored products and the ranked lists drawn from them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductPerformance {
    /// Every product, by revenue
    pub products: Vec<ProductScore>,
    /// Ranked lists
    pub lists: ProductLists,
}

/// The main dashboard.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    /// Resolved dates
    pub period: ReportPeriod,
    /// Location scope used for every section
    pub scope: LocationScope,
    /// Advisory message about denied locations
    pub warning: Option<String>,
    /// Title line
    pub date_range_text: String,
    /// Headline KPIs
    pub kpis: Section<KpiSummary>,
    /// Day-aligned series
    pub daily: Section<DailyComparison>,
    /// Month series
    pub monthly: Section<MonthlyComparison>,
    /// Basket composition
    pub cross_sell: Section<CrossSellComparison>,
    /// Ticket-value distribution of the current period
    pub distribution: Section<TicketDistribution>,
    /// Top categories with prior revenue
    pub categories: Section<Vec<GroupComparison>>,
    /// Locations with prior revenue
    pub locations: Section<Vec<GroupComparison>>,
    /// Product tiers and lists
    pub products: Section<ProductPerformance>,
    /// Highest-value tickets
    pub top_tickets: Section<Vec<TicketAggregate>>,
    /// Latest line items
    pub recent: Section<Vec<sales_record::Model>>,
    /// Narrated insights
    pub insights: Section<Narration>,
    /// A ticket count was estimated or a supporting pass failed
    #[serde(skip)]
    partial: bool,
}

impl Dashboard {
    /// Whether any part of the dashboard failed or fell back to an estimate.
    #[must_use]
    pub const fn degraded(&self) -> bool {
        self.partial
            || self.kpis.is_unavailable()
            || self.daily.is_unavailable()
            || self.monthly.is_unavailable()
            || self.cross_sell.is_unavailable()
            || self.distribution.is_unavailable()
            || self.categories.is_unavailable()
            || self.locations.is_unavailable()
            || self.products.is_unavailable()
            || self.top_tickets.is_unavailable()
            || self.recent.is_unavailable()
            || self.insights.is_unavailable()
    }
}

/// Employee performance report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmployeeReport {
    /// Resolved dates
    pub period: ReportPeriod,
    /// Location scope used for every section
    pub scope: LocationScope,
    /// Advisory message about denied locations
    pub warning: Option<String>,
    /// Title line
    pub date_range_text: String,
    /// Employees with prior-period comparison and basket composition
    pub employees: Section<Vec<EmployeeComparison>>,
    /// Best sellers in the top categories
    pub category_leaders: Section<Vec<CategoryLeaders>>,
}

impl EmployeeReport {
    /// Whether any section failed.
    #[must_use]
    pub const fn degraded(&self) -> bool {
        self.employees.is_unavailable() || self.category_leaders.is_unavailable()
    }
}

/// Narrated insights report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightsReport {
    /// Resolved dates
    pub period: ReportPeriod,
    /// Advisory message about denied locations
    pub warning: Option<String>,
    /// Title line
    pub date_range_text: String,
    /// Insights, recommendations and overview
    pub narration: Section<Narration>,
    /// A ticket count was estimated or a supporting pass failed
    #[serde(skip)]
    partial: bool,
}

impl InsightsReport {
    /// Whether the narration failed or rests on an estimate.
    #[must_use]
    pub const fn degraded(&self) -> bool {
        self.partial || self.narration.is_unavailable()
    }
}

/// Values a caller may pick in the report filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    /// Locations the caller may select
    pub locations: Vec<String>,
    /// Product groups
    pub categories: Vec<String>,
    /// Product names
    pub products: Vec<String>,
    /// Campaign names
    pub campaigns: Vec<String>,
    /// Employee names
    pub employees: Vec<String>,
}

/// Per-request state shared by every report.
struct RequestScope {
    profile: AccessProfile,
    ctx: FilterContext,
    resolved: ResolvedLocations,
}

/// Sections derived from one window.
struct WindowPass {
    year: i32,
    totals: Section<SummaryTotals>,
    active_locations: Section<u64>,
    tickets: Section<Vec<TicketAggregate>>,
    sellable: Section<Vec<TicketAggregate>>,
    cross_sell: Section<CrossSellBreakdown>,
    categories: Section<Vec<GroupTotals>>,
    locations: Section<Vec<GroupTotals>>,
}

impl WindowPass {
    fn degraded(&self) -> bool {
        self.totals.ready().is_some_and(|t| t.tickets_estimated)
            || self.totals.is_unavailable()
            || self.active_locations.is_unavailable()
            || self.tickets.is_unavailable()
            || self.sellable.is_unavailable()
            || self.categories.is_unavailable()
            || self.locations.is_unavailable()
    }

    fn summary(&self) -> Section<PeriodSummary> {
        let year = self.year;
        self.totals
            .as_ref()
            .zip(self.cross_sell.as_ref())
            .zip(self.categories.as_ref().zip(self.locations.as_ref()))
            .map(|((totals, cross_sell), (categories, locations))| PeriodSummary {
                year,
                totals: *totals,
                cross_sell: cross_sell.overall,
                top_categories: categories.iter().take(NARRATOR_TOP).cloned().collect(),
                top_locations: locations.iter().take(NARRATOR_TOP).cloned().collect(),
            })
    }
}

fn two_back_degraded(two_back: &Section<PeriodSummary>) -> bool {
    two_back.is_unavailable() || two_back.ready().is_some_and(|s| s.totals.tickets_estimated)
}

fn date_range_text(ctx: &FilterContext) -> String {
    let mut text = ctx.period.date_range_text();
    if let LocationScope::Only(locations) = &ctx.scope {
        let shown: Vec<&str> = locations
            .iter()
            .take(LOCATIONS_IN_TITLE)
            .map(String::as_str)
            .collect();
        text.push_str(" • ");
        text.push_str(&shown.join(", "));
        if locations.len() > LOCATIONS_IN_TITLE {
            text.push_str(&format!(" +{} more", locations.len() - LOCATIONS_IN_TITLE));
        }
    }
    text
}

/// The reporting pipeline with its response caches.
pub struct ReportEngine {
    db: DatabaseConnection,
    config: AppConfig,
    dashboards: ReportCache<Dashboard>,
    employee_reports: ReportCache<EmployeeReport>,
    insight_reports: ReportCache<InsightsReport>,
}

impl ReportEngine {
    /// Engine over `db` with caches sized by `config`.
    #[must_use]
    pub fn new(db: DatabaseConnection, config: AppConfig) -> Self {
        let ttl = config.cache_ttl();
        Self {
            db,
            config,
            dashboards: ReportCache::new(ttl),
            employee_reports: ReportCache::new(ttl),
            insight_reports: ReportCache::new(ttl),
        }
    }

    /// Underlying connection
    #[must_use]
    pub const fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Active settings
    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Resolves the caller, their locations and the report dates.
    async fn scope(&self, request: &ReportRequest) -> Result<RequestScope> {
        let profile = require_profile(&self.db, request.user_id).await?;
        let resolved = resolve_locations(&profile, &request.locations)?;
        let tz = self.config.timezone();
        let latest_year = self.config.latest_year;
        let years = ComparisonMode::parse(request.comparison.as_deref(), latest_year)
            .years(latest_year);
        let (start, end) = requested_dates(
            years.current,
            request.start_date.as_deref(),
            request.end_date.as_deref(),
        );

        let mut ctx = FilterContext {
            period: ReportPeriod::new(years, start, end, tz),
            scope: resolved.scope.clone(),
            category: Selector::parse(request.category.as_deref()),
            product: Selector::parse(request.product.as_deref()),
            campaign: Selector::parse(request.campaign.as_deref()),
            employee: Selector::parse(request.employee.as_deref()),
            rules: CatalogRules::from(&self.config),
        };

        let latest = match aggregate::latest_sale(&self.db, ctx.records(ctx.period.current)).await
        {
            Ok(latest) => latest.map(|at| at.with_timezone(&tz).date_naive()),
            Err(e) => {
                warn!("Could not look up latest sale, keeping requested end date: {e}");
                None
            }
        };
        let clamped = clamp_end(end, latest).max(start);
        if clamped != end {
            ctx.period = ReportPeriod::new(years, start, clamped, tz);
        }

        Ok(RequestScope {
            profile,
            ctx,
            resolved,
        })
    }

    /// Runs `work` under the aggregation budget and wraps the outcome as a section.
    async fn timed<T>(
        &self,
        name: &str,
        work: impl Future<Output = Result<T>>,
    ) -> Result<Section<T>> {
        let result = tokio::time::timeout(self.config.aggregation_budget(), work)
            .await
            .unwrap_or_else(|_| {
                Err(Error::AggregationTimeout {
                    section: name.to_string(),
                })
            });
        Section::capture(name, result)
    }

    async fn window_pass(&self, ctx: &FilterContext, window: Window, year: i32) -> Result<WindowPass> {
        let db = &self.db;
        let rules = &ctx.rules;
        let tz = self.config.timezone();

        // the distinct count has its own budget and degrades instead of failing
        let totals = Section::capture(
            "summary",
            aggregate::summary_totals(
                db,
                ctx.records(window),
                rules,
                self.config.aggregation_budget(),
            )
            .await,
        )?;
        let active_locations = self
            .timed(
                "active locations",
                aggregate::active_location_count(db, ctx.records(window)),
            )
            .await?;
        let tickets = self
            .timed(
                "tickets",
                aggregate::ticket_totals(db, ctx.records(window), rules.non_merchandise_line()),
            )
            .await?;
        let sellable = self
            .timed(
                "sellable tickets",
                aggregate::ticket_totals(db, ctx.sellable(window), rules.non_qualifying_line()),
            )
            .await?;
        let categories = self
            .timed(
                "categories",
                aggregate::category_rollup(db, ctx.records(window), rules),
            )
            .await?;
        let locations = self
            .timed(
                "locations",
                aggregate::location_rollup(db, ctx.records(window), rules),
            )
            .await?;
        let cross_sell = sellable
            .as_ref()
            .map(|tickets| aggregate::classify_tickets(tickets, tz));

        Ok(WindowPass {
            year,
            totals,
            active_locations,
            tickets,
            sellable,
            cross_sell,
            categories,
            locations,
        })
    }

    /// Summary for the third comparison year; `NoData` when the mode has none.
    async fn two_back_summary(&self, ctx: &FilterContext) -> Result<Section<PeriodSummary>> {
        let (Some(window), Some(year)) = (ctx.period.two_back, ctx.period.years.two_back) else {
            return Ok(Section::NoData);
        };
        let totals = Section::capture(
            "two-back summary",
            aggregate::summary_totals(
                &self.db,
                ctx.records(window),
                &ctx.rules,
                self.config.aggregation_budget(),
            )
            .await,
        )?;
        Ok(totals.map(|totals| PeriodSummary {
            year,
            totals,
            ..PeriodSummary::default()
        }))
    }

    /// The main dashboard.
    pub async fn dashboard(&self, request: &ReportRequest) -> Result<Dashboard> {
        let scope = self.scope(request).await?;
        let key = CacheKey::new("dashboard", request.user_id, &scope.ctx).digest()?;
        let warning = scope.resolved.warning();
        if let Some(cached) = self.dashboards.get(&key).await {
            return Ok(Dashboard { warning, ..cached });
        }

        let report = self.build_dashboard(&scope.ctx).await?;
        if report.degraded() {
            warn!(user_id = request.user_id, "Dashboard is incomplete, not caching it");
        } else {
            self.dashboards.put(key, report.clone()).await;
        }
        info!(user_id = request.user_id, "Rendered dashboard");
        Ok(Dashboard { warning, ..report })
    }

    async fn build_dashboard(&self, ctx: &FilterContext) -> Result<Dashboard> {
        let tz = self.config.timezone();
        let years = ctx.period.years;
        let current_window = ctx.period.current;
        let cur = self.window_pass(ctx, current_window, years.current).await?;
        let prev = self
            .window_pass(ctx, ctx.period.previous, years.previous)
            .await?;

        let kpis = cur
            .totals
            .as_ref()
            .zip(prev.totals.as_ref())
            .zip(cur.active_locations.as_ref().zip(prev.active_locations.as_ref()))
            .map(|((c, p), (ac, ap))| KpiSummary::new(c, p, *ac, *ap));

        let daily = cur
            .tickets
            .as_ref()
            .zip(prev.tickets.as_ref())
            .zip(cur.cross_sell.as_ref().zip(prev.cross_sell.as_ref()))
            .non_empty(|((c, p), _)| c.is_empty() && p.is_empty())
            .map(|((c, p), (cx, px))| {
                aggregate::align_daily(
                    &aggregate::daily_totals(c, tz),
                    &aggregate::daily_totals(p, tz),
                    &cx.daily,
                    &px.daily,
                )
            });

        let monthly = cur
            .tickets
            .as_ref()
            .zip(prev.tickets.as_ref())
            .non_empty(|(c, p)| c.is_empty() && p.is_empty())
            .map(|(c, p)| {
                let current = aggregate::monthly_series(c, tz);
                let previous = aggregate::monthly_series(p, tz);
                MonthlyComparison {
                    basket_current: current.basket(),
                    basket_previous: previous.basket(),
                    current,
                    previous,
                }
            });

        let cross_sell = cur
            .cross_sell
            .as_ref()
            .zip(prev.cross_sell.as_ref())
            .non_empty(|(c, p)| {
                c.overall.classified_tickets == 0 && p.overall.classified_tickets == 0
            })
            .map(|(c, p)| CrossSellComparison {
                current: c.overall,
                previous: p.overall,
                cross_sell_change_pct: percent_change(
                    c.overall.cross_sell_pct(),
                    p.overall.cross_sell_pct(),
                ),
                single_item_change_pct: percent_change(
                    c.overall.single_item_pct(),
                    p.overall.single_item_pct(),
                ),
            });

        let distribution = cur
            .sellable
            .as_ref()
            .non_empty(|tickets| tickets.is_empty())
            .map(|tickets| {
                let values: Vec<f64> = tickets.iter().map(|t| t.revenue).collect();
                aggregate::ticket_distribution(&values)
            });

        let categories = cur
            .categories
            .as_ref()
            .zip(prev.categories.as_ref())
            .non_empty(|(c, _)| c.is_empty())
            .map(|(c, p)| aggregate::compare_groups(c, p, Some(CATEGORY_LIMIT)));

        let locations = cur
            .locations
            .as_ref()
            .zip(prev.locations.as_ref())
            .non_empty(|(c, _)| c.is_empty())
            .map(|(c, p)| aggregate::compare_groups(c, p, None));

        let products = self
            .timed(
                "products",
                aggregate::product_rollup(&self.db, ctx.merchandise(current_window)),
            )
            .await?
            .non_empty(Vec::is_empty)
            .map(|products| {
                let scores = score_products(&products, current_window.end);
                let lists = product_lists(&scores);
                ProductPerformance {
                    products: scores,
                    lists,
                }
            });

        let top_tickets = cur
            .tickets
            .as_ref()
            .non_empty(|tickets| tickets.is_empty())
            .map(|tickets| aggregate::top_tickets(tickets, TOP_TICKET_LIMIT));

        let recent = self
            .timed(
                "recent records",
                aggregate::recent_records(&self.db, ctx.records(current_window), RECENT_LIMIT),
            )
            .await?
            .non_empty(Vec::is_empty);

        let two_back = self.two_back_summary(ctx).await?;
        let partial = cur.degraded() || prev.degraded() || two_back_degraded(&two_back);
        let insights = cur
            .summary()
            .zip(prev.summary())
            .map(|(c, p)| narrate(&c, &p, two_back.ready()));

        Ok(Dashboard {
            period: ctx.period.clone(),
            scope: ctx.scope.clone(),
            warning: None,
            date_range_text: date_range_text(ctx),
            kpis,
            daily,
            monthly,
            cross_sell,
            distribution,
            categories,
            locations,
            products,
            top_tickets,
            recent,
            insights,
            partial,
        })
    }

    /// Employee performance with prior-period comparison and category leaders.
    pub async fn employee_report(&self, request: &ReportRequest) -> Result<EmployeeReport> {
        let scope = self.scope(request).await?;
        let key = CacheKey::new("employees", request.user_id, &scope.ctx).digest()?;
        let warning = scope.resolved.warning();
        if let Some(cached) = self.employee_reports.get(&key).await {
            return Ok(EmployeeReport { warning, ..cached });
        }

        let report = self.build_employee_report(&scope.ctx).await?;
        if report.degraded() {
            warn!(user_id = request.user_id, "Employee report is incomplete, not caching it");
        } else {
            self.employee_reports.put(key, report.clone()).await;
        }
        info!(user_id = request.user_id, "Rendered employee report");
        Ok(EmployeeReport { warning, ..report })
    }

    async fn build_employee_report(&self, ctx: &FilterContext) -> Result<EmployeeReport> {
        let db = &self.db;
        let rules = &ctx.rules;
        let tz = self.config.timezone();
        let current = ctx.period.current;
        let previous = ctx.period.previous;

        let staff_current = self
            .timed(
                "employees",
                aggregate::employee_rollup(db, ctx.records(current), rules),
            )
            .await?;
        let staff_previous = self
            .timed(
                "employees (prior)",
                aggregate::employee_rollup(db, ctx.records(previous), rules),
            )
            .await?;
        let cross_sell = self
            .timed(
                "employee cross-sell",
                aggregate::ticket_totals(db, ctx.sellable(current), rules.non_qualifying_line()),
            )
            .await?
            .map(|tickets| aggregate::classify_tickets(&tickets, tz).by_employee);

        let employees = staff_current
            .zip(staff_previous)
            .zip(cross_sell)
            .non_empty(|((c, _), _)| c.is_empty())
            .map(|((c, p), xs)| aggregate::compare_employees(&c, &p, &xs));

        let categories = self
            .timed(
                "categories",
                aggregate::category_rollup(db, ctx.records(current), rules),
            )
            .await?;
        let pairs_current = self
            .timed(
                "category employees",
                aggregate::category_employee_totals(db, ctx.records(current)),
            )
            .await?;
        let pairs_previous = self
            .timed(
                "category employees (prior)",
                aggregate::category_employee_totals(db, ctx.records(previous)),
            )
            .await?;

        let category_leaders = categories
            .zip(pairs_current)
            .zip(pairs_previous)
            .non_empty(|((c, _), _)| c.is_empty())
            .map(|((categories, current), previous)| {
                let top: Vec<GroupTotals> =
                    categories.into_iter().take(CATEGORY_LIMIT).collect();
                aggregate::category_leaders(&top, &current, &previous, LEADER_LIMIT)
            });

        Ok(EmployeeReport {
            period: ctx.period.clone(),
            scope: ctx.scope.clone(),
            warning: None,
            date_range_text: date_range_text(ctx),
            employees,
            category_leaders,
        })
    }

    /// Narrated comparison of the current, prior and (where defined) two-back years.
    pub async fn insights(&self, request: &ReportRequest) -> Result<InsightsReport> {
        let scope = self.scope(request).await?;
        let key = CacheKey::new("insights", request.user_id, &scope.ctx).digest()?;
        let warning = scope.resolved.warning();
        if let Some(cached) = self.insight_reports.get(&key).await {
            return Ok(InsightsReport { warning, ..cached });
        }

        let ctx = &scope.ctx;
        let years = ctx.period.years;
        let cur = self.window_pass(ctx, ctx.period.current, years.current).await?;
        let prev = self
            .window_pass(ctx, ctx.period.previous, years.previous)
            .await?;
        let two_back = self.two_back_summary(ctx).await?;
        let narration = cur
            .summary()
            .zip(prev.summary())
            .map(|(c, p)| narrate(&c, &p, two_back.ready()));

        let report = InsightsReport {
            period: ctx.period.clone(),
            warning: None,
            date_range_text: date_range_text(ctx),
            narration,
            partial: cur.degraded() || prev.degraded() || two_back_degraded(&two_back),
        };
        if report.degraded() {
            warn!(user_id = request.user_id, "Insights are incomplete, not caching them");
        } else {
            self.insight_reports.put(key, report.clone()).await;
        }
        info!(user_id = request.user_id, "Rendered insights");
        Ok(InsightsReport { warning, ..report })
    }

    /// Per-location revenue and tickets for both periods, as an export table.
    pub async fn location_export(&self, request: &ReportRequest) -> Result<ExportTable> {
        let scope = self.scope(request).await?;
        let ctx = &scope.ctx;
        let current =
            aggregate::location_rollup(&self.db, ctx.records(ctx.period.current), &ctx.rules)
                .await?;
        let previous =
            aggregate::location_rollup(&self.db, ctx.records(ctx.period.previous), &ctx.rules)
                .await?;
        let rows = aggregate::compare_groups(&current, &previous, None);
        if rows.is_empty() {
            return Err(Error::EmptyResult {
                section: "location export".to_string(),
            });
        }

        let (cy, py) = (ctx.period.years.current, ctx.period.years.previous);
        let columns = vec![
            "Location".to_string(),
            format!("Revenue {cy}"),
            format!("Revenue {py}"),
            "Revenue Change".to_string(),
            "Revenue Change %".to_string(),
            format!("Tickets {cy}"),
            format!("Tickets {py}"),
            "Tickets Change %".to_string(),
        ];
        let rows = rows
            .into_iter()
            .map(|row| {
                vec![
                    json!(row.name),
                    json!(row.revenue),
                    json!(row.previous_revenue),
                    json!(row.revenue_change),
                    json!(row.revenue_change_pct),
                    json!(row.tickets),
                    json!(row.previous_tickets),
                    json!(row.tickets_change_pct),
                ]
            })
            .collect();

        info!(user_id = request.user_id, "Exported location comparison");
        Ok(ExportTable { columns, rows })
    }

    /// Values for the filter pickers in the current year.
    ///
    /// Non-admins are offered only their permitted locations.
    pub async fn filter_options(&self, request: &ReportRequest) -> Result<FilterOptions> {
        let scope = self.scope(request).await?;
        let ctx = &scope.ctx;
        let year = ctx.period.years.current;
        let (Some(first), Some(last)) = (
            NaiveDate::from_ymd_opt(year, 1, 1),
            NaiveDate::from_ymd_opt(year, 12, 31),
        ) else {
            return Ok(FilterOptions::default());
        };
        let window = Window::days(first, last, self.config.timezone());
        let values = |column| aggregate::distinct_values(&self.db, ctx.located(window), column);

        let locations = if scope.profile.is_admin {
            values(sales_record::Column::Location).await?
        } else {
            let mut permitted = scope.profile.allowed_locations.clone();
            permitted.sort();
            permitted
        };

        Ok(FilterOptions {
            locations,
            categories: values(sales_record::Column::ProductGroup).await?,
            products: values(sales_record::Column::ProductName).await?,
            campaigns: values(sales_record::Column::CampaignName).await?,
            employees: values(sales_record::Column::EmployeeName).await?,
        })
    }

    /// Plan against actual sales for the requested months, with the prior year.
    pub async fn plan_report(
        &self,
        request: &PlanRequest,
        targets: &[PlanTarget],
    ) -> Result<PlanReport> {
        let profile = require_profile(&self.db, request.user_id).await?;
        plan::plan_vs_actual(&self.db, &self.config, &profile, request, targets).await
    }

    /// Runs a read-only console query for an admin.
    pub async fn console(&self, user_id: i64, sql: &str) -> Result<ExportTable> {
        let profile = require_profile(&self.db, user_id).await?;
        console::run_console_query(&self.db, &profile, sql).await
    }

    /// Replaces the stored rows in `[start, end]` and drops every cached report.
    pub async fn load(
        &self,
        user_id: i64,
        rows: Vec<sales_record::Model>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<LoadSummary> {
        let profile = require_profile(&self.db, user_id).await?;
        let summary =
            loader::replace_window(&self.db, &profile, rows, start, end, self.config.timezone())
                .await?;
        self.clear_caches().await;
        Ok(summary)
    }

    /// Drops every cached report.
    pub async fn clear_caches(&self) {
        self.dashboards.clear().await;
        self.employee_reports.clear().await;
        self.insight_reports.clear().await;
    }
}
