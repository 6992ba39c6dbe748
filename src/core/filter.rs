//! Per-request filter context and the shared query builder.
//!
//! A [`FilterContext`] is built once per request and handed to every aggregation, so
//! the dashboard, employee, insight and export outputs of one request can never
//! disagree about which rows they cover.

use crate::{
    config::AppConfig,
    core::{
        access::LocationScope,
        period::{Period, ReportPeriod, Window},
    },
    entities::{SalesRecord, sales_record},
};
use sea_orm::{Condition, QueryFilter, Select, prelude::*};
use serde::Serialize;

/// Sentinel meaning "do not filter on this field".
pub const ALL: &str = "all";

/// A single-value selector that defaults to "all".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum Selector {
    /// No predicate
    All,
    /// Exact match on one value
    Only(String),
}

impl Selector {
    /// Parses raw input; missing, blank or `"all"` become [`Selector::All`].
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("" | ALL) => Self::All,
            Some(value) => Self::Only(value.to_string()),
        }
    }

    /// The selected value, if any.
    #[must_use]
    pub fn value(&self) -> Option<&str> {
        match self {
            Self::All => None,
            Self::Only(value) => Some(value),
        }
    }

    /// Value used in cache keys and display (`"all"` when unset).
    #[must_use]
    pub fn key(&self) -> &str {
        self.value().unwrap_or(ALL)
    }
}

/// Catalog conventions that decide which rows count for which metric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogRules {
    /// Locations hidden from aggregate views
    pub excluded_locations: Vec<String>,
    /// Promotional product groups ignored for cross-sell and tiering
    pub excluded_product_groups: Vec<String>,
    /// Product codes that never count as items
    pub non_merchandise_product_ids: Vec<String>,
    /// Product type of sellable lines
    pub sellable_product_type: String,
}

impl From<&AppConfig> for CatalogRules {
    fn from(config: &AppConfig) -> Self {
        Self {
            excluded_locations: config.excluded_locations.clone(),
            excluded_product_groups: config.excluded_product_groups.clone(),
            non_merchandise_product_ids: config.non_merchandise_product_ids.clone(),
            sellable_product_type: config.sellable_product_type.clone(),
        }
    }
}

impl CatalogRules {
    /// Lines in an excluded product group or with a non-merchandise code.
    ///
    /// NULL group or code never matches, so such lines still count.
    #[must_use]
    pub fn non_qualifying_line(&self) -> Condition {
        Condition::any()
            .add(sales_record::Column::ProductGroup.is_in(self.excluded_product_groups.clone()))
            .add(sales_record::Column::ProductId.is_in(self.non_merchandise_product_ids.clone()))
    }

    /// Lines with a non-merchandise product code.
    #[must_use]
    pub fn non_merchandise_line(&self) -> Condition {
        Condition::all()
            .add(sales_record::Column::ProductId.is_in(self.non_merchandise_product_ids.clone()))
    }

    /// Rows whose product group is not excluded, keeping NULL groups.
    #[must_use]
    pub fn outside_excluded_groups(&self) -> Condition {
        Condition::any()
            .add(sales_record::Column::ProductGroup.is_null())
            .add(sales_record::Column::ProductGroup.is_not_in(self.excluded_product_groups.clone()))
    }
}

/// Immutable per-request filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterContext {
    /// Resolved report dates
    pub period: ReportPeriod,
    /// Authoritative location restriction
    pub scope: LocationScope,
    /// Product group selector
    pub category: Selector,
    /// Product name selector
    pub product: Selector,
    /// Campaign name selector
    pub campaign: Selector,
    /// Employee name selector
    pub employee: Selector,
    /// Row classification rules
    pub rules: CatalogRules,
}

impl FilterContext {
    /// Window for `period`, if defined by the comparison mode.
    #[must_use]
    pub const fn window(&self, period: Period) -> Option<Window> {
        self.period.window(period)
    }

    /// Applies location, category, product, campaign and employee predicates.
    #[must_use]
    pub fn apply_selectors(&self, mut query: Select<SalesRecord>) -> Select<SalesRecord> {
        if let Some(locations) = self.scope.locations() {
            query = query.filter(sales_record::Column::Location.is_in(locations.to_vec()));
        }
        if let Some(category) = self.category.value() {
            query = query.filter(sales_record::Column::ProductGroup.eq(category));
        }
        if let Some(product) = self.product.value() {
            query = query.filter(sales_record::Column::ProductName.eq(product));
        }
        if let Some(campaign) = self.campaign.value() {
            query = query.filter(sales_record::Column::CampaignName.eq(campaign));
        }
        if let Some(employee) = self.employee.value() {
            query = query.filter(sales_record::Column::EmployeeName.eq(employee));
        }
        query
    }

    /// Rows in `window` matching every selector, without the location deny-list.
    #[must_use]
    pub fn unsuppressed(&self, window: Window) -> Select<SalesRecord> {
        let query = SalesRecord::find()
            .filter(sales_record::Column::SoldAt.gte(window.start))
            .filter(sales_record::Column::SoldAt.lte(window.end));
        self.apply_selectors(query)
    }

    /// The base record set for aggregate views.
    #[must_use]
    pub fn records(&self, window: Window) -> Select<SalesRecord> {
        self.unsuppressed(window).filter(
            sales_record::Column::Location.is_not_in(self.rules.excluded_locations.clone()),
        )
    }

    /// Rows in `window` inside the location scope, ignoring every other selector.
    #[must_use]
    pub fn located(&self, window: Window) -> Select<SalesRecord> {
        let mut query = SalesRecord::find()
            .filter(sales_record::Column::SoldAt.gte(window.start))
            .filter(sales_record::Column::SoldAt.lte(window.end));
        if let Some(locations) = self.scope.locations() {
            query = query.filter(sales_record::Column::Location.is_in(locations.to_vec()));
        }
        query.filter(sales_record::Column::Location.is_not_in(self.rules.excluded_locations.clone()))
    }

    /// Sellable, non-zero lines; the input to basket analysis.
    #[must_use]
    pub fn sellable(&self, window: Window) -> Select<SalesRecord> {
        self.records(window)
            .filter(sales_record::Column::ProductType.eq(self.rules.sellable_product_type.as_str()))
            .filter(sales_record::Column::Amount.ne(0.0))
    }

    /// Base record set outside the excluded product groups; the input to tiering.
    #[must_use]
    pub fn merchandise(&self, window: Window) -> Select<SalesRecord> {
        self.records(window)
            .filter(self.rules.outside_excluded_groups())
    }
}
