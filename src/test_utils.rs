//! Shared test utilities for `SalesPulse`.
//!
//! This module provides common helper functions for setting up test databases
//! and creating sales rows and contexts with sensible defaults.
#![allow(clippy::unwrap_used)]

use crate::{
    config::AppConfig,
    core::{
        access::{AccessProfile, LocationScope},
        filter::{CatalogRules, FilterContext, Selector},
        period::{ComparisonMode, ReportPeriod},
    },
    entities::{SalesRecord, sales_record},
    errors::Result,
};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use sea_orm::{DatabaseConnection, EntityTrait};

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all database tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a sales line with sensible defaults.
///
/// # Arguments
/// * `id` - Line id; also used for the product code and name
/// * `ticket_id` - Ticket the line belongs to
/// * `sold_at` - RFC 3339 timestamp
/// * `amount` - Line revenue
///
/// # Defaults
/// * `location`: `"Tbilisi Mall"`
/// * `employee_name`: `"Nino"`
/// * `product_type`: `"selling item"`
/// * `product_group`: `"SKIN CARE"`
/// * `std_price`: `amount`, `discount_amount`: `amount`
pub fn sale(id: i64, ticket_id: &str, sold_at: &str, amount: f64) -> sales_record::Model {
    sales_record::Model {
        id,
        ticket_id: ticket_id.to_string(),
        sold_at: DateTime::parse_from_rfc3339(sold_at)
            .unwrap()
            .with_timezone(&Utc),
        location: "Tbilisi Mall".to_string(),
        employee_id: Some(1),
        employee_name: Some("Nino".to_string()),
        product_id: Some(format!("P{id}")),
        product_name: Some(format!("Product {id}")),
        product_type: Some("selling item".to_string()),
        product_group: Some("SKIN CARE".to_string()),
        campaign_id: None,
        campaign_name: None,
        quantity: Some(1.0),
        amount,
        discount_amount: Some(amount),
        std_price: Some(amount),
        is_gift: false,
    }
}

/// Inserts the given rows.
pub async fn insert_sales(db: &DatabaseConnection, rows: Vec<sales_record::Model>) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    SalesRecord::insert_many(rows.into_iter().map(sales_record::ActiveModel::from))
        .exec(db)
        .await?;
    Ok(())
}

/// Three tickets in March 2025 with one, three and two items.
///
/// * `T1`: line 1 (30)
/// * `T2`: lines 2, 3, 4 (50, 70, 80)
/// * `T3`: lines 5, 6 (40, 50)
pub fn three_ticket_sales() -> Vec<sales_record::Model> {
    vec![
        sale(1, "T1", "2025-03-03T10:00:00Z", 30.0),
        sale(2, "T2", "2025-03-10T12:00:00Z", 50.0),
        sale(3, "T2", "2025-03-10T12:00:00Z", 70.0),
        sale(4, "T2", "2025-03-10T12:00:00Z", 80.0),
        sale(5, "T3", "2025-03-20T15:30:00Z", 40.0),
        sale(6, "T3", "2025-03-20T15:30:00Z", 50.0),
    ]
}

/// Filter context for March 2025 against March 2024, in UTC, with no selectors.
pub fn test_context(scope: LocationScope) -> FilterContext {
    let config = AppConfig::default();
    let years = ComparisonMode::Default.years(2026);
    let tz = FixedOffset::east_opt(0).unwrap();
    FilterContext {
        period: ReportPeriod::new(
            years,
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap(),
            tz,
        ),
        scope,
        category: Selector::All,
        product: Selector::All,
        campaign: Selector::All,
        employee: Selector::All,
        rules: CatalogRules::from(&config),
    }
}

/// An administrator profile.
pub fn admin_profile() -> AccessProfile {
    AccessProfile {
        user_id: 1,
        username: "admin".to_string(),
        is_admin: true,
        allowed_locations: Vec::new(),
    }
}
