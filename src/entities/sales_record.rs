//! Sales record entity - one row per line item of a checkout.
//!
//! Rows are written only by the bulk-load path; reporting code treats the table
//! as read-only. `ticket_id` groups line items into one transaction, and
//! (`ticket_id`, `sold_at`, `location`) together identify one checkout event.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Sales line-item database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sales_records")]
pub struct Model {
    /// Upstream unique line identifier
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    /// Ticket (checkout) identifier shared by all lines of a transaction
    pub ticket_id: String,
    /// When the transaction was rung up
    pub sold_at: DateTimeUtc,
    /// Store / location name
    pub location: String,
    /// Upstream employee identifier
    pub employee_id: Option<i64>,
    /// Employee display name
    pub employee_name: Option<String>,
    /// Product code (e.g. `"M9157"`)
    pub product_id: Option<String>,
    /// Product display name
    pub product_name: Option<String>,
    /// Product type; only `"selling item"` lines count toward basket analysis
    pub product_type: Option<String>,
    /// Product group, used as the report category
    pub product_group: Option<String>,
    /// Campaign identifier
    pub campaign_id: Option<String>,
    /// Campaign display name
    pub campaign_name: Option<String>,
    /// Unit quantity as exported upstream
    pub quantity: Option<f64>,
    /// Extended line amount (revenue)
    pub amount: f64,
    /// Price actually charged after discount
    pub discount_amount: Option<f64>,
    /// Standard list price
    pub std_price: Option<f64>,
    /// Whether the line was handed out as a gift
    pub is_gift: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
