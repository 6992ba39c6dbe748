//! Access profile entity - who may see which locations.
//!
//! Admins see every location; their stored list is ignored. Non-admins are
//! limited to `allowed_locations`, stored as a JSON array of location names.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Access profile database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "access_profiles")]
pub struct Model {
    /// Caller identity this profile belongs to
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: i64,
    /// Login name, kept for display
    pub username: String,
    /// Admins may see every location and use the console and loader
    pub is_admin: bool,
    /// JSON array of permitted location names
    pub allowed_locations: Json,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
