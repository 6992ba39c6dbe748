//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod access_profile;
pub mod sales_record;

// Re-export specific types to avoid conflicts
pub use access_profile::{
    Column as AccessProfileColumn, Entity as AccessProfile, Model as AccessProfileModel,
};
pub use sales_record::{
    Column as SalesRecordColumn, Entity as SalesRecord, Model as SalesRecordModel,
};
