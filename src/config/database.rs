//! Database configuration module.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated with `Schema::create_table_from_entity`, so the schema always
//! matches the entity definitions without hand-written DDL.

use crate::entities::{AccessProfile, SalesRecord};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};

/// Establishes a connection to the database at `database_url`.
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    tracing::debug!("Connecting to database at {database_url}");
    Database::connect(database_url).await.map_err(Into::into)
}

/// Creates the sales and access-profile tables from their entity definitions.
///
/// Uses `IF NOT EXISTS`, so calling this against an already provisioned
/// database is harmless.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut sales_table = schema.create_table_from_entity(SalesRecord);
    let mut profile_table = schema.create_table_from_entity(AccessProfile);

    sales_table.if_not_exists();
    profile_table.if_not_exists();

    db.execute(builder.build(&sales_table)).await?;
    db.execute(builder.build(&profile_table)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{AccessProfileModel, SalesRecordModel};
    use sea_orm::{EntityTrait, QuerySelect};

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = create_connection("sqlite::memory:").await?;
        create_tables(&db).await?;

        let _: Vec<SalesRecordModel> = SalesRecord::find().limit(1).all(&db).await?;
        let _: Vec<AccessProfileModel> = AccessProfile::find().limit(1).all(&db).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_create_tables_is_idempotent() -> Result<()> {
        let db = create_connection("sqlite::memory:").await?;
        create_tables(&db).await?;
        create_tables(&db).await?;
        Ok(())
    }
}
