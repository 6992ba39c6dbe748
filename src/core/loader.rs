//! Admin bulk load with replace-by-window semantics.
//!
//! A load covers an inclusive date range. Every stored row in that range, and any
//! stored row sharing an id with the batch, is deleted before the batch is
//! inserted, all inside one transaction. Reloading the same range twice therefore
//! never double-counts.

use crate::{
    core::{access::AccessProfile, period::Window},
    entities::{SalesRecord, sales_record},
    errors::{Error, Result},
};
use chrono::{FixedOffset, NaiveDate};
use sea_orm::{QueryFilter, TransactionTrait, prelude::*};
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

/// Rows per INSERT statement, well under SQLite's bound-parameter limit.
const INSERT_CHUNK: usize = 50;
/// Ids per DELETE ... IN statement.
const DELETE_CHUNK: usize = 500;

/// Outcome of a bulk load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    /// Rows handed in
    pub received: usize,
    /// Rows inside the load window, before deduplication
    pub in_window: usize,
    /// Rows dropped because a later row had the same id
    pub duplicates: usize,
    /// Stored rows removed
    pub deleted: u64,
    /// Rows written
    pub inserted: usize,
}

/// Replaces every stored row in `[start, end]` with the batch.
///
/// Rows outside the window are ignored. When several rows share an id, the last
/// one wins.
///
/// # Errors
/// [`Error::AccessDenied`] for non-admins, [`Error::InvalidBatch`] when
/// `start > end`, [`Error::EmptyResult`] when no row falls inside the window.
pub async fn replace_window(
    db: &DatabaseConnection,
    caller: &AccessProfile,
    rows: Vec<sales_record::Model>,
    start: NaiveDate,
    end: NaiveDate,
    tz: FixedOffset,
) -> Result<LoadSummary> {
    caller.require_admin("load sales data")?;
    if start > end {
        return Err(Error::InvalidBatch {
            message: format!("start date {start} is after end date {end}"),
        });
    }

    let window = Window::days(start, end, tz);
    let received = rows.len();
    let in_window: Vec<sales_record::Model> = rows
        .into_iter()
        .filter(|row| window.contains(row.sold_at))
        .collect();
    let in_window_count = in_window.len();
    if in_window.is_empty() {
        return Err(Error::EmptyResult {
            section: format!("load batch for {start} to {end}"),
        });
    }

    let mut by_id: HashMap<i64, sales_record::Model> = HashMap::with_capacity(in_window_count);
    let mut order = Vec::with_capacity(in_window_count);
    for row in in_window {
        let id = row.id;
        if by_id.insert(id, row).is_none() {
            order.push(id);
        }
    }
    let batch: Vec<sales_record::Model> = order
        .into_iter()
        .filter_map(|id| by_id.remove(&id))
        .collect();

    let txn = db.begin().await?;

    let mut deleted = SalesRecord::delete_many()
        .filter(sales_record::Column::SoldAt.gte(window.start))
        .filter(sales_record::Column::SoldAt.lte(window.end))
        .exec(&txn)
        .await?
        .rows_affected;

    let ids: Vec<i64> = batch.iter().map(|row| row.id).collect();
    for chunk in ids.chunks(DELETE_CHUNK) {
        deleted += SalesRecord::delete_many()
            .filter(sales_record::Column::Id.is_in(chunk.to_vec()))
            .exec(&txn)
            .await?
            .rows_affected;
    }

    for chunk in batch.chunks(INSERT_CHUNK) {
        SalesRecord::insert_many(chunk.iter().cloned().map(sales_record::ActiveModel::from))
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;

    let summary = LoadSummary {
        received,
        in_window: in_window_count,
        duplicates: in_window_count - batch.len(),
        deleted,
        inserted: batch.len(),
    };
    info!(
        user_id = caller.user_id,
        "Loaded {} rows for {start} to {end}: {} received, {} deleted, {} duplicates dropped",
        summary.inserted,
        summary.received,
        summary.deleted,
        summary.duplicates
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::{admin_profile, insert_sales, sale, setup_test_db};
    use sea_orm::PaginatorTrait;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_reload_replaces_window() -> Result<()> {
        let db = setup_test_db().await?;
        insert_sales(
            &db,
            vec![
                sale(1, "T1", "2025-03-01T10:00:00Z", 10.0),
                sale(2, "T2", "2025-03-02T10:00:00Z", 20.0),
                sale(3, "T3", "2025-04-01T10:00:00Z", 30.0),
            ],
        )
        .await?;

        let batch = vec![
            sale(2, "T2", "2025-03-02T10:00:00Z", 25.0),
            sale(4, "T4", "2025-03-31T23:59:59Z", 40.0),
            sale(5, "T5", "2025-04-02T10:00:00Z", 50.0),
        ];
        let summary = replace_window(
            &db,
            &admin_profile(),
            batch.clone(),
            ymd(2025, 3, 1),
            ymd(2025, 3, 31),
            utc(),
        )
        .await?;
        assert_eq!(summary.received, 3);
        assert_eq!(summary.in_window, 2);
        assert_eq!(summary.deleted, 2);
        assert_eq!(summary.inserted, 2);

        // loading the same batch again leaves the same rows
        replace_window(&db, &admin_profile(), batch, ymd(2025, 3, 1), ymd(2025, 3, 31), utc())
            .await?;
        assert_eq!(SalesRecord::find().count(&db).await?, 3);
        let reloaded = SalesRecord::find_by_id(2).one(&db).await?.unwrap();
        assert!((reloaded.amount - 25.0).abs() < f64::EPSILON);
        assert!(SalesRecord::find_by_id(3).one(&db).await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_ids_keep_last() -> Result<()> {
        let db = setup_test_db().await?;
        let batch = vec![
            sale(9, "T9", "2025-03-02T10:00:00Z", 1.0),
            sale(9, "T9", "2025-03-02T10:00:00Z", 2.0),
        ];
        let summary = replace_window(
            &db,
            &admin_profile(),
            batch,
            ymd(2025, 3, 1),
            ymd(2025, 3, 31),
            utc(),
        )
        .await?;
        assert_eq!(summary.duplicates, 1);
        let row = SalesRecord::find_by_id(9).one(&db).await?.unwrap();
        assert!((row.amount - 2.0).abs() < f64::EPSILON);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_batches() -> Result<()> {
        let db = setup_test_db().await?;
        let reversed = replace_window(
            &db,
            &admin_profile(),
            vec![sale(1, "T1", "2025-03-01T10:00:00Z", 1.0)],
            ymd(2025, 3, 31),
            ymd(2025, 3, 1),
            utc(),
        )
        .await;
        assert!(matches!(reversed, Err(Error::InvalidBatch { .. })));

        let outside = replace_window(
            &db,
            &admin_profile(),
            vec![sale(1, "T1", "2025-05-01T10:00:00Z", 1.0)],
            ymd(2025, 3, 1),
            ymd(2025, 3, 31),
            utc(),
        )
        .await;
        assert!(matches!(outside, Err(Error::EmptyResult { .. })));

        let mut clerk = admin_profile();
        clerk.is_admin = false;
        let denied = replace_window(
            &db,
            &clerk,
            vec![sale(1, "T1", "2025-03-01T10:00:00Z", 1.0)],
            ymd(2025, 3, 1),
            ymd(2025, 3, 31),
            utc(),
        )
        .await;
        assert!(matches!(denied, Err(Error::AccessDenied { .. })));
        Ok(())
    }
}
