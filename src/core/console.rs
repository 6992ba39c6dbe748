//! Admin-only read-only SQL console.

use crate::{
    core::{access::AccessProfile, export::ExportTable},
    errors::{Error, Result},
};
use sea_orm::{ConnectionTrait, DatabaseConnection, FromQueryResult, JsonValue, Statement};
use tracing::{info, warn};

/// Keywords that reject a console query outright.
pub const FORBIDDEN_KEYWORDS: [&str; 9] = [
    "DROP", "DELETE", "INSERT", "UPDATE", "ALTER", "CREATE", "TRUNCATE", "EXEC", "EXECUTE",
];

fn reject(reason: String) -> Error {
    warn!("Rejected console query: {reason}");
    Error::UnauthorizedQuery { reason }
}

/// Checks that `sql` is a single read-only statement.
///
/// The upper-cased text must start with `SELECT` or `WITH`, and no word in it may
/// be one of [`FORBIDDEN_KEYWORDS`].
pub fn validate_query(sql: &str) -> Result<()> {
    let upper = sql.trim().to_uppercase();
    if upper.is_empty() {
        return Err(reject("query is empty".to_string()));
    }
    if !(upper.starts_with("SELECT") || upper.starts_with("WITH")) {
        return Err(reject("only SELECT and WITH queries are allowed".to_string()));
    }
    let forbidden = upper
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .find(|word| FORBIDDEN_KEYWORDS.contains(word));
    if let Some(word) = forbidden {
        return Err(reject(format!("query contains forbidden keyword {word}")));
    }
    Ok(())
}

/// Runs a validated query for an admin and returns every row.
///
/// Columns come from the first row's keys in sorted order; an empty result has
/// no columns.
pub async fn run_console_query(
    db: &DatabaseConnection,
    caller: &AccessProfile,
    sql: &str,
) -> Result<ExportTable> {
    caller.require_admin("run console queries")?;
    validate_query(sql)?;

    let backend = db.get_database_backend();
    let rows = JsonValue::find_by_statement(Statement::from_string(backend, sql.trim()))
        .all(db)
        .await?;

    let columns: Vec<String> = rows
        .first()
        .and_then(JsonValue::as_object)
        .map(|object| object.keys().cloned().collect())
        .unwrap_or_default();

    let table_rows = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|column| row.get(column).cloned().unwrap_or(JsonValue::Null))
                .collect()
        })
        .collect();

    info!(
        user_id = caller.user_id,
        "Console query returned {} rows",
        rows.len()
    );
    Ok(ExportTable {
        columns,
        rows: table_rows,
    })
}
