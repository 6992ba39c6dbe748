#![allow(clippy::result_large_err)]

use dotenvy::dotenv;
use sales_pulse::{
    config::{self, database},
    core::{
        export::to_csv_string,
        plan::{PlanRequest, load_plan_targets},
        report::{ReportEngine, ReportRequest},
    },
    errors::{Error, Result},
};
use std::{env, fs::File};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: sales-pulse <dashboard|employees|insights|locations|filters> <user_id> [comparison] [start] [end]\n       sales-pulse plan <user_id> <targets.csv> [year] [granularity] [location]";

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn invalid(message: String) -> Error {
    Error::InvalidArguments { message }
}

/// Splits the command line into the view name and its caller.
fn parse_view(args: &[String]) -> Result<(&str, i64)> {
    let (Some(view), Some(user_id)) = (args.first(), args.get(1)) else {
        return Err(invalid(USAGE.to_string()));
    };
    let user_id = user_id
        .parse::<i64>()
        .map_err(|e| invalid(format!("Invalid user id {user_id:?}: {e}")))?;
    Ok((view.as_str(), user_id))
}

fn report_request(user_id: i64, args: &[String]) -> ReportRequest {
    ReportRequest {
        user_id,
        comparison: args.get(2).cloned(),
        start_date: args.get(3).cloned(),
        end_date: args.get(4).cloned(),
        ..ReportRequest::default()
    }
}

fn plan_request(user_id: i64, args: &[String]) -> Result<PlanRequest> {
    let year = args
        .get(3)
        .map(|y| {
            y.parse::<i32>()
                .map_err(|e| invalid(format!("Invalid plan year {y:?}: {e}")))
        })
        .transpose()?;
    Ok(PlanRequest {
        user_id,
        year,
        granularity: args.get(4).cloned(),
        location: args.get(5).cloned(),
        ..PlanRequest::default()
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; variables may also be set externally
    dotenv().ok();

    // 3. Check the arguments before touching the database
    let args: Vec<String> = env::args().skip(1).collect();
    let (view, user_id) = parse_view(&args)?;

    // 4. Load the application configuration
    let app_config = config::settings::load_app_configuration()?;
    info!("Loaded configuration for latest year {}", app_config.latest_year);

    // 5. Connect and make sure the tables exist
    let db = database::create_connection(&app_config.database_url)
        .await
        .inspect_err(|e| error!("Failed to connect to database: {e}"))?;
    database::create_tables(&db).await?;

    // 6. Run one report
    let engine = ReportEngine::new(db, app_config);
    let request = report_request(user_id, &args);
    match view {
        "dashboard" => print_json(&engine.dashboard(&request).await?),
        "employees" => print_json(&engine.employee_report(&request).await?),
        "insights" => print_json(&engine.insights(&request).await?),
        "filters" => print_json(&engine.filter_options(&request).await?),
        "locations" => {
            let table = engine.location_export(&request).await?;
            print!("{}", to_csv_string(&table)?);
            Ok(())
        }
        "plan" => {
            let Some(path) = args.get(2) else {
                return Err(invalid(USAGE.to_string()));
            };
            let targets = load_plan_targets(
                File::open(path).inspect_err(|e| error!("Failed to open {path}: {e}"))?,
            )?;
            print_json(&engine.plan_report(&plan_request(user_id, &args)?, &targets).await?)
        }
        other => Err(invalid(format!("Unknown view {other:?}; {USAGE}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_missing_or_bad_arguments_are_rejected() {
        let missing_args = args(&["dashboard"]);
        let missing = parse_view(&missing_args);
        assert!(matches!(missing, Err(Error::InvalidArguments { .. })));

        let bad_user_args = args(&["dashboard", "abc"]);
        let bad_user = parse_view(&bad_user_args);
        assert!(matches!(bad_user, Err(Error::InvalidArguments { .. })));

        let bad_year = plan_request(7, &args(&["plan", "7", "targets.csv", "soon"]));
        assert!(matches!(bad_year, Err(Error::InvalidArguments { .. })));
    }

    #[test]
    fn test_requests_from_arguments() -> Result<()> {
        let line = args(&["insights", "7", "last_year", "2025-03-01"]);
        let (view, user_id) = parse_view(&line)?;
        assert_eq!((view, user_id), ("insights", 7));
        let request = report_request(user_id, &line);
        assert_eq!(request.comparison.as_deref(), Some("last_year"));
        assert_eq!(request.start_date.as_deref(), Some("2025-03-01"));
        assert_eq!(request.end_date, None);

        let line = args(&["plan", "7", "targets.csv", "2025", "weekly", "Batumi"]);
        let plan = plan_request(7, &line)?;
        assert_eq!(plan.year, Some(2025));
        assert_eq!(plan.granularity.as_deref(), Some("weekly"));
        assert_eq!(plan.location.as_deref(), Some("Batumi"));
        assert_eq!(plan.start_month, None);
        Ok(())
    }
}
