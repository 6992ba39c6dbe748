//! Comparison modes and report date windows.
//!
//! A request names a comparison mode and, optionally, a start and end date. This
//! module turns those into the current window and the same month/day span re-stamped
//! onto the comparison years. Bad or missing dates never fail a request; they fall
//! back to the whole current year.

use crate::errors::{Error, Result};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};
use serde::Serialize;

/// Which years a report compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ComparisonMode {
    /// Latest year against the year before it
    LatestVsPrior,
    /// Latest year against the year two before it
    LatestVsTwoPrior,
    /// The last complete year against the year before it
    Default,
}

/// Concrete years selected by a [`ComparisonMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ComparisonYears {
    /// Year being reported on
    pub current: i32,
    /// Year it is compared against
    pub previous: i32,
    /// Third year for long-term trends, when the mode has one
    pub two_back: Option<i32>,
}

impl ComparisonMode {
    /// Parses a mode token.
    ///
    /// Accepts the named tokens as well as the `"2026-2025"` style used by existing
    /// dashboards, interpreted relative to `latest_year`. Anything else is
    /// [`ComparisonMode::Default`].
    #[must_use]
    pub fn parse(token: Option<&str>, latest_year: i32) -> Self {
        let Some(token) = token.map(str::trim) else {
            return Self::Default;
        };
        match token {
            "latest-vs-prior" => Self::LatestVsPrior,
            "latest-vs-two-prior" => Self::LatestVsTwoPrior,
            _ if token == format!("{}-{}", latest_year, latest_year - 1) => Self::LatestVsPrior,
            _ if token == format!("{}-{}", latest_year, latest_year - 2) => Self::LatestVsTwoPrior,
            _ => Self::Default,
        }
    }

    /// Years this mode compares, anchored on `latest_year`.
    #[must_use]
    pub const fn years(self, latest_year: i32) -> ComparisonYears {
        match self {
            Self::LatestVsPrior => ComparisonYears {
                current: latest_year,
                previous: latest_year - 1,
                two_back: Some(latest_year - 2),
            },
            Self::LatestVsTwoPrior => ComparisonYears {
                current: latest_year,
                previous: latest_year - 2,
                two_back: None,
            },
            Self::Default => ComparisonYears {
                current: latest_year - 1,
                previous: latest_year - 2,
                two_back: Some(latest_year - 3),
            },
        }
    }
}

/// Which of the compared periods a query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Period {
    /// The reported span
    Current,
    /// The same span in the comparison year
    Previous,
    /// The same span two comparison steps back
    TwoBack,
}

/// A closed `[start, end]` interval of instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    /// First instant, at 00:00:00 local time
    pub start: DateTime<Utc>,
    /// Last instant, at 23:59:59 local time
    pub end: DateTime<Utc>,
}

impl Window {
    /// Window covering whole local days from `start` through `end`.
    #[must_use]
    pub fn days(start: NaiveDate, end: NaiveDate, tz: FixedOffset) -> Self {
        Self {
            start: start_of_day(start, tz),
            end: start_of_day(end, tz) + TimeDelta::seconds(86_399),
        }
    }

    /// Whether `instant` falls inside the window.
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }
}

fn start_of_day(date: NaiveDate, tz: FixedOffset) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::default());
    tz.from_local_datetime(&naive).single().map_or_else(
        || Utc.from_utc_datetime(&naive),
        |local| local.with_timezone(&Utc),
    )
}

/// Parses a `YYYY-MM-DD` report date.
pub fn parse_report_date(input: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").map_err(|_| Error::InvalidDateInput {
        input: input.to_string(),
    })
}

/// Moves `date` into `year`, keeping month and day. Feb 29 becomes Feb 28 in
/// non-leap years.
#[must_use]
pub fn restamp_year(date: NaiveDate, year: i32) -> NaiveDate {
    date.with_year(year)
        .or_else(|| NaiveDate::from_ymd_opt(year, date.month(), 28))
        .unwrap_or(date)
}

fn year_boundary(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

fn date_or(input: Option<&str>, fallback: NaiveDate, which: &str) -> NaiveDate {
    match input.filter(|s| !s.trim().is_empty()).map(parse_report_date) {
        Some(Ok(date)) => date,
        Some(Err(e)) => {
            tracing::debug!("Falling back to {fallback} for {which} date: {e}");
            fallback
        }
        None => fallback,
    }
}

/// The requested start and end dates, forced into the current year.
///
/// Missing or unparsable input falls back to Jan 1 / Dec 31 of `current_year`.
#[must_use]
pub fn requested_dates(
    current_year: i32,
    start: Option<&str>,
    end: Option<&str>,
) -> (NaiveDate, NaiveDate) {
    let start = date_or(start, year_boundary(current_year, 1, 1), "start");
    let end = date_or(end, year_boundary(current_year, 12, 31), "end");
    (
        restamp_year(start, current_year),
        restamp_year(end, current_year),
    )
}

/// Pulls `end` back to the last day that actually has data.
#[must_use]
pub fn clamp_end(end: NaiveDate, latest_available: Option<NaiveDate>) -> NaiveDate {
    match latest_available {
        Some(latest) if latest < end => {
            tracing::debug!("Clamping end date {end} to latest available data {latest}");
            latest
        }
        _ => end,
    }
}

/// The resolved date portion of a filter context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportPeriod {
    /// Compared years
    pub years: ComparisonYears,
    /// First reported day in the current year
    pub start_date: NaiveDate,
    /// Last reported day in the current year, after clamping
    pub end_date: NaiveDate,
    /// Current-year window
    pub current: Window,
    /// Same span in the previous year
    pub previous: Window,
    /// Same span two steps back, when the mode has a third year
    pub two_back: Option<Window>,
}

impl ReportPeriod {
    /// Builds all windows from the current-year dates.
    #[must_use]
    pub fn new(
        years: ComparisonYears,
        start_date: NaiveDate,
        end_date: NaiveDate,
        tz: FixedOffset,
    ) -> Self {
        let span = |year: i32| {
            Window::days(
                restamp_year(start_date, year),
                restamp_year(end_date, year),
                tz,
            )
        };
        Self {
            years,
            start_date,
            end_date,
            current: Window::days(start_date, end_date, tz),
            previous: span(years.previous),
            two_back: years.two_back.map(span),
        }
    }

    /// Window for `period`, if the comparison mode defines one.
    #[must_use]
    pub const fn window(&self, period: Period) -> Option<Window> {
        match period {
            Period::Current => Some(self.current),
            Period::Previous => Some(self.previous),
            Period::TwoBack => self.two_back,
        }
    }

    /// Year covered by `period`.
    #[must_use]
    pub const fn year(&self, period: Period) -> Option<i32> {
        match period {
            Period::Current => Some(self.years.current),
            Period::Previous => Some(self.years.previous),
            Period::TwoBack => self.years.two_back,
        }
    }

    /// Display text like `"Jan 01 - Mar 31, 2025"`.
    #[must_use]
    pub fn date_range_text(&self) -> String {
        format!(
            "{} - {}, {}",
            self.start_date.format("%b %d"),
            self.end_date.format("%b %d"),
            self.years.current
        )
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_comparison_mode_tokens() {
        assert_eq!(
            ComparisonMode::parse(Some("latest-vs-prior"), 2026),
            ComparisonMode::LatestVsPrior
        );
        assert_eq!(
            ComparisonMode::parse(Some("2026-2024"), 2026),
            ComparisonMode::LatestVsTwoPrior
        );
        assert_eq!(
            ComparisonMode::parse(Some("2025-2024"), 2026),
            ComparisonMode::Default
        );
        assert_eq!(ComparisonMode::parse(None, 2026), ComparisonMode::Default);
        assert_eq!(
            ComparisonMode::parse(Some("garbage"), 2026),
            ComparisonMode::Default
        );
    }

    #[test]
    fn test_comparison_years() {
        let years = ComparisonMode::LatestVsPrior.years(2026);
        assert_eq!((years.current, years.previous, years.two_back), (2026, 2025, Some(2024)));

        let years = ComparisonMode::LatestVsTwoPrior.years(2026);
        assert_eq!((years.current, years.previous, years.two_back), (2026, 2024, None));

        let years = ComparisonMode::Default.years(2026);
        assert_eq!((years.current, years.previous, years.two_back), (2025, 2024, Some(2023)));
    }

    #[test]
    fn test_parse_report_date_rejects_garbage() {
        assert_eq!(parse_report_date("2025-03-04").unwrap(), ymd(2025, 3, 4));
        assert!(matches!(
            parse_report_date("03/04/2025"),
            Err(Error::InvalidDateInput { .. })
        ));
    }

    #[test]
    fn test_requested_dates_fall_back_to_full_year() {
        let (start, end) = requested_dates(2025, Some("not-a-date"), None);
        assert_eq!(start, ymd(2025, 1, 1));
        assert_eq!(end, ymd(2025, 12, 31));
    }

    #[test]
    fn test_requested_dates_forced_into_current_year() {
        let (start, end) = requested_dates(2025, Some("2019-02-10"), Some("2031-06-30"));
        assert_eq!(start, ymd(2025, 2, 10));
        assert_eq!(end, ymd(2025, 6, 30));
    }

    #[test]
    fn test_restamp_leap_day() {
        assert_eq!(restamp_year(ymd(2024, 2, 29), 2025), ymd(2025, 2, 28));
        assert_eq!(restamp_year(ymd(2025, 7, 14), 2024), ymd(2024, 7, 14));
    }

    #[test]
    fn test_clamp_end() {
        assert_eq!(
            clamp_end(ymd(2025, 12, 31), Some(ymd(2025, 5, 2))),
            ymd(2025, 5, 2)
        );
        assert_eq!(
            clamp_end(ymd(2025, 3, 1), Some(ymd(2025, 5, 2))),
            ymd(2025, 3, 1)
        );
        assert_eq!(clamp_end(ymd(2025, 3, 1), None), ymd(2025, 3, 1));
    }

    #[test]
    fn test_report_period_windows() {
        let years = ComparisonMode::Default.years(2026);
        let tz = FixedOffset::east_opt(0).unwrap();
        let period = ReportPeriod::new(years, ymd(2025, 3, 1), ymd(2025, 3, 31), tz);

        assert_eq!(period.current.start.to_rfc3339(), "2025-03-01T00:00:00+00:00");
        assert_eq!(period.current.end.to_rfc3339(), "2025-03-31T23:59:59+00:00");
        assert_eq!(period.previous.start.to_rfc3339(), "2024-03-01T00:00:00+00:00");
        assert_eq!(
            period.two_back.unwrap().end.to_rfc3339(),
            "2023-03-31T23:59:59+00:00"
        );
        assert_eq!(period.date_range_text(), "Mar 01 - Mar 31, 2025");
    }

    #[test]
    fn test_window_respects_offset() {
        let tz = FixedOffset::east_opt(4 * 3600).unwrap();
        let window = Window::days(ymd(2025, 1, 1), ymd(2025, 1, 1), tz);
        assert_eq!(window.start.to_rfc3339(), "2024-12-31T20:00:00+00:00");
        assert!(window.contains(window.end));
        assert!(!window.contains(window.end + TimeDelta::seconds(1)));
    }
}
