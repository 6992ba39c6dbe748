//! Core business logic - framework-agnostic reporting operations.
//!
//! Every report goes through [`report::ReportEngine`], which resolves one
//! [`filter::FilterContext`] per request and hands it to the aggregations in
//! [`aggregate`]. Scoring, narration and formatting are pure functions over the
//! aggregated values.

pub mod access;
pub mod aggregate;
pub mod cache;
pub mod console;
pub mod export;
pub mod filter;
pub mod format;
pub mod loader;
pub mod metrics;
pub mod narrator;
pub mod period;
pub mod plan;
pub mod profile;
pub mod report;
pub mod scoring;
