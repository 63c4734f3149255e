//! Reports and Reporters.
//!
//! A [`Report`] is the final, machine-readable view of a run; a
//! [`Reporter`] sends it somewhere (stdout, file, database). The built-in
//! [`SummaryReport`] carries every per-metric summary and serializes to
//! JSON.

use std::fmt::Debug;

use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::Error;
use crate::metrics::MetricsSummary;

/// Final, serializable view of one run.
pub trait Report
where
    Self: Send + Sync + Debug + Serialize + DeserializeOwned,
{
}

/// Sink for reports: stdout, a file, a metrics backend, whatever you need.
#[async_trait]
pub trait Reporter<R: Report> {
    async fn report(&self, report: R) -> Result<(), Error>;
}

/// Per-metric summaries for one completed scenario run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SummaryReport {
    pub scenario: String,
    pub metrics: MetricsSummary,
}

impl Report for SummaryReport {}

/// Prints the report to stdout as pretty JSON.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdoutReporter;

#[async_trait]
impl Reporter<SummaryReport> for StdoutReporter {
    async fn report(&self, report: SummaryReport) -> Result<(), Error> {
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }
}
