//! Surge — a small virtual-user load-testing engine for Rust.
//!
//! Surge drives concurrency the way tools such as K6 do: you declare a list
//! of time-bounded stages, each with a target number of virtual users (VUs),
//! and the engine ramps the active VU count along that curve while every VU
//! repeatedly executes your scenario function. Per-request latency and error
//! telemetry is aggregated into queryable statistical summaries.
//!
//! # Architecture
//!
//! The main building blocks are:
//!
//! - [`Scenario`]: glue tying a name to the user-supplied async action — one
//!   logical "user action" per invocation.
//! - [`StageSchedule`]: the declared [`Stage`] list compiled into a
//!   piecewise-linear target-concurrency curve, a pure function of elapsed
//!   time.
//! - [`Runner`]: the orchestrator. It ticks the schedule, reconciles the VU
//!   pool against the target (spawning new VUs, retiring the
//!   most-recently-spawned first), and drains everything once the schedule
//!   is exhausted or a [`StopHandle`] fires.
//! - [`Context`]: the capabilities each scenario invocation runs with —
//!   issuing requests, evaluating named checks, recording trend/rate
//!   metrics, and cooperative sleeping.
//! - [`MetricRegistry`]: the shared, concurrent accumulator behind
//!   [`TrendSummary`] and [`RateSummary`].
//! - [`Report`] / [`Reporter`]: turn the final aggregate into
//!   machine-readable output and send it somewhere.
//!
//! The HTTP client is an external collaborator behind the [`HttpClient`]
//! trait; a `reqwest`-backed implementation ships behind the default `http`
//! feature.
//!
//! # Design goals
//!
//! - A VU is never killed mid-iteration: cancellation is cooperative and
//!   checked between iterations, so every recorded sample comes from a fully
//!   completed request.
//! - One bad request never kills the user: iteration failures are recorded
//!   into the `errors` rate and the VU moves on, which is what sustains load
//!   under partial server failure.
//! - Metrics recording happens on every request of every VU, so the
//!   registry uses per-metric locks rather than one global one.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use surge::{
//!     Context, HttpResponse, ReqwestClient, RequestOptions, Reporter, Runner, Scenario,
//!     ScenarioError, Stage, StageSchedule, StdoutReporter,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let scenario = Scenario::builder()
//!         .name("smoke")
//!         .action(|ctx: Context| async move {
//!             let res = ctx.get("/registries", &RequestOptions::default()).await?;
//!             ctx.check(&res, &[("200 OK", &|r: &HttpResponse| r.status == 200)]);
//!             ctx.trend("timing_registry", res.timings.total_ms());
//!             ctx.sleep(Duration::from_millis(10)).await;
//!             Ok::<(), ScenarioError>(())
//!         })
//!         .build();
//!
//!     let runner = Runner::builder()
//!         .scenario(scenario)
//!         .schedule(StageSchedule::new(vec![
//!             // Over 10s, ramp up from 0 users to 10, then hold for 60s.
//!             Stage::new(Duration::from_secs(10), 10),
//!             Stage::new(Duration::from_secs(60), 10),
//!         ])?)
//!         .base_url("http://localhost:8000")
//!         .client(Arc::new(ReqwestClient::new()?))
//!         .build();
//!
//!     let report = runner.run().await?;
//!     StdoutReporter.report(report).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Feature flags
//!
//! - `http`: provides [`ReqwestClient`], a built-in [`HttpClient`] backed by
//!   `reqwest`. (Enabled by default; disable to bring your own client.)
//!
//! # Where to start
//!
//! - Read the docs for [`Runner`], [`Scenario`], and [`Context`].
//! - See `demos/http.rs` for a runnable scenario against a local server.

/// Configuration and startup errors
pub mod error;
/// The HTTP collaborator seam
pub mod http;
/// Concurrent trend/rate aggregation and summaries
pub mod metrics;
/// The VU pool and per-VU scenario loop
mod pool;
/// Reports and Reporters
pub mod report;
/// The orchestrator that glues everything together
pub mod runner;
/// Scenario definition and per-iteration capabilities
pub mod scenario;
/// Stage lists and the target-concurrency curve
pub mod stage;

pub use error::Error;
#[cfg(feature = "http")]
pub use http::ReqwestClient;
pub use http::{HttpClient, HttpError, HttpResponse, Method, RequestOptions, Timings};
pub use metrics::{
    CHECKS_RATE, ERRORS_RATE, ITERATION_DURATION, MetricRegistry, MetricsSummary, RateSummary,
    Sample, TrendSummary, VUS_TREND,
};
pub use report::{Report, Reporter, StdoutReporter, SummaryReport};
pub use runner::{RunState, Runner, StopHandle};
pub use scenario::{Check, Context, Scenario, ScenarioError};
pub use stage::{Phase, Stage, StageSchedule};
