//! Test orchestrator — drives a scenario through its stage schedule.
//!
//! [`Runner::run`] owns the whole lifecycle: it ticks at a fixed interval,
//! asks the [`StageSchedule`] for the current target concurrency, reconciles
//! the VU pool against it, and once the schedule is exhausted (or a
//! [`StopHandle`] fires) drains every VU and returns the final metric
//! summaries. The state machine is
//! `NotStarted -> Ramping/Steady -> Draining -> Completed`, published over a
//! watch channel for observers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use typed_builder::TypedBuilder;

use crate::error::Error;
use crate::http::HttpClient;
use crate::metrics::{MetricRegistry, VUS_TREND};
use crate::pool::{VuPool, VuSeed};
use crate::report::SummaryReport;
use crate::scenario::{Context, Scenario, ScenarioError};
use crate::stage::{Phase, StageSchedule};

/// Where a run currently is in its lifecycle.
///
/// `Ramping` and `Steady` are informative sub-states of the active period;
/// the engine reconciles both identically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    NotStarted,
    Ramping,
    Steady,
    Draining,
    Completed,
}

/// Cooperative early-stop switch. Flipping it sends the run straight to
/// `Draining` from any state; in-flight iterations still complete.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Top-level driver tying a scenario to a schedule and the shared
/// collaborators (HTTP client, metric registry).
///
/// Build one with [`Runner::builder`]; the defaults cover the common case
/// (1s reconciliation tick, no think time, fresh registry).
#[derive(TypedBuilder)]
pub struct Runner<F, Fut>
where
    F: Fn(Context) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Result<(), ScenarioError>> + Send + 'static,
{
    scenario: Scenario<F, Fut>,
    schedule: StageSchedule,

    /// How often the pool is reconciled against the schedule.
    #[builder(default = Duration::from_secs(1))]
    tick: Duration,

    /// Pause inserted between scenario iterations, on top of any sleeps the
    /// scenario performs itself.
    #[builder(default = Duration::ZERO)]
    think_time: Duration,

    /// Prefix for path-style request targets.
    #[builder(default = String::new(), setter(into))]
    base_url: String,

    /// The external HTTP collaborator. Scenarios that never issue requests
    /// can leave it unset.
    #[builder(default, setter(strip_option))]
    client: Option<Arc<dyn HttpClient>>,

    /// Registry the run records into. Shared, so callers can poll summaries
    /// mid-run or hand the same registry to several consecutive runs.
    #[builder(default = Arc::new(MetricRegistry::new()))]
    metrics: Arc<MetricRegistry>,

    #[builder(default, setter(skip))]
    stop: StopHandle,

    #[builder(default = watch::channel(RunState::NotStarted), setter(skip))]
    state: (watch::Sender<RunState>, watch::Receiver<RunState>),
}

impl<F, Fut> Runner<F, Fut>
where
    F: Fn(Context) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Result<(), ScenarioError>> + Send + 'static,
{
    /// Handle for requesting an early, graceful stop.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Observe lifecycle transitions as they happen.
    pub fn state(&self) -> watch::Receiver<RunState> {
        self.state.1.clone()
    }

    /// The registry this run records into.
    pub fn metrics(&self) -> Arc<MetricRegistry> {
        self.metrics.clone()
    }

    /// Observers only wake on real transitions, not on every tick.
    fn publish(&self, state: RunState) {
        self.state.0.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    /// Drive the whole test and block until every VU has drained.
    ///
    /// Returns the final per-metric summaries. Iteration-level failures are
    /// absorbed into the metrics; only configuration problems error here.
    pub async fn run(&self) -> Result<SummaryReport, Error> {
        if self.tick.is_zero() {
            return Err(Error::ZeroTick);
        }

        let seed = VuSeed {
            action: self.scenario.action.clone(),
            base_url: Arc::from(self.base_url.as_str()),
            client: self.client.clone(),
            metrics: self.metrics.clone(),
            think_time: self.think_time,
        };
        let mut pool = VuPool::new();
        let total = self.schedule.total_duration();
        tracing::info!(
            scenario = %self.scenario.name,
            total = ?total,
            tick = ?self.tick,
            "starting test run"
        );

        let started = Instant::now();
        let mut ticker = tokio::time::interval(self.tick);
        loop {
            ticker.tick().await;
            if self.stop.is_stopped() {
                tracing::info!("stop requested, draining early");
                break;
            }
            let elapsed = started.elapsed();
            if elapsed >= total {
                break;
            }

            let state = match self.schedule.phase_at(elapsed) {
                Some(Phase::Ramp) => RunState::Ramping,
                Some(Phase::Hold) => RunState::Steady,
                None => break,
            };
            self.publish(state);

            pool.reap(&self.metrics).await;
            pool.reconcile(self.schedule.target_at(elapsed) as usize, &seed);
            self.metrics.trend(VUS_TREND, pool.active_count() as f64);
        }

        self.publish(RunState::Draining);
        tracing::info!(active = pool.active_count(), "draining vus");
        pool.drain(&self.metrics).await;

        self.publish(RunState::Completed);
        tracing::info!(scenario = %self.scenario.name, "run complete");

        Ok(SummaryReport {
            scenario: self.scenario.name.clone(),
            metrics: self.metrics.summary(),
        })
    }
}
