//! VU pool — owns every virtual user and tracks the scheduler's target.
//!
//! The pool is the sole mutator of the active set: the orchestrator's tick
//! loop calls [`VuPool::reconcile`] and nothing else touches it. Spawning
//! registers a fresh id; retiring sends a cooperative cancel signal and
//! parks the handle until its current iteration finishes. Retirement is
//! most-recently-spawned first, so long-lived VUs are not churned on
//! ramp-down.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::http::HttpClient;
use crate::metrics::{ERRORS_RATE, ITERATION_DURATION, MetricRegistry};
use crate::scenario::{Context, ScenarioError};

/// Everything needed to mint a new VU.
pub(crate) struct VuSeed<F> {
    pub action: F,
    pub base_url: Arc<str>,
    pub client: Option<Arc<dyn HttpClient>>,
    pub metrics: Arc<MetricRegistry>,
    pub think_time: Duration,
}

struct VuHandle {
    id: u64,
    spawned_at: Instant,
    cancel: watch::Sender<bool>,
    task: JoinHandle<u64>,
}

/// The set of live virtual users.
pub(crate) struct VuPool {
    active: Vec<VuHandle>,
    draining: Vec<VuHandle>,
    next_id: u64,
}

impl VuPool {
    pub fn new() -> Self {
        Self {
            active: Vec::new(),
            draining: Vec::new(),
            next_id: 1,
        }
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    #[cfg(test)]
    fn active_ids(&self) -> Vec<u64> {
        self.active.iter().map(|h| h.id).collect()
    }

    /// Spawn or retire VUs until the active set matches `target`.
    pub fn reconcile<F, Fut>(&mut self, target: usize, seed: &VuSeed<F>)
    where
        F: Fn(Context) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<(), ScenarioError>> + Send + 'static,
    {
        while self.active.len() < target {
            self.spawn_one(seed);
        }
        while self.active.len() > target {
            self.retire_one();
        }
    }

    fn spawn_one<F, Fut>(&mut self, seed: &VuSeed<F>)
    where
        F: Fn(Context) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<(), ScenarioError>> + Send + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        let (cancel, cancel_rx) = watch::channel(false);
        let ctx = Context::new(
            id,
            seed.base_url.clone(),
            seed.client.clone(),
            seed.metrics.clone(),
        );
        tracing::debug!(vu = id, "spawning vu");
        let task = tokio::spawn(vu_loop(ctx, seed.action.clone(), seed.think_time, cancel_rx));
        self.active.push(VuHandle {
            id,
            spawned_at: Instant::now(),
            cancel,
            task,
        });
    }

    fn retire_one(&mut self) {
        if let Some(handle) = self.active.pop() {
            tracing::debug!(vu = handle.id, "retiring vu");
            let _ = handle.cancel.send(true);
            self.draining.push(handle);
        }
    }

    /// Collect VUs whose tasks have finished: retired VUs done with their
    /// last iteration, plus any active VU that panicked. A panicked VU is
    /// counted as an error and replaced by the next reconciliation.
    pub async fn reap(&mut self, metrics: &MetricRegistry) {
        let mut draining = Vec::with_capacity(self.draining.len());
        for handle in self.draining.drain(..) {
            if handle.task.is_finished() {
                join_one(handle, metrics).await;
            } else {
                draining.push(handle);
            }
        }
        self.draining = draining;

        let mut active = Vec::with_capacity(self.active.len());
        for handle in self.active.drain(..) {
            if handle.task.is_finished() {
                join_one(handle, metrics).await;
            } else {
                active.push(handle);
            }
        }
        self.active = active;
    }

    /// Cancel everything and wait for the last iterations to finish.
    pub async fn drain(&mut self, metrics: &MetricRegistry) {
        for handle in &self.active {
            let _ = handle.cancel.send(true);
        }
        self.draining.append(&mut self.active);
        let joins = self
            .draining
            .drain(..)
            .map(|handle| async move { (handle.id, handle.spawned_at, handle.task.await) });
        for (id, spawned_at, outcome) in join_all(joins).await {
            match outcome {
                Ok(iterations) => {
                    tracing::debug!(vu = id, iterations, lived = ?spawned_at.elapsed(), "vu retired")
                }
                Err(error) => {
                    tracing::error!(vu = id, %error, "vu task panicked");
                    metrics.rate(ERRORS_RATE, true);
                }
            }
        }
    }
}

async fn join_one(handle: VuHandle, metrics: &MetricRegistry) {
    match handle.task.await {
        Ok(iterations) => {
            tracing::debug!(
                vu = handle.id,
                iterations,
                lived = ?handle.spawned_at.elapsed(),
                "vu retired"
            );
        }
        Err(error) => {
            tracing::error!(vu = handle.id, %error, "vu task panicked");
            metrics.rate(ERRORS_RATE, true);
        }
    }
}

/// One VU's lifecycle: run the action until cancelled, recovering from
/// per-iteration failures so one bad request never kills the user.
///
/// Cancellation is honored between iterations only; an in-flight iteration
/// always runs to completion so every recorded sample comes from a whole
/// request. Returns the number of completed iterations.
async fn vu_loop<F, Fut>(
    ctx: Context,
    action: F,
    think_time: Duration,
    mut cancel: watch::Receiver<bool>,
) -> u64
where
    F: Fn(Context) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Result<(), ScenarioError>> + Send + 'static,
{
    let mut iterations = 0u64;
    while !*cancel.borrow() {
        let started = Instant::now();
        if let Err(error) = action(ctx.clone()).await {
            tracing::warn!(vu = ctx.vu_id(), %error, "scenario iteration failed");
            ctx.metrics().rate(ERRORS_RATE, true);
        }
        ctx.metrics()
            .trend(ITERATION_DURATION, started.elapsed().as_secs_f64() * 1_000.0);
        iterations += 1;

        // Think time sits between iterations, so it may be cut short.
        if !think_time.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(think_time) => {}
                _ = cancel.changed() => {}
            }
        }
    }
    iterations
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;
    use futures::future::BoxFuture;

    use super::*;

    type TestFuture = BoxFuture<'static, Result<(), ScenarioError>>;

    fn seed_with<F>(metrics: Arc<MetricRegistry>, action: F) -> VuSeed<F>
    where
        F: Fn(Context) -> TestFuture + Send + Sync + Clone + 'static,
    {
        VuSeed {
            action,
            base_url: Arc::from(""),
            client: None,
            metrics,
            think_time: Duration::ZERO,
        }
    }

    fn idle_action(_ctx: Context) -> TestFuture {
        async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            Ok(())
        }
        .boxed()
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_converges_on_the_target() {
        let metrics = Arc::new(MetricRegistry::new());
        let seed = seed_with(metrics.clone(), idle_action);
        let mut pool = VuPool::new();

        pool.reconcile(5, &seed);
        assert_eq!(pool.active_count(), 5);

        pool.reconcile(2, &seed);
        assert_eq!(pool.active_count(), 2);

        pool.drain(&metrics).await;
        assert_eq!(pool.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retirement_is_most_recently_spawned_first() {
        let metrics = Arc::new(MetricRegistry::new());
        let seed = seed_with(metrics.clone(), idle_action);
        let mut pool = VuPool::new();

        pool.reconcile(4, &seed);
        assert_eq!(pool.active_ids(), vec![1, 2, 3, 4]);

        pool.reconcile(2, &seed);
        assert_eq!(pool.active_ids(), vec![1, 2]);

        pool.drain(&metrics).await;
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_vus_get_unique_ids_across_churn() {
        let metrics = Arc::new(MetricRegistry::new());
        let seed = seed_with(metrics.clone(), idle_action);
        let mut pool = VuPool::new();

        pool.reconcile(2, &seed);
        pool.reconcile(0, &seed);
        pool.reconcile(2, &seed);
        assert_eq!(pool.active_ids(), vec![3, 4]);

        pool.drain(&metrics).await;
    }

    #[tokio::test(start_paused = true)]
    async fn reap_counts_a_panicked_vu_as_an_error() {
        let metrics = Arc::new(MetricRegistry::new());
        let seed = seed_with(metrics.clone(), |_ctx: Context| {
            async { panic!("simulated scenario bug") }.boxed()
        });
        let mut pool = VuPool::new();
        pool.reconcile(1, &seed);

        // Let the task run to its panic, then collect it.
        tokio::time::sleep(Duration::from_millis(1)).await;
        pool.reap(&metrics).await;

        assert_eq!(pool.active_count(), 0);
        let errors = metrics.rate_summary(ERRORS_RATE).unwrap();
        assert_eq!(errors.count, 1);
        assert_eq!(errors.rate, 1.0);

        // The next reconciliation replaces the dead VU.
        let replacement = seed_with(metrics.clone(), idle_action);
        pool.reconcile(1, &replacement);
        assert_eq!(pool.active_ids(), vec![2]);
        pool.drain(&metrics).await;
    }

    #[tokio::test(start_paused = true)]
    async fn drain_waits_for_the_inflight_iteration() {
        let metrics = Arc::new(MetricRegistry::new());
        let seed = seed_with(metrics.clone(), |ctx: Context| {
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                ctx.trend("done", 1.0);
                Ok(())
            }
            .boxed()
        });
        let mut pool = VuPool::new();
        pool.reconcile(1, &seed);

        // Cancel mid-iteration; the sample must still land.
        tokio::time::sleep(Duration::from_millis(5)).await;
        pool.drain(&metrics).await;

        assert_eq!(metrics.trend_summary("done").unwrap().count, 1);
    }
}
