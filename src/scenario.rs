//! Scenario — the user-supplied unit of work and the capabilities it runs with.
//!
//! A [`Scenario`] ties a name to an async action, exactly one logical "user
//! action" per invocation. The engine calls the action once per VU iteration
//! with a [`Context`] exposing the request, check, metrics-recording, and
//! cooperative sleep capabilities. Actions return `Result`; an `Err` never
//! kills the VU, it is recorded and the loop moves on.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use typed_builder::TypedBuilder;

use crate::http::{HttpClient, HttpError, HttpResponse, Method, RequestOptions};
use crate::metrics::{CHECKS_RATE, ERRORS_RATE, MetricRegistry};

/// Error a scenario action may return. Iteration failures are logged and
/// counted into the `errors` rate; they never terminate the VU.
pub type ScenarioError = Box<dyn std::error::Error + Send + Sync>;

/// A named predicate evaluated against a response.
pub type Check<'a> = (&'a str, &'a dyn Fn(&HttpResponse) -> bool);

/// Glue tying a scenario name to the action being load-tested.
///
/// The action is any `Fn(Context) -> Future` closure; it is cloned into
/// every VU, so keep heavy state (clients, payloads) outside and move clones
/// in.
#[derive(Debug, Clone, TypedBuilder)]
pub struct Scenario<F, Fut>
where
    F: Fn(Context) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Result<(), ScenarioError>> + Send + 'static,
{
    #[builder(setter(into))]
    pub name: String,
    pub action: F,
    #[builder(default, setter(skip))]
    _marker: PhantomData<Fut>,
}

/// Capabilities handed to each scenario invocation.
///
/// Cheap to clone; all shared state sits behind `Arc`s. The metrics registry
/// is the process-wide aggregator passed by shared reference, never an
/// ambient global.
#[derive(Clone)]
pub struct Context {
    vu_id: u64,
    base_url: Arc<str>,
    client: Option<Arc<dyn HttpClient>>,
    metrics: Arc<MetricRegistry>,
}

impl Context {
    pub(crate) fn new(
        vu_id: u64,
        base_url: Arc<str>,
        client: Option<Arc<dyn HttpClient>>,
        metrics: Arc<MetricRegistry>,
    ) -> Self {
        Self {
            vu_id,
            base_url,
            client,
            metrics,
        }
    }

    /// Identity of the VU running this iteration.
    pub fn vu_id(&self) -> u64 {
        self.vu_id
    }

    /// The shared metric registry, for direct queries or recording.
    pub fn metrics(&self) -> &MetricRegistry {
        &self.metrics
    }

    /// Issue a request through the configured client.
    ///
    /// `target` may be an absolute URL, or a path starting with `/` which is
    /// appended to the runner's base URL.
    pub async fn request(
        &self,
        method: Method,
        target: &str,
        options: &RequestOptions,
    ) -> Result<HttpResponse, HttpError> {
        let client = self.client.as_ref().ok_or(HttpError::NoClient)?;
        let url = if target.starts_with('/') {
            format!("{}{}", self.base_url, target)
        } else {
            target.to_string()
        };
        client.request(method, &url, options).await
    }

    /// Shorthand for [`Context::request`] with [`Method::Get`].
    pub async fn get(
        &self,
        target: &str,
        options: &RequestOptions,
    ) -> Result<HttpResponse, HttpError> {
        self.request(Method::Get, target, options).await
    }

    /// Evaluate named predicates against a response.
    ///
    /// Every predicate outcome lands in the `checks` rate; one `errors`
    /// sample records whether any predicate failed. Returns whether all
    /// predicates held.
    pub fn check(&self, response: &HttpResponse, checks: &[Check<'_>]) -> bool {
        let mut all = true;
        for (name, predicate) in checks {
            let passed = predicate(response);
            self.metrics.rate(CHECKS_RATE, passed);
            if !passed {
                tracing::debug!(
                    vu = self.vu_id,
                    check = name,
                    status = response.status,
                    "check failed"
                );
                all = false;
            }
        }
        self.metrics.rate(ERRORS_RATE, !all);
        all
    }

    /// Record one numeric sample into a named trend.
    pub fn trend(&self, name: &str, value: f64) {
        self.metrics.trend(name, value);
    }

    /// Record one boolean outcome into a named rate.
    pub fn rate(&self, name: &str, hit: bool) {
        self.metrics.rate(name, hit);
    }

    /// Cooperative pause that suspends only this VU.
    pub async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Timings;

    fn context() -> Context {
        Context::new(1, Arc::from(""), None, Arc::new(MetricRegistry::new()))
    }

    fn response(status: u16) -> HttpResponse {
        HttpResponse {
            status,
            timings: Timings::default(),
            body: None,
        }
    }

    #[test]
    fn check_records_every_predicate_and_one_error_sample() {
        let ctx = context();
        let passed = ctx.check(
            &response(404),
            &[
                ("200 OK", &|r: &HttpResponse| r.status == 200),
                ("no body", &|r: &HttpResponse| r.body.is_none()),
            ],
        );
        assert!(!passed);

        let checks = ctx.metrics().rate_summary(CHECKS_RATE).unwrap();
        assert_eq!(checks.count, 2);
        assert_eq!(checks.rate, 0.5);

        let errors = ctx.metrics().rate_summary(ERRORS_RATE).unwrap();
        assert_eq!(errors.count, 1);
        assert_eq!(errors.rate, 1.0);
    }

    #[test]
    fn passing_checks_record_a_clean_error_sample() {
        let ctx = context();
        assert!(ctx.check(
            &response(200),
            &[("200 OK", &|r: &HttpResponse| r.status == 200)],
        ));
        assert_eq!(ctx.metrics().rate_summary(ERRORS_RATE).unwrap().rate, 0.0);
    }

    #[tokio::test]
    async fn request_without_a_client_is_a_request_error() {
        let ctx = context();
        let err = ctx.get("/anything", &RequestOptions::default()).await;
        assert!(matches!(err, Err(HttpError::NoClient)));
    }
}
