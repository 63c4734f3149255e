//! HTTP collaborator seam.
//!
//! The engine never speaks HTTP itself; it hands every request to an
//! [`HttpClient`] and consumes the status code and timing breakdown that
//! come back. A `reqwest`-backed implementation ships behind the default
//! `http` feature; tests swap in mocks.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// HTTP method, covering what load scenarios actually issue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Patch,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Head => "HEAD",
            Method::Patch => "PATCH",
        };
        f.write_str(name)
    }
}

/// Per-request knobs recognized by every client implementation.
#[derive(Clone, Copy, Debug)]
pub struct RequestOptions {
    /// Maximum redirects to follow; 0 (the default) disables following.
    pub redirects: u32,
    /// Skip buffering the response body, for memory efficiency under load.
    pub discard_response_body: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            redirects: 0,
            discard_response_body: false,
        }
    }
}

/// Timing breakdown of one completed request.
#[derive(Clone, Copy, Debug, Default)]
pub struct Timings {
    /// Time until response headers arrived.
    pub wait: Duration,
    /// Full request duration, including redirects and body transfer.
    pub total: Duration,
}

impl Timings {
    /// Total duration in milliseconds, the usual unit for latency trends.
    pub fn total_ms(&self) -> f64 {
        self.total.as_secs_f64() * 1_000.0
    }
}

/// A completed HTTP exchange, as consumed by checks and metrics.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub timings: Timings,
    /// `None` when the body was discarded.
    pub body: Option<Vec<u8>>,
}

impl HttpResponse {
    /// Parse the body as JSON, if present and valid.
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(self.body.as_deref()?).ok()
    }
}

/// Request-level failures. These are recoverable by design: the scenario
/// runner records them and moves on to the next iteration.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("no http client configured for this runner")]
    NoClient,
    #[error("redirect response missing a usable location")]
    BadRedirect,
    #[error("transport error: {0}")]
    Transport(String),
}

/// External collaborator that performs one HTTP request and reports its
/// status and timing. Implementations must be shareable across every VU.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn request(
        &self,
        method: Method,
        url: &str,
        options: &RequestOptions,
    ) -> Result<HttpResponse, HttpError>;
}

#[cfg(feature = "http")]
pub use builtin::ReqwestClient;

#[cfg(feature = "http")]
mod builtin {
    use tokio::time::Instant;

    use super::*;
    use crate::error::Error;

    /// Built-in [`HttpClient`] backed by `reqwest`.
    ///
    /// Redirects are followed manually so the `redirects` option can vary
    /// per request instead of being fixed at client construction.
    #[derive(Clone, Debug)]
    pub struct ReqwestClient {
        inner: reqwest::Client,
    }

    impl ReqwestClient {
        pub fn new() -> Result<Self, Error> {
            let inner = reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .map_err(Error::ClientBuild)?;
            Ok(Self { inner })
        }
    }

    fn to_reqwest(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
            Method::Head => reqwest::Method::HEAD,
            Method::Patch => reqwest::Method::PATCH,
        }
    }

    #[async_trait]
    impl HttpClient for ReqwestClient {
        async fn request(
            &self,
            method: Method,
            url: &str,
            options: &RequestOptions,
        ) -> Result<HttpResponse, HttpError> {
            let started = Instant::now();
            let mut url = url.to_string();
            let mut hops = 0u32;
            loop {
                let response = self
                    .inner
                    .request(to_reqwest(method), &url)
                    .send()
                    .await
                    .map_err(|e| HttpError::Transport(e.to_string()))?;
                let wait = started.elapsed();
                let status = response.status().as_u16();

                if (300..400).contains(&status) && hops < options.redirects {
                    let location = response
                        .headers()
                        .get(reqwest::header::LOCATION)
                        .and_then(|v| v.to_str().ok())
                        .ok_or(HttpError::BadRedirect)?;
                    url = response
                        .url()
                        .join(location)
                        .map_err(|_| HttpError::BadRedirect)?
                        .to_string();
                    hops += 1;
                    continue;
                }

                let body = if options.discard_response_body {
                    None
                } else {
                    Some(
                        response
                            .bytes()
                            .await
                            .map_err(|e| HttpError::Transport(e.to_string()))?
                            .to_vec(),
                    )
                };
                return Ok(HttpResponse {
                    status,
                    timings: Timings {
                        wait,
                        total: started.elapsed(),
                    },
                    body,
                });
            }
        }
    }
}
