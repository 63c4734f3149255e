use thiserror::Error;

/// Errors surfaced before or while a test runs.
///
/// Everything that happens inside a scenario iteration is recovered locally
/// and recorded as metrics; only configuration and startup problems reach
/// this type.
#[derive(Debug, Error)]
pub enum Error {
    /// A schedule needs at least one stage.
    #[error("stage list must not be empty")]
    EmptyStages,

    /// Stage durations must be strictly positive.
    #[error("stage {index} has a zero duration")]
    ZeroDurationStage { index: usize },

    /// The reconciliation tick must be strictly positive.
    #[error("reconciliation tick must be positive")]
    ZeroTick,

    /// A report could not be serialized.
    #[error("failed to serialize report: {0}")]
    Report(#[from] serde_json::Error),

    /// The built-in HTTP client could not be constructed.
    #[cfg(feature = "http")]
    #[error("failed to build http client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}
