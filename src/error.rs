use thiserror::Error;

/// Failures surfaced by the source engine.
///
/// Numerical trouble (non-convergent integrals, NaN densities) is
/// never an error: such values are replaced by zero and counted in
/// the source's diagnostics instead.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("operation cancelled")]
    Cancelled,
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("unable to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
