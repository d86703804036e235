use thiserror::Error;

/// Errors surfaced synchronously by the loader.
///
/// Compute failures, stale results and cache misbehavior are deliberately
/// absent: they are contained at the task boundary and the absence of a
/// delivered result is the failure signal.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Indexed load attempted without a data source configured.
    /// This is a programming error and fails fast at call time.
    #[error("no data source configured; indexed loads require one")]
    NoDataSource,
    /// Indexed load past the end of the data source.
    #[error("index {index} out of bounds (data source holds {len} items)")]
    IndexOutOfBounds { index: usize, len: usize },
    /// The loader has been shut down and accepts no new work.
    #[error("loader is shutting down")]
    ShuttingDown,
}
