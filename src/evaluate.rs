//! The evaluator contract between the host compressor and the strategies.

use thiserror::Error;

/// Ordered values read from the compressor's metrics bag; the first element
/// is the primary objective unless a reducer collapsed it.
pub type Measurement = Vec<f64>;

/// The black-box callable a strategy optimizes. Accepts a parameter vector
/// in the order of `opt:inputs`, returns the measurement vector in the order
/// of `opt:output`.
///
/// Concurrent strategies call this from multiple threads; the host builds it
/// over a cloned compressor per call.
pub type Evaluator<'a> = dyn Fn(&[f64]) -> Result<Measurement, EvalError> + Sync + 'a;

/// A failure raised from within an evaluation. Strategies propagate these
/// unchanged; the outermost invoker converts them to status 2.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EvalError {
    #[error("failed to configure setting: {0}")]
    Configure(String),
    #[error("failed to configure compressor: {0}")]
    Compressor(String),
    #[error("failed to compress data: {0}")]
    Compress(String),
    #[error("failed to decompress data: {0}")]
    Decompress(String),
    #[error("failed to retrieve metric: {0}")]
    MissingMetric(String),
}
