//! Search strategies and the contract they share.
//!
//! A strategy receives box bounds, an objective mode, and a black-box
//! evaluator; it returns the best parameter vector it found. Wrappers embed
//! inner strategies and address their options through scoped names.

pub mod binary;
pub mod fraz;
pub mod grid;
pub mod guess;
pub mod guess_first;
pub mod midpoint;
pub mod random;
pub mod registry;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::evaluate::{EvalError, Evaluator};
use crate::options::Options;
use crate::stop::StopToken;

pub use registry::{search_plugins, Registry};

/// Summary of one `search` invocation.
///
/// Status convention: `0` success, `< 0` warning with a usable best-so-far,
/// `> 0` hard error with possibly empty `inputs`/`output`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub inputs: Vec<f64>,
    pub output: Vec<f64>,
    pub status: i32,
    pub msg: String,
}

impl SearchResult {
    pub fn ok(inputs: Vec<f64>, output: Vec<f64>) -> Self {
        Self {
            inputs,
            output,
            status: 0,
            msg: String::new(),
        }
    }

    /// Returned when the stop token was already tripped at entry: a
    /// non-error result with nothing evaluated.
    pub fn aborted() -> Self {
        Self {
            inputs: Vec::new(),
            output: Vec::new(),
            status: 0,
            msg: "stop requested before first evaluation".to_string(),
        }
    }
}

/// Hard failures a strategy cannot express as a status code.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Evaluator(#[from] EvalError),
    #[error("{strategy} does not support objective mode {mode}")]
    Unsupported {
        strategy: &'static str,
        mode: &'static str,
    },
}

impl SearchError {
    pub fn config(msg: impl Into<String>) -> Self {
        SearchError::Config(msg.into())
    }
}

/// The uniform contract every search strategy exposes.
///
/// `Sync` because wrappers clone prototypes from worker threads; per-search
/// mutable state lives in locals or concurrency-safe caches.
pub trait Search: Send + Sync {
    /// The identifier this strategy registers under; also its option prefix.
    fn prefix(&self) -> &'static str;

    /// Establish the dotted path used for option scoping. Wrappers rename
    /// children to `<name>/<child prefix>`.
    fn set_name(&mut self, name: &str);

    fn name(&self) -> &str;

    /// Current configuration keyed by namespaced strings.
    fn get_options(&self) -> Options;

    /// Apply recognized keys; unknown keys are ignored. Fails only when a
    /// supplied value is structurally invalid for this strategy.
    fn set_options(&mut self, opts: &Options) -> Result<(), SearchError>;

    /// Compile-time capabilities: child strategy names, thread safety.
    fn get_configuration(&self) -> Options {
        Options::new()
    }

    /// Run the optimization. Returns [`SearchResult::aborted`] when the stop
    /// token was tripped before the first evaluation.
    fn search(
        &mut self,
        compress_fn: &Evaluator,
        token: &StopToken,
    ) -> Result<SearchResult, SearchError>;

    fn box_clone(&self) -> Box<dyn Search>;
}

impl Clone for Box<dyn Search> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Key under which `get_configuration` lists embedded strategy names.
pub const CONFIG_CHILDREN: &str = "opt:children";

pub(crate) fn require_same_len(
    lower: &[f64],
    upper: &[f64],
    strategy: &'static str,
) -> Result<(), SearchError> {
    if lower.is_empty() || lower.len() != upper.len() {
        return Err(SearchError::config(format!(
            "{strategy}: lower and upper bounds must be non-empty and the same length"
        )));
    }
    if lower.iter().zip(upper).any(|(lo, hi)| lo > hi) {
        return Err(SearchError::config(format!(
            "{strategy}: lower bound exceeds upper bound"
        )));
    }
    Ok(())
}
