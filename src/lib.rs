//! Automatic parameter selection for lossy compressors.
//!
//! Given box bounds over a set of tunable compressor settings, an objective
//! direction, and a black-box evaluator that compresses and measures, the
//! search strategies in this crate return the best parameter vector found
//! together with its measured outputs.

pub mod compressor;
pub mod evaluate;
pub mod metrics;
pub mod objective;
pub mod opt;
pub mod options;
pub mod queue;
pub mod stop;
pub mod strategies;

pub use evaluate::{EvalError, Evaluator, Measurement};
pub use objective::{Mode, Reducer};
pub use options::{Options, OptionValue, TensorBuf};
pub use stop::StopToken;
pub use strategies::{search_plugins, Search, SearchError, SearchResult};
