//! The observation bus: per-iteration events streamed to metrics sinks.
//!
//! Strategies report through the host's evaluator wrapper, so a sink sees
//! `begin_search`, then `begin_iter`/`end_iter` per evaluation, then exactly
//! one `end_search` carrying the best result.

pub mod composite;
pub mod noop;
pub mod progress;
pub mod record;

use std::sync::OnceLock;

use crate::options::Options;
use crate::strategies::{Registry, SearchError};

pub trait SearchMetrics: Send + Sync {
    /// The identifier this sink registers under; also its option prefix.
    fn prefix(&self) -> &'static str;

    fn set_name(&mut self, _name: &str) {}

    fn name(&self) -> &str {
        ""
    }

    /// Called once before the first evaluation.
    fn begin_search(&mut self) {}

    /// Called before each evaluation the host reports.
    fn begin_iter(&mut self, _inputs: &[f64]) {}

    /// Called after each reported evaluation with its measurement.
    fn end_iter(&mut self, _inputs: &[f64], _output: &[f64]) {}

    /// Called once with the best result; the vectors may be empty when no
    /// evaluation succeeded.
    fn end_search(&mut self, _inputs: &[f64], _output: &[f64]) {}

    fn get_options(&self) -> Options {
        Options::new()
    }

    fn set_options(&mut self, _opts: &Options) -> Result<(), SearchError> {
        Ok(())
    }

    fn get_metrics_results(&self) -> Options {
        Options::new()
    }

    fn box_clone(&self) -> Box<dyn SearchMetrics>;
}

impl Clone for Box<dyn SearchMetrics> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// The process-wide metrics sink registry, seeded with the stock sinks.
pub fn search_metrics_plugins() -> &'static Registry<Box<dyn SearchMetrics>> {
    static PLUGINS: OnceLock<Registry<Box<dyn SearchMetrics>>> = OnceLock::new();
    PLUGINS.get_or_init(|| {
        let registry = Registry::new();
        registry.register("noop", || {
            Box::new(noop::Noop::default()) as Box<dyn SearchMetrics>
        });
        registry.register("progress_printer", || {
            Box::new(progress::ProgressPrinter::default()) as Box<dyn SearchMetrics>
        });
        registry.register("record_search", || {
            Box::new(record::RecordSearch::default()) as Box<dyn SearchMetrics>
        });
        registry.register("composite_search", || {
            Box::new(composite::CompositeSearch::default()) as Box<dyn SearchMetrics>
        });
        registry
    })
}
