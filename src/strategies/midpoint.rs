//! Evaluate the element-wise midpoint of the bounds.

use crate::evaluate::Evaluator;
use crate::options::Options;
use crate::stop::StopToken;

use super::{require_same_len, Search, SearchError, SearchResult};

/// Midpoint that stays finite on extreme inputs. `(lo + hi) / 2` overflows
/// when the bounds straddle the representable range.
pub(crate) fn midpoint(lo: f64, hi: f64) -> f64 {
    let mid = (lo + hi) / 2.0;
    if mid.is_finite() {
        mid
    } else {
        lo / 2.0 + hi / 2.0
    }
}

#[derive(Clone, Debug, Default)]
pub struct GuessMidpoint {
    name: String,
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Search for GuessMidpoint {
    fn prefix(&self) -> &'static str {
        "guess_midpoint"
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn get_options(&self) -> Options {
        let mut opts = Options::new();
        opts.set("opt:lower_bound", self.lower.clone());
        opts.set("opt:upper_bound", self.upper.clone());
        opts
    }

    fn set_options(&mut self, opts: &Options) -> Result<(), SearchError> {
        let scoped = opts.scoped(&self.name);
        if let Some(lower) = scoped.f64_vec("opt:lower_bound") {
            self.lower = lower.to_vec();
        }
        if let Some(upper) = scoped.f64_vec("opt:upper_bound") {
            self.upper = upper.to_vec();
        }
        Ok(())
    }

    fn search(
        &mut self,
        compress_fn: &Evaluator,
        token: &StopToken,
    ) -> Result<SearchResult, SearchError> {
        if token.stop_requested() {
            return Ok(SearchResult::aborted());
        }
        require_same_len(&self.lower, &self.upper, "guess_midpoint")?;

        let point: Vec<f64> = self
            .lower
            .iter()
            .zip(&self.upper)
            .map(|(&lo, &hi)| midpoint(lo, hi))
            .collect();
        let output = compress_fn(&point)?;
        Ok(SearchResult::ok(point, output))
    }

    fn box_clone(&self) -> Box<dyn Search> {
        Box::new(self.clone())
    }
}
