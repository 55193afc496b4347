//! 1-D binary search toward a target objective.
//!
//! Assumes the objective is monotone non-decreasing in the parameter and
//! brackets the target between the evaluated bounds. Violations of the
//! monotonicity assumption are detected and reported rather than looped on.

use log::debug;

use crate::evaluate::Evaluator;
use crate::options::Options;
use crate::stop::{StopToken, Timer};

use super::{Search, SearchError, SearchResult};

#[derive(Clone, Debug)]
pub struct BinarySearch {
    name: String,
    prediction: Vec<f64>,
    lower: Vec<f64>,
    upper: Vec<f64>,
    target: Option<f64>,
    global_rel_tolerance: f64,
    max_iterations: u32,
    max_seconds: u32,
}

impl Default for BinarySearch {
    fn default() -> Self {
        Self {
            name: String::new(),
            prediction: Vec::new(),
            lower: Vec::new(),
            upper: Vec::new(),
            target: None,
            global_rel_tolerance: 0.1,
            max_iterations: 100,
            max_seconds: u32::MAX,
        }
    }
}

fn one_dimensional(v: &[f64], key: &str) -> Result<Vec<f64>, SearchError> {
    if v.len() > 1 {
        return Err(SearchError::config(format!(
            "binary: {key} must have length 1"
        )));
    }
    Ok(v.to_vec())
}

impl Search for BinarySearch {
    fn prefix(&self) -> &'static str {
        "binary"
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn get_options(&self) -> Options {
        let mut opts = Options::new();
        opts.set("opt:prediction", self.prediction.clone());
        opts.set("opt:lower_bound", self.lower.clone());
        opts.set("opt:upper_bound", self.upper.clone());
        opts.set("opt:max_iterations", self.max_iterations);
        opts.set("opt:max_seconds", self.max_seconds);
        opts.set("opt:global_rel_tolerance", self.global_rel_tolerance);
        if let Some(target) = self.target {
            opts.set("opt:target", target);
        }
        opts
    }

    fn set_options(&mut self, opts: &Options) -> Result<(), SearchError> {
        let scoped = opts.scoped(&self.name);
        if let Some(v) = scoped.f64_vec("opt:prediction") {
            self.prediction = one_dimensional(v, "opt:prediction")?;
        }
        if let Some(v) = scoped.f64_vec("opt:lower_bound") {
            self.lower = one_dimensional(v, "opt:lower_bound")?;
        }
        if let Some(v) = scoped.f64_vec("opt:upper_bound") {
            self.upper = one_dimensional(v, "opt:upper_bound")?;
        }
        if let Some(v) = scoped.u32("opt:max_iterations") {
            self.max_iterations = v;
        }
        if let Some(v) = scoped.u32("opt:max_seconds") {
            self.max_seconds = v;
        }
        if let Some(v) = scoped.f64("opt:global_rel_tolerance") {
            self.global_rel_tolerance = v;
        }
        if let Some(v) = scoped.f64("opt:target") {
            self.target = Some(v);
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
        if self.lower.len() != 1 || self.upper.len() != 1 {
            return Err(SearchError::config(
                "binary: requires 1-D lower and upper bounds",
            ));
        }
        let target = self
            .target
            .ok_or_else(|| SearchError::config("binary: opt:target is required"))?;

        let timer = Timer::start(self.max_seconds);
        let mut lower = self.lower[0];
        let mut upper = self.upper[0];
        let mut lower_value: Option<f64> = None;
        let mut upper_value: Option<f64> = None;

        let mut current = (upper - lower) / 2.0 + lower;
        let mut output = compress_fn(&[current])?;
        let mut result = output[0];
        let mut iter: u32 = 2;

        let within_tolerance = |result: f64| {
            (1.0 - self.global_rel_tolerance) * target <= result
                && result <= (1.0 + self.global_rel_tolerance) * target
        };
        let non_monotonic = |lower_value: Option<f64>, upper_value: Option<f64>, result: f64| {
            lower_value.is_some_and(|lv| lv > result) || upper_value.is_some_and(|uv| uv < result)
        };

        loop {
            if within_tolerance(result)
                || iter > self.max_iterations
                || timer.expired()
                || lower > upper
                || non_monotonic(lower_value, upper_value, result)
                || token.stop_requested()
            {
                break;
            }

            if result < target {
                lower = current;
                lower_value = Some(result);
            } else {
                upper = current;
                upper_value = Some(result);
            }

            current = (upper - lower) / 2.0 + lower;
            output = compress_fn(&[current])?;
            result = output[0];
            iter += 1;
            debug!("binary iter={iter} bracket=[{lower}, {upper}] value={result}");
        }

        if within_tolerance(result) {
            token.request_stop();
        }

        let mut results = SearchResult::ok(vec![current], output);
        if non_monotonic(lower_value, upper_value, result) {
            results.status = 1;
            results.msg =
                "objective function was non-monotonic, violation of assumptions".to_string();
        }
        if iter > self.max_iterations {
            results.status = -1;
            results.msg = "iterations exceeded".to_string();
        }
        if timer.expired() {
            results.status = -2;
            results.msg = "time-limit exceeded".to_string();
        }
        Ok(results)
    }

    fn box_clone(&self) -> Box<dyn Search> {
        Box::new(self.clone())
    }
}
