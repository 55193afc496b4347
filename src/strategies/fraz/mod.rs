//! Global derivative-free search over the full box, with integrality
//! support, prior evaluations, and intra-process parallel evaluation.

mod cache;
mod optimizer;

use log::debug;

use crate::evaluate::Evaluator;
use crate::objective::Mode;
use crate::options::Options;
use crate::stop::{StopToken, Timer};

use self::cache::EvalCache;
use self::optimizer::{Evaluation, Optimizer, StopReason};
use super::{require_same_len, Search, SearchError, SearchResult};

/// Keeps the optimizer's internal arithmetic away from overflow: objectives
/// are clamped to the smallest/largest finite doubles scaled by 1e-10.
fn clamp(value: f64) -> f64 {
    value.clamp(f64::MIN_POSITIVE * 1e-10, f64::MAX * 1e-10)
}

fn loss(target: f64, actual: f64) -> f64 {
    clamp((target - actual) * (target - actual))
}

#[derive(Clone, Debug)]
pub struct Fraz {
    name: String,
    lower: Vec<f64>,
    upper: Vec<f64>,
    is_integral: Vec<u8>,
    target: Option<f64>,
    local_tolerance: f64,
    global_rel_tolerance: f64,
    max_iterations: u32,
    max_seconds: u32,
    mode: Mode,
    nthreads: u32,
    thread_safe: bool,
    inter_iteration: u32,
    evaluations: Vec<Vec<f64>>,
}

impl Default for Fraz {
    fn default() -> Self {
        Self {
            name: String::new(),
            lower: Vec::new(),
            upper: Vec::new(),
            is_integral: Vec::new(),
            target: None,
            local_tolerance: 0.01,
            global_rel_tolerance: 0.1,
            max_iterations: 100,
            max_seconds: u32::MAX,
            mode: Mode::Target,
            nthreads: 1,
            thread_safe: false,
            inter_iteration: 1,
            evaluations: Vec::new(),
        }
    }
}

impl Search for Fraz {
    fn prefix(&self) -> &'static str {
        "fraz"
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
        opts.set("opt:is_integral", self.is_integral.clone());
        opts.set("opt:max_iterations", self.max_iterations);
        opts.set("opt:max_seconds", self.max_seconds);
        opts.set("opt:global_rel_tolerance", self.global_rel_tolerance);
        opts.set("opt:local_rel_tolerance", self.local_tolerance);
        opts.set("opt:objective_mode", self.mode.to_u32());
        opts.set("opt:evaluations", self.evaluations.clone());
        opts.set("opt:inter_iteration", self.inter_iteration);
        opts.set("fraz:nthreads", self.nthreads);
        if let Some(target) = self.target {
            opts.set("opt:target", target);
        }
        opts
    }

    fn set_options(&mut self, opts: &Options) -> Result<(), SearchError> {
        let scoped = opts.scoped(&self.name);
        if let Some(v) = scoped.f64_vec("opt:lower_bound") {
            self.lower = v.to_vec();
        }
        if let Some(v) = scoped.f64_vec("opt:upper_bound") {
            self.upper = v.to_vec();
        }
        if let Some(v) = scoped.u8_vec("opt:is_integral") {
            self.is_integral = v.to_vec();
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
        if let Some(v) = scoped.f64("opt:local_rel_tolerance") {
            self.local_tolerance = v;
        }
        if let Some(v) = scoped.f64("opt:target") {
            self.target = Some(v);
        }
        if let Some(v) = scoped.u32("opt:objective_mode") {
            self.mode = Mode::from_u32(v)
                .ok_or_else(|| SearchError::config(format!("fraz: unknown mode {v}")))?;
        }
        if let Some(v) = scoped.str_("opt:objective_mode_name") {
            self.mode = Mode::from_name(v)
                .ok_or_else(|| SearchError::config(format!("fraz: unknown mode {v}")))?;
        }
        if let Some(v) = scoped.table("opt:evaluations") {
            self.evaluations = v.to_vec();
        }
        if let Some(v) = scoped.u32("opt:inter_iteration") {
            self.inter_iteration = v;
        }
        if let Some(v) = scoped.u32("fraz:nthreads") {
            self.nthreads = v;
        }
        if let Some(v) = scoped.i32("opt:thread_safe") {
            self.thread_safe = v != 0;
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
        require_same_len(&self.lower, &self.upper, "fraz")?;
        let dims = self.lower.len();

        // raw prior objective -> the value the optimizer minimizes
        let transform: Box<dyn Fn(f64) -> f64 + Sync> = match self.mode {
            Mode::Target => {
                let target = self
                    .target
                    .ok_or_else(|| SearchError::config("fraz: target mode needs opt:target"))?;
                Box::new(move |raw| loss(target, raw))
            }
            Mode::Min => Box::new(|raw| clamp(raw)),
            Mode::Max => Box::new(|raw| -clamp(raw)),
            Mode::None => {
                return Err(SearchError::Unsupported {
                    strategy: "fraz",
                    mode: "none",
                })
            }
        };

        let cache = EvalCache::new();
        let mut priors = Vec::with_capacity(self.evaluations.len());
        for row in &self.evaluations {
            if row.len() != dims + 1 {
                return Err(SearchError::config(format!(
                    "fraz: opt:evaluations rows must have {} columns",
                    dims + 1
                )));
            }
            let (x, y) = row.split_at(dims);
            cache.insert(x, vec![y[0]]);
            priors.push(Evaluation {
                x: x.to_vec(),
                y: transform(y[0]),
            });
        }

        let target = self.target;
        let inter_iteration = self.inter_iteration;
        let mode = self.mode;
        let global_rel_tolerance = self.global_rel_tolerance;
        let should_stop = move |y: f64| {
            let achieved = match mode {
                Mode::Target => {
                    let t = target.expect("target checked above");
                    let threshold = loss(t, t * (1.0 - global_rel_tolerance))
                        .min(loss(t, t * (1.0 + global_rel_tolerance)));
                    y < threshold
                }
                Mode::Min => target.is_some_and(|t| y < t),
                Mode::Max => target.is_some_and(|t| -y > t),
                Mode::None => false,
            };
            if achieved {
                token.request_stop();
            }
            achieved || (inter_iteration != 0 && token.stop_requested())
        };

        let threads = if self.thread_safe {
            self.nthreads.max(1) as usize
        } else {
            1
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .map_err(|e| SearchError::config(format!("fraz: thread pool: {e}")))?;

        let optimizer = Optimizer {
            lower: self.lower.clone(),
            upper: self.upper.clone(),
            integral: self.is_integral.iter().map(|&v| v != 0).collect(),
            max_calls: self.max_iterations,
            local_tolerance: self.local_tolerance,
        };
        let timer = Timer::start(self.max_seconds);
        let objective = |x: &[f64]| {
            let measurement = compress_fn(x)?;
            let y = transform(measurement[0]);
            cache.insert(x, measurement);
            Ok(y)
        };

        let outcome = optimizer.minimize(&pool, objective, &priors, &timer, should_stop)?;
        debug!(
            "fraz finished after {} calls ({:?})",
            outcome.calls, outcome.reason
        );

        let output = cache
            .get(&outcome.best.x)
            .expect("winning input was cached");
        let mut results = SearchResult::ok(outcome.best.x, output);
        if outcome.reason == StopReason::TimeLimit {
            results.status = -2;
            results.msg = "time-limit exceeded".to_string();
        }
        Ok(results)
    }

    fn box_clone(&self) -> Box<dyn Search> {
        Box::new(self.clone())
    }
}
