//! Uniform random sampling over the bounds, dispatched through the queue.

use rand::rngs::SmallRng;
use rand::Rng;
use rand_core::SeedableRng;

use crate::evaluate::{EvalError, Evaluator, Measurement};
use crate::objective::Mode;
use crate::options::Options;
use crate::queue::DistributedManager;
use crate::stop::{StopToken, Timer};

use super::{require_same_len, Search, SearchError, SearchResult};

fn loss(target: f64, actual: f64) -> f64 {
    (target - actual).abs()
}

#[derive(Clone, Debug)]
pub struct RandomSearch {
    name: String,
    lower: Vec<f64>,
    upper: Vec<f64>,
    target: Option<f64>,
    mode: Mode,
    max_iterations: u32,
    max_seconds: u32,
    global_rel_tolerance: f64,
    seed: Option<u64>,
    manager: DistributedManager,
}

impl Default for RandomSearch {
    fn default() -> Self {
        Self {
            name: String::new(),
            lower: Vec::new(),
            upper: Vec::new(),
            target: None,
            mode: Mode::None,
            max_iterations: 100,
            max_seconds: u32::MAX,
            global_rel_tolerance: 0.1,
            seed: None,
            manager: DistributedManager::new(1, 1),
        }
    }
}

type TaskResponse = (Vec<f64>, Result<Measurement, EvalError>);

impl Search for RandomSearch {
    fn prefix(&self) -> &'static str {
        "random"
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
        opts.set("opt:max_iterations", self.max_iterations);
        opts.set("opt:max_seconds", self.max_seconds);
        opts.set("opt:global_rel_tolerance", self.global_rel_tolerance);
        opts.set("opt:objective_mode", self.mode.to_u32());
        if let Some(target) = self.target {
            opts.set("opt:target", target);
        }
        if let Some(seed) = self.seed {
            opts.set("random:seed", seed);
        }
        opts.copy_from(&self.manager.get_options());
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
        if let Some(v) = scoped.u32("opt:objective_mode") {
            self.mode = Mode::from_u32(v)
                .ok_or_else(|| SearchError::config(format!("random: unknown mode {v}")))?;
        }
        if let Some(v) = scoped.str_("opt:objective_mode_name") {
            self.mode = Mode::from_name(v)
                .ok_or_else(|| SearchError::config(format!("random: unknown mode {v}")))?;
        }
        if let Some(v) = scoped.u64("random:seed") {
            self.seed = Some(v);
        }
        self.manager.set_options(opts);
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
        require_same_len(&self.lower, &self.upper, "random")?;
        if self.max_iterations < 1 {
            return Ok(SearchResult {
                inputs: Vec::new(),
                output: Vec::new(),
                status: -2,
                msg: "at least 1 iterations are required".to_string(),
            });
        }
        let target = match (self.mode, self.target) {
            (Mode::Target, None) => {
                return Err(SearchError::config("random: target mode needs opt:target"))
            }
            (_, t) => t,
        };

        let mut rng = match self.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        let points: Vec<Vec<f64>> = (0..self.max_iterations)
            .map(|_| {
                self.lower
                    .iter()
                    .zip(&self.upper)
                    .map(|(&lo, &hi)| rng.gen_range(lo..=hi))
                    .collect()
            })
            .collect();

        let timer = Timer::start(self.max_seconds);
        let mut best = SearchResult::default();
        let mut best_objective = match self.mode {
            Mode::Max => f64::MIN,
            _ => f64::MAX,
        };
        let tolerance_band = target
            .map(|t| {
                loss(t * (1.0 + self.global_rel_tolerance), t)
                    .min(loss(t * (1.0 - self.global_rel_tolerance), t))
            })
            .unwrap_or(0.0);
        let mut failure: Option<EvalError> = None;

        self.manager.work_queue(
            points,
            |inputs: Vec<f64>, _handle| {
                let result = compress_fn(&inputs);
                (inputs, result)
            },
            |(inputs, result): TaskResponse, queue| {
                match result {
                    Err(err) => {
                        if failure.is_none() {
                            failure = Some(err);
                        }
                        queue.request_stop();
                    }
                    Ok(output) => {
                        let objective = output[0];
                        match self.mode {
                            Mode::Max => {
                                if objective > best_objective {
                                    best_objective = objective;
                                    best = SearchResult::ok(inputs, output);
                                    if target.is_some_and(|t| objective > t) {
                                        token.request_stop();
                                        queue.request_stop();
                                    }
                                }
                            }
                            Mode::Min => {
                                if objective < best_objective {
                                    best_objective = objective;
                                    best = SearchResult::ok(inputs, output);
                                    if target.is_some_and(|t| objective < t) {
                                        token.request_stop();
                                        queue.request_stop();
                                    }
                                }
                            }
                            Mode::Target => {
                                let t = target.expect("target checked above");
                                if loss(t, objective) < best_objective {
                                    best_objective = loss(t, objective);
                                    best = SearchResult::ok(inputs, output);
                                    if best_objective < tolerance_band {
                                        token.request_stop();
                                        queue.request_stop();
                                    }
                                }
                            }
                            Mode::None => {
                                // reducer output carries the preference
                                if objective < best_objective {
                                    best_objective = objective;
                                    best = SearchResult::ok(inputs, output);
                                }
                            }
                        }
                    }
                }
                if token.stop_requested() || timer.expired() {
                    queue.request_stop();
                }
            },
        );

        if let Some(err) = failure {
            return Err(err.into());
        }
        if timer.expired() {
            best.status = -2;
            best.msg = "time-limit exceeded".to_string();
        }
        self.manager.bcast(&mut best);
        Ok(best)
    }

    fn box_clone(&self) -> Box<dyn Search> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::testutil::{assert_within_bounds, Counted};

    fn configured(mode: &str, iterations: u32, seed: u64) -> RandomSearch {
        let mut opts = Options::new();
        opts.set("opt:lower_bound", vec![0.0]);
        opts.set("opt:upper_bound", vec![1.0]);
        opts.set("opt:objective_mode_name", mode);
        opts.set("opt:max_iterations", iterations);
        opts.set("random:seed", seed);
        let mut s = RandomSearch::default();
        s.set_options(&opts).unwrap();
        s
    }

    #[test]
    fn fixed_seed_reproduces_the_run() {
        let f = Counted::new(|x| 100.0 * x);
        let a = configured("min", 20, 12345)
            .search(&|x| f.eval(x), &StopToken::new())
            .unwrap();
        let b = configured("min", 20, 12345)
            .search(&|x| f.eval(x), &StopToken::new())
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.status, 0);
        assert_within_bounds(&a, &[0.0], &[1.0]);
    }

    #[test]
    fn different_seeds_explore_differently() {
        let f = Counted::new(|x| x);
        let a = configured("min", 20, 1)
            .search(&|x| f.eval(x), &StopToken::new())
            .unwrap();
        let b = configured("min", 20, 2)
            .search(&|x| f.eval(x), &StopToken::new())
            .unwrap();
        assert_ne!(a.inputs, b.inputs);
    }

    #[test]
    fn min_mode_with_target_exits_on_first_satisfying_sample() {
        let mut s = configured("min", 1000, 7);
        let mut opts = Options::new();
        opts.set("opt:target", 1000.0);
        s.set_options(&opts).unwrap();

        let f = Counted::new(|x| x);
        let token = StopToken::new();
        let result = s.search(&|x| f.eval(x), &token).unwrap();
        assert_eq!(f.count(), 1);
        assert!(token.stop_requested());
        assert_eq!(result.status, 0);
    }

    #[test]
    fn target_mode_stops_inside_the_tolerance_band() {
        let mut s = configured("target", 1000, 99);
        let mut opts = Options::new();
        opts.set("opt:target", 50.0);
        opts.set("opt:global_rel_tolerance", 1.0);
        s.set_options(&opts).unwrap();

        // the whole interior of the bounds satisfies |100x - 50| < 50
        let f = Counted::new(|x| 100.0 * x);
        let token = StopToken::new();
        let result = s.search(&|x| f.eval(x), &token).unwrap();
        assert_eq!(f.count(), 1);
        assert!(token.stop_requested());
        assert!((result.output[0] - 50.0).abs() < 50.0);
    }

    #[test]
    fn zero_iterations_is_refused() {
        let mut s = configured("min", 0, 1);
        let f = Counted::new(|x| x);
        let result = s.search(&|x| f.eval(x), &StopToken::new()).unwrap();
        assert_eq!(result.status, -2);
        assert!(result.msg.contains("at least 1 iterations"));
        assert_eq!(f.count(), 0);
    }

    #[test]
    fn target_mode_without_target_is_rejected() {
        let mut s = configured("target", 10, 1);
        let f = Counted::new(|x| x);
        assert!(matches!(
            s.search(&|x| f.eval(x), &StopToken::new()),
            Err(SearchError::Config(_))
        ));
    }

    #[test]
    fn evaluator_failures_propagate() {
        let mut s = configured("min", 10, 1);
        let result = s.search(
            &|_x: &[f64]| Err(EvalError::Compress("synthetic".to_string())),
            &StopToken::new(),
        );
        assert!(matches!(result, Err(SearchError::Evaluator(_))));
    }

    #[test]
    fn stop_before_entry_returns_empty() {
        let mut s = configured("min", 10, 1);
        let f = Counted::new(|x| x);
        let token = StopToken::new();
        token.request_stop();
        let result = s.search(&|x| f.eval(x), &token).unwrap();
        assert!(result.inputs.is_empty());
        assert_eq!(f.count(), 0);
    }
}
