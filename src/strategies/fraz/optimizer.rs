//! Box-bounded derivative-free minimization.
//!
//! Batched global exploration (uniform sampling mixed with a shrinking
//! trust region around the incumbent) with integer snapping for integral
//! dimensions. Each batch is evaluated in parallel on the caller's pool;
//! the stop predicate and budgets are observed at batch boundaries. The
//! trust region doubles as the local refinement stage: the search ends when
//! the region collapses below the local tolerance.

use rand::rngs::SmallRng;
use rand::Rng;
use rand_core::SeedableRng;
use rayon::prelude::*;
use rustc_hash::FxHashSet;

use crate::evaluate::EvalError;
use crate::stop::Timer;

use super::cache::{bit_key, BitKey};

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Evaluation {
    pub x: Vec<f64>,
    pub y: f64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum StopReason {
    /// The trust region shrank below the local tolerance, or the candidate
    /// space is exhausted.
    Converged,
    /// The function-call budget ran out.
    Budget,
    TimeLimit,
    /// The caller's stop predicate fired.
    Predicate,
}

#[derive(Debug)]
pub(crate) struct Outcome {
    pub best: Evaluation,
    pub reason: StopReason,
    pub calls: u32,
}

pub(crate) struct Optimizer {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub integral: Vec<bool>,
    pub max_calls: u32,
    pub local_tolerance: f64,
}

/// Share of each batch drawn uniformly from the whole box rather than from
/// the trust region, so the search keeps escaping local basins.
const EXPLORE_SHARE: f64 = 0.4;
const GROW: f64 = 1.3;
const SHRINK: f64 = 0.7;
const INITIAL_RADIUS: f64 = 0.25;
const MAX_RADIUS: f64 = 0.5;
/// Rejection-sampling attempts before declaring the candidate space dry.
const MAX_REJECTS: usize = 50;

impl Optimizer {
    fn snap(&self, x: &mut [f64]) {
        for (d, v) in x.iter_mut().enumerate() {
            if self.integral.get(d).copied().unwrap_or(false) {
                *v = v.round().clamp(self.lower[d], self.upper[d]);
            }
        }
    }

    fn candidate(&self, rng: &mut SmallRng, best: Option<&Evaluation>, radius: f64) -> Vec<f64> {
        let dims = self.lower.len();
        let mut x = Vec::with_capacity(dims);
        match best {
            Some(best) if rng.gen_bool(1.0 - EXPLORE_SHARE) => {
                for d in 0..dims {
                    let span = (self.upper[d] - self.lower[d]) * radius;
                    let v = best.x[d] + rng.gen_range(-span..=span);
                    x.push(v.clamp(self.lower[d], self.upper[d]));
                }
            }
            _ => {
                for d in 0..dims {
                    x.push(rng.gen_range(self.lower[d]..=self.upper[d]));
                }
            }
        }
        self.snap(&mut x);
        x
    }

    /// Minimize `f` over the box. `priors` seed the incumbent without
    /// consuming budget; if one already satisfies `should_stop` the search
    /// is skipped entirely.
    pub fn minimize<F, S>(
        &self,
        pool: &rayon::ThreadPool,
        f: F,
        priors: &[Evaluation],
        timer: &Timer,
        should_stop: S,
    ) -> Result<Outcome, EvalError>
    where
        F: Fn(&[f64]) -> Result<f64, EvalError> + Sync,
        S: Fn(f64) -> bool,
    {
        let mut seen: FxHashSet<BitKey> = FxHashSet::default();
        let mut best: Option<Evaluation> = None;
        for prior in priors {
            seen.insert(bit_key(&prior.x));
            if best.as_ref().is_none_or(|b| prior.y < b.y) {
                best = Some(prior.clone());
            }
        }
        if let Some(b) = &best {
            if should_stop(b.y) {
                return Ok(Outcome {
                    best: b.clone(),
                    reason: StopReason::Predicate,
                    calls: 0,
                });
            }
        }

        let mut rng = SmallRng::from_entropy();
        let mut radius = INITIAL_RADIUS;
        let mut calls: u32 = 0;
        let max_calls = self.max_calls.max(1);
        let batch_size = pool.current_num_threads().max(1);

        let reason = 'outer: loop {
            if calls >= max_calls {
                break StopReason::Budget;
            }
            if timer.expired() {
                break StopReason::TimeLimit;
            }

            let remaining = (max_calls - calls) as usize;
            let mut batch: Vec<Vec<f64>> = Vec::with_capacity(batch_size.min(remaining));
            let mut rejects = 0;
            while batch.len() < batch_size.min(remaining) {
                let x = self.candidate(&mut rng, best.as_ref(), radius);
                if seen.insert(bit_key(&x)) {
                    batch.push(x);
                } else {
                    rejects += 1;
                    if rejects > MAX_REJECTS {
                        break;
                    }
                }
            }
            if batch.is_empty() {
                // every remaining candidate collides with an evaluated point
                break StopReason::Converged;
            }

            let evaluated: Result<Vec<Evaluation>, EvalError> = pool.install(|| {
                batch
                    .par_iter()
                    .map(|x| f(x).map(|y| Evaluation { x: x.clone(), y }))
                    .collect()
            });
            let evaluated = evaluated?;
            calls += evaluated.len() as u32;

            let mut improved = false;
            for eval in evaluated {
                let is_best = best.as_ref().is_none_or(|b| eval.y < b.y);
                let stop = should_stop(eval.y);
                if is_best {
                    best = Some(eval);
                    improved = true;
                }
                if stop {
                    break 'outer StopReason::Predicate;
                }
            }

            radius = if improved {
                (radius * GROW).min(MAX_RADIUS)
            } else {
                radius * SHRINK
            };
            if radius < self.local_tolerance {
                break StopReason::Converged;
            }
        };

        Ok(Outcome {
            best: best.expect("at least one evaluation or prior"),
            reason,
            calls,
        })
    }
}
