//! Recursive grid search: partition the bounds into overlapping cells and
//! run an inner strategy per cell across the worker pool.

use log::{debug, warn};

use crate::evaluate::Evaluator;
use crate::objective::Mode;
use crate::options::Options;
use crate::queue::DistributedManager;
use crate::stop::StopToken;

use super::{guess::Guess, search_plugins, Search, SearchError, SearchResult, CONFIG_CHILDREN};

fn loss(target: f64, actual: f64) -> f64 {
    (target - actual).abs()
}

#[derive(Clone)]
pub struct DistGridSearch {
    name: String,
    lower: Vec<f64>,
    upper: Vec<f64>,
    num_bins: Vec<u32>,
    overlap_percentage: Vec<f64>,
    mode: Mode,
    target: Option<f64>,
    global_rel_tolerance: f64,
    child_id: String,
    child: Box<dyn Search>,
    manager: DistributedManager,
}

impl Default for DistGridSearch {
    fn default() -> Self {
        Self {
            name: String::new(),
            lower: Vec::new(),
            upper: Vec::new(),
            num_bins: Vec::new(),
            overlap_percentage: Vec::new(),
            mode: Mode::None,
            target: None,
            global_rel_tolerance: 0.1,
            child_id: "guess".to_string(),
            child: Box::new(Guess::default()),
            manager: DistributedManager::new(1, 1),
        }
    }
}

impl DistGridSearch {
    /// Enumerate the lexicographic Cartesian product of bins, dimension 0
    /// fastest. Overlap widens each cell so interior optima near cell edges
    /// are captured by multiple cells.
    fn build_task_list(&self) -> Vec<(Vec<f64>, Vec<f64>)> {
        let dims = self.lower.len();
        let mut step = vec![0.0; dims];
        let mut overlap = vec![0.0; dims];
        for d in 0..dims {
            step[d] = (self.upper[d] - self.lower[d]) / f64::from(self.num_bins[d]);
            overlap[d] = self.overlap_percentage.get(d).copied().unwrap_or(0.0) * step[d];
        }

        let mut tasks = Vec::new();
        let mut bin = vec![0u32; dims];
        loop {
            let mut cell_lower = vec![0.0; dims];
            let mut cell_upper = vec![0.0; dims];
            for d in 0..dims {
                cell_lower[d] =
                    (self.lower[d] + step[d] * f64::from(bin[d]) - overlap[d]).max(self.lower[d]);
                cell_upper[d] = (self.lower[d] + step[d] * f64::from(bin[d] + 1) + overlap[d])
                    .min(self.upper[d]);
            }
            tasks.push((cell_lower, cell_upper));

            let mut d = 0;
            loop {
                bin[d] += 1;
                if bin[d] < self.num_bins[d] {
                    break;
                }
                bin[d] = 0;
                d += 1;
                if d == dims {
                    return tasks;
                }
            }
        }
    }
}

impl Search for DistGridSearch {
    fn prefix(&self) -> &'static str {
        "dist_gridsearch"
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
        let child_name = format!("{}/{}", name, self.child.prefix());
        self.child.set_name(&child_name);
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn get_options(&self) -> Options {
        let mut opts = Options::new();
        opts.set("opt:lower_bound", self.lower.clone());
        opts.set("opt:upper_bound", self.upper.clone());
        opts.set("dist_gridsearch:num_bins", self.num_bins.clone());
        opts.set(
            "dist_gridsearch:overlap_percentage",
            self.overlap_percentage.clone(),
        );
        opts.set("dist_gridsearch:search", self.child_id.clone());
        opts.set("opt:objective_mode", self.mode.to_u32());
        opts.set("opt:global_rel_tolerance", self.global_rel_tolerance);
        if let Some(target) = self.target {
            opts.set("opt:target", target);
        }
        opts.copy_from(&self.manager.get_options());
        // child options ride along so the whole subtree round-trips
        opts.copy_from(&self.child.get_options());
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
        if let Some(v) = scoped.u32_vec("dist_gridsearch:num_bins") {
            self.num_bins = v.to_vec();
        }
        if let Some(v) = scoped.f64_vec("dist_gridsearch:overlap_percentage") {
            self.overlap_percentage = v.to_vec();
        }
        if let Some(v) = scoped.f64("opt:target") {
            self.target = Some(v);
        }
        if let Some(v) = scoped.f64("opt:global_rel_tolerance") {
            self.global_rel_tolerance = v;
        }
        if let Some(v) = scoped.u32("opt:objective_mode") {
            self.mode = Mode::from_u32(v)
                .ok_or_else(|| SearchError::config(format!("dist_gridsearch: unknown mode {v}")))?;
        }
        if let Some(v) = scoped.str_("opt:objective_mode_name") {
            self.mode = Mode::from_name(v)
                .ok_or_else(|| SearchError::config(format!("dist_gridsearch: unknown mode {v}")))?;
        }
        if let Some(id) = scoped.str_("dist_gridsearch:search") {
            if id != self.child_id {
                self.child = search_plugins().build(id).ok_or_else(|| {
                    SearchError::config(format!("dist_gridsearch: unknown inner strategy {id}"))
                })?;
                self.child_id = id.to_string();
                if !self.name.is_empty() {
                    let child_name = format!("{}/{}", self.name, self.child.prefix());
                    self.child.set_name(&child_name);
                }
            }
        }
        self.manager.set_options(opts);
        self.child.set_options(opts)
    }

    fn get_configuration(&self) -> Options {
        let mut opts = Options::new();
        let child = if self.child.name().is_empty() {
            self.child.prefix().to_string()
        } else {
            self.child.name().to_string()
        };
        opts.set(CONFIG_CHILDREN, vec![child]);
        opts
    }

    fn search(
        &mut self,
        compress_fn: &Evaluator,
        token: &StopToken,
    ) -> Result<SearchResult, SearchError> {
        if token.stop_requested() {
            return Ok(SearchResult::aborted());
        }
        if self.num_bins.is_empty() {
            return Ok(SearchResult {
                inputs: Vec::new(),
                output: Vec::new(),
                status: 1,
                msg: "not configured with non-empty bin sizes".to_string(),
            });
        }
        if self.lower.len() != self.upper.len() || self.lower.len() != self.num_bins.len() {
            return Ok(SearchResult {
                inputs: Vec::new(),
                output: Vec::new(),
                status: 1,
                msg: "different sizes".to_string(),
            });
        }
        let target = match (self.mode, self.target) {
            (Mode::Target, None) => {
                return Err(SearchError::config(
                    "dist_gridsearch: target mode needs opt:target",
                ))
            }
            (_, t) => t,
        };

        let tasks = self.build_task_list();
        debug!("dist_gridsearch planned {} cells", tasks.len());

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
        let mut failure: Option<SearchError> = None;
        let child = &self.child;
        let mode = self.mode;

        self.manager.work_queue(
            tasks,
            |(cell_lower, cell_upper): (Vec<f64>, Vec<f64>), handle| {
                let mut inner = child.box_clone();
                let mut cell = Options::new();
                cell.set("opt:lower_bound", cell_lower);
                cell.set("opt:upper_bound", cell_upper);
                inner.set_options(&cell)?;
                inner.search(compress_fn, handle.token())
            },
            |response: Result<SearchResult, SearchError>, queue| {
                match response {
                    Err(err) => {
                        if failure.is_none() {
                            failure = Some(err);
                        }
                        token.request_stop();
                        queue.request_stop();
                    }
                    Ok(cell_result) => {
                        if cell_result.status != 0 || cell_result.output.is_empty() {
                            debug!(
                                "dist_gridsearch dropping cell result status={} msg={}",
                                cell_result.status, cell_result.msg
                            );
                        } else {
                            let actual = cell_result.output[0];
                            match mode {
                                Mode::Max => {
                                    if actual > best_objective {
                                        best_objective = actual;
                                        best = cell_result;
                                        if target.is_some_and(|t| actual > t) {
                                            token.request_stop();
                                            queue.request_stop();
                                        }
                                    }
                                }
                                Mode::Min => {
                                    if actual < best_objective {
                                        best_objective = actual;
                                        best = cell_result;
                                        if target.is_some_and(|t| actual < t) {
                                            token.request_stop();
                                            queue.request_stop();
                                        }
                                    }
                                }
                                Mode::Target => {
                                    let t = target.expect("target checked above");
                                    if loss(t, actual) < best_objective {
                                        best_objective = loss(t, actual);
                                        best = cell_result;
                                        if best_objective < tolerance_band {
                                            token.request_stop();
                                            queue.request_stop();
                                        }
                                    }
                                }
                                Mode::None => {
                                    if actual < best_objective {
                                        best_objective = actual;
                                        best = cell_result;
                                    }
                                }
                            }
                        }
                    }
                }
                if token.stop_requested() {
                    queue.request_stop();
                }
            },
        );

        if let Some(err) = failure {
            warn!("dist_gridsearch aborting: {err}");
            return Err(err);
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
    use crate::strategies::testutil::Counted;

    fn configured(bins: Vec<u32>, overlap: Vec<f64>, inner: &str) -> DistGridSearch {
        let mut opts = Options::new();
        opts.set("opt:lower_bound", vec![0.0]);
        opts.set("opt:upper_bound", vec![9.0]);
        opts.set("dist_gridsearch:num_bins", bins);
        opts.set("dist_gridsearch:overlap_percentage", overlap);
        opts.set("dist_gridsearch:search", inner);
        opts.set("opt:objective_mode_name", "max");
        let mut s = DistGridSearch::default();
        s.set_options(&opts).unwrap();
        s
    }

    #[test]
    fn plans_overlapping_cells() {
        let s = configured(vec![3], vec![0.1], "guess_midpoint");
        let tasks = s.build_task_list();
        assert_eq!(tasks.len(), 3);
        let expect = [(0.0, 3.3), (2.7, 6.3), (5.7, 9.0)];
        for ((lower, upper), (elo, ehi)) in tasks.iter().zip(expect) {
            assert!((lower[0] - elo).abs() < 1e-9, "{lower:?}");
            assert!((upper[0] - ehi).abs() < 1e-9, "{upper:?}");
        }
    }

    #[test]
    fn midpoint_per_cell_finds_the_best_cell() {
        let mut s = configured(vec![3], vec![0.1], "guess_midpoint");
        let f = Counted::new(|x| -(x - 7.0) * (x - 7.0));
        let result = s.search(&|x| f.eval(x), &StopToken::new()).unwrap();

        assert_eq!(result.status, 0);
        assert_eq!(f.count(), 3);
        // cell midpoints are 1.65, 4.5, 7.35; the last wins
        assert!((result.inputs[0] - 7.35).abs() < 1e-9);
        assert!(result.inputs[0] >= 5.7 && result.inputs[0] <= 9.0);
    }

    #[test]
    fn one_bin_degenerates_to_a_single_inner_run() {
        let mut s = configured(vec![1], vec![0.0], "guess_midpoint");
        let f = Counted::new(|x| x);
        let result = s.search(&|x| f.eval(x), &StopToken::new()).unwrap();
        assert_eq!(f.count(), 1);
        assert_eq!(result.inputs, vec![4.5]);
    }

    #[test]
    fn multi_dimensional_cells_cover_the_product() {
        let mut opts = Options::new();
        opts.set("opt:lower_bound", vec![0.0, 0.0]);
        opts.set("opt:upper_bound", vec![4.0, 6.0]);
        opts.set("dist_gridsearch:num_bins", vec![2u32, 3u32]);
        opts.set("dist_gridsearch:overlap_percentage", vec![0.0, 0.0]);
        let mut s = DistGridSearch::default();
        s.set_options(&opts).unwrap();
        let tasks = s.build_task_list();
        assert_eq!(tasks.len(), 6);
        // dimension 0 advances fastest
        assert_eq!(tasks[0].0, vec![0.0, 0.0]);
        assert_eq!(tasks[1].0, vec![2.0, 0.0]);
        assert_eq!(tasks[2].0, vec![0.0, 2.0]);
        assert_eq!(tasks[5].1, vec![4.0, 6.0]);
    }

    #[test]
    fn unconfigured_bins_are_a_hard_error_status() {
        let mut s = DistGridSearch::default();
        let mut opts = Options::new();
        opts.set("opt:lower_bound", vec![0.0]);
        opts.set("opt:upper_bound", vec![1.0]);
        s.set_options(&opts).unwrap();
        let f = Counted::new(|x| x);
        let result = s.search(&|x| f.eval(x), &StopToken::new()).unwrap();
        assert_eq!(result.status, 1);
        assert!(result.msg.contains("non-empty bin sizes"));
        assert_eq!(f.count(), 0);
    }

    #[test]
    fn mismatched_lengths_are_a_hard_error_status() {
        let mut s = DistGridSearch::default();
        let mut opts = Options::new();
        opts.set("opt:lower_bound", vec![0.0, 1.0]);
        opts.set("opt:upper_bound", vec![1.0, 2.0]);
        opts.set("dist_gridsearch:num_bins", vec![2u32]);
        s.set_options(&opts).unwrap();
        let f = Counted::new(|x| x);
        let result = s.search(&|x| f.eval(x), &StopToken::new()).unwrap();
        assert_eq!(result.status, 1);
        assert_eq!(result.msg, "different sizes");
    }

    #[test]
    fn target_mode_early_exit_stops_remaining_cells() {
        let mut s = configured(vec![9], vec![0.0], "guess_midpoint");
        let mut opts = Options::new();
        opts.set("opt:objective_mode_name", "target");
        opts.set("opt:target", 0.5);
        opts.set("opt:global_rel_tolerance", 0.5);
        s.set_options(&opts).unwrap();

        let f = Counted::new(|x| x);
        let token = StopToken::new();
        let result = s.search(&|x| f.eval(x), &token).unwrap();
        // first cell midpoint 0.5 hits the target exactly
        assert_eq!(f.count(), 1);
        assert!(token.stop_requested());
        assert_eq!(result.inputs, vec![0.5]);
    }

    #[test]
    fn name_propagates_to_the_child() {
        let mut s = configured(vec![1], vec![0.0], "guess_midpoint");
        s.set_name("outer");
        let config = s.get_configuration();
        assert_eq!(
            config.get_str_vec(CONFIG_CHILDREN),
            Some(&["outer/guess_midpoint".to_string()][..])
        );
    }

    #[test]
    fn scoped_options_reach_only_the_named_subtree() {
        let mut s = configured(vec![1], vec![0.0], "guess_midpoint");
        s.set_name("outer");
        // address only the child's bounds through its scoped name; the
        // wrapper's own bounds stay put
        let mut opts = Options::new();
        opts.set("outer/guess_midpoint:opt:lower_bound", vec![4.0]);
        opts.set("outer/guess_midpoint:opt:upper_bound", vec![6.0]);
        s.set_options(&opts).unwrap();

        // get_options merges the child's view over the wrapper's
        let merged = s.get_options();
        assert_eq!(merged.get_f64_vec("opt:lower_bound"), Some(&[4.0][..]));

        // the planner still spans the wrapper's bounds and overwrites the
        // child's per cell at dispatch
        let f = Counted::new(|x| x);
        let result = s.search(&|x| f.eval(x), &StopToken::new()).unwrap();
        assert_eq!(result.status, 0);
        assert_eq!(result.inputs, vec![4.5]);
        assert_eq!(f.count(), 1);
    }
}
