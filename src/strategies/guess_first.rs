//! Try the predicted point first; fall through to an inner strategy.

use crate::evaluate::Evaluator;
use crate::objective::Mode;
use crate::options::Options;
use crate::stop::StopToken;

use super::{guess::Guess, search_plugins, Search, SearchError, SearchResult, CONFIG_CHILDREN};

#[derive(Clone)]
pub struct GuessFirst {
    name: String,
    prediction: Vec<f64>,
    target: Option<f64>,
    mode: Mode,
    global_rel_tolerance: f64,
    child_id: String,
    child: Box<dyn Search>,
}

impl Default for GuessFirst {
    fn default() -> Self {
        Self {
            name: String::new(),
            prediction: Vec::new(),
            target: None,
            mode: Mode::Target,
            global_rel_tolerance: 0.0,
            child_id: "guess".to_string(),
            child: Box::new(Guess::default()),
        }
    }
}

impl Search for GuessFirst {
    fn prefix(&self) -> &'static str {
        "guess_first"
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
        opts.set("opt:prediction", self.prediction.clone());
        opts.set("opt:objective_mode", self.mode.to_u32());
        opts.set("opt:global_rel_tolerance", self.global_rel_tolerance);
        opts.set("guess_first:search", self.child_id.clone());
        if let Some(target) = self.target {
            opts.set("opt:target", target);
        }
        opts.copy_from(&self.child.get_options());
        opts
    }

    fn set_options(&mut self, opts: &Options) -> Result<(), SearchError> {
        let scoped = opts.scoped(&self.name);
        if let Some(v) = scoped.f64_vec("opt:prediction") {
            self.prediction = v.to_vec();
        }
        if let Some(v) = scoped.f64("opt:target") {
            self.target = Some(v);
        }
        if let Some(v) = scoped.f64("opt:global_rel_tolerance") {
            self.global_rel_tolerance = v;
        }
        if let Some(v) = scoped.u32("opt:objective_mode") {
            self.mode = Mode::from_u32(v)
                .ok_or_else(|| SearchError::config(format!("guess_first: unknown mode {v}")))?;
        }
        if let Some(v) = scoped.str_("opt:objective_mode_name") {
            self.mode = Mode::from_name(v)
                .ok_or_else(|| SearchError::config(format!("guess_first: unknown mode {v}")))?;
        }
        if let Some(id) = scoped.str_("guess_first:search") {
            if id != self.child_id {
                self.child = search_plugins().build(id).ok_or_else(|| {
                    SearchError::config(format!("guess_first: unknown inner strategy {id}"))
                })?;
                self.child_id = id.to_string();
                if !self.name.is_empty() {
                    let child_name = format!("{}/{}", self.name, self.child.prefix());
                    self.child.set_name(&child_name);
                }
            }
        }
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
        if self.prediction.is_empty() {
            return Err(SearchError::config(
                "guess_first: opt:prediction is required",
            ));
        }
        if self.mode == Mode::Target && self.target.is_none() {
            return Err(SearchError::config(
                "guess_first: target mode needs opt:target",
            ));
        }

        let output = compress_fn(&self.prediction)?;
        let primary = output[0];
        let satisfied = match self.mode {
            Mode::Target => {
                let target = self.target.expect("target checked above");
                primary < target * (1.0 + self.global_rel_tolerance)
                    && primary > target * (1.0 - self.global_rel_tolerance)
            }
            Mode::Min => self.target.is_some_and(|t| primary < t),
            Mode::Max => self.target.is_some_and(|t| primary > t),
            Mode::None => false,
        };
        if satisfied {
            token.request_stop();
            return Ok(SearchResult::ok(self.prediction.clone(), output));
        }
        self.child.search(compress_fn, token)
    }

    fn box_clone(&self) -> Box<dyn Search> {
        Box::new(self.clone())
    }
}
