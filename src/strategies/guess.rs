//! Evaluate a single predicted point.

use crate::evaluate::Evaluator;
use crate::options::Options;
use crate::stop::StopToken;

use super::{Search, SearchError, SearchResult};

#[derive(Clone, Debug, Default)]
pub struct Guess {
    name: String,
    prediction: Vec<f64>,
}

impl Search for Guess {
    fn prefix(&self) -> &'static str {
        "guess"
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
        opts
    }

    fn set_options(&mut self, opts: &Options) -> Result<(), SearchError> {
        let scoped = opts.scoped(&self.name);
        if let Some(prediction) = scoped.f64_vec("opt:prediction") {
            self.prediction = prediction.to_vec();
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
        if self.prediction.is_empty() {
            return Err(SearchError::config("guess: opt:prediction is required"));
        }
        let output = compress_fn(&self.prediction)?;
        Ok(SearchResult::ok(self.prediction.clone(), output))
    }

    fn box_clone(&self) -> Box<dyn Search> {
        Box::new(self.clone())
    }
}
