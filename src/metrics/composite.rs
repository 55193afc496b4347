//! Fans events out to an ordered list of child sinks.

use crate::options::Options;
use crate::strategies::SearchError;

use super::{search_metrics_plugins, SearchMetrics};

#[derive(Clone, Default)]
pub struct CompositeSearch {
    name: String,
    ids: Vec<String>,
    child_names: Vec<String>,
    children: Vec<Box<dyn SearchMetrics>>,
}

impl CompositeSearch {
    fn rename_children(&mut self) {
        for (child, child_name) in self.children.iter_mut().zip(&self.child_names) {
            let full = if self.name.is_empty() {
                child_name.clone()
            } else {
                format!("{}/{}", self.name, child_name)
            };
            child.set_name(&full);
        }
    }
}

impl SearchMetrics for CompositeSearch {
    fn prefix(&self) -> &'static str {
        "composite_search"
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
        self.rename_children();
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn begin_search(&mut self) {
        for child in &mut self.children {
            child.begin_search();
        }
    }

    fn begin_iter(&mut self, inputs: &[f64]) {
        for child in &mut self.children {
            child.begin_iter(inputs);
        }
    }

    fn end_iter(&mut self, inputs: &[f64], output: &[f64]) {
        for child in &mut self.children {
            child.end_iter(inputs, output);
        }
    }

    fn end_search(&mut self, inputs: &[f64], output: &[f64]) {
        for child in &mut self.children {
            child.end_search(inputs, output);
        }
    }

    fn get_options(&self) -> Options {
        let mut opts = Options::new();
        opts.set("composite_search:search_metrics", self.ids.clone());
        opts.set("composite_search:names", self.child_names.clone());
        for child in &self.children {
            opts.copy_from(&child.get_options());
        }
        opts
    }

    fn set_options(&mut self, opts: &Options) -> Result<(), SearchError> {
        let scoped = opts.scoped(&self.name);
        if let Some(ids) = scoped.str_vec("composite_search:search_metrics") {
            if ids != self.ids.as_slice() {
                let mut children = Vec::with_capacity(ids.len());
                for id in ids {
                    children.push(search_metrics_plugins().build(id).ok_or_else(|| {
                        SearchError::config(format!(
                            "composite_search: failed to load search metrics plugin: {id}"
                        ))
                    })?);
                }
                self.ids = ids.to_vec();
                self.children = children;
                self.child_names.clear();
            }
        }
        if let Some(names) = scoped.str_vec("composite_search:names") {
            if !names.is_empty() && names.len() != self.children.len() {
                return Err(SearchError::config(
                    "composite_search: invalid number of names",
                ));
            }
            self.child_names = names.to_vec();
            self.rename_children();
        }
        for child in &mut self.children {
            child.set_options(opts)?;
        }
        Ok(())
    }

    fn get_metrics_results(&self) -> Options {
        let mut results = Options::new();
        for child in &self.children {
            results.copy_from(&child.get_metrics_results());
        }
        results
    }

    fn box_clone(&self) -> Box<dyn SearchMetrics> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    // a registered probe sink so composite tests exercise the same path the
    // host does: ids resolved through the process-wide registry
    fn event_log() -> &'static Mutex<Vec<String>> {
        static LOG: OnceLock<Mutex<Vec<String>>> = OnceLock::new();
        LOG.get_or_init(|| Mutex::new(Vec::new()))
    }

    #[derive(Clone, Default)]
    struct Probe {
        name: String,
    }

    impl SearchMetrics for Probe {
        fn prefix(&self) -> &'static str {
            "probe"
        }

        fn set_name(&mut self, name: &str) {
            self.name = name.to_string();
        }

        fn name(&self) -> &str {
            &self.name
        }

        fn begin_search(&mut self) {
            event_log()
                .lock()
                .unwrap()
                .push(format!("{}:begin_search", self.name));
        }

        fn end_iter(&mut self, inputs: &[f64], _output: &[f64]) {
            event_log()
                .lock()
                .unwrap()
                .push(format!("{}:end_iter:{}", self.name, inputs[0]));
        }

        fn end_search(&mut self, _inputs: &[f64], _output: &[f64]) {
            event_log()
                .lock()
                .unwrap()
                .push(format!("{}:end_search", self.name));
        }

        fn box_clone(&self) -> Box<dyn SearchMetrics> {
            Box::new(self.clone())
        }
    }

    fn register_probe() {
        static ONCE: OnceLock<()> = OnceLock::new();
        ONCE.get_or_init(|| {
            search_metrics_plugins()
                .register("probe", || Box::new(Probe::default()) as Box<dyn SearchMetrics>);
        });
    }

    #[test]
    fn events_fan_out_in_child_order() {
        register_probe();
        let mut opts = Options::new();
        opts.set(
            "composite_search:search_metrics",
            vec!["probe".to_string(), "probe".to_string()],
        );
        opts.set(
            "composite_search:names",
            vec!["first".to_string(), "second".to_string()],
        );
        let mut composite = CompositeSearch::default();
        composite.set_options(&opts).unwrap();

        event_log().lock().unwrap().clear();
        composite.begin_search();
        composite.end_iter(&[1.0], &[2.0]);
        composite.end_search(&[1.0], &[2.0]);

        let log = event_log().lock().unwrap().clone();
        assert_eq!(
            log,
            vec![
                "first:begin_search",
                "second:begin_search",
                "first:end_iter:1",
                "second:end_iter:1",
                "first:end_search",
                "second:end_search",
            ]
        );
    }

    #[test]
    fn wrong_name_count_is_rejected() {
        register_probe();
        let mut opts = Options::new();
        opts.set(
            "composite_search:search_metrics",
            vec!["probe".to_string()],
        );
        opts.set(
            "composite_search:names",
            vec!["a".to_string(), "b".to_string()],
        );
        let mut composite = CompositeSearch::default();
        let err = composite.set_options(&opts).unwrap_err();
        assert!(err.to_string().contains("invalid number of names"));
    }

    #[test]
    fn unknown_child_id_is_rejected() {
        let mut opts = Options::new();
        opts.set(
            "composite_search:search_metrics",
            vec!["no_such_sink".to_string()],
        );
        let mut composite = CompositeSearch::default();
        assert!(composite.set_options(&opts).is_err());
    }
}
