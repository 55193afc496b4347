//! A sink that ignores every event.

use super::SearchMetrics;

#[derive(Clone, Debug, Default)]
pub struct Noop {
    name: String,
}

impl SearchMetrics for Noop {
    fn prefix(&self) -> &'static str {
        "noop"
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn box_clone(&self) -> Box<dyn SearchMetrics> {
        Box::new(self.clone())
    }
}
