//! Line-formatted progress printing.

use std::sync::Mutex;

use crate::options::Options;
use crate::strategies::SearchError;

use super::SearchMetrics;

/// Concurrent evaluations report through the same stdout; one process-wide
/// lock keeps the lines whole.
static PRINT_LOCK: Mutex<()> = Mutex::new(());

fn join(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Clone, Debug, Default)]
pub struct ProgressPrinter {
    name: String,
    iteration: usize,
    rank_prefix: String,
}

impl SearchMetrics for ProgressPrinter {
    fn prefix(&self) -> &'static str {
        "progress_printer"
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn begin_search(&mut self) {
        self.iteration = 0;
    }

    fn end_iter(&mut self, inputs: &[f64], output: &[f64]) {
        let primary = output.first().copied().unwrap_or(f64::NAN);
        let _guard = PRINT_LOCK.lock().expect("print lock poisoned");
        println!(
            "{}{},{},{},{}",
            self.rank_prefix,
            self.iteration,
            join(inputs),
            join(output),
            primary
        );
        self.iteration += 1;
    }

    fn end_search(&mut self, inputs: &[f64], output: &[f64]) {
        let _guard = PRINT_LOCK.lock().expect("print lock poisoned");
        println!(
            "final iter={}: inputs={} output={}",
            self.iteration,
            join(inputs),
            join(output)
        );
    }

    fn set_options(&mut self, opts: &Options) -> Result<(), SearchError> {
        // prefix lines with rank,size when running under a worker group
        if let (Some(rank), Some(size)) = (
            opts.get_u32("distributed:rank"),
            opts.get_u32("distributed:size"),
        ) {
            self.rank_prefix = format!("{rank},{size},");
        }
        Ok(())
    }

    fn box_clone(&self) -> Box<dyn SearchMetrics> {
        Box::new(self.clone())
    }
}
