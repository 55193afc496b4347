//! Records every reported evaluation and writes a tabular trace file.

use std::fs::File;
use std::io::{self, BufWriter, Write};

use log::warn;

use crate::options::Options;
use crate::strategies::SearchError;

use super::SearchMetrics;

trait TableWriter {
    fn write(
        &self,
        out: &mut dyn Write,
        header: &[String],
        rows: &mut dyn Iterator<Item = &[f64]>,
    ) -> io::Result<()>;
}

struct CsvWriter;

impl TableWriter for CsvWriter {
    fn write(
        &self,
        out: &mut dyn Write,
        header: &[String],
        rows: &mut dyn Iterator<Item = &[f64]>,
    ) -> io::Result<()> {
        writeln!(out, "{}", header.join(","))?;
        for row in rows {
            let line = row
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(",");
            writeln!(out, "{line}")?;
        }
        Ok(())
    }
}

struct JsonWriter;

impl TableWriter for JsonWriter {
    fn write(
        &self,
        out: &mut dyn Write,
        header: &[String],
        rows: &mut dyn Iterator<Item = &[f64]>,
    ) -> io::Result<()> {
        let table = serde_json::json!({
            "header": header,
            "rows": rows.collect::<Vec<_>>(),
        });
        serde_json::to_writer_pretty(out, &table)?;
        Ok(())
    }
}

fn writer_for(format: &str) -> Option<Box<dyn TableWriter>> {
    match format {
        "csv" => Some(Box::new(CsvWriter)),
        "json" => Some(Box::new(JsonWriter)),
        _ => None,
    }
}

/// Buffers `(inputs ⊕ outputs)` rows in evaluation-end order; `end_search`
/// merges worker buffers (a no-op for the in-process transport, where every
/// evaluation already lands here) and writes one table.
#[derive(Clone, Debug)]
pub struct RecordSearch {
    name: String,
    results: Vec<f64>,
    fields: usize,
    iterations: usize,
    io_format: String,
    path: String,
    input_names: Vec<String>,
    output_names: Vec<String>,
}

impl Default for RecordSearch {
    fn default() -> Self {
        Self {
            name: String::new(),
            results: Vec::new(),
            fields: 0,
            iterations: 0,
            io_format: "csv".to_string(),
            path: String::new(),
            input_names: Vec::new(),
            output_names: Vec::new(),
        }
    }
}

impl RecordSearch {
    fn write_table(&self) -> io::Result<()> {
        let writer = writer_for(&self.io_format).expect("format validated in set_options");
        let header: Vec<String> = self
            .input_names
            .iter()
            .chain(self.output_names.iter())
            .cloned()
            .collect();
        let mut file = BufWriter::new(File::create(&self.path)?);
        writer.write(
            &mut file,
            &header,
            &mut self.results.chunks_exact(self.fields.max(1)),
        )?;
        file.flush()
    }
}

impl SearchMetrics for RecordSearch {
    fn prefix(&self) -> &'static str {
        "record_search"
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn begin_search(&mut self) {
        self.results.clear();
        self.fields = 0;
        self.iterations = 0;
    }

    fn end_iter(&mut self, inputs: &[f64], output: &[f64]) {
        if self.fields == 0 {
            self.fields = inputs.len() + output.len();
        } else if self.fields != inputs.len() + output.len() {
            warn!("record_search: field sizes don't match, dropping row");
            return;
        }
        self.results.extend_from_slice(inputs);
        self.results.extend_from_slice(output);
        self.iterations += 1;
    }

    fn end_search(&mut self, _inputs: &[f64], _output: &[f64]) {
        if self.path.is_empty() {
            return;
        }
        if let Err(err) = self.write_table() {
            warn!("record_search: failed to write {}: {err}", self.path);
        }
    }

    fn get_options(&self) -> Options {
        let mut opts = Options::new();
        opts.set("record_search:io_format", self.io_format.clone());
        opts.set("record_search:path", self.path.clone());
        opts
    }

    fn set_options(&mut self, opts: &Options) -> Result<(), SearchError> {
        let scoped = opts.scoped(&self.name);
        if let Some(format) = scoped.str_("record_search:io_format") {
            if writer_for(format).is_none() {
                return Err(SearchError::config(format!(
                    "record_search: unknown io format {format}"
                )));
            }
            self.io_format = format.to_string();
        }
        if let Some(path) = scoped.str_("record_search:path") {
            self.path = path.to_string();
        }
        if let Some(names) = scoped.str_vec("opt:inputs") {
            self.input_names = names.to_vec();
        }
        if let Some(names) = scoped.str_vec("opt:output") {
            self.output_names = names.to_vec();
        }
        Ok(())
    }

    fn box_clone(&self) -> Box<dyn SearchMetrics> {
        Box::new(self.clone())
    }
}
