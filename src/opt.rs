//! The host compressor shell: builds the strategy tree, wires the
//! evaluator, and replays the winning configuration.

use std::sync::Mutex;

use log::debug;

use crate::compressor::{Compressor, CompressorError};
use crate::evaluate::EvalError;
use crate::metrics::{search_metrics_plugins, SearchMetrics};
use crate::objective::{Mode, Reducer};
use crate::options::{Options, TensorBuf};
use crate::stop::StopToken;
use crate::strategies::{search_plugins, Search, SearchError, SearchResult};

/// Configure the compressor for `point`, compress, optionally decompress,
/// and read the named metrics back in declaration order.
fn run_once(
    compressor: &mut dyn Compressor,
    input_settings: &[String],
    output_settings: &[String],
    do_decompress: bool,
    input: &TensorBuf,
    output: &mut TensorBuf,
    point: &[f64],
) -> Result<Vec<f64>, EvalError> {
    let mut settings = compressor.get_options();
    for (name, value) in input_settings.iter().zip(point) {
        settings
            .cast_set(name, *value)
            .map_err(|_| EvalError::Configure(name.clone()))?;
    }
    compressor
        .set_options(&settings)
        .map_err(|e| EvalError::Compressor(e.to_string()))?;
    compressor
        .compress(input, output)
        .map_err(|e| EvalError::Compress(e.to_string()))?;
    if do_decompress {
        let mut decompressed = TensorBuf::zeros(input.dims().to_vec());
        compressor
            .decompress(output, &mut decompressed)
            .map_err(|e| EvalError::Decompress(e.to_string()))?;
    }

    let bag = compressor.metrics_results();
    output_settings
        .iter()
        .map(|name| {
            bag.cast(name)
                .ok_or_else(|| EvalError::MissingMetric(name.clone()))
        })
        .collect()
}

#[derive(Clone)]
pub struct OptCompressor {
    name: String,
    compressor: Box<dyn Compressor>,
    search_id: String,
    search: Box<dyn Search>,
    search_metrics_id: String,
    search_metrics: Box<dyn SearchMetrics>,
    input_settings: Vec<String>,
    output_settings: Vec<String>,
    do_decompress: bool,
    reducer: Reducer,
    last_results: Option<SearchResult>,
}

impl OptCompressor {
    /// The compression library is handed in; strategies and sinks are
    /// resolved by name from the process-wide registries.
    pub fn new(compressor: Box<dyn Compressor>) -> Self {
        Self {
            name: String::new(),
            compressor,
            search_id: "guess".to_string(),
            search: search_plugins().build("guess").expect("builtin strategy"),
            search_metrics_id: "progress_printer".to_string(),
            search_metrics: search_metrics_plugins()
                .build("progress_printer")
                .expect("builtin sink"),
            input_settings: Vec::new(),
            output_settings: Vec::new(),
            do_decompress: true,
            reducer: Reducer::First,
            last_results: None,
        }
    }

    /// Install the measurement-to-scalar combination applied before each
    /// measurement reaches the strategy.
    pub fn set_reducer(&mut self, reducer: Reducer) {
        self.reducer = reducer;
    }

    pub fn last_results(&self) -> Option<&SearchResult> {
        self.last_results.as_ref()
    }

    fn thread_safe(&self) -> i32 {
        self.compressor
            .get_configuration()
            .get_i32("opt:thread_safe")
            .unwrap_or(0)
    }

    fn map_search_error(err: SearchError) -> CompressorError {
        CompressorError::new(2, err.to_string())
    }
}

impl Compressor for OptCompressor {
    fn prefix(&self) -> &str {
        "opt"
    }

    fn get_options(&self) -> Options {
        let mut opts = Options::new();
        opts.set("opt:inputs", self.input_settings.clone());
        opts.set("opt:output", self.output_settings.clone());
        opts.set("opt:do_decompress", i32::from(self.do_decompress));
        opts.set("opt:search", self.search_id.clone());
        opts.set("opt:search_metrics", self.search_metrics_id.clone());
        opts.copy_from(&self.search.get_options());
        opts.copy_from(&self.search_metrics.get_options());
        opts
    }

    fn set_options(&mut self, opts: &Options) -> Result<(), CompressorError> {
        let scoped = opts.scoped(&self.name);
        if let Some(names) = scoped.str_vec("opt:inputs") {
            self.input_settings = names.to_vec();
        }
        if let Some(names) = scoped.str_vec("opt:output") {
            self.output_settings = names.to_vec();
        }
        if let Some(v) = scoped.i32("opt:do_decompress") {
            self.do_decompress = v != 0;
        }
        if let Some(id) = scoped.str_("opt:search") {
            if id != self.search_id {
                self.search = search_plugins()
                    .build(id)
                    .ok_or_else(|| CompressorError::new(2, format!("unknown search plugin {id}")))?;
                self.search_id = id.to_string();
                if !self.name.is_empty() {
                    let child = format!("{}/{}", self.name, self.search.prefix());
                    self.search.set_name(&child);
                }
            }
        }
        if let Some(id) = scoped.str_("opt:search_metrics") {
            if id != self.search_metrics_id {
                self.search_metrics = search_metrics_plugins().build(id).ok_or_else(|| {
                    CompressorError::new(2, format!("unknown search metrics plugin {id}"))
                })?;
                self.search_metrics_id = id.to_string();
                if !self.name.is_empty() {
                    let child = format!("{}/{}", self.name, self.search_metrics.prefix());
                    self.search_metrics.set_name(&child);
                }
            }
        }

        // forward the full option set down the tree, with the numeric mode
        // derived from the name and the compressor's thread safety attached
        let mut forwarded = opts.clone();
        forwarded.set("opt:thread_safe", self.thread_safe());
        if let Some(mode_name) = scoped.str_("opt:objective_mode_name") {
            let mode = Mode::from_name(mode_name)
                .ok_or_else(|| CompressorError::new(2, format!("unknown mode {mode_name}")))?;
            forwarded.set("opt:objective_mode", mode.to_u32());
        }
        self.search
            .set_options(&forwarded)
            .map_err(Self::map_search_error)?;
        self.search_metrics
            .set_options(&forwarded)
            .map_err(Self::map_search_error)?;
        self.compressor.set_options(&forwarded)
    }

    fn get_configuration(&self) -> Options {
        let mut config = Options::new();
        config.set("opt:thread_safe", 0);
        config.set("opt:search_methods", search_plugins().names());
        config.set("opt:search_metrics", search_metrics_plugins().names());
        config.copy_from(&self.compressor.get_configuration());
        config
    }

    fn compress(
        &mut self,
        input: &TensorBuf,
        output: &mut TensorBuf,
    ) -> Result<(), CompressorError> {
        if self.output_settings.is_empty() {
            return Err(CompressorError::new(
                1,
                "opt:output is required to be set, but is not",
            ));
        }
        if self.input_settings.is_empty() {
            return Err(CompressorError::new(
                3,
                "opt:inputs is required to be set, but is not",
            ));
        }

        let token = StopToken::new();
        let search_result = {
            let metrics = Mutex::new(&mut self.search_metrics);
            let base = &self.compressor;
            let input_settings = &self.input_settings;
            let output_settings = &self.output_settings;
            let do_decompress = self.do_decompress;
            let reducer = &self.reducer;
            let out_dims = output.dims().to_vec();

            let compress_fn = |point: &[f64]| -> Result<Vec<f64>, EvalError> {
                metrics.lock().expect("metrics lock").begin_iter(point);
                let mut worker = base.box_clone();
                let mut scratch = TensorBuf::zeros(out_dims.clone());
                let mut measurement = run_once(
                    worker.as_mut(),
                    input_settings,
                    output_settings,
                    do_decompress,
                    input,
                    &mut scratch,
                    point,
                )?;
                reducer.apply(&mut measurement);
                metrics
                    .lock()
                    .expect("metrics lock")
                    .end_iter(point, &measurement);
                Ok(measurement)
            };

            metrics.lock().expect("metrics lock").begin_search();
            let search_result = self.search.search(&compress_fn, &token);
            match &search_result {
                Ok(results) => metrics
                    .lock()
                    .expect("metrics lock")
                    .end_search(&results.inputs, &results.output),
                Err(_) => metrics.lock().expect("metrics lock").end_search(&[], &[]),
            }
            search_result
        };

        let results = search_result.map_err(Self::map_search_error)?;
        debug!(
            "search finished status={} inputs={:?}",
            results.status, results.inputs
        );

        // replay the winner with observer emission suppressed so the output
        // buffer reflects the best configuration
        run_once(
            self.compressor.as_mut(),
            &self.input_settings,
            &self.output_settings,
            self.do_decompress,
            input,
            output,
            &results.inputs,
        )
        .map_err(|e| CompressorError::new(2, e.to_string()))?;

        let status = results.status;
        let msg = results.msg.clone();
        self.last_results = Some(results);
        if status != 0 {
            return Err(CompressorError::new(status, msg));
        }
        Ok(())
    }

    fn decompress(
        &mut self,
        input: &TensorBuf,
        output: &mut TensorBuf,
    ) -> Result<(), CompressorError> {
        self.compressor.decompress(input, output)
    }

    fn metrics_results(&self) -> Options {
        let mut results = self.search_metrics.get_metrics_results();
        if let Some(last) = &self.last_results {
            results.set("opt:input", last.inputs.clone());
            results.set("opt:output", last.output.clone());
            results.set("opt:status", last.status);
            results.set("opt:msg", last.msg.clone());
        }
        results
    }

    fn box_clone(&self) -> Box<dyn Compressor> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::search_metrics_plugins;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, OnceLock};

    /// Simulated lossy compressor: one knob `mock:rel_bound`, measured
    /// `mock:compression_ratio = 1/x` and `mock:psnr = 100 - 50x`.
    #[derive(Clone)]
    struct MockCompressor {
        rel_bound: f64,
        last: Option<(f64, f64)>,
    }

    impl MockCompressor {
        fn new() -> Self {
            Self {
                rel_bound: 0.05,
                last: None,
            }
        }
    }

    impl Compressor for MockCompressor {
        fn prefix(&self) -> &str {
            "mock"
        }

        fn get_options(&self) -> Options {
            let mut opts = Options::new();
            opts.set("mock:rel_bound", self.rel_bound);
            opts
        }

        fn set_options(&mut self, opts: &Options) -> Result<(), CompressorError> {
            if let Some(v) = opts.get_f64("mock:rel_bound") {
                self.rel_bound = v;
            }
            Ok(())
        }

        fn get_configuration(&self) -> Options {
            let mut config = Options::new();
            config.set("opt:thread_safe", 1);
            config
        }

        fn compress(
            &mut self,
            _input: &TensorBuf,
            output: &mut TensorBuf,
        ) -> Result<(), CompressorError> {
            if self.rel_bound <= 0.0 {
                return Err(CompressorError::new(2, "rel_bound must be positive"));
            }
            output.data_mut()[0] = self.rel_bound;
            self.last = Some((1.0 / self.rel_bound, 100.0 - 50.0 * self.rel_bound));
            Ok(())
        }

        fn decompress(
            &mut self,
            _input: &TensorBuf,
            _output: &mut TensorBuf,
        ) -> Result<(), CompressorError> {
            Ok(())
        }

        fn metrics_results(&self) -> Options {
            let mut bag = Options::new();
            if let Some((cr, psnr)) = self.last {
                bag.set("mock:compression_ratio", cr);
                bag.set("mock:psnr", psnr);
            }
            bag
        }

        fn box_clone(&self) -> Box<dyn Compressor> {
            Box::new(self.clone())
        }
    }

    fn host(search: &str) -> OptCompressor {
        let mut host = OptCompressor::new(Box::new(MockCompressor::new()));
        let mut opts = Options::new();
        opts.set("opt:search", search);
        opts.set("opt:search_metrics", "noop");
        opts.set("opt:inputs", vec!["mock:rel_bound".to_string()]);
        opts.set(
            "opt:output",
            vec![
                "mock:compression_ratio".to_string(),
                "mock:psnr".to_string(),
            ],
        );
        host.set_options(&opts).unwrap();
        host
    }

    fn buffers() -> (TensorBuf, TensorBuf) {
        (TensorBuf::zeros(vec![16]), TensorBuf::zeros(vec![16]))
    }

    #[test]
    fn guess_end_to_end_populates_the_metrics_bag() {
        let mut h = host("guess");
        let mut opts = Options::new();
        opts.set("opt:prediction", vec![0.05]);
        h.set_options(&opts).unwrap();

        let (input, mut output) = buffers();
        h.compress(&input, &mut output).unwrap();

        let bag = h.metrics_results();
        assert_eq!(bag.get_f64_vec("opt:input"), Some(&[0.05][..]));
        let measured = bag.get_f64_vec("opt:output").unwrap();
        assert!((measured[0] - 20.0).abs() < 1e-9);
        assert!((measured[1] - 97.5).abs() < 1e-9);
        assert_eq!(bag.get_i32("opt:status"), Some(0));
        // the replay wrote the winning configuration into the real output
        assert_eq!(output.data()[0], 0.05);
    }

    #[test]
    fn missing_output_list_is_status_1() {
        let mut h = OptCompressor::new(Box::new(MockCompressor::new()));
        let mut opts = Options::new();
        opts.set("opt:inputs", vec!["mock:rel_bound".to_string()]);
        opts.set("opt:search_metrics", "noop");
        h.set_options(&opts).unwrap();
        let (input, mut output) = buffers();
        let err = h.compress(&input, &mut output).unwrap_err();
        assert_eq!(err.code, 1);
    }

    #[test]
    fn missing_inputs_list_is_status_3() {
        let mut h = OptCompressor::new(Box::new(MockCompressor::new()));
        let mut opts = Options::new();
        opts.set("opt:output", vec!["mock:psnr".to_string()]);
        opts.set("opt:search_metrics", "noop");
        h.set_options(&opts).unwrap();
        let (input, mut output) = buffers();
        let err = h.compress(&input, &mut output).unwrap_err();
        assert_eq!(err.code, 3);
    }

    #[test]
    fn missing_metric_is_status_2() {
        let mut h = host("guess");
        let mut opts = Options::new();
        opts.set("opt:prediction", vec![0.05]);
        opts.set(
            "opt:output",
            vec!["mock:no_such_metric".to_string()],
        );
        h.set_options(&opts).unwrap();
        let (input, mut output) = buffers();
        let err = h.compress(&input, &mut output).unwrap_err();
        assert_eq!(err.code, 2);
        assert!(err.msg.contains("failed to retrieve metric"));
    }

    #[test]
    fn search_config_failures_are_status_2() {
        // binary without a target cannot start
        let mut h = host("binary");
        let mut opts = Options::new();
        opts.set("opt:lower_bound", vec![0.01]);
        opts.set("opt:upper_bound", vec![1.0]);
        h.set_options(&opts).unwrap();
        let (input, mut output) = buffers();
        let err = h.compress(&input, &mut output).unwrap_err();
        assert_eq!(err.code, 2);
    }

    #[test]
    fn fraz_with_scripted_reducer_respects_the_constraint() {
        let mut h = host("fraz");
        let mut opts = Options::new();
        opts.set("opt:lower_bound", vec![1e-4]);
        opts.set("opt:upper_bound", vec![0.1]);
        opts.set("opt:objective_mode_name", "max");
        opts.set("opt:max_iterations", 60u32);
        h.set_options(&opts).unwrap();
        h.set_reducer(Reducer::Func(Arc::new(|m: &[f64]| {
            if m[1] >= 65.0 {
                m[0]
            } else {
                f64::NEG_INFINITY
            }
        })));

        let (input, mut output) = buffers();
        h.compress(&input, &mut output).unwrap();

        let bag = h.metrics_results();
        let measured = bag.get_f64_vec("opt:output").unwrap();
        assert!(measured[1] >= 65.0, "psnr {}", measured[1]);
        assert!(measured[0] >= 1.0 / 0.7, "cr {}", measured[0]);
        assert_eq!(bag.get_i32("opt:status"), Some(0));
    }

    #[test]
    fn seeded_random_search_reproduces_the_trace() {
        let run = |path: &str| {
            let mut h = host("random");
            let mut opts = Options::new();
            opts.set("opt:lower_bound", vec![0.01]);
            opts.set("opt:upper_bound", vec![0.1]);
            opts.set("opt:objective_mode_name", "min");
            opts.set("opt:max_iterations", 15u32);
            opts.set("random:seed", 12345u64);
            opts.set("opt:search_metrics", "record_search");
            opts.set("record_search:path", path);
            h.set_options(&opts).unwrap();
            let (input, mut output) = buffers();
            h.compress(&input, &mut output).unwrap();
            let bag = h.metrics_results();
            bag.get_f64_vec("opt:input").unwrap().to_vec()
        };

        let path_a = std::env::temp_dir()
            .join(format!("optune_trace_a_{}", std::process::id()))
            .to_string_lossy()
            .into_owned();
        let path_b = std::env::temp_dir()
            .join(format!("optune_trace_b_{}", std::process::id()))
            .to_string_lossy()
            .into_owned();
        let best_a = run(&path_a);
        let best_b = run(&path_b);
        assert_eq!(best_a, best_b);

        let trace_a = std::fs::read_to_string(&path_a).unwrap();
        let trace_b = std::fs::read_to_string(&path_b).unwrap();
        assert_eq!(trace_a, trace_b);
        assert_eq!(trace_a.lines().count(), 16, "header plus one row per eval");
        std::fs::remove_file(&path_a).ok();
        std::fs::remove_file(&path_b).ok();
    }

    // pairing probe: counts events so host-level invariants are checkable
    #[derive(Clone, Default)]
    struct PairingProbe;

    #[derive(Default)]
    struct PairingCounts {
        begin_search: AtomicUsize,
        end_search: AtomicUsize,
        begin_iter: AtomicUsize,
        end_iter: AtomicUsize,
    }

    fn pairing_counts() -> &'static PairingCounts {
        static COUNTS: OnceLock<PairingCounts> = OnceLock::new();
        COUNTS.get_or_init(PairingCounts::default)
    }

    impl crate::metrics::SearchMetrics for PairingProbe {
        fn prefix(&self) -> &'static str {
            "pairing_probe"
        }

        fn begin_search(&mut self) {
            pairing_counts().begin_search.fetch_add(1, Ordering::SeqCst);
        }

        fn begin_iter(&mut self, _inputs: &[f64]) {
            pairing_counts().begin_iter.fetch_add(1, Ordering::SeqCst);
        }

        fn end_iter(&mut self, _inputs: &[f64], _output: &[f64]) {
            pairing_counts().end_iter.fetch_add(1, Ordering::SeqCst);
        }

        fn end_search(&mut self, _inputs: &[f64], _output: &[f64]) {
            pairing_counts().end_search.fetch_add(1, Ordering::SeqCst);
        }

        fn box_clone(&self) -> Box<dyn crate::metrics::SearchMetrics> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn observer_events_pair_and_the_replay_is_silent() {
        search_metrics_plugins().register("pairing_probe", || {
            Box::new(PairingProbe) as Box<dyn crate::metrics::SearchMetrics>
        });

        let mut h = host("guess");
        let mut opts = Options::new();
        opts.set("opt:prediction", vec![0.05]);
        opts.set("opt:search_metrics", "pairing_probe");
        h.set_options(&opts).unwrap();

        let (input, mut output) = buffers();
        h.compress(&input, &mut output).unwrap();

        let counts = pairing_counts();
        assert_eq!(counts.begin_search.load(Ordering::SeqCst), 1);
        assert_eq!(counts.end_search.load(Ordering::SeqCst), 1);
        // guess evaluates once; the final best replay emits nothing
        assert_eq!(counts.begin_iter.load(Ordering::SeqCst), 1);
        assert_eq!(counts.end_iter.load(Ordering::SeqCst), 1);
    }
}
