/// Tune a simulated lossy compressor end to end: pick a search strategy and
/// objective from the command line, run the host compressor, and print the
/// winning configuration. The simulated codec has one error-bound knob; its
/// compression ratio rises and its psnr falls as the bound loosens.
use clap::Parser;

use optune::compressor::{Compressor, CompressorError};
use optune::opt::OptCompressor;
use optune::{Options, TensorBuf};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// search strategy id (guess, guess_midpoint, binary, random, fraz,
    /// guess_first, dist_gridsearch)
    #[arg(long, default_value = "fraz")]
    search: String,

    /// objective direction: min, max, target, none
    #[arg(long, default_value = "target")]
    mode: String,

    /// objective target (compression ratio)
    #[arg(long, default_value_t = 20.0)]
    target: f64,

    #[arg(long, default_value_t = 0.05)]
    tolerance: f64,

    #[arg(long, default_value_t = 100)]
    iterations: u32,

    /// write a CSV trace of every evaluation here
    #[arg(long)]
    trace: Option<String>,
}

/// One knob, `sim:rel_bound`. Compression quality follows a smooth synthetic
/// model so every strategy has something to optimize against.
#[derive(Clone)]
struct SimCompressor {
    rel_bound: f64,
    last: Option<(f64, f64)>,
}

impl SimCompressor {
    fn new() -> Self {
        Self {
            rel_bound: 1e-3,
            last: None,
        }
    }
}

impl Compressor for SimCompressor {
    fn prefix(&self) -> &str {
        "sim"
    }

    fn get_options(&self) -> Options {
        let mut opts = Options::new();
        opts.set("sim:rel_bound", self.rel_bound);
        opts
    }

    fn set_options(&mut self, opts: &Options) -> Result<(), CompressorError> {
        if let Some(v) = opts.get_f64("sim:rel_bound") {
            if v <= 0.0 {
                return Err(CompressorError::new(2, "sim:rel_bound must be positive"));
            }
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
        input: &TensorBuf,
        output: &mut TensorBuf,
    ) -> Result<(), CompressorError> {
        // compressed size shrinks as the bound loosens
        let ratio = 1.0 + 400.0 * self.rel_bound.sqrt();
        let kept = ((input.len() as f64) / ratio).max(1.0) as usize;
        *output = TensorBuf::zeros(vec![kept]);
        let psnr = 20.0 * (1.0 / self.rel_bound).log10();
        self.last = Some((ratio, psnr));
        Ok(())
    }

    fn decompress(
        &mut self,
        _input: &TensorBuf,
        output: &mut TensorBuf,
    ) -> Result<(), CompressorError> {
        for v in output.data_mut() {
            *v = 0.0;
        }
        Ok(())
    }

    fn metrics_results(&self) -> Options {
        let mut bag = Options::new();
        if let Some((ratio, psnr)) = self.last {
            bag.set("sim:compression_ratio", ratio);
            bag.set("sim:psnr", psnr);
        }
        bag
    }

    fn box_clone(&self) -> Box<dyn Compressor> {
        Box::new(self.clone())
    }
}

fn main() {
    color_backtrace::install();
    pretty_env_logger::init();
    let args = Args::parse();

    let mut host = OptCompressor::new(Box::new(SimCompressor::new()));
    let mut opts = Options::new();
    opts.set("opt:search", args.search.clone());
    opts.set("opt:inputs", vec!["sim:rel_bound".to_string()]);
    opts.set(
        "opt:output",
        vec!["sim:compression_ratio".to_string(), "sim:psnr".to_string()],
    );
    opts.set("opt:objective_mode_name", args.mode.clone());
    opts.set("opt:target", args.target);
    opts.set("opt:global_rel_tolerance", args.tolerance);
    opts.set("opt:max_iterations", args.iterations);
    opts.set("opt:lower_bound", vec![1e-6]);
    opts.set("opt:upper_bound", vec![0.1]);
    opts.set("opt:prediction", vec![1e-3]);
    if let Some(trace) = &args.trace {
        opts.set(
            "opt:search_metrics",
            "composite_search",
        );
        opts.set(
            "composite_search:search_metrics",
            vec!["progress_printer".to_string(), "record_search".to_string()],
        );
        opts.set(
            "composite_search:names",
            vec!["progress".to_string(), "recorder".to_string()],
        );
        opts.set("record_search:path", trace.clone());
    }
    if let Err(err) = host.set_options(&opts) {
        eprintln!("configuration failed: {err}");
        std::process::exit(err.code);
    }

    let input = TensorBuf::zeros(vec![1 << 16]);
    let mut output = TensorBuf::zeros(vec![1 << 16]);
    match host.compress(&input, &mut output) {
        Ok(()) => {
            let bag = host.metrics_results();
            println!("--------------------------");
            println!(
                "best inputs:  {:?}",
                bag.get_f64_vec("opt:input").unwrap_or(&[])
            );
            println!(
                "best outputs: {:?}",
                bag.get_f64_vec("opt:output").unwrap_or(&[])
            );
            println!("compressed elements: {}", output.len());
        }
        Err(err) => {
            eprintln!("search failed: {err}");
            std::process::exit(err.code);
        }
    }
}
