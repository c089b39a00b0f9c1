//! CLI argument parsing for the Jouler demo driver

use crate::config::{OutputStrategy, ProfilerConfig, ReportFormat};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "jouler")]
#[command(version)]
#[command(about = "Per-thread CPU power attribution over a synthetic workload", long_about = None)]
pub struct Cli {
    /// TOML config file (falls back to $JOULER_CONFIG, then defaults)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Sampler interval in milliseconds
    #[arg(short = 'i', long = "interval-ms", value_name = "MS")]
    pub interval_ms: Option<u64>,

    /// Nominal CPU power rating in watts
    #[arg(short = 'w', long = "power-rating", value_name = "WATTS")]
    pub power_rating: Option<f64>,

    /// Where thread reports go
    #[arg(short, long, value_enum)]
    pub output: Option<OutputStrategy>,

    /// Base path for per-thread report files
    #[arg(long = "dump-path", value_name = "PATH")]
    pub dump_path: Option<PathBuf>,

    /// Report file format
    #[arg(long, value_enum)]
    pub format: Option<ReportFormat>,

    /// Exclude methods matching a regex (repeatable)
    #[arg(short = 'x', long = "exclude", value_name = "REGEX")]
    pub exclude: Vec<String>,

    /// Number of worker threads in the synthetic workload
    #[arg(short = 't', long = "threads", default_value = "2")]
    pub threads: usize,

    /// Work items per worker thread
    #[arg(short = 'n', long = "iterations", default_value = "20")]
    pub iterations: usize,

    /// Recursion depth of the recursive workload step
    #[arg(short = 'd', long = "depth", default_value = "18")]
    pub depth: u32,

    /// Enable debug tracing output to stderr
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Overlay command-line values on a loaded configuration
    pub fn apply_to(&self, config: &mut ProfilerConfig) {
        if let Some(interval) = self.interval_ms {
            config.sampling_interval_ms = interval;
        }
        if let Some(rating) = self.power_rating {
            config.power_rating_watts = rating;
        }
        if let Some(output) = self.output {
            config.output = output;
        }
        if let Some(path) = &self.dump_path {
            config.dump_path = Some(path.clone());
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        config.exclude.extend(self.exclude.iter().cloned());
    }
}
