//! Finalized thread reports and where they are published
//!
//! A [`ThreadReport`] is produced exactly once per thread profile, when its
//! outermost frame exits. The engine hands it to a [`ReportSink`]; sink
//! failures are logged by the engine and never reach the profiled code.

use crate::config::{ProfilerConfig, ReportFormat};
use crate::error::Result;
use crate::statistics::{print_summary, MethodStatistics};
use crate::thread_clock::Tid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Summary of one thread's profiling session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadReport {
    pub tid: Tid,
    /// Most recent sampler cycle, the power denominator
    pub cycle_duration_ns: u64,
    /// Thread timer from profile creation to finalize
    pub total_time_ns: u64,
    pub cpu_time_ns: u64,
    pub user_time_ns: u64,
    /// Thread power in watts
    pub power: f64,
    /// Sum of every invocation's CPU time, the attribution denominator
    pub total_method_cpu_ns: u64,
    /// Sorted by total wall time, heaviest first
    pub methods: Vec<MethodStatistics>,
}

impl ThreadReport {
    pub fn method(&self, name: &str) -> Option<&MethodStatistics> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Sum of the power attributed to every method
    pub fn attributed_power(&self) -> f64 {
        self.methods.iter().map(|m| m.attributed_power).sum()
    }

    /// Plain-text rendering: one line per method, then the thread footer
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        for method in &self.methods {
            text.push_str(&method.to_string());
            text.push('\n');
        }
        text.push_str("Thread info\n");
        text.push_str(&self.to_string());
        text.push('\n');
        text
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for ThreadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id:{}, cycle {}ms, time:{}ms, power: {:?}",
            self.tid,
            self.cycle_duration_ns / 1_000_000,
            self.total_time_ns / 1_000_000,
            self.power
        )
    }
}

/// Destination for finalized reports
pub trait ReportSink: Send + Sync {
    fn publish(&self, report: &ThreadReport) -> Result<()>;
}

/// Summary table and footer on stderr
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl ReportSink for ConsoleSink {
    fn publish(&self, report: &ThreadReport) -> Result<()> {
        print_summary(report.tid, &report.methods);
        eprintln!("{}", report);
        Ok(())
    }
}

/// One file per thread, named `<stem>-<tid>.<ext>` next to the base path
#[derive(Debug, Clone)]
pub struct FileSink {
    base: PathBuf,
    format: ReportFormat,
}

impl FileSink {
    pub fn new(base: impl Into<PathBuf>, format: ReportFormat) -> Self {
        Self {
            base: base.into(),
            format,
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Report file for `tid`
    ///
    /// Text reports keep the base path's extension (`txt` when it has none);
    /// JSON reports always use `json`.
    pub fn path_for(&self, tid: Tid) -> PathBuf {
        let stem = self
            .base
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "jouler".to_string());
        let extension = match self.format {
            ReportFormat::Json => ReportFormat::Json.extension().to_string(),
            ReportFormat::Text => self
                .base
                .extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_else(|| ReportFormat::Text.extension().to_string()),
        };
        self.base
            .with_file_name(format!("{}-{}.{}", stem, tid, extension))
    }
}

impl ReportSink for FileSink {
    fn publish(&self, report: &ThreadReport) -> Result<()> {
        let path = self.path_for(report.tid);
        let mut writer = BufWriter::new(File::create(&path)?);
        match self.format {
            ReportFormat::Text => writer.write_all(report.to_text().as_bytes())?,
            ReportFormat::Json => serde_json::to_writer_pretty(&mut writer, report)?,
        }
        writer.flush()?;
        tracing::debug!(tid = report.tid, path = %path.display(), "report written");
        Ok(())
    }
}

/// Publishes to every inner sink, returning the first failure
#[derive(Default)]
pub struct CompositeSink {
    sinks: Vec<Arc<dyn ReportSink>>,
}

impl CompositeSink {
    pub fn new(sinks: Vec<Arc<dyn ReportSink>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ReportSink for CompositeSink {
    fn publish(&self, report: &ThreadReport) -> Result<()> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.publish(report) {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Discards every report
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ReportSink for NullSink {
    fn publish(&self, _report: &ThreadReport) -> Result<()> {
        Ok(())
    }
}

/// Keeps every report in memory
#[derive(Debug, Default)]
pub struct CollectingSink {
    reports: Mutex<Vec<ThreadReport>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<ThreadReport> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn report_for(&self, tid: Tid) -> Option<ThreadReport> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|r| r.tid == tid)
            .cloned()
    }
}

impl ReportSink for CollectingSink {
    fn publish(&self, report: &ThreadReport) -> Result<()> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(report.clone());
        Ok(())
    }
}

/// Sink matching the configured output strategy
pub fn sink_for(config: &ProfilerConfig) -> Arc<dyn ReportSink> {
    let mut sinks: Vec<Arc<dyn ReportSink>> = Vec::new();
    if config.output.writes_file() {
        sinks.push(Arc::new(FileSink::new(
            config.dump_path_or_default(),
            config.format,
        )));
    }
    if config.output.writes_console() {
        sinks.push(Arc::new(ConsoleSink));
    }

    match sinks.len() {
        0 => Arc::new(NullSink),
        1 => sinks.remove(0),
        _ => Arc::new(CompositeSink::new(sinks)),
    }
}
