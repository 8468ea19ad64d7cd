//! Job observers.
//!
//! The coordinator reports every job outcome, and every non-fatal per-record error, to a
//! [`JobObserver`]. Observers are the error sink: a record error that does not abort its
//! dataset is visible only through them.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::error::{ReadError, RecordError, TabulateError};

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    /// Non-fatal: a record error, or a job abandoned on interrupt.
    Warning,
    /// The dataset failed.
    Error,
    /// Infrastructure failure (I/O on input, output or cache).
    Critical,
}

/// Identifies the job an event belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobContext {
    /// Dataset name.
    pub dataset: String,
    pub input: PathBuf,
    /// `delimited` or `markup`.
    pub format: &'static str,
}

/// Counters reported on a successful job.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobStats {
    pub rows_read: u64,
    pub rows_written: u64,
    pub rows_filtered: u64,
    /// Rows dropped because every mapped value was blank.
    pub rows_empty: u64,
    pub malformed_rows: u64,
    pub record_errors: u64,
    pub output: PathBuf,
}

/// Observer interface for job outcomes.
pub trait JobObserver: Send + Sync {
    fn on_started(&self, _ctx: &JobContext) {}

    fn on_success(&self, _ctx: &JobContext, _stats: &JobStats) {}

    /// The input was already processed by an earlier run.
    fn on_skipped(&self, _ctx: &JobContext) {}

    fn on_failure(&self, _ctx: &JobContext, _severity: Severity, _error: &TabulateError) {}

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &JobContext, severity: Severity, error: &TabulateError) {
        self.on_failure(ctx, severity, error)
    }

    /// A per-record error that did not abort the dataset.
    fn on_record_error(&self, _ctx: &JobContext, _error: &RecordError) {}
}

/// Severity of a job-level error.
pub fn severity_for_error(e: &TabulateError) -> Severity {
    match e {
        TabulateError::Read(ReadError::Io { .. })
        | TabulateError::Cache(_)
        | TabulateError::Output { .. } => Severity::Critical,
        TabulateError::OutputCsv(err) => match err.kind() {
            ::csv::ErrorKind::Io(_) => Severity::Critical,
            _ => Severity::Error,
        },
        TabulateError::Cancelled => Severity::Warning,
        TabulateError::Descriptor(_)
        | TabulateError::Read(_)
        | TabulateError::Record(_)
        | TabulateError::Fetch(_)
        | TabulateError::MissingInput { .. }
        | TabulateError::NoAddressParser => Severity::Error,
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn JobObserver>>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn JobObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl JobObserver for CompositeObserver {
    fn on_started(&self, ctx: &JobContext) {
        for o in &self.observers {
            o.on_started(ctx);
        }
    }

    fn on_success(&self, ctx: &JobContext, stats: &JobStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_skipped(&self, ctx: &JobContext) {
        for o in &self.observers {
            o.on_skipped(ctx);
        }
    }

    fn on_failure(&self, ctx: &JobContext, severity: Severity, error: &TabulateError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &JobContext, severity: Severity, error: &TabulateError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }

    fn on_record_error(&self, ctx: &JobContext, error: &RecordError) {
        for o in &self.observers {
            o.on_record_error(ctx, error);
        }
    }
}

/// Reports job events through `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl JobObserver for TracingObserver {
    fn on_started(&self, ctx: &JobContext) {
        tracing::info!(dataset = %ctx.dataset, input = %ctx.input.display(), format = ctx.format, "processing");
    }

    fn on_success(&self, ctx: &JobContext, stats: &JobStats) {
        tracing::info!(
            dataset = %ctx.dataset,
            rows_read = stats.rows_read,
            rows_written = stats.rows_written,
            rows_filtered = stats.rows_filtered,
            malformed_rows = stats.malformed_rows,
            record_errors = stats.record_errors,
            output = %stats.output.display(),
            "completed"
        );
    }

    fn on_skipped(&self, ctx: &JobContext) {
        tracing::info!(dataset = %ctx.dataset, input = %ctx.input.display(), "unchanged since last successful run, skipping");
    }

    fn on_failure(&self, ctx: &JobContext, severity: Severity, error: &TabulateError) {
        match severity {
            Severity::Info | Severity::Warning => {
                tracing::warn!(dataset = %ctx.dataset, ?severity, error = %error, "job did not complete")
            }
            Severity::Error | Severity::Critical => {
                tracing::error!(dataset = %ctx.dataset, ?severity, error = %error, "job failed")
            }
        }
    }

    fn on_alert(&self, ctx: &JobContext, severity: Severity, error: &TabulateError) {
        tracing::error!(dataset = %ctx.dataset, ?severity, error = %error, alert = true, "job failed");
    }

    fn on_record_error(&self, ctx: &JobContext, error: &RecordError) {
        tracing::warn!(dataset = %ctx.dataset, error = %error, "record error");
    }
}

/// Appends job events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{} {line}", Utc::now().to_rfc3339());
        }
    }
}

impl JobObserver for FileObserver {
    fn on_success(&self, ctx: &JobContext, stats: &JobStats) {
        self.append_line(&format!(
            "ok dataset={} rows={} output={}",
            ctx.dataset,
            stats.rows_written,
            stats.output.display()
        ));
    }

    fn on_skipped(&self, ctx: &JobContext) {
        self.append_line(&format!("skipped dataset={}", ctx.dataset));
    }

    fn on_failure(&self, ctx: &JobContext, severity: Severity, error: &TabulateError) {
        self.append_line(&format!(
            "fail severity={severity:?} dataset={} input={} err={error}",
            ctx.dataset,
            ctx.input.display()
        ));
    }

    fn on_alert(&self, ctx: &JobContext, severity: Severity, error: &TabulateError) {
        self.append_line(&format!(
            "ALERT severity={severity:?} dataset={} input={} err={error}",
            ctx.dataset,
            ctx.input.display()
        ));
    }

    fn on_record_error(&self, ctx: &JobContext, error: &RecordError) {
        self.append_line(&format!("record dataset={} err={error}", ctx.dataset));
    }
}

/// One recorded observer callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobEvent {
    Started { dataset: String },
    Succeeded { dataset: String, stats: JobStats },
    Skipped { dataset: String },
    Failed { dataset: String, severity: Severity, message: String },
    Alert { dataset: String, severity: Severity },
    RecordError { dataset: String, error: RecordError },
}

/// Keeps every event in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemoryObserver {
    events: Mutex<Vec<JobEvent>>,
}

impl MemoryObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn push(&self, event: JobEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl JobObserver for MemoryObserver {
    fn on_started(&self, ctx: &JobContext) {
        self.push(JobEvent::Started {
            dataset: ctx.dataset.clone(),
        });
    }

    fn on_success(&self, ctx: &JobContext, stats: &JobStats) {
        self.push(JobEvent::Succeeded {
            dataset: ctx.dataset.clone(),
            stats: stats.clone(),
        });
    }

    fn on_skipped(&self, ctx: &JobContext) {
        self.push(JobEvent::Skipped {
            dataset: ctx.dataset.clone(),
        });
    }

    fn on_failure(&self, ctx: &JobContext, severity: Severity, error: &TabulateError) {
        self.push(JobEvent::Failed {
            dataset: ctx.dataset.clone(),
            severity,
            message: error.to_string(),
        });
    }

    fn on_alert(&self, ctx: &JobContext, severity: Severity, _error: &TabulateError) {
        self.push(JobEvent::Alert {
            dataset: ctx.dataset.clone(),
            severity,
        });
    }

    fn on_record_error(&self, ctx: &JobContext, error: &RecordError) {
        self.push(JobEvent::RecordError {
            dataset: ctx.dataset.clone(),
            error: error.clone(),
        });
    }
}
