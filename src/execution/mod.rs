//! Dataset job coordinator.
//!
//! The [`Coordinator`] runs one job per descriptor on a bounded worker pool:
//!
//! - at most `workers` jobs are active at once (each job is single-threaded and streams
//!   read -> transform -> write end to end)
//! - the redundancy cache is consulted before and committed after each job, with lookup and
//!   commit serialised per input digest
//! - a failing job never affects its siblings; every descriptor gets exactly one outcome
//! - a [`CancelToken`] stops new jobs from starting and makes running jobs abandon their
//!   output without committing
//! - real-time [`ExecutionMetrics`] and [`JobObserver`] hooks for monitoring

mod job;
mod metrics;
mod semaphore;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rayon::ThreadPool;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::cache::{CacheStore, DigestLocks};
use crate::config::ColumnGroups;
use crate::descriptor::Descriptor;
use crate::error::{RunError, TabulateError};
use crate::fetch::Fetcher;
use crate::observability::{JobContext, JobObserver, JobStats, Severity, severity_for_error};
use crate::reader::{FileReaderFactory, ReaderFactory, ReaderOptions};
use crate::transform::{AddressParser, TransformOptions};

pub use metrics::{ExecutionMetrics, ExecutionMetricsSnapshot};

use semaphore::Semaphore;

/// Configuration for the [`Coordinator`].
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    /// Upper bound on concurrently active jobs.
    pub workers: usize,
    /// Directory relative `localfile`s are resolved against.
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Skip the cache lookup; successful jobs are still committed.
    pub ignore_cache: bool,
    /// Retrieve descriptors' `url`s before reading.
    pub fetch: bool,
    pub reader: ReaderOptions,
    pub transform: TransformOptions,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: Severity,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            input_dir: PathBuf::from("."),
            output_dir: PathBuf::from("."),
            ignore_cache: false,
            fetch: false,
            reader: ReaderOptions::default(),
            transform: TransformOptions::default(),
            alert_at_or_above: Severity::Critical,
        }
    }
}

/// Run-level abort flag, cheap to clone and share with a signal handler.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Terminal status of one job.
#[derive(Debug)]
pub enum JobOutcome {
    Succeeded(JobStats),
    /// The input's digest was already committed; nothing was read.
    SkippedCached,
    Failed(TabulateError),
    /// Not started, or abandoned, because the run was interrupted.
    Cancelled,
}

impl JobOutcome {
    /// True for success and skipped-cached.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Succeeded(_) | Self::SkippedCached)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Succeeded(_) => "ok",
            Self::SkippedCached => "skipped (cached)",
            Self::Failed(_) => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// One descriptor with its outcome.
#[derive(Debug)]
pub struct JobReport {
    pub dataset: String,
    pub outcome: JobOutcome,
}

/// Outcomes of a run, in descriptor order.
#[derive(Debug)]
pub struct RunReport {
    pub jobs: Vec<JobReport>,
    pub metrics: ExecutionMetricsSnapshot,
}

impl RunReport {
    /// True iff every job succeeded or was skipped-cached.
    pub fn all_ok(&self) -> bool {
        self.jobs.iter().all(|j| j.outcome.is_ok())
    }

    /// Jobs that did not end ok.
    pub fn failures(&self) -> impl Iterator<Item = &JobReport> {
        self.jobs.iter().filter(|j| !j.outcome.is_ok())
    }

    pub fn count(&self, pred: impl Fn(&JobOutcome) -> bool) -> usize {
        self.jobs.iter().filter(|j| pred(&j.outcome)).count()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for job in &self.jobs {
            match &job.outcome {
                JobOutcome::Succeeded(stats) => writeln!(
                    f,
                    "{}: {} ({} rows -> {})",
                    job.dataset,
                    job.outcome.label(),
                    stats.rows_written,
                    stats.output.display()
                )?,
                JobOutcome::Failed(e) => writeln!(f, "{}: {}: {e}", job.dataset, job.outcome.label())?,
                other => writeln!(f, "{}: {}", job.dataset, other.label())?,
            }
        }
        write!(
            f,
            "{} succeeded, {} skipped, {} failed, {} cancelled",
            self.count(|o| matches!(o, JobOutcome::Succeeded(_))),
            self.count(|o| matches!(o, JobOutcome::SkippedCached)),
            self.count(|o| matches!(o, JobOutcome::Failed(_))),
            self.count(|o| matches!(o, JobOutcome::Cancelled)),
        )
    }
}

/// Schedules dataset jobs across a bounded worker pool.
pub struct Coordinator {
    pool: ThreadPool,
    slots: Semaphore,
    opts: CoordinatorOptions,
    cache: Arc<dyn CacheStore>,
    locks: DigestLocks,
    readers: Arc<dyn ReaderFactory>,
    address_parser: Option<Arc<dyn AddressParser>>,
    fetcher: Option<Arc<dyn Fetcher>>,
    observer: Option<Arc<dyn JobObserver>>,
    metrics: Arc<ExecutionMetrics>,
    cancel: CancelToken,
}

impl Coordinator {
    /// Create a coordinator using `cache` as its redundancy store.
    pub fn new(opts: CoordinatorOptions, cache: Arc<dyn CacheStore>) -> Result<Self, RunError> {
        let workers = opts.workers.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("tabulate-worker-{i}"))
            .build()?;

        Ok(Self {
            pool,
            slots: Semaphore::new(workers),
            opts,
            cache,
            locks: DigestLocks::new(),
            readers: Arc::new(FileReaderFactory),
            address_parser: None,
            fetcher: None,
            observer: None,
            metrics: Arc::new(ExecutionMetrics::new()),
            cancel: CancelToken::new(),
        })
    }

    /// Replace how input files are opened.
    pub fn with_reader_factory(mut self, readers: Arc<dyn ReaderFactory>) -> Self {
        self.readers = readers;
        self
    }

    pub fn with_address_parser(mut self, parser: Arc<dyn AddressParser>) -> Self {
        self.address_parser = Some(parser);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Attach an observer for job events and record errors.
    pub fn with_observer(mut self, observer: Arc<dyn JobObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Share an externally owned cancel token (e.g. with an interrupt handler).
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Get a handle to real-time execution metrics.
    pub fn metrics(&self) -> Arc<ExecutionMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Run every descriptor to an outcome.
    pub fn run(&self, descriptors: &[Descriptor]) -> RunReport {
        let start = Instant::now();
        self.metrics.begin_run();
        tracing::info!(jobs = descriptors.len(), workers = self.opts.workers, "starting run");

        let jobs: Vec<JobReport> = self.pool.install(|| {
            descriptors
                .par_iter()
                .map(|d| JobReport {
                    dataset: d.name.clone(),
                    outcome: self.run_job(d),
                })
                .collect()
        });

        self.finish(jobs, start)
    }

    /// Load descriptor files and run them. A descriptor that fails to load or validate is a
    /// failed job; the others still run.
    pub fn run_paths<P: AsRef<Path>>(&self, paths: &[P], groups: &ColumnGroups) -> RunReport {
        let start = Instant::now();
        self.metrics.begin_run();
        let loaded: Vec<(PathBuf, Result<Descriptor, TabulateError>)> = paths
            .iter()
            .map(|p| {
                let p = p.as_ref();
                (p.to_path_buf(), Descriptor::load(p, groups).map_err(TabulateError::from))
            })
            .collect();

        tracing::info!(jobs = loaded.len(), workers = self.opts.workers, "starting run");

        let jobs: Vec<JobReport> = self.pool.install(|| {
            loaded
                .into_par_iter()
                .map(|(path, loaded)| match loaded {
                    Ok(d) => JobReport {
                        dataset: d.name.clone(),
                        outcome: self.run_job(&d),
                    },
                    Err(e) => {
                        let dataset = path
                            .file_stem()
                            .map(|s| s.to_string_lossy().into_owned())
                            .unwrap_or_else(|| path.display().to_string());
                        let outcome = self.reject(&dataset, path, e);
                        JobReport { dataset, outcome }
                    }
                })
                .collect()
        });

        self.finish(jobs, start)
    }

    /// A descriptor that never became a job; `source` is the descriptor file.
    fn reject(&self, name: &str, source: PathBuf, e: TabulateError) -> JobOutcome {
        let ctx = JobContext {
            dataset: name.to_string(),
            input: source,
            format: "unknown",
        };
        let severity = severity_for_error(&e);
        self.metrics.on_job_failed();
        self.emit(|o| o.on_failure(&ctx, severity, &e));
        if severity >= self.opts.alert_at_or_above {
            self.emit(|o| o.on_alert(&ctx, severity, &e));
        }
        JobOutcome::Failed(e)
    }

    fn finish(&self, jobs: Vec<JobReport>, start: Instant) -> RunReport {
        self.metrics.end_run(start.elapsed());
        let report = RunReport {
            jobs,
            metrics: self.metrics.snapshot(),
        };
        tracing::info!(metrics = %report.metrics, "run finished");
        report
    }

    fn emit(&self, f: impl FnOnce(&dyn JobObserver)) {
        if let Some(obs) = &self.observer {
            f(obs.as_ref());
        }
    }
}
