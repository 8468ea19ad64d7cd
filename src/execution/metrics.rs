use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Real-time counters for a run.
///
/// The coordinator updates these while jobs execute; callers can snapshot them at any time,
/// including from another thread while the run is in progress.
#[derive(Debug, Default)]
pub struct ExecutionMetrics {
    elapsed_ns: AtomicU64,

    jobs_started: AtomicU64,
    jobs_succeeded: AtomicU64,
    jobs_skipped: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_cancelled: AtomicU64,

    rows_read: AtomicU64,
    rows_written: AtomicU64,
    rows_filtered: AtomicU64,
    malformed_rows: AtomicU64,
    record_errors: AtomicU64,

    slot_wait_ns: AtomicU64,
    active_jobs: AtomicUsize,
    max_active_jobs: AtomicUsize,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero every counter; each run reports only its own activity.
    pub fn begin_run(&self) {
        for counter in [
            &self.elapsed_ns,
            &self.jobs_started,
            &self.jobs_succeeded,
            &self.jobs_skipped,
            &self.jobs_failed,
            &self.jobs_cancelled,
            &self.rows_read,
            &self.rows_written,
            &self.rows_filtered,
            &self.malformed_rows,
            &self.record_errors,
            &self.slot_wait_ns,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
        self.active_jobs.store(0, Ordering::SeqCst);
        self.max_active_jobs.store(0, Ordering::SeqCst);
    }

    pub fn end_run(&self, elapsed: Duration) {
        self.elapsed_ns.store(saturating_nanos(elapsed), Ordering::SeqCst);
    }

    pub fn on_job_start(&self) {
        let _ = self.jobs_started.fetch_add(1, Ordering::SeqCst);
        let now = self.active_jobs.fetch_add(1, Ordering::SeqCst) + 1;
        update_max_usize(&self.max_active_jobs, now);
    }

    /// A started job ended; exactly one of the outcome counters is bumped by the caller.
    pub fn on_job_end(&self) {
        let _ = self.active_jobs.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn on_job_succeeded(&self) {
        let _ = self.jobs_succeeded.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_job_skipped(&self) {
        let _ = self.jobs_skipped.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_job_failed(&self) {
        let _ = self.jobs_failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_job_cancelled(&self) {
        let _ = self.jobs_cancelled.fetch_add(1, Ordering::SeqCst);
    }

    pub fn on_row_read(&self) {
        let _ = self.rows_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_row_written(&self) {
        let _ = self.rows_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_row_filtered(&self) {
        let _ = self.rows_filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_malformed_rows(&self, n: u64) {
        let _ = self.malformed_rows.fetch_add(n, Ordering::Relaxed);
    }

    pub fn on_record_error(&self) {
        let _ = self.record_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_slot_wait(&self, d: Duration) {
        let _ = self.slot_wait_ns.fetch_add(saturating_nanos(d), Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ExecutionMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        let elapsed = if elapsed_ns > 0 {
            Some(Duration::from_nanos(elapsed_ns))
        } else {
            None
        };

        ExecutionMetricsSnapshot {
            elapsed,
            jobs_started: self.jobs_started.load(Ordering::SeqCst),
            jobs_succeeded: self.jobs_succeeded.load(Ordering::SeqCst),
            jobs_skipped: self.jobs_skipped.load(Ordering::SeqCst),
            jobs_failed: self.jobs_failed.load(Ordering::SeqCst),
            jobs_cancelled: self.jobs_cancelled.load(Ordering::SeqCst),
            rows_read: self.rows_read.load(Ordering::Relaxed),
            rows_written: self.rows_written.load(Ordering::Relaxed),
            rows_filtered: self.rows_filtered.load(Ordering::Relaxed),
            malformed_rows: self.malformed_rows.load(Ordering::Relaxed),
            record_errors: self.record_errors.load(Ordering::Relaxed),
            slot_wait: Duration::from_nanos(self.slot_wait_ns.load(Ordering::SeqCst)),
            max_active_jobs: self.max_active_jobs.load(Ordering::SeqCst),
        }
    }
}

fn saturating_nanos(d: Duration) -> u64 {
    d.as_nanos().min(u64::MAX as u128) as u64
}

fn update_max_usize(dst: &AtomicUsize, now: usize) {
    loop {
        let cur = dst.load(Ordering::SeqCst);
        if now <= cur {
            break;
        }
        if dst
            .compare_exchange(cur, now, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            break;
        }
    }
}

/// Immutable snapshot of [`ExecutionMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionMetricsSnapshot {
    pub elapsed: Option<Duration>,
    pub jobs_started: u64,
    pub jobs_succeeded: u64,
    pub jobs_skipped: u64,
    pub jobs_failed: u64,
    pub jobs_cancelled: u64,
    pub rows_read: u64,
    pub rows_written: u64,
    pub rows_filtered: u64,
    pub malformed_rows: u64,
    pub record_errors: u64,
    /// Total time jobs spent waiting for a worker slot.
    pub slot_wait: Duration,
    pub max_active_jobs: usize,
}

impl fmt::Display for ExecutionMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "jobs={}/{} (skipped={}, failed={}, cancelled={}), rows read={} written={} filtered={} malformed={}, record_errors={}, max_active_jobs={}, slot_wait={:?}, elapsed={:?}",
            self.jobs_succeeded,
            self.jobs_started,
            self.jobs_skipped,
            self.jobs_failed,
            self.jobs_cancelled,
            self.rows_read,
            self.rows_written,
            self.rows_filtered,
            self.malformed_rows,
            self.record_errors,
            self.max_active_jobs,
            self.slot_wait,
            self.elapsed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_peak_concurrency() {
        let m = ExecutionMetrics::new();
        m.on_job_start();
        m.on_job_start();
        m.on_job_end();
        m.on_job_start();
        m.on_job_end();
        m.on_job_end();

        let snap = m.snapshot();
        assert_eq!(snap.jobs_started, 3);
        assert_eq!(snap.max_active_jobs, 2);
        assert_eq!(snap.elapsed, None);
    }

    #[test]
    fn begin_run_zeroes_counters() {
        let m = ExecutionMetrics::new();
        m.on_job_start();
        m.on_job_succeeded();
        m.on_row_read();
        m.on_malformed_rows(3);
        m.on_slot_wait(Duration::from_millis(2));
        m.end_run(Duration::from_millis(5));

        m.begin_run();
        assert_eq!(m.snapshot(), ExecutionMetricsSnapshot::default());
    }

    #[test]
    fn display_is_one_line() {
        let m = ExecutionMetrics::new();
        m.on_row_read();
        m.on_row_written();
        m.end_run(Duration::from_millis(5));
        let s = m.snapshot().to_string();
        assert!(s.contains("rows read=1 written=1"));
        assert!(!s.contains('\n'));
    }
}
