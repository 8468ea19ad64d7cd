//! One dataset job: cache check, read, transform, write, commit.

use std::borrow::Cow;
use std::path::Path;
use std::time::Instant;

use crate::cache::digest_file;
use crate::descriptor::Descriptor;
use crate::error::{ReadError, RecordError, TabulateError, TabulateResult};
use crate::fetch;
use crate::observability::{JobContext, JobStats, severity_for_error};
use crate::transform::encode::{self, EncodingErrorPolicy};
use crate::transform::{Disposition, OutputWriter, Pipeline};

use super::{Coordinator, JobOutcome};

impl Coordinator {
    /// Run one descriptor to a terminal outcome. Never panics on job errors and never lets an
    /// error escape to sibling jobs.
    pub(super) fn run_job(&self, descriptor: &Descriptor) -> JobOutcome {
        let span = tracing::info_span!("job", dataset = %descriptor.name);
        let _enter = span.enter();

        let ctx = JobContext {
            dataset: descriptor.name.clone(),
            input: descriptor.input_path(&self.opts.input_dir),
            format: descriptor.format.tag(),
        };

        if self.cancel.is_cancelled() {
            tracing::debug!("run interrupted, not starting");
            self.metrics.on_job_cancelled();
            return JobOutcome::Cancelled;
        }

        let (_permit, waited) = self.slots.acquire();
        if !waited.is_zero() {
            self.metrics.on_slot_wait(waited);
        }
        self.metrics.on_job_start();
        self.emit(|o| o.on_started(&ctx));
        let start = Instant::now();

        let outcome = match self.execute(descriptor, &ctx) {
            Ok(Some(stats)) => {
                self.metrics.on_job_succeeded();
                self.emit(|o| o.on_success(&ctx, &stats));
                JobOutcome::Succeeded(stats)
            }
            Ok(None) => {
                self.metrics.on_job_skipped();
                self.emit(|o| o.on_skipped(&ctx));
                JobOutcome::SkippedCached
            }
            Err(e @ TabulateError::Cancelled) => {
                self.metrics.on_job_cancelled();
                self.emit(|o| o.on_failure(&ctx, severity_for_error(&e), &e));
                JobOutcome::Cancelled
            }
            Err(e) => {
                self.metrics.on_job_failed();
                let severity = severity_for_error(&e);
                self.emit(|o| o.on_failure(&ctx, severity, &e));
                if severity >= self.opts.alert_at_or_above {
                    self.emit(|o| o.on_alert(&ctx, severity, &e));
                }
                JobOutcome::Failed(e)
            }
        };

        self.metrics.on_job_end();
        tracing::debug!(elapsed = ?start.elapsed(), "job finished");
        outcome
    }

    /// `Ok(None)` means the input was already processed by an earlier run.
    fn execute(&self, descriptor: &Descriptor, ctx: &JobContext) -> TabulateResult<Option<JobStats>> {
        let input = &ctx.input;

        if self.opts.fetch {
            if let (Some(url), Some(fetcher)) = (&descriptor.url, &self.fetcher) {
                fetch::retrieve(fetcher.as_ref(), url, input)?;
            }
        }
        if !input.is_file() {
            return Err(TabulateError::MissingInput {
                path: input.clone(),
            });
        }

        let digest = digest_file(input).map_err(|source| ReadError::Io {
            path: input.clone(),
            source,
        })?;
        let _guard = self.locks.acquire(&digest);

        if !self.opts.ignore_cache && self.cache.lookup(&digest)? {
            return Ok(None);
        }

        let stats = self.tabulate(descriptor, ctx, input)?;

        // Only reached with the output renamed into place.
        self.cache.commit(&digest)?;
        tracing::debug!(digest = %digest, "committed to cache");
        Ok(Some(stats))
    }

    /// Stream input records through the pipeline into the output file.
    fn tabulate(&self, descriptor: &Descriptor, ctx: &JobContext, input: &Path) -> TabulateResult<JobStats> {
        let mut reader = self.readers.open(descriptor, input, &self.opts.reader)?;
        let mut pipeline = Pipeline::new(
            descriptor,
            self.opts.transform,
            self.address_parser.as_deref(),
        )?;

        let target = self.opts.output_dir.join(descriptor.output_file_name());
        let mut writer = OutputWriter::create(&target)?;
        let header_encoding = self.opts.transform.output_encoding;
        writer.write_fields(pipeline.schema().column_names().map(|c| {
            match encode::encode_value(c, header_encoding, EncodingErrorPolicy::Replace) {
                Ok(e) => e.bytes,
                Err(_) => Cow::Borrowed(c.as_bytes()),
            }
        }))?;

        let mut stats = JobStats::default();
        let mut record_errors: Vec<RecordError> = Vec::new();

        while let Some(raw) = reader.next_record()? {
            if self.cancel.is_cancelled() {
                return Err(TabulateError::Cancelled);
            }
            stats.rows_read += 1;
            self.metrics.on_row_read();

            match pipeline.apply(&raw, &mut |e| record_errors.push(e)) {
                Disposition::Emit(record) => {
                    let fields = pipeline.encode(&record, &mut |e| record_errors.push(e))?;
                    writer.write_fields(&fields)?;
                    stats.rows_written += 1;
                    self.metrics.on_row_written();
                }
                Disposition::Filtered => {
                    stats.rows_filtered += 1;
                    self.metrics.on_row_filtered();
                }
                Disposition::Empty => stats.rows_empty += 1,
            }

            for e in record_errors.drain(..) {
                stats.record_errors += 1;
                self.metrics.on_record_error();
                self.emit(|o| o.on_record_error(ctx, &e));
            }
        }

        stats.malformed_rows = reader.stats().malformed_rows;
        self.metrics.on_malformed_rows(stats.malformed_rows);
        if stats.malformed_rows > 0 {
            tracing::info!(malformed_rows = stats.malformed_rows, "dropped malformed rows");
        }

        stats.output = writer.finish()?;
        Ok(stats)
    }
}
