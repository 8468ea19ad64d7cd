//! Output file writing.
//!
//! Rows are written to a temporary file next to the target and renamed into place by
//! [`OutputWriter::finish`]. A writer dropped before that removes its temporary file, so an
//! abandoned job never leaves a file that looks complete.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempPath;

use crate::error::{TabulateError, TabulateResult};

pub struct OutputWriter {
    writer: csv::Writer<File>,
    temp: TempPath,
    target: PathBuf,
    rows: u64,
}

impl OutputWriter {
    /// Start writing the file that will end up at `target`.
    pub fn create(target: impl Into<PathBuf>) -> TabulateResult<Self> {
        let target = target.into();
        let dir = target
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let (file, temp) = tempfile::Builder::new()
            .prefix(".tabulate-")
            .suffix(".part")
            .tempfile_in(dir)
            .map_err(|source| output_error(&target, source))?
            .into_parts();

        Ok(Self {
            writer: csv::WriterBuilder::new().from_writer(file),
            temp,
            target,
            rows: 0,
        })
    }

    /// Write an already-encoded header or data row.
    pub fn write_fields<I, T>(&mut self, fields: I) -> TabulateResult<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.writer.write_record(fields)?;
        self.rows += 1;
        Ok(())
    }

    /// Records written so far, header included.
    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Flush, sync and move the file into place.
    pub fn finish(self) -> TabulateResult<PathBuf> {
        let Self {
            writer,
            temp,
            target,
            ..
        } = self;
        let file = writer
            .into_inner()
            .map_err(|e| output_error(&target, e.into_error()))?;
        file.sync_all().map_err(|source| output_error(&target, source))?;
        drop(file);
        temp.persist(&target)
            .map_err(|e| output_error(&target, e.error))?;
        Ok(target)
    }
}

fn output_error(path: &Path, source: io::Error) -> TabulateError {
    TabulateError::Output {
        path: path.to_path_buf(),
        source,
    }
}
