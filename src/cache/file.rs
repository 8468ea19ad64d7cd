use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::error::CacheError;

use super::{CacheEntry, CacheStore};

/// Durable cache store backed by a text file of `digest timestamp` lines.
///
/// Every commit takes an exclusive advisory lock on the `<path>.lock` sibling, re-reads the
/// file, merges the new entry and atomically replaces the file (temporary sibling, fsync,
/// rename). Entries committed by another store or process since this one was opened are kept,
/// and a crash never leaves a truncated store. The OS drops the lock with the process.
#[derive(Debug)]
pub struct FileCacheStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, DateTime<Utc>>>,
}

impl FileCacheStore {
    /// Open (or create on first commit) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| io_error(&path, source))?;
        }
        let entries = read_entries(&path)?;
        tracing::debug!(path = %path.display(), entries = entries.len(), "opened cache store");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        Ok(entries
            .iter()
            .map(|(d, t)| CacheEntry {
                digest: d.clone(),
                committed_at: *t,
            })
            .collect())
    }

    /// Block until this process holds the cross-process lock; released when the file drops.
    fn lock_exclusive(&self) -> Result<File, CacheError> {
        let mut lock_path = self.path.clone().into_os_string();
        lock_path.push(".lock");
        let lock_path = PathBuf::from(lock_path);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| io_error(&lock_path, e))?;
        file.lock().map_err(|e| io_error(&lock_path, e))?;
        Ok(file)
    }

    fn write_entries(&self, entries: &BTreeMap<String, DateTime<Utc>>) -> Result<(), CacheError> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| io_error(&self.path, e))?;
        {
            let mut w = io::BufWriter::new(tmp.as_file_mut());
            for (digest, at) in entries {
                writeln!(w, "{digest} {}", at.to_rfc3339()).map_err(|e| io_error(&self.path, e))?;
            }
            w.flush().map_err(|e| io_error(&self.path, e))?;
        }
        tmp.as_file().sync_all().map_err(|e| io_error(&self.path, e))?;
        tmp.persist(&self.path)
            .map_err(|e| io_error(&self.path, e.error))?;
        Ok(())
    }
}

impl CacheStore for FileCacheStore {
    fn lookup(&self, digest: &str) -> Result<bool, CacheError> {
        Ok(self
            .entries
            .lock()
            .map_err(|_| CacheError::Poisoned)?
            .contains_key(digest))
    }

    fn commit(&self, digest: &str) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        let _lock = self.lock_exclusive()?;
        let mut merged = read_entries(&self.path)?;
        merged.extend(entries.iter().map(|(d, t)| (d.clone(), *t)));
        merged.insert(digest.to_string(), Utc::now());
        self.write_entries(&merged)?;
        *entries = merged;
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        let _lock = self.lock_exclusive()?;
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_error(&self.path, e)),
        }
        entries.clear();
        Ok(())
    }
}

fn read_entries(path: &Path) -> Result<BTreeMap<String, DateTime<Utc>>, CacheError> {
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(io_error(path, e)),
    };

    let mut out = BTreeMap::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let corrupt = || CacheError::Corrupt {
            path: path.to_path_buf(),
            line: i + 1,
        };
        let (digest, at) = line.split_once(' ').ok_or_else(corrupt)?;
        if digest.len() != 64 || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(corrupt());
        }
        let at = DateTime::parse_from_rfc3339(at.trim())
            .map_err(|_| corrupt())?
            .with_timezone(&Utc);
        out.insert(digest.to_string(), at);
    }
    Ok(out)
}

fn io_error(path: &Path, source: io::Error) -> CacheError {
    CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}
