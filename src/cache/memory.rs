use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::error::CacheError;

use super::{CacheEntry, CacheStore};

/// Cache store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `digests`.
    pub fn with_entries<I, S>(digests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let now = Utc::now();
        Self {
            entries: Mutex::new(digests.into_iter().map(|d| (d.into(), now)).collect()),
        }
    }

    pub fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        let mut out: Vec<CacheEntry> = entries
            .iter()
            .map(|(d, t)| CacheEntry {
                digest: d.clone(),
                committed_at: *t,
            })
            .collect();
        out.sort_by(|a, b| a.digest.cmp(&b.digest));
        Ok(out)
    }
}

impl CacheStore for MemoryCacheStore {
    fn lookup(&self, digest: &str) -> Result<bool, CacheError> {
        Ok(self
            .entries
            .lock()
            .map_err(|_| CacheError::Poisoned)?
            .contains_key(digest))
    }

    fn commit(&self, digest: &str) -> Result<(), CacheError> {
        self.entries
            .lock()
            .map_err(|_| CacheError::Poisoned)?
            .insert(digest.to_string(), Utc::now());
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        self.entries.lock().map_err(|_| CacheError::Poisoned)?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_then_lookup() {
        let store = MemoryCacheStore::new();
        assert!(!store.lookup("d1").unwrap());
        store.commit("d1").unwrap();
        assert!(store.lookup("d1").unwrap());
        store.clear().unwrap();
        assert!(store.entries().unwrap().is_empty());
    }

    #[test]
    fn prepopulated_entries_are_found() {
        let store = MemoryCacheStore::with_entries(["b", "a"]);
        assert!(store.lookup("a").unwrap());
        let digests: Vec<_> = store.entries().unwrap().into_iter().map(|e| e.digest).collect();
        assert_eq!(digests, vec!["a", "b"]);
    }
}
