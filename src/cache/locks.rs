use std::collections::HashSet;
use std::sync::{Condvar, Mutex, PoisonError};

/// Per-digest mutual exclusion.
///
/// A worker holds the guard for a digest from its cache lookup until after its commit, so two
/// workers given the same input never both process it: the second one waits, then finds the
/// entry the first one committed.
#[derive(Debug, Default)]
pub struct DigestLocks {
    held: Mutex<HashSet<String>>,
    cv: Condvar,
}

impl DigestLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until no other guard holds `digest`, then take it.
    pub fn acquire(&self, digest: &str) -> DigestGuard<'_> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while held.contains(digest) {
            held = self.cv.wait(held).unwrap_or_else(PoisonError::into_inner);
        }
        held.insert(digest.to_string());
        DigestGuard {
            locks: self,
            digest: digest.to_string(),
        }
    }

    /// Number of digests currently held.
    pub fn held(&self) -> usize {
        self.held.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Releases its digest on drop.
#[derive(Debug)]
pub struct DigestGuard<'a> {
    locks: &'a DigestLocks,
    digest: String,
}

impl DigestGuard<'_> {
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl Drop for DigestGuard<'_> {
    fn drop(&mut self) {
        let mut held = self.locks.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.remove(&self.digest);
        self.locks.cv.notify_all();
    }
}
