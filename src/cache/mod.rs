//! Redundancy cache.
//!
//! Records the content digest of every input file that was processed to completion without a
//! fatal error, so later runs can skip it. The store is passed to the coordinator explicitly;
//! there is no process-wide cache.
//!
//! Stores:
//! - [`FileCacheStore`]: durable, one `digest timestamp` line per entry
//! - [`MemoryCacheStore`]: in-process only

mod file;
mod locks;
mod memory;

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::error::CacheError;

pub use file::FileCacheStore;
pub use locks::{DigestGuard, DigestLocks};
pub use memory::MemoryCacheStore;

/// Hex-encoded SHA-256 of an input file's full content.
pub type ContentDigest = String;

/// One committed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub digest: ContentDigest,
    pub committed_at: DateTime<Utc>,
}

/// Durable memo of successfully processed inputs.
///
/// Implementations must tolerate concurrent callers; the coordinator additionally serialises
/// the lookup-then-commit sequence per digest with [`DigestLocks`].
pub trait CacheStore: Send + Sync {
    /// True if `digest` was committed by an earlier successful job.
    fn lookup(&self, digest: &str) -> Result<bool, CacheError>;

    /// Record `digest` as processed. Durable once this returns.
    fn commit(&self, digest: &str) -> Result<(), CacheError>;

    /// Forget every entry.
    fn clear(&self) -> Result<(), CacheError>;
}

/// Digest of everything `reader` yields.
pub fn digest_reader<R: Read>(reader: &mut R) -> io::Result<ContentDigest> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Digest of a file's full content.
pub fn digest_file(path: impl AsRef<Path>) -> io::Result<ContentDigest> {
    let mut file = File::open(path)?;
    digest_reader(&mut file)
}
