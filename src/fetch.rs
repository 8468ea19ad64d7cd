//! Retrieval of remote datasets.
//!
//! A [`Fetcher`] copies a descriptor's `url` to its local input path before the reader opens
//! it. Retrieval failure is fatal to that dataset only, unless a copy from an earlier
//! retrieval is already on disk, in which case that copy is used.

use std::path::Path;
#[cfg(feature = "remote")]
use std::time::Duration;

use crate::error::FetchError;

/// Fetches bytes from a URL to a local path.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError>;
}

/// How the local input came to be available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retrieval {
    Downloaded,
    /// Retrieval failed; an existing local copy is used.
    LocalFallback,
}

/// Fetch `url` to `dest`, falling back to an existing `dest` on failure.
pub fn retrieve(fetcher: &dyn Fetcher, url: &str, dest: &Path) -> Result<Retrieval, FetchError> {
    match fetcher.fetch(url, dest) {
        Ok(()) => {
            tracing::info!(url, path = %dest.display(), "retrieved dataset");
            Ok(Retrieval::Downloaded)
        }
        Err(e) if dest.is_file() => {
            tracing::warn!(url, path = %dest.display(), error = %e, "retrieval failed, using existing local copy");
            Ok(Retrieval::LocalFallback)
        }
        Err(e) => Err(e),
    }
}

/// Fetches over HTTP(S) with a blocking client.
///
/// The body is streamed to a temporary sibling of `dest` and renamed into place, so a failed
/// download never replaces an earlier good copy.
#[cfg(feature = "remote")]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "remote")]
impl HttpFetcher {
    const TIMEOUT: Duration = Duration::from_secs(300);

    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Self::TIMEOUT)
            .user_agent(concat!("tabulate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Request {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[cfg(feature = "remote")]
impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(FetchError::Unsupported { url: url.to_string() });
        }

        let request_error = |message: String| FetchError::Request {
            url: url.to_string(),
            message,
        };
        let io_error = |source: std::io::Error| FetchError::Io {
            url: url.to_string(),
            path: dest.to_path_buf(),
            source,
        };

        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| request_error(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(request_error(format!("server returned {status}")));
        }

        let dir = dest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir).map_err(io_error)?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_error)?;
        response
            .copy_to(tmp.as_file_mut())
            .map_err(|e| request_error(e.to_string()))?;
        tmp.as_file().sync_all().map_err(io_error)?;
        tmp.persist(dest).map_err(|e| io_error(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl Fetcher for Failing {
        fn fetch(&self, url: &str, _dest: &Path) -> Result<(), FetchError> {
            Err(FetchError::Request {
                url: url.to_string(),
                message: "connection refused".to_string(),
            })
        }
    }

    struct Writing(&'static str);

    impl Fetcher for Writing {
        fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
            std::fs::write(dest, self.0).map_err(|source| FetchError::Io {
                url: url.to_string(),
                path: dest.to_path_buf(),
                source,
            })
        }
    }

    #[test]
    fn successful_fetch_writes_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.csv");
        assert_eq!(
            retrieve(&Writing("NAME\n"), "https://example.org/a.csv", &dest).unwrap(),
            Retrieval::Downloaded
        );
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "NAME\n");
    }

    #[test]
    fn failure_falls_back_to_existing_copy() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("a.csv");

        assert!(retrieve(&Failing, "https://example.org/a.csv", &dest).is_err());

        std::fs::write(&dest, "NAME\n").unwrap();
        assert_eq!(
            retrieve(&Failing, "https://example.org/a.csv", &dest).unwrap(),
            Retrieval::LocalFallback
        );
    }
}
