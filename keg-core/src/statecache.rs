//! State cache: raw version-server response bodies on disk
//!
//! Bodies are stored content-addressed under the document name, e.g.
//! `responses/versions/<ab>/<cd>/<digest>` for HTTP and
//! `ribbit/<host>/<path>/<checksum>.bmime` for raw Ribbit payloads, so every
//! historical response stays replayable.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;

use keg_cdn::{atomic_write, partition_hash};
use keg_psv::PsvDocument;
use keg_remote::StatefulResponse;
use keg_ribbit::RibbitResponse;

use crate::Result;

#[derive(Debug, Clone)]
pub struct StateCache {
    cache_dir: PathBuf,
}

impl StateCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    fn full_path(&self, name: &str, digest: &str) -> Result<PathBuf> {
        Ok(self
            .cache_dir
            .join(name.trim_matches('/'))
            .join(partition_hash(digest)?))
    }

    pub fn exists(&self, name: &str, digest: &str) -> Result<bool> {
        Ok(self.full_path(name, digest)?.exists())
    }

    pub fn read(&self, name: &str, digest: &str) -> Result<String> {
        Ok(fs::read_to_string(self.full_path(name, digest)?)?)
    }

    pub fn read_psv(&self, name: &str, digest: &str) -> Result<PsvDocument> {
        Ok(PsvDocument::parse(&self.read(name, digest)?)?)
    }

    pub fn write(&self, name: &str, digest: &str, content: &[u8]) -> Result<()> {
        let path = self.full_path(name, digest)?;
        trace!("caching {} bytes at {}", content.len(), path.display());
        atomic_write(&path, content)?;
        Ok(())
    }

    /// Cache an HTTP response body under its digest. Returns false when the
    /// body was already cached.
    pub fn write_http_response(&self, response: &StatefulResponse) -> Result<bool> {
        let name = response.path.trim_matches('/');
        if self.exists(name, &response.digest)? {
            return Ok(false);
        }
        self.write(name, &response.digest, &response.content)?;
        Ok(true)
    }

    /// Cache a raw Ribbit payload as `<host>/<path>/<checksum>.bmime`.
    pub fn write_ribbit_response(
        &self,
        hostname: &str,
        path: &str,
        response: &RibbitResponse,
    ) -> Result<bool> {
        let target = self
            .cache_dir
            .join(hostname)
            .join(path.trim_matches('/'))
            .join(format!("{}.bmime", response.checksum()));

        if target.exists() {
            return Ok(false);
        }
        atomic_write(&target, response.data())?;
        Ok(true)
    }
}
