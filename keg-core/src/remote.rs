//! Cacheable remote wrappers
//!
//! Every live PSV fetch leaves three traces: the raw body in the state
//! cache, typed rows in the per-schema table, and a journal row in
//! `responses`. Cached reads replay the newest archived body instead of
//! touching the network.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use keg_psv::PsvDocument;
use keg_remote::{Bgdl, Blobs, Cdns, HttpRemote, RibbitRemote, StatefulResponse, Versions};

use crate::db::{KegDb, ResponseSource};
use crate::statecache::StateCache;
use crate::{Error, Result};

fn now_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// HTTP remote with write-through caching.
pub struct CacheableHttpRemote {
    http: HttpRemote,
    db: Arc<KegDb>,
    state_cache: StateCache,
}

impl CacheableHttpRemote {
    pub fn new(http: HttpRemote, db: Arc<KegDb>, state_cache: StateCache) -> Self {
        Self {
            http,
            db,
            state_cache,
        }
    }

    pub fn remote(&self) -> &str {
        self.http.remote()
    }

    /// Live fetch; archives the body and indexes the rows.
    pub async fn get_psv(&self, name: &str) -> Result<(PsvDocument, StatefulResponse)> {
        let (doc, response) = self.http.get_psv(name).await?;

        self.state_cache.write_http_response(&response)?;
        self.db
            .write_psv(&doc, &response.digest, self.remote(), name)?;
        self.db.write_response(
            self.remote(),
            name,
            response.timestamp,
            &response.digest,
            ResponseSource::Http,
        )?;

        Ok((doc, response))
    }

    /// Replay the newest archived response, falling back to a live fetch.
    pub async fn get_cached_psv(&self, name: &str) -> Result<PsvDocument> {
        if let Some(digest) = self.db.get_response_key(self.remote(), name)? {
            if self.state_cache.exists(name, &digest)? {
                debug!("replaying cached {name} ({digest})");
                return self.state_cache.read_psv(name, &digest);
            }
        }
        Ok(self.get_psv(name).await?.0)
    }

    pub async fn get_versions(&self) -> Result<Vec<Versions>> {
        let (doc, _) = self.get_psv("versions").await?;
        Ok(Versions::from_document(&doc))
    }

    pub async fn get_cdns(&self) -> Result<Vec<Cdns>> {
        let (doc, _) = self.get_psv("cdns").await?;
        Ok(Cdns::from_document(&doc))
    }

    pub async fn get_bgdl(&self) -> Result<Vec<Bgdl>> {
        let (doc, _) = self.get_psv("bgdl").await?;
        Ok(Bgdl::from_document(&doc))
    }

    pub async fn get_blobs(&self) -> Result<Vec<Blobs>> {
        let (doc, _) = self.get_psv("blobs").await?;
        Ok(Blobs::from_document(&doc))
    }

    pub async fn get_cached_versions(&self) -> Result<Vec<Versions>> {
        Ok(Versions::from_document(&self.get_cached_psv("versions").await?))
    }

    pub async fn get_cached_cdns(&self) -> Result<Vec<Cdns>> {
        Ok(Cdns::from_document(&self.get_cached_psv("cdns").await?))
    }

    /// Named JSON blob; the body is archived but has no schema table.
    pub async fn get_blob(&self, name: &str) -> Result<serde_json::Value> {
        let (value, response) = self.http.get_blob(name).await?;
        self.state_cache.write_http_response(&response)?;
        Ok(value)
    }
}

/// Ribbit remote with write-through caching. Raw MIME payloads are kept
/// alongside the indexed rows; the checksum doubles as the response digest.
pub struct CacheableRibbitRemote {
    ribbit: RibbitRemote,
    db: Arc<KegDb>,
    ribbit_cache: StateCache,
}

impl CacheableRibbitRemote {
    pub fn new(ribbit: RibbitRemote, db: Arc<KegDb>, ribbit_cache: StateCache) -> Self {
        Self {
            ribbit,
            db,
            ribbit_cache,
        }
    }

    pub fn remote(&self) -> &str {
        self.ribbit.remote()
    }

    pub async fn get_psv(&self, name: &str) -> Result<PsvDocument> {
        let (doc, response) = self.ribbit.get_psv(name).await?;

        self.ribbit_cache.write_ribbit_response(
            self.ribbit.hostname(),
            &self.ribbit.path_for(name),
            &response,
        )?;
        self.db
            .write_psv(&doc, response.checksum(), self.remote(), name)?;
        self.db.write_response(
            self.remote(),
            name,
            now_timestamp(),
            response.checksum(),
            ResponseSource::Ribbit,
        )?;

        Ok(doc)
    }

    pub async fn get_versions(&self) -> Result<Vec<Versions>> {
        Ok(Versions::from_document(&self.get_psv("versions").await?))
    }

    pub async fn get_cdns(&self) -> Result<Vec<Cdns>> {
        Ok(Cdns::from_document(&self.get_psv("cdns").await?))
    }

    pub async fn get_bgdl(&self) -> Result<Vec<Bgdl>> {
        Ok(Bgdl::from_document(&self.get_psv("bgdl").await?))
    }
}

/// Either flavor of cacheable remote, selected by URL scheme.
pub enum AnyRemote {
    Http(CacheableHttpRemote),
    Ribbit(CacheableRibbitRemote),
}

impl AnyRemote {
    pub fn remote(&self) -> &str {
        match self {
            Self::Http(r) => r.remote(),
            Self::Ribbit(r) => r.remote(),
        }
    }

    pub async fn get_versions(&self) -> Result<Vec<Versions>> {
        match self {
            Self::Http(r) => r.get_versions().await,
            Self::Ribbit(r) => r.get_versions().await,
        }
    }

    pub async fn get_cdns(&self) -> Result<Vec<Cdns>> {
        match self {
            Self::Http(r) => r.get_cdns().await,
            Self::Ribbit(r) => r.get_cdns().await,
        }
    }

    pub async fn get_bgdl(&self) -> Result<Vec<Bgdl>> {
        match self {
            Self::Http(r) => r.get_bgdl().await,
            Self::Ribbit(r) => r.get_bgdl().await,
        }
    }

    /// Blobs only exist on the HTTP protocol.
    pub async fn get_blobs(&self) -> Result<Vec<Blobs>> {
        match self {
            Self::Http(r) => r.get_blobs().await,
            Self::Ribbit(_) => Err(Error::Remote(keg_remote::Error::BlobsUnsupported)),
        }
    }

    /// Cached reads replay archived bodies where the protocol supports it.
    pub async fn get_cached_versions(&self) -> Result<Vec<Versions>> {
        match self {
            Self::Http(r) => r.get_cached_versions().await,
            Self::Ribbit(r) => r.get_versions().await,
        }
    }

    pub async fn get_cached_cdns(&self) -> Result<Vec<Cdns>> {
        match self {
            Self::Http(r) => r.get_cached_cdns().await,
            Self::Ribbit(r) => r.get_cdns().await,
        }
    }
}
