//! HTTP version-server remote

use keg_psv::PsvDocument;
use reqwest::Client;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::records::{Bgdl, Blobs, Cdns, Versions};
use crate::{Error, Result};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// A fetched response together with the identity the archive layers need:
/// its MD5 digest and the UTC second it was received.
#[derive(Debug, Clone)]
pub struct StatefulResponse {
    pub path: String,
    pub content: Vec<u8>,
    pub timestamp: i64,
    pub digest: String,
}

impl StatefulResponse {
    pub fn new(path: &str, content: Vec<u8>) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let digest = format!("{:x}", md5::compute(&content));

        Self {
            path: path.to_string(),
            content,
            timestamp,
            digest,
        }
    }

    /// The response body as UTF-8 text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).to_string()
    }
}

/// HTTP remote, e.g. `http://us.patch.battle.net:1119/hsb`.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    remote: String,
    client: Client,
}

impl HttpRemote {
    pub fn new(remote: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            remote: remote.into(),
            client,
        })
    }

    /// Create a remote with a caller-configured HTTP client.
    pub fn with_client(remote: impl Into<String>, client: Client) -> Self {
        Self {
            remote: remote.into(),
            client,
        }
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    /// GET a path relative to the remote and stamp the response.
    pub async fn get_response(&self, path: &str) -> Result<StatefulResponse> {
        let url = format!("{}{}", self.remote, path);
        debug!("HTTP GET {url}");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Network {
                status: status.as_u16(),
                url,
            });
        }

        let content = response.bytes().await?.to_vec();
        Ok(StatefulResponse::new(path, content))
    }

    /// Fetch and parse one PSV document.
    pub async fn get_psv(&self, name: &str) -> Result<(PsvDocument, StatefulResponse)> {
        let response = self.get_response(&format!("/{name}")).await?;
        let doc = PsvDocument::parse(&response.text())?;
        Ok((doc, response))
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

    /// Fetch a named JSON blob (`/blob/<name>`).
    pub async fn get_blob(
        &self,
        name: &str,
    ) -> Result<(serde_json::Value, StatefulResponse)> {
        let response = self.get_response(&format!("/blob/{name}")).await?;
        let value = serde_json::from_slice(&response.content)?;
        Ok((value, response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stateful_response_digest() {
        let response = StatefulResponse::new("/versions", b"some body".to_vec());
        assert_eq!(response.path, "/versions");
        assert_eq!(
            response.digest,
            format!("{:x}", md5::compute(b"some body"))
        );
        assert!(response.timestamp > 0);
    }

    #[test]
    fn test_stateful_response_text() {
        let response = StatefulResponse::new("/cdns", b"Name!STRING:0\nus".to_vec());
        assert_eq!(response.text(), "Name!STRING:0\nus");
    }
}
