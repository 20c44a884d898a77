//! Streaming HTTP client for one CDN origin

use futures_util::StreamExt;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::paths;
use crate::{Error, Result};

const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// HTTP client for a single CDN origin.
///
/// `path` is the tenant prefix (e.g. `tpr/hsb`) under which the object
/// spaces live; `config_path` addresses the product-config space.
#[derive(Debug, Clone)]
pub struct RemoteCdn {
    server: String,
    path: String,
    config_path: String,
    client: Client,
}

impl RemoteCdn {
    pub fn new(
        server: impl Into<String>,
        path: impl Into<String>,
        config_path: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            server: server.into(),
            path: path.into(),
            config_path: config_path.into(),
            client,
        })
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Join two path segments: single slash between them, base's lead and
    /// rel's tail preserved, runs of slashes collapsed.
    pub fn join_path(base: &str, rel: &str) -> String {
        let mut joined = String::with_capacity(base.len() + rel.len() + 1);
        joined.push_str(base.trim_end_matches('/'));
        joined.push('/');
        joined.push_str(rel.trim_start_matches('/'));

        let mut out = String::with_capacity(joined.len());
        let mut prev_slash = false;
        for c in joined.chars() {
            if c == '/' {
                if !prev_slash {
                    out.push(c);
                }
                prev_slash = true;
            } else {
                prev_slash = false;
                out.push(c);
            }
        }
        out
    }

    fn url_for(&self, base_path: &str, item_path: &str) -> String {
        let path = Self::join_path(base_path, item_path);
        format!(
            "{}/{}",
            self.server.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Begin a streaming GET of an object-relative path (e.g.
    /// `/config/ab/cd/abcd…`).
    pub async fn get_item(&self, item_path: &str) -> Result<reqwest::Response> {
        let url = self.url_for(&self.path, item_path);
        debug!("HTTP GET {url}");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Network {
                status: status.as_u16(),
                url,
            });
        }
        Ok(response)
    }

    /// Fetch an object fully into memory.
    pub async fn get_item_bytes(&self, item_path: &str) -> Result<Vec<u8>> {
        Ok(self.get_item(item_path).await?.bytes().await?.to_vec())
    }

    /// Stream an object into a file, returning the byte count.
    pub async fn download_to(&self, item_path: &str, target: &Path) -> Result<u64> {
        let response = self.get_item(item_path).await?;
        let mut file = tokio::fs::File::create(target).await?;

        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        Ok(written)
    }

    /// Fetch a config object.
    pub async fn fetch_config(&self, key: &str) -> Result<Vec<u8>> {
        self.get_item_bytes(&format!("/{}", paths::config_path(key)?))
            .await
    }

    /// Fetch a product-config item from the config-path space.
    pub async fn get_config_item(&self, key: &str) -> Result<Vec<u8>> {
        let item_path = format!("/{}", crate::util::partition_hash(key)?);
        let url = self.url_for(&self.config_path, &item_path);
        debug!("HTTP GET {url}");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Network {
                status: status.as_u16(),
                url,
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(RemoteCdn::join_path("/path", "foo/"), "/path/foo/");
        assert_eq!(RemoteCdn::join_path("/path/", "foo/"), "/path/foo/");
        assert_eq!(RemoteCdn::join_path("/path/", "/foo/"), "/path/foo/");
        assert_eq!(RemoteCdn::join_path("path/", "/foo/"), "path/foo/");
        assert_eq!(RemoteCdn::join_path("path", "/foo/"), "path/foo/");
    }

    #[test]
    fn test_join_path_collapses_runs() {
        assert_eq!(RemoteCdn::join_path("/a//b/", "//c"), "/a/b/c");
        assert_eq!(RemoteCdn::join_path("tpr/hsb", "config//ab"), "tpr/hsb/config/ab");
    }

    #[test]
    fn test_url_composition() {
        let cdn = RemoteCdn::new("http://cdn.example.com", "tpr/hsb", "tpr/configs/data")
            .unwrap();
        assert_eq!(
            cdn.url_for(&cdn.path, "/config/aa/bb/aabbcc"),
            "http://cdn.example.com/tpr/hsb/config/aa/bb/aabbcc"
        );
        assert_eq!(
            cdn.url_for(&cdn.config_path, "/aa/bb/aabbcc"),
            "http://cdn.example.com/tpr/configs/data/aa/bb/aabbcc"
        );
    }

    #[test]
    fn test_url_composition_trailing_slash_server() {
        let cdn = RemoteCdn::new("http://cdn.example.com/", "/tpr/hsb/", "").unwrap();
        assert_eq!(
            cdn.url_for(&cdn.path, "/data/aa/bb/aabbcc.index"),
            "http://cdn.example.com/tpr/hsb/data/aa/bb/aabbcc.index"
        );
    }
}
