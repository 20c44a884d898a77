//! Ribbit TCP client

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::response::RibbitResponse;
use crate::{DEFAULT_PORT, Error, Result};

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// TCP client for one Ribbit host.
///
/// A request is a single line (`path\n`); the server streams the response
/// and closes the connection.
#[derive(Debug, Clone)]
pub struct RibbitClient {
    hostname: String,
    port: u16,
    connect_timeout: Duration,
    verify: bool,
}

impl RibbitClient {
    /// Create a client for `hostname`, defaulting the port to 1119.
    pub fn new(hostname: impl Into<String>, port: Option<u16>) -> Self {
        Self {
            hostname: hostname.into(),
            port: port.unwrap_or(DEFAULT_PORT),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            verify: true,
        }
    }

    /// Override the connect timeout.
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Disable checksum verification of responses.
    pub fn without_verification(mut self) -> Self {
        self.verify = false;
        self
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Request `path` and parse the signed MIME response.
    pub async fn get(&self, path: &str) -> Result<RibbitResponse> {
        let data = self.get_raw(path).await?;
        validate_raw(path, &data)?;
        RibbitResponse::parse(data, self.verify)
    }

    /// Request `path` and return the raw response bytes.
    pub async fn get_raw(&self, path: &str) -> Result<Vec<u8>> {
        let address = format!("{}:{}", self.hostname, self.port);
        debug!("connecting to ribbit service at {address}");

        let mut stream = timeout(self.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| Error::ConnectionTimeout {
                host: self.hostname.clone(),
                port: self.port,
                timeout_secs: self.connect_timeout.as_secs(),
            })??;

        stream.write_all(path.as_bytes()).await?;
        stream.write_all(b"\n").await?;

        let mut data = Vec::new();
        stream.read_to_end(&mut data).await?;
        debug!("received {} bytes for {path:?}", data.len());

        Ok(data)
    }
}

/// Reject empty and cut-short responses before attempting a parse.
fn validate_raw(path: &str, data: &[u8]) -> Result<()> {
    if data.is_empty() {
        return Err(Error::NoData {
            path: path.to_string(),
        });
    }
    // A healthy response always terminates in CRLF.
    if !data.ends_with(b"\r\n") {
        return Err(Error::Unterminated);
    }
    Ok(())
}
