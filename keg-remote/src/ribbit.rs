//! Ribbit version-server remote

use keg_psv::PsvDocument;
use keg_ribbit::{RibbitClient, RibbitResponse};
use url::Url;

use crate::records::{Bgdl, Cdns, Versions};
use crate::{Error, Result};

/// Remote speaking the Ribbit protocol.
///
/// The URL shape is `ribbit://host[:port]/product`; the product determines
/// the real request path, `v1/products/<product>/<name>`.
#[derive(Debug, Clone)]
pub struct RibbitRemote {
    remote: String,
    hostname: String,
    product: String,
    client: RibbitClient,
}

impl RibbitRemote {
    pub fn new(remote: impl Into<String>) -> Result<Self> {
        let remote = remote.into();
        let url = Url::parse(&remote).map_err(|_| Error::InvalidRemote(remote.clone()))?;

        if url.scheme() != "ribbit" {
            return Err(Error::InvalidRemote(remote));
        }
        let hostname = url
            .host_str()
            .ok_or_else(|| Error::InvalidRemote(remote.clone()))?
            .to_string();
        let product = url.path().trim_start_matches('/').to_string();
        if product.is_empty() {
            return Err(Error::InvalidRemote(remote));
        }

        let client = RibbitClient::new(hostname.clone(), url.port());

        Ok(Self {
            remote,
            hostname,
            product,
            client,
        })
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    /// The request path for a document name.
    pub fn path_for(&self, name: &str) -> String {
        format!("v1/products/{}/{name}", self.product)
    }

    /// Fetch and parse one PSV document.
    pub async fn get_psv(&self, name: &str) -> Result<(PsvDocument, RibbitResponse)> {
        let response = self.client.get(&self.path_for(name)).await?;
        let doc = PsvDocument::parse(response.content())?;
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
}
