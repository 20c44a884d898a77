//! # keg-remote
//!
//! Clients for NGDP version servers ("remotes"). Two wire protocols serve
//! the same PSV documents:
//!
//! - plain HTTP: `GET <remote>/versions`, `/cdns`, `/bgdl`, `/blobs`,
//!   `/blob/<name>`
//! - Ribbit: `ribbit://host[:port]/product`, mapping each document to
//!   `v1/products/<product>/<name>` over TCP
//!
//! Every response is stamped with its MD5 digest and a UTC timestamp so
//! callers can archive it.

pub mod error;
pub mod http;
pub mod records;
pub mod ribbit;

pub use error::{Error, Result};
pub use http::{HttpRemote, StatefulResponse};
pub use records::{Bgdl, Blobs, Cdns, Versions};
pub use ribbit::RibbitRemote;
