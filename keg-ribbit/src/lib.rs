//! # keg-ribbit
//!
//! Client for the Ribbit protocol: a line-oriented request over TCP
//! answered with a signed MIME multipart document whose epilogue carries a
//! SHA-256 checksum of everything before it.
//!
//! ```no_run
//! use keg_ribbit::RibbitClient;
//!
//! # async fn example() -> keg_ribbit::Result<()> {
//! let client = RibbitClient::new("us.version.battle.net", None);
//! let response = client.get("v1/products/wow/versions").await?;
//! println!("{}", response.content());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod response;

pub use client::RibbitClient;
pub use error::{Error, Result};
pub use response::RibbitResponse;

/// Default Ribbit TCP port
pub const DEFAULT_PORT: u16 = 1119;
