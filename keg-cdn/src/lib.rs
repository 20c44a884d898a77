//! # keg-cdn
//!
//! The two ends of content distribution:
//!
//! - [`LocalCdn`]: the content-addressed object store on disk, with its
//!   partitioned layout (`config/`, `data/`, `patch/`, `configs/data/`),
//!   the encrypted quarantine, temp staging, and crash-safe writes;
//! - [`RemoteCdn`]: a streaming HTTP client over one CDN origin with the
//!   path-composition rules origins expect.
//!
//! Once written, objects never mutate; the temp → rename step is the only
//! moment a reader can first observe a file.

pub mod error;
pub mod local;
pub mod paths;
pub mod remote;
pub mod util;

pub use error::{Error, Result};
pub use local::LocalCdn;
pub use remote::RemoteCdn;
pub use util::{atomic_write, partition_hash, verify_data};
