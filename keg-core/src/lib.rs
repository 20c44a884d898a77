//! # keg-core
//!
//! The repository root of a Keg mirror. Wires together the object store,
//! the metadata database, the response caches and the remotes, and hosts
//! the two orchestrators:
//!
//! - the [`Fetcher`]: walks the reference graph of a version (build config
//!   → CDN config → patch config → encoding → archives → loose files →
//!   patches) and emits drains of fetch directives;
//! - the [`BuildManager`]: convenience reads over a mirrored build
//!   (encoding table, install manifest, archive group, root file).

pub mod build;
pub mod config;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod keg;
pub mod remote;
pub mod statecache;

pub use build::BuildManager;
pub use config::KegConfig;
pub use db::{KegDb, ResponseSource};
pub use error::{Error, Result};
pub use fetcher::{Directive, DirectiveKind, Drain, Fetcher, Phase};
pub use keg::Keg;
pub use remote::{AnyRemote, CacheableHttpRemote, CacheableRibbitRemote};
pub use statecache::StateCache;
