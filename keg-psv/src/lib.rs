//! # keg-psv
//!
//! Parser for the PSV (pipe-separated values) format served by NGDP version
//! servers (`/versions`, `/cdns`, `/bgdl`, `/blobs`).
//!
//! PSV is a tabular format with typed column annotations and an optional
//! sequence number:
//!
//! ```text
//! Region!STRING:0|BuildConfig!HEX:16|BuildId!DEC:4
//! ## seqn = 12345
//! us|4eb3986466ec004ffa1755642b375a87|27291
//! ```
//!
//! ## Quick start
//!
//! ```rust
//! use keg_psv::PsvDocument;
//!
//! let data = "Region!STRING:0|BuildId!DEC:4\n## seqn = 12345\nus|1234\neu|5678";
//!
//! let doc = PsvDocument::parse(data)?;
//! assert_eq!(doc.sequence_number(), Some(12345));
//! assert_eq!(doc.rows().len(), 2);
//! assert_eq!(doc.rows()[0].get_by_name("Region", doc.schema()), Some("us"));
//! # Ok::<(), keg_psv::Error>(())
//! ```

pub mod document;
pub mod error;
pub mod field_type;
pub mod parser;
pub mod schema;

pub use document::{PsvDocument, PsvRow};
pub use error::{Error, Result};
pub use field_type::FieldType;
pub use schema::{PsvField, PsvSchema};
