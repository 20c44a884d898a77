//! # keg-crypto
//!
//! Armadillo object encryption: Salsa20 layered over specific config blobs,
//! with the nonce derived from the object's own key.
//!
//! A key blob on disk is 20 bytes: the 16-byte Salsa20 key followed by the
//! first 4 bytes of its MD5, which lets a key file be verified standalone.
//! The 16-byte key selects the 128-bit Salsa20 variant.

pub mod armadillo;
pub mod error;
mod salsa;

pub use armadillo::{ARMADILLO_DIGEST_SIZE, ARMADILLO_KEY_SIZE, ArmadilloKey};
pub use error::{Error, Result};
