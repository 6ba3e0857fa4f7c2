//! Cryptographic utilities
//!
//! This module provides:
//! - SHA-256 hashing
//! - Base58Check address encoding and validation
//! - ECDSA key management (P-256)

pub mod address;
pub mod hash;
pub mod keys;

pub use address::{
    address_to_pub_key_hash, hash_pub_key, pub_key_to_address, validate_address, AddressError,
    ADDRESS_VERSION, CHECKSUM_LEN,
};
pub use hash::{double_sha256, meets_difficulty, sha256};
pub use keys::{verify_signature, KeyError, KeyPair, PUBLIC_KEY_LEN, SIGNATURE_LEN};
