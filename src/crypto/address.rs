//! Base58Check address codec
//!
//! An address commits to the RIPEMD-160(SHA-256(pubkey)) hash of its
//! owning key: version byte, pubkey hash, then a 4-byte double-SHA-256
//! checksum, all Base58-encoded. Outputs lock to the hash, never to the
//! encoded string.

use ripemd::Ripemd160;
use sha2::Digest;
use thiserror::Error;

use super::hash::double_sha256;
use super::hash::sha256;

/// Version byte prepended to every address payload (0x00 for mainnet)
pub const ADDRESS_VERSION: u8 = 0x00;

/// Length of the truncated double-SHA-256 checksum
pub const CHECKSUM_LEN: usize = 4;

/// Errors that can occur while decoding an address
#[derive(Error, Debug)]
pub enum AddressError {
    #[error("Invalid base58 encoding")]
    InvalidEncoding,
    #[error("Address payload too short")]
    TooShort,
    #[error("Checksum mismatch")]
    ChecksumMismatch,
}

/// Hash a public key the way outputs are locked: SHA-256, then RIPEMD-160
pub fn hash_pub_key(pub_key: &[u8]) -> Vec<u8> {
    let sha = sha256(pub_key);
    let mut ripemd = Ripemd160::new();
    ripemd.update(&sha);
    ripemd.finalize().to_vec()
}

/// Derive the Base58Check address for a raw public key
pub fn pub_key_to_address(pub_key: &[u8]) -> String {
    let mut payload = vec![ADDRESS_VERSION];
    payload.extend_from_slice(&hash_pub_key(pub_key));
    let checksum = checksum(&payload);
    payload.extend_from_slice(&checksum);
    bs58::encode(payload).into_string()
}

/// Checks encoding and checksum; false on any malformation
pub fn validate_address(address: &str) -> bool {
    decode_address(address).is_ok()
}

/// Decode an address back to the pubkey hash it commits to
pub fn address_to_pub_key_hash(address: &str) -> Result<Vec<u8>, AddressError> {
    decode_address(address)
}

fn decode_address(address: &str) -> Result<Vec<u8>, AddressError> {
    let payload = bs58::decode(address)
        .into_vec()
        .map_err(|_| AddressError::InvalidEncoding)?;
    if payload.len() <= 1 + CHECKSUM_LEN {
        return Err(AddressError::TooShort);
    }

    let (body, stored_checksum) = payload.split_at(payload.len() - CHECKSUM_LEN);
    if checksum(body).as_slice() != stored_checksum {
        return Err(AddressError::ChecksumMismatch);
    }

    // Strip the version byte, keep the pubkey hash
    Ok(body[1..].to_vec())
}

/// First 4 bytes of double SHA-256 over the versioned payload
fn checksum(payload: &[u8]) -> Vec<u8> {
    double_sha256(payload)[..CHECKSUM_LEN].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_and_validate() {
        let pub_key = [7u8; 64];
        let address = pub_key_to_address(&pub_key);
        assert!(validate_address(&address));
        // Version byte 0x00 encodes as a leading '1'
        assert!(address.starts_with('1'));
    }

    #[test]
    fn test_decode_recovers_pubkey_hash() {
        let pub_key = [42u8; 64];
        let address = pub_key_to_address(&pub_key);
        let decoded = address_to_pub_key_hash(&address).unwrap();
        assert_eq!(decoded, hash_pub_key(&pub_key));
        assert_eq!(decoded.len(), 20);
    }

    #[test]
    fn test_corrupted_checksum_rejected() {
        let address = pub_key_to_address(&[1u8; 64]);
        let mut corrupted: Vec<char> = address.chars().collect();
        let last = corrupted.len() - 1;
        corrupted[last] = if corrupted[last] == '2' { '3' } else { '2' };
        let corrupted: String = corrupted.into_iter().collect();

        assert!(!validate_address(&corrupted));
        assert!(address_to_pub_key_hash(&corrupted).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        // '0', 'O', 'I', and 'l' are not in the base58 alphabet
        assert!(!validate_address("0OIl"));
        assert!(!validate_address(""));
        assert!(!validate_address("abc"));
    }
}
