//! ECDSA key management
//!
//! Provides key pair generation, prehash signing, and verification over
//! the NIST P-256 curve. Public keys travel as the raw 64-byte X||Y
//! concatenation, signatures as the raw 64-byte R||S concatenation.

use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::generic_array::GenericArray;
use p256::EncodedPoint;
use rand::rngs::OsRng;
use thiserror::Error;

use super::address::pub_key_to_address;

/// Raw public key length (X and Y coordinates, 32 bytes each)
pub const PUBLIC_KEY_LEN: usize = 64;

/// Raw signature length (R and S scalars, 32 bytes each)
pub const SIGNATURE_LEN: usize = 64;

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Signing failed: {0}")]
    SigningFailed(#[from] p256::ecdsa::Error),
}

/// A key pair consisting of a private signing key and its public key
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    public_key: Vec<u8>,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        let public_key = encode_public_key(signing_key.verifying_key());
        Self {
            signing_key,
            public_key,
        }
    }

    /// Rebuild a key pair from the raw 32-byte private scalar
    pub fn from_private_key_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let signing_key =
            SigningKey::from_slice(bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        let public_key = encode_public_key(signing_key.verifying_key());
        Ok(Self {
            signing_key,
            public_key,
        })
    }

    /// Raw private scalar, for persistence
    pub fn private_key_bytes(&self) -> Vec<u8> {
        self.signing_key.to_bytes().to_vec()
    }

    /// Raw X||Y public key
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Base58Check address derived from the public key
    pub fn address(&self) -> String {
        pub_key_to_address(&self.public_key)
    }

    /// Sign a 32-byte digest, returning the raw R||S signature
    pub fn sign_digest(&self, digest: &[u8]) -> Result<Vec<u8>, KeyError> {
        let signature: Signature = self.signing_key.sign_prehash(digest)?;
        Ok(signature.to_bytes().to_vec())
    }
}

/// Serialize a verifying key as its uncompressed X||Y coordinates
fn encode_public_key(key: &VerifyingKey) -> Vec<u8> {
    // Skip the SEC1 uncompressed-point tag byte
    key.to_encoded_point(false).as_bytes()[1..].to_vec()
}

/// Verify a raw R||S signature over a digest against a raw X||Y public
/// key. Malformed keys or signatures count as verification failure.
pub fn verify_signature(public_key: &[u8], digest: &[u8], signature: &[u8]) -> bool {
    if public_key.len() != PUBLIC_KEY_LEN || signature.len() != SIGNATURE_LEN {
        return false;
    }

    let point = EncodedPoint::from_untagged_bytes(GenericArray::from_slice(public_key));
    let verifying_key = match VerifyingKey::from_encoded_point(&point) {
        Ok(key) => key,
        Err(_) => return false,
    };
    let signature = match Signature::from_slice(signature) {
        Ok(sig) => sig,
        Err(_) => return false,
    };

    verifying_key.verify_prehash(digest, &signature).is_ok()
}
