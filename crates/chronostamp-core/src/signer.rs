//! Mint-authorization signing for ChronoStamp claims.
//!
//! The signer holds the service's secp256k1 private key and produces the
//! `(nonce, signature)` pair the on-chain contract verifies before minting.
//! The message layout must match the contract byte-for-byte:
//!
//! ```text
//! message_hash = keccak256(address_bytes ‖ nonce_bytes)   // abi.encodePacked
//! signed_hash  = keccak256("\x19Ethereum Signed Message:\n32" ‖ message_hash)
//! signature    = ECDSA(signed_hash)                        // 65 bytes, r‖s‖v
//! ```
//!
//! The contract recovers the signer address from the signature and compares
//! it against its configured authority, so [`SignerService::validate_config`]
//! exists to catch a key/address mismatch before any authorization is issued
//! with a key the contract will reject.
//!
//! Addresses are normalized to their EIP-55 checksum form before hashing, so
//! differently-cased spellings of the same account always produce the same
//! signature.

use k256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use sha3::{Digest, Keccak256};
use thiserror::Error;

/// Length of the nonce bound into every signed message, in bytes.
pub const NONCE_LEN: usize = 32;

/// The fixed EIP-191 prefix for a 32-byte message hash.
const PERSONAL_SIGN_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// Errors from signing and signer configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SignerError {
    /// The user address is not a syntactically valid EVM account address.
    #[error("invalid address: {address}")]
    InvalidAddress {
        /// The rejected input, as received.
        address: String,
    },

    /// The nonce is not a 32-byte hex string.
    #[error("invalid nonce")]
    InvalidNonce,

    /// The configured private key could not be parsed.
    #[error("invalid signing key")]
    InvalidKey,

    /// The loaded key does not derive the expected signer address.
    ///
    /// This is a deployment safety check: the on-chain contract only
    /// accepts signatures from one authority address, and a mismatched
    /// key would issue authorizations the contract rejects.
    #[error("signer key does not match expected address {expected}")]
    Misconfigured {
        /// The address the deployment expects the key to derive.
        expected: String,
    },

    /// The ECDSA operation itself failed.
    #[error("signing failed")]
    SigningFailed,
}

/// Configuration for constructing a [`SignerService`].
pub struct SignerConfig {
    /// Hex-encoded secp256k1 private key, with or without a `0x` prefix.
    pub private_key_hex: SecretString,

    /// Expected checksummed signer address for this deployment, if known.
    ///
    /// When set, [`SignerService::validate_config`] fails unless the key
    /// derives exactly this address.
    pub expected_address: Option<String>,
}

/// A 65-byte recoverable ECDSA signature in `r ‖ s ‖ v` layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature65(pub [u8; 65]);

impl Signature65 {
    /// Returns the signature as a `0x`-prefixed hex string.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

/// The claim-authorization signer.
///
/// Constructed once from configuration and injected into the claim
/// orchestrator; holds the private key for the lifetime of the process and
/// never exposes it. There is deliberately no global instance.
pub struct SignerService {
    key: SigningKey,
    expected_address: Option<String>,
}

impl std::fmt::Debug for SignerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material must never appear in debug output.
        f.debug_struct("SignerService")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

impl SignerService {
    /// Constructs a signer from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::InvalidKey`] if the key hex does not decode
    /// to a valid secp256k1 scalar.
    pub fn new(config: SignerConfig) -> Result<Self, SignerError> {
        let raw = config.private_key_hex.expose_secret();
        let stripped = raw.strip_prefix("0x").unwrap_or(raw);
        let bytes = hex::decode(stripped).map_err(|_| SignerError::InvalidKey)?;
        let key = SigningKey::from_slice(&bytes).map_err(|_| SignerError::InvalidKey)?;

        Ok(Self {
            key,
            expected_address: config.expected_address,
        })
    }

    /// Returns the EIP-55 checksummed address derived from the loaded key.
    #[must_use]
    pub fn address(&self) -> String {
        let verifying = self.key.verifying_key();
        derive_address(verifying)
    }

    /// Checks that the loaded key derives the expected signer address.
    ///
    /// Run at startup and again at the authorize flow's signer-health gate.
    /// A signer with no expected address configured always passes.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::Misconfigured`] on a mismatch.
    pub fn validate_config(&self) -> Result<(), SignerError> {
        let Some(expected) = &self.expected_address else {
            return Ok(());
        };

        if self.address().eq_ignore_ascii_case(expected) {
            Ok(())
        } else {
            Err(SignerError::Misconfigured {
                expected: expected.clone(),
            })
        }
    }

    /// Generates a fresh 32-byte nonce, `0x`-prefixed hex encoded.
    ///
    /// Uniqueness is a birthday bound over 256 bits of OS randomness; the
    /// nonce is not tracked here. Replay defense lives in the on-chain
    /// contract's consumed-nonce set and the claim ledger's uniqueness key.
    #[must_use]
    pub fn generate_nonce(&self) -> String {
        let mut bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut bytes);
        format!("0x{}", hex::encode(bytes))
    }

    /// Signs a claim authorization for `user_address` bound to `nonce`.
    ///
    /// The address is checksum-normalized first, so any casing of the same
    /// account yields an identical signature. Signing is deterministic
    /// (RFC 6979): the same `(address, nonce)` pair always produces the
    /// same bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::InvalidAddress`] or [`SignerError::InvalidNonce`]
    /// on malformed inputs, and [`SignerError::SigningFailed`] if the ECDSA
    /// operation fails.
    pub fn sign_claim(&self, user_address: &str, nonce: &str) -> Result<Signature65, SignerError> {
        let address_bytes = parse_address(user_address)?;
        let nonce_bytes = parse_nonce(nonce)?;

        // abi.encodePacked(address, bytes32): 20 raw address bytes followed
        // by the 32 nonce bytes. The contract rebuilds exactly this.
        let mut packed = [0u8; 20 + NONCE_LEN];
        packed[..20].copy_from_slice(&address_bytes);
        packed[20..].copy_from_slice(&nonce_bytes);
        let message_hash = keccak256(&packed);

        // EIP-191 personal-sign envelope over the 32-byte hash.
        let mut prefixed = Vec::with_capacity(PERSONAL_SIGN_PREFIX.len() + 32);
        prefixed.extend_from_slice(PERSONAL_SIGN_PREFIX);
        prefixed.extend_from_slice(&message_hash);
        let signed_hash = keccak256(&prefixed);

        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(&signed_hash)
            .map_err(|_| SignerError::SigningFailed)?;

        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&signature.to_bytes());
        // Ethereum convention: v = 27 + recovery id.
        out[64] = 27 + recovery_id.to_byte();

        Ok(Signature65(out))
    }
}

/// Computes Keccak-256 over `input`.
#[must_use]
pub fn keccak256(input: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(input);
    hasher.finalize().into()
}

/// Parses a `0x`-prefixed 20-byte hex address, accepting any casing.
fn parse_address(address: &str) -> Result<[u8; 20], SignerError> {
    let invalid = || SignerError::InvalidAddress {
        address: address.to_string(),
    };

    let stripped = address.strip_prefix("0x").ok_or_else(invalid)?;
    if stripped.len() != 40 {
        return Err(invalid());
    }

    let bytes = hex::decode(stripped).map_err(|_| invalid())?;
    let mut out = [0u8; 20];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Parses a `0x`-prefixed 32-byte hex nonce.
fn parse_nonce(nonce: &str) -> Result<[u8; NONCE_LEN], SignerError> {
    let stripped = nonce.strip_prefix("0x").unwrap_or(nonce);
    let bytes = hex::decode(stripped).map_err(|_| SignerError::InvalidNonce)?;
    if bytes.len() != NONCE_LEN {
        return Err(SignerError::InvalidNonce);
    }

    let mut out = [0u8; NONCE_LEN];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Returns true if `address` parses as a valid EVM account address.
#[must_use]
pub fn is_valid_address(address: &str) -> bool {
    parse_address(address).is_ok()
}

/// Renders a 20-byte address in EIP-55 mixed-case checksum form.
#[must_use]
pub fn to_checksum_address(bytes: &[u8; 20]) -> String {
    let lower = hex::encode(bytes);
    let hash = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = if i % 2 == 0 {
            hash[i / 2] >> 4
        } else {
            hash[i / 2] & 0x0f
        };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Normalizes any casing of a valid address to its EIP-55 checksum form.
///
/// # Errors
///
/// Returns [`SignerError::InvalidAddress`] if the input does not parse.
pub fn normalize_address(address: &str) -> Result<String, SignerError> {
    let bytes = parse_address(address)?;
    Ok(to_checksum_address(&bytes))
}

/// Derives the EIP-55 address for a public key.
fn derive_address(verifying: &k256::ecdsa::VerifyingKey) -> String {
    use k256::elliptic_curve::sec1::ToEncodedPoint;

    let point = verifying.to_encoded_point(false);
    // Skip the 0x04 uncompressed-point tag; the address is the last 20
    // bytes of keccak256 over the 64-byte public key.
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&hash[12..]);
    to_checksum_address(&addr)
}
