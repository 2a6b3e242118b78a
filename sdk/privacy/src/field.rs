//! Field Encoding
//!
//! Maps arbitrary byte strings into the BN254 scalar field used by the
//! commitment hash and the withdrawal circuit.
//!
//! ```text
//! bytes (any length, big-endian) ──► integer ──► integer mod P ──► Fr
//! ```
//!
//! The whole input is reduced. Reducing a prefix instead would yield a
//! different element than the circuit computes for the same bytes.

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};

use crate::error::NoteError;

/// Scalar field element of the proving system
pub type FieldElement = Fr;

/// Width of a serialized field element
pub const FIELD_BYTES: usize = 32;

/// Interpret `bytes` as a big-endian unsigned integer and reduce it modulo P
pub fn to_field_element(bytes: &[u8]) -> FieldElement {
    Fr::from_be_bytes_mod_order(bytes)
}

/// Serialize a field element as 32 big-endian bytes
pub fn field_to_bytes(f: &FieldElement) -> [u8; FIELD_BYTES] {
    let bytes = f.into_bigint().to_bytes_be();
    let mut arr = [0u8; FIELD_BYTES];
    // left-pad in case the limb encoding is ever shorter than 32 bytes
    arr[FIELD_BYTES - bytes.len()..].copy_from_slice(&bytes);
    arr
}

/// Whether `bytes` is the canonical encoding of some element (value < P)
pub fn is_canonical(bytes: &[u8; FIELD_BYTES]) -> bool {
    field_to_bytes(&to_field_element(bytes)) == *bytes
}

/// The field modulus P as 32 big-endian bytes
pub fn modulus_bytes() -> [u8; FIELD_BYTES] {
    let bytes = Fr::MODULUS.to_bytes_be();
    let mut arr = [0u8; FIELD_BYTES];
    arr[FIELD_BYTES - bytes.len()..].copy_from_slice(&bytes);
    arr
}

/// Parse a 32-byte value from hex (optional `0x` prefix)
pub fn bytes32_from_hex(s: &str) -> Result<[u8; FIELD_BYTES], NoteError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).map_err(|e| NoteError::InvalidHex(e.to_string()))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| NoteError::InvalidHex(format!("expected 32 bytes, got {}", bytes.len())))
}
