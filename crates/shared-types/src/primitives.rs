//! # Consensus Primitives
//!
//! Scalar aliases and fixed-size byte newtypes used throughout the beacon
//! node. BLS and KZG values are opaque byte strings at this layer; nothing
//! here verifies a signature or a commitment.

use primitive_types::{H160, H256, U256};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use sha2::{Digest, Sha256};

/// Slot number (12 seconds on mainnet).
pub type Slot = u64;

/// Epoch number (group of `SLOTS_PER_EPOCH` slots).
pub type Epoch = u64;

/// Index into the validator registry.
pub type ValidatorIndex = u64;

/// Committee index within a slot.
pub type CommitteeIndex = u64;

/// Amount in gwei.
pub type Gwei = u64;

/// Amount in wei (execution-layer denomination).
pub type Wei = U256;

/// 32-byte hash tree root.
pub type Root = H256;

/// 32-byte execution-layer hash.
pub type Hash32 = H256;

/// 20-byte execution-layer address.
pub type ExecutionAddress = H160;

/// Opaque blob payload (4096 field elements on mainnet).
pub type Blob = Vec<u8>;

/// Wei per gwei.
pub const WEI_PER_GWEI: u64 = 1_000_000_000;

/// Length of a compressed BLS public key.
pub const BLS_PUBLIC_KEY_LEN: usize = 48;

/// Length of a compressed BLS signature.
pub const BLS_SIGNATURE_LEN: usize = 96;

/// Length of a KZG commitment or proof.
pub const KZG_LEN: usize = 48;

/// Compressed BLS12-381 G1 public key.
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlsPublicKey(#[serde_as(as = "Bytes")] pub [u8; BLS_PUBLIC_KEY_LEN]);

impl Default for BlsPublicKey {
    fn default() -> Self {
        Self([0u8; BLS_PUBLIC_KEY_LEN])
    }
}

impl BlsPublicKey {
    /// Short hex prefix for log fields.
    pub fn short_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.0[..8]))
    }
}

/// Compressed BLS12-381 G2 signature.
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlsSignature(#[serde_as(as = "Bytes")] pub [u8; BLS_SIGNATURE_LEN]);

impl Default for BlsSignature {
    fn default() -> Self {
        Self([0u8; BLS_SIGNATURE_LEN])
    }
}

impl BlsSignature {
    /// The compressed point at infinity (`0xc0` followed by zeros).
    ///
    /// Used as the signature of an empty sync aggregate.
    pub fn infinity() -> Self {
        let mut bytes = [0u8; BLS_SIGNATURE_LEN];
        bytes[0] = 0xc0;
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for BlsSignature {
    type Error = InvalidLength;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; BLS_SIGNATURE_LEN] = value.try_into().map_err(|_| InvalidLength {
            expected: BLS_SIGNATURE_LEN,
            actual: value.len(),
        })?;
        Ok(Self(bytes))
    }
}

/// KZG commitment to a blob.
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KzgCommitment(#[serde_as(as = "Bytes")] pub [u8; KZG_LEN]);

impl Default for KzgCommitment {
    fn default() -> Self {
        Self([0u8; KZG_LEN])
    }
}

/// KZG opening proof for a blob.
#[serde_as]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KzgProof(#[serde_as(as = "Bytes")] pub [u8; KZG_LEN]);

impl Default for KzgProof {
    fn default() -> Self {
        Self([0u8; KZG_LEN])
    }
}

/// A byte string had the wrong length for its fixed-size type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid length: expected {expected} bytes, got {actual}")]
pub struct InvalidLength {
    /// Required length
    pub expected: usize,
    /// Supplied length
    pub actual: usize,
}

/// SHA-256 of `data`.
pub fn hash(data: &[u8]) -> H256 {
    H256::from_slice(&Sha256::digest(data))
}

/// SHA-256 over the concatenation of `left` and `right`.
pub fn hash_concat(left: &[u8], right: &[u8]) -> H256 {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    H256::from_slice(&hasher.finalize())
}

/// Root of any serializable container: SHA-256 of its bincode encoding.
pub fn object_root<T: Serialize>(value: &T) -> Result<Root, bincode::Error> {
    let encoded = bincode::serialize(value)?;
    Ok(hash(&encoded))
}

/// Wei to gwei, saturating at `u64::MAX`.
pub fn wei_to_gwei(value: Wei) -> Gwei {
    let gwei = value / U256::from(WEI_PER_GWEI);
    if gwei > U256::from(u64::MAX) {
        u64::MAX
    } else {
        gwei.low_u64()
    }
}

/// Gwei to wei.
pub fn gwei_to_wei(value: Gwei) -> Wei {
    U256::from(value) * U256::from(WEI_PER_GWEI)
}
