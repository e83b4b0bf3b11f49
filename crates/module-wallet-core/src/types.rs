//! Core types for the module wallet
//!
//! Selectors, recoverable signatures, hashing helpers and the event log
//! entries emitted by every contract in the system.

use crate::{Error, Result};
use alloy_primitives::{Address, B256, Bytes, U256};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use tiny_keccak::{Hasher, Keccak};

/// Length of one `r || s || v` signature record
pub const SIGNATURE_LENGTH: usize = 65;

/// Prefix of a personal-message hash over a 32-byte digest
const PERSONAL_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// Four-byte operation selector
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Selector(pub [u8; 4]);

impl Selector {
    /// Create a selector from raw bytes
    pub const fn new(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Derive a selector from a canonical signature such as `owner()`
    pub fn from_signature(signature: &str) -> Self {
        let hash = keccak256(signature.as_bytes());
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&hash[..4]);
        Self(bytes)
    }

    /// Read the selector at the start of call data
    pub fn of(data: &[u8]) -> Option<Self> {
        let bytes: [u8; 4] = data.get(..4)?.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Selector bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Selector({self})")
    }
}

impl Serialize for Selector {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Selector {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let raw = hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)?;
        let bytes: [u8; 4] = raw
            .try_into()
            .map_err(|_| serde::de::Error::custom("selector must be 4 bytes"))?;
        Ok(Selector(bytes))
    }
}

/// Keccak-256 digest
pub fn keccak256(data: impl AsRef<[u8]>) -> B256 {
    let mut hasher = Keccak::v256();
    hasher.update(data.as_ref());
    let mut hash = [0u8; 32];
    hasher.finalize(&mut hash);
    B256::from(hash)
}

/// Personal-message hash over a 32-byte digest
pub fn eth_signed_message_hash(digest: &B256) -> B256 {
    let mut hasher = Keccak::v256();
    hasher.update(PERSONAL_MESSAGE_PREFIX);
    hasher.update(digest.as_slice());
    let mut hash = [0u8; 32];
    hasher.finalize(&mut hash);
    B256::from(hash)
}

/// Address controlled by a secp256k1 public key
pub fn address_of(key: &VerifyingKey) -> Address {
    // Uncompressed SEC1 encoding, skipping the 0x04 tag
    let encoded = key.to_encoded_point(false);
    let hash = keccak256(&encoded.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

/// Address controlled by a signing key
pub fn signer_address(key: &SigningKey) -> Address {
    address_of(key.verifying_key())
}

/// Recoverable ECDSA signature record (r, s, v)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    /// R component
    pub r: [u8; 32],
    /// S component
    pub s: [u8; 32],
    /// Recovery byte, 27 or 28 when well formed
    pub v: u8,
}

impl RecoverableSignature {
    /// Create a new signature record
    pub fn new(r: [u8; 32], s: [u8; 32], v: u8) -> Self {
        Self { r, s, v }
    }

    /// Parse a single 65-byte record
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != SIGNATURE_LENGTH {
            return Err(Error::InvalidSignatureLength {
                expected: SIGNATURE_LENGTH,
                actual: bytes.len(),
            });
        }
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        Ok(Self::new(r, s, bytes[64]))
    }

    /// Split a concatenated blob into records
    pub fn split(blob: &[u8]) -> Result<Vec<Self>> {
        if blob.len() % SIGNATURE_LENGTH != 0 {
            return Err(Error::InvalidSignatureLength {
                expected: blob.len() - blob.len() % SIGNATURE_LENGTH,
                actual: blob.len(),
            });
        }
        blob.chunks_exact(SIGNATURE_LENGTH)
            .map(Self::from_slice)
            .collect()
    }

    /// Encode as `r || s || v`
    pub fn to_bytes(&self) -> [u8; SIGNATURE_LENGTH] {
        let mut bytes = [0u8; SIGNATURE_LENGTH];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.v;
        bytes
    }

    /// Sign a 32-byte digest
    pub fn sign(key: &SigningKey, digest: &B256) -> Result<Self> {
        let (signature, recovery_id) = key
            .sign_prehash_recoverable(digest.as_slice())
            .map_err(|e| Error::InvalidSignature(e.to_string()))?;
        let bytes = signature.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Ok(Self::new(r, s, recovery_id.to_byte() + 27))
    }

    /// Recover the signer of a 32-byte digest.
    ///
    /// A `v` outside {27, 28} is rejected before any curve arithmetic.
    pub fn recover(&self, digest: &B256) -> Result<Address> {
        if self.v != 27 && self.v != 28 {
            return Err(Error::InvalidSignatureV(self.v));
        }
        let recovery_id = RecoveryId::from_byte(self.v - 27).ok_or(Error::InvalidSignatureV(self.v))?;
        let bytes = self.to_bytes();
        let signature = EcdsaSignature::from_slice(&bytes[..64])
            .map_err(|e| Error::InvalidSignature(e.to_string()))?;
        let key = VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recovery_id)
            .map_err(|e| Error::InvalidSignature(e.to_string()))?;
        Ok(address_of(&key))
    }
}

/// Event emitted by a contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    // ============ Account ============
    AuthorisedModule {
        module: Address,
        value: bool,
    },
    EnabledStaticCall {
        module: Address,
        method: Selector,
    },
    Invoked {
        module: Address,
        target: Address,
        value: U256,
        data: Bytes,
    },
    Received {
        value: U256,
        sender: Address,
        data: Bytes,
    },
    OwnerChanged {
        owner: Address,
    },

    // ============ Registry ============
    ModuleRegistered {
        module: Address,
        name: B256,
    },
    ModuleDeregistered {
        module: Address,
    },
    UpgraderRegistered {
        upgrader: Address,
        name: B256,
    },
    UpgraderDeregistered {
        upgrader: Address,
    },
    RegistryOwnerChanged {
        owner: Address,
    },

    // ============ Modules ============
    ModuleCreated {
        name: String,
    },
    ModuleInitialised {
        account: Address,
    },
    TransactionExecuted {
        account: Address,
        success: bool,
        sign_hash: B256,
    },
    Transfer {
        account: Address,
        token: Address,
        to: Address,
        amount: U256,
        data: Bytes,
    },
    GuardianAdded {
        account: Address,
        guardian: Address,
    },
    GuardianRevoked {
        account: Address,
        guardian: Address,
    },
    Locked {
        account: Address,
        release_after: u64,
    },
    Unlocked {
        account: Address,
    },
    RecoveryExecuted {
        account: Address,
        recovery: Address,
        execute_after: u64,
    },
    RecoveryFinalized {
        account: Address,
        recovery: Address,
    },
    RecoveryCanceled {
        account: Address,
        recovery: Address,
    },

    // ============ Token ============
    TokenTransfer {
        from: Address,
        to: Address,
        amount: U256,
    },
}

/// Event together with the contract that emitted it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Emitting contract
    pub emitter: Address,
    /// Block the event was emitted in
    pub block: u64,
    /// Event payload
    pub event: Event,
}
