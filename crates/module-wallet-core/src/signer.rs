//! Off-chain construction of relayed calls
//!
//! A [`MetaTransaction`] is what the principals of an account sign and what a
//! relayer submits to the module's `execute`.

use crate::relay::{ExecuteRequest, sign_hash};
use crate::types::{RecoverableSignature, SIGNATURE_LENGTH, signer_address};
use crate::Result;
use alloy_primitives::{Address, B256, Bytes, U256};
use k256::ecdsa::SigningKey;
use serde::{Deserialize, Serialize};

/// Unsigned relayed call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaTransaction {
    pub module: Address,
    pub account: Address,
    pub data: Bytes,
    pub nonce: U256,
    pub gas_price: U256,
    pub gas_limit: U256,
}

impl MetaTransaction {
    /// Relayed call with zero gas price and a 500k gas limit
    pub fn new(module: Address, account: Address, data: Bytes) -> Self {
        Self {
            module,
            account,
            data,
            nonce: U256::ZERO,
            gas_price: U256::ZERO,
            gas_limit: U256::from(500_000u64),
        }
    }

    pub fn with_nonce(mut self, nonce: U256) -> Self {
        self.nonce = nonce;
        self
    }

    pub fn with_gas_price(mut self, gas_price: U256) -> Self {
        self.gas_price = gas_price;
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: U256) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    /// Digest every signer signs
    pub fn sign_hash(&self) -> B256 {
        sign_hash(
            self.module,
            self.account,
            &self.data,
            self.nonce,
            self.gas_price,
            self.gas_limit,
        )
    }

    /// Sign with `keys` in the order given and concatenate the signatures
    pub fn sign(&self, keys: &[&SigningKey]) -> Result<Bytes> {
        let hash = self.sign_hash();
        let mut blob = Vec::with_capacity(keys.len() * SIGNATURE_LENGTH);
        for key in keys {
            blob.extend_from_slice(&RecoverableSignature::sign(key, &hash)?.to_bytes());
        }
        Ok(Bytes::from(blob))
    }

    /// Sign with `keys` ordered by ascending signer address
    pub fn sign_sorted(&self, keys: &[&SigningKey]) -> Result<Bytes> {
        let mut keys = keys.to_vec();
        keys.sort_by_key(|key| signer_address(key));
        self.sign(&keys)
    }

    /// Request carrying `signatures`
    pub fn request(&self, signatures: Bytes) -> ExecuteRequest {
        ExecuteRequest {
            account: self.account,
            data: self.data.clone(),
            nonce: self.nonce,
            signatures,
            gas_price: self.gas_price,
            gas_limit: self.gas_limit,
        }
    }

    /// `execute(...)` call data carrying `signatures`
    pub fn execute_calldata(&self, signatures: Bytes) -> Bytes {
        self.request(signatures).encode()
    }
}

/// Monotonic nonce: block number in the upper 128 bits, counter below
pub fn nonce_for_block(block: u64, counter: u64) -> U256 {
    (U256::from(block) << 128) | U256::from(counter)
}
