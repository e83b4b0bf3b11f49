//! Single-signature specialization
//!
//! Exactly one signature, recovered to the account owner, with monotonic
//! nonce replay protection. Modules built this way also accept `addModule`
//! through the relay path, so adding a module can itself be a relayed call.

use super::{ReplayProtection, RelayEngine, SignaturePolicy};
use crate::account::AccountGateway;
use crate::chain::Chain;
use crate::config::RelayConfig;
use crate::module::{AddModuleAuthority, ModuleLogic, RelayedModule};
use crate::types::RecoverableSignature;
use crate::{Error, Result};
use alloy_primitives::{Address, B256};

/// One signature from the account owner
#[derive(Debug, Clone, Copy, Default)]
pub struct OwnerSignature;

impl SignaturePolicy for OwnerSignature {
    fn required_signatures(
        &self,
        _chain: &Chain,
        _module: Address,
        _account: Address,
        _data: &[u8],
    ) -> Result<usize> {
        Ok(1)
    }

    fn validate_signatures(
        &self,
        chain: &Chain,
        _module: Address,
        account: Address,
        _data: &[u8],
        sign_hash: &B256,
        signatures: &[RecoverableSignature],
    ) -> Result<()> {
        let [signature] = signatures else {
            return Err(Error::InvalidSignatureLength {
                expected: 1,
                actual: signatures.len(),
            });
        };
        let signer = signature.recover(sign_hash)?;
        if signer != AccountGateway::owner(chain, account) {
            return Err(Error::InvalidSigner(signer));
        }
        Ok(())
    }
}

impl<L: ModuleLogic> RelayedModule<L, OwnerSignature> {
    /// Owner-signed module with monotonic nonces
    pub fn owner_only(logic: L, config: RelayConfig) -> Self {
        RelayedModule::new(
            logic,
            OwnerSignature,
            RelayEngine::new(ReplayProtection::MonotonicNonce, config),
        )
        .with_add_module_authority(AddModuleAuthority::OwnerOrRelayed)
    }
}
