//! Lock manager: guardian-triggered account lock
//!
//! A guardian (directly, or through `execute` with one guardian signature)
//! locks the account for the configured lock period. Only the module that
//! set the lock can lift it early.

use super::{ModuleCore, ModuleLogic, RelayedModule};
use crate::abi::{self, Args, Token, selectors};
use crate::chain::{Chain, Message};
use crate::config::{RelayConfig, SecurityConfig};
use crate::guardian::GuardianStore;
use crate::relay::{RelayEngine, ReplayProtection, SignaturePolicy};
use crate::types::{Event, RecoverableSignature, Selector};
use crate::{Error, Result};
use alloy_primitives::{Address, B256, Bytes, U256};
use tracing::info;

/// One signature from a guardian of the account
#[derive(Debug, Clone, Copy)]
pub struct GuardianSignature {
    guardian_store: Address,
}

impl GuardianSignature {
    /// Policy backed by `guardian_store`
    pub fn new(guardian_store: Address) -> Self {
        Self { guardian_store }
    }
}

impl SignaturePolicy for GuardianSignature {
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
        for signature in signatures {
            let signer = signature.recover(sign_hash)?;
            if !GuardianStore::is_guardian(chain, self.guardian_store, account, signer) {
                return Err(Error::InvalidSigner(signer));
            }
        }
        Ok(())
    }
}

/// Lock manager logic
#[derive(Debug, Clone)]
pub struct LockManager {
    core: ModuleCore,
    guardian_store: Address,
    lock_period: u64,
}

impl LockManager {
    /// Create the logic
    pub fn new(registry: Address, guardian_store: Address, lock_period: u64) -> Self {
        Self {
            core: ModuleCore::new(registry, "LockManager"),
            guardian_store,
            lock_period,
        }
    }

    /// Deploy as a guardian-signed module with monotonic nonces
    pub fn deploy(
        chain: &mut Chain,
        registry: Address,
        guardian_store: Address,
        relay: RelayConfig,
        security: SecurityConfig,
    ) -> Address {
        RelayedModule::new(
            Self::new(registry, guardian_store, security.lock_period),
            GuardianSignature::new(guardian_store),
            RelayEngine::new(ReplayProtection::MonotonicNonce, relay),
        )
        .deploy(chain)
    }

    /// `lock(account)` call data
    pub fn lock_call(account: Address) -> Bytes {
        abi::encode_call(selectors::LOCK, &[Token::Address(account)])
    }

    /// `unlock(account)` call data
    pub fn unlock_call(account: Address) -> Bytes {
        abi::encode_call(selectors::UNLOCK, &[Token::Address(account)])
    }

    /// `getLock(account)` call data
    pub fn get_lock_call(account: Address) -> Bytes {
        abi::encode_call(selectors::GET_LOCK, &[Token::Address(account)])
    }

    fn lock(&self, chain: &mut Chain, msg: &Message, account: Address) -> Result<Bytes> {
        ModuleCore::require_guardian_or_relayed(chain, msg, self.guardian_store, account)?;
        ModuleCore::require_unlocked(chain, self.guardian_store, account)?;

        let release_after = chain.timestamp().saturating_add(self.lock_period);
        ModuleCore::set_lock(chain, msg.to, self.guardian_store, account, release_after)?;
        chain.emit(
            msg.to,
            Event::Locked {
                account,
                release_after,
            },
        )?;
        info!(%account, release_after, "Account locked");
        Ok(Bytes::new())
    }

    fn unlock(&self, chain: &mut Chain, msg: &Message, account: Address) -> Result<Bytes> {
        ModuleCore::require_guardian_or_relayed(chain, msg, self.guardian_store, account)?;
        let config = GuardianStore::config(chain, self.guardian_store, account);
        if !config.is_locked(chain.timestamp()) {
            return Err(Error::AccountNotLocked(account));
        }
        if config.locker() != msg.to {
            return Err(Error::LockedByOtherModule {
                account,
                locker: config.locker(),
            });
        }

        ModuleCore::set_lock(chain, msg.to, self.guardian_store, account, 0)?;
        chain.emit(msg.to, Event::Unlocked { account })?;
        info!(%account, "Account unlocked");
        Ok(Bytes::new())
    }

    fn handle(
        &self,
        chain: &mut Chain,
        msg: &Message,
        selector: Selector,
        args: Args<'_>,
    ) -> Result<Bytes> {
        let account = args.address(0)?;
        match selector {
            selectors::LOCK => self.lock(chain, msg, account),
            selectors::UNLOCK => self.unlock(chain, msg, account),
            selectors::GET_LOCK => Ok(abi::returns(&[Token::Uint(self.get_lock(chain, account))])),
            selectors::IS_LOCKED => {
                let locked = GuardianStore::is_locked(chain, self.guardian_store, account);
                Ok(abi::returns(&[Token::Bool(locked)]))
            }
            other => Err(Error::UnknownSelector(other)),
        }
    }

    /// Release time of an active lock, zero when unlocked
    fn get_lock(&self, chain: &Chain, account: Address) -> U256 {
        let config = GuardianStore::config(chain, self.guardian_store, account);
        if config.is_locked(chain.timestamp()) {
            U256::from(config.lock())
        } else {
            U256::ZERO
        }
    }
}

impl ModuleLogic for LockManager {
    fn core(&self) -> &ModuleCore {
        &self.core
    }

    fn dispatch(
        &self,
        chain: &mut Chain,
        msg: &Message,
        selector: Selector,
        args: Args<'_>,
    ) -> Option<Result<Bytes>> {
        if !matches!(
            selector,
            selectors::LOCK | selectors::UNLOCK | selectors::GET_LOCK | selectors::IS_LOCKED
        ) {
            return None;
        }
        Some(self.handle(chain, msg, selector, args))
    }
}
