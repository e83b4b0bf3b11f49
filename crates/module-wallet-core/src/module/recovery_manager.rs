//! Recovery manager: guardian-majority ownership recovery
//!
//! `executeRecovery` and `cancelRecovery` are only reachable through
//! `execute` and need a majority of guardian signatures, which makes this
//! module the path on which relayers are refunded. `finalizeRecovery` needs
//! no signature once the recovery period has elapsed.

use super::{ModuleCore, ModuleLogic, RelayedModule};
use crate::abi::{self, Args, Token, selectors};
use crate::account::AccountGateway;
use crate::chain::{Chain, Message};
use crate::config::{RelayConfig, SecurityConfig};
use crate::guardian::GuardianStore;
use crate::relay::{RelayEngine, ReplayProtection, SignaturePolicy};
use crate::types::{Event, RecoverableSignature, Selector};
use crate::{Error, Result};
use alloy_primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// A pending recovery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// New owner once finalized
    pub recovery: Address,
    /// Earliest finalization time
    pub execute_after: u64,
    /// Guardian count when the recovery started
    pub guardian_count: usize,
}

/// Pending recoveries per account
#[derive(Debug, Clone, Default)]
pub struct RecoveryState {
    pending: HashMap<Address, RecoveryConfig>,
}

/// Majority of guardians, ascending and distinct
#[derive(Debug, Clone, Copy)]
pub struct GuardianMajority {
    guardian_store: Address,
}

impl GuardianMajority {
    /// Policy backed by `guardian_store`
    pub fn new(guardian_store: Address) -> Self {
        Self { guardian_store }
    }
}

/// Smallest integer not below `a / b`
fn ceil_div(a: usize, b: usize) -> usize {
    a.div_ceil(b)
}

impl SignaturePolicy for GuardianMajority {
    fn required_signatures(
        &self,
        chain: &Chain,
        module: Address,
        account: Address,
        data: &[u8],
    ) -> Result<usize> {
        let selector = Selector::of(data).ok_or(Error::InvalidData(data.len()))?;
        match selector {
            selectors::EXECUTE_RECOVERY => {
                let guardians = GuardianStore::guardian_count(chain, self.guardian_store, account);
                if guardians == 0 {
                    return Err(Error::NoGuardians(account));
                }
                Ok(ceil_div(guardians, 2))
            }
            selectors::FINALIZE_RECOVERY => Ok(0),
            selectors::CANCEL_RECOVERY => {
                let guardians = RecoveryManager::pending(chain, module, account)
                    .map(|config| config.guardian_count)
                    .unwrap_or_else(|| {
                        GuardianStore::guardian_count(chain, self.guardian_store, account)
                    });
                Ok(ceil_div(guardians + 1, 2))
            }
            other => Err(Error::UnknownSelector(other)),
        }
    }

    fn validate_signatures(
        &self,
        chain: &Chain,
        _module: Address,
        account: Address,
        data: &[u8],
        sign_hash: &B256,
        signatures: &[RecoverableSignature],
    ) -> Result<()> {
        // Only a cancellation may carry the owner, and only as the first signer
        let owner_may_sign = Selector::of(data) == Some(selectors::CANCEL_RECOVERY);
        let mut last_signer = Address::ZERO;

        for (i, signature) in signatures.iter().enumerate() {
            let signer = signature.recover(sign_hash)?;
            if i == 0 && owner_may_sign && ModuleCore::is_owner(chain, account, signer) {
                continue;
            }
            if signer <= last_signer {
                return Err(Error::UnsortedSigners);
            }
            last_signer = signer;
            if !GuardianStore::is_guardian(chain, self.guardian_store, account, signer) {
                return Err(Error::InvalidSigner(signer));
            }
        }
        Ok(())
    }
}

/// Recovery manager logic
#[derive(Debug, Clone)]
pub struct RecoveryManager {
    core: ModuleCore,
    guardian_store: Address,
    recovery_period: u64,
}

impl RecoveryManager {
    /// Create the logic
    pub fn new(registry: Address, guardian_store: Address, recovery_period: u64) -> Self {
        Self {
            core: ModuleCore::new(registry, "RecoveryManager"),
            guardian_store,
            recovery_period,
        }
    }

    /// Deploy as a guardian-majority module with sign-hash replay protection
    pub fn deploy(
        chain: &mut Chain,
        registry: Address,
        guardian_store: Address,
        relay: RelayConfig,
        security: SecurityConfig,
    ) -> Address {
        RelayedModule::new(
            Self::new(registry, guardian_store, security.recovery_period),
            GuardianMajority::new(guardian_store),
            RelayEngine::new(ReplayProtection::SignHashSet, relay),
        )
        .deploy(chain)
    }

    /// Pending recovery of `account` on the module at `module`
    pub fn pending(chain: &Chain, module: Address, account: Address) -> Option<RecoveryConfig> {
        chain
            .storage::<RecoveryState>(module)
            .and_then(|state| state.pending.get(&account))
            .copied()
    }

    /// `executeRecovery(account, recovery)` call data
    pub fn execute_recovery_call(account: Address, recovery: Address) -> Bytes {
        abi::encode_call(
            selectors::EXECUTE_RECOVERY,
            &[Token::Address(account), Token::Address(recovery)],
        )
    }

    /// `finalizeRecovery(account)` call data
    pub fn finalize_recovery_call(account: Address) -> Bytes {
        abi::encode_call(selectors::FINALIZE_RECOVERY, &[Token::Address(account)])
    }

    /// `cancelRecovery(account)` call data
    pub fn cancel_recovery_call(account: Address) -> Bytes {
        abi::encode_call(selectors::CANCEL_RECOVERY, &[Token::Address(account)])
    }

    fn execute_recovery(&self, chain: &mut Chain, msg: &Message, args: Args<'_>) -> Result<Bytes> {
        ModuleCore::require_relayed(msg)?;
        let (account, recovery) = (args.address(0)?, args.address(1)?);
        let this = msg.to;

        if Self::pending(chain, this, account).is_some() {
            return Err(Error::RecoveryPending(account));
        }
        if recovery.is_zero()
            || ModuleCore::is_owner(chain, account, recovery)
            || GuardianStore::is_guardian(chain, self.guardian_store, account, recovery)
        {
            return Err(Error::InvalidRecoveryAddress(recovery));
        }

        let execute_after = chain.timestamp().saturating_add(self.recovery_period);
        let guardian_count = GuardianStore::guardian_count(chain, self.guardian_store, account);
        chain.storage_mut::<RecoveryState>(this)?.pending.insert(
            account,
            RecoveryConfig {
                recovery,
                execute_after,
                guardian_count,
            },
        );
        ModuleCore::set_lock(chain, this, self.guardian_store, account, execute_after)?;
        chain.emit(
            this,
            Event::RecoveryExecuted {
                account,
                recovery,
                execute_after,
            },
        )?;
        info!(%account, %recovery, execute_after, "Recovery started");
        Ok(Bytes::new())
    }

    fn finalize_recovery(&self, chain: &mut Chain, msg: &Message, args: Args<'_>) -> Result<Bytes> {
        let account = args.address(0)?;
        let this = msg.to;
        let config = Self::pending(chain, this, account).ok_or(Error::NoRecoveryPending(account))?;
        if chain.timestamp() <= config.execute_after {
            return Err(Error::RecoveryPeriodNotElapsed {
                execute_after: config.execute_after,
            });
        }

        chain.storage_mut::<RecoveryState>(this)?.pending.remove(&account);
        chain.call(
            this,
            account,
            U256::ZERO,
            AccountGateway::set_owner_call(config.recovery),
        )?;
        ModuleCore::set_lock(chain, this, self.guardian_store, account, 0)?;
        chain.emit(
            this,
            Event::RecoveryFinalized {
                account,
                recovery: config.recovery,
            },
        )?;
        info!(%account, owner = %config.recovery, "Recovery finalized");
        Ok(Bytes::new())
    }

    fn cancel_recovery(&self, chain: &mut Chain, msg: &Message, args: Args<'_>) -> Result<Bytes> {
        ModuleCore::require_relayed(msg)?;
        let account = args.address(0)?;
        let this = msg.to;
        let config = Self::pending(chain, this, account).ok_or(Error::NoRecoveryPending(account))?;

        chain.storage_mut::<RecoveryState>(this)?.pending.remove(&account);
        ModuleCore::set_lock(chain, this, self.guardian_store, account, 0)?;
        chain.emit(
            this,
            Event::RecoveryCanceled {
                account,
                recovery: config.recovery,
            },
        )?;
        info!(%account, "Recovery canceled");
        Ok(Bytes::new())
    }

    fn get_recovery(&self, chain: &Chain, msg: &Message, args: Args<'_>) -> Result<Bytes> {
        let config = Self::pending(chain, msg.to, args.address(0)?).unwrap_or_default();
        Ok(abi::returns(&[
            Token::Address(config.recovery),
            Token::Uint(U256::from(config.execute_after)),
            Token::Uint(U256::from(config.guardian_count)),
        ]))
    }
}

impl ModuleLogic for RecoveryManager {
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
        match selector {
            selectors::EXECUTE_RECOVERY => Some(self.execute_recovery(chain, msg, args)),
            selectors::FINALIZE_RECOVERY => Some(self.finalize_recovery(chain, msg, args)),
            selectors::CANCEL_RECOVERY => Some(self.cancel_recovery(chain, msg, args)),
            selectors::GET_RECOVERY => Some(self.get_recovery(chain, msg, args)),
            _ => None,
        }
    }
}
