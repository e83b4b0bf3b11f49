//! Guardian manager: owner-controlled guardian list

use super::{ModuleCore, ModuleLogic, RelayedModule};
use crate::abi::{self, Args, Token, selectors};
use crate::chain::{Chain, Message};
use crate::config::RelayConfig;
use crate::guardian::GuardianStore;
use crate::types::{Event, Selector};
use crate::{Error, Result};
use alloy_primitives::{Address, Bytes, U256};

/// Guardian manager logic
#[derive(Debug, Clone)]
pub struct GuardianManager {
    core: ModuleCore,
    guardian_store: Address,
}

impl GuardianManager {
    /// Create the logic
    pub fn new(registry: Address, guardian_store: Address) -> Self {
        Self {
            core: ModuleCore::new(registry, "GuardianManager"),
            guardian_store,
        }
    }

    /// Deploy as an owner-signed module
    pub fn deploy(
        chain: &mut Chain,
        registry: Address,
        guardian_store: Address,
        relay: RelayConfig,
    ) -> Address {
        RelayedModule::owner_only(Self::new(registry, guardian_store), relay).deploy(chain)
    }

    /// `addGuardian(account, guardian)` call data
    pub fn add_guardian_call(account: Address, guardian: Address) -> Bytes {
        abi::encode_call(
            selectors::ADD_GUARDIAN,
            &[Token::Address(account), Token::Address(guardian)],
        )
    }

    /// `revokeGuardian(account, guardian)` call data
    pub fn revoke_guardian_call(account: Address, guardian: Address) -> Bytes {
        abi::encode_call(
            selectors::REVOKE_GUARDIAN,
            &[Token::Address(account), Token::Address(guardian)],
        )
    }

    fn add_guardian(&self, chain: &mut Chain, msg: &Message, args: Args<'_>) -> Result<Bytes> {
        let (account, guardian) = (args.address(0)?, args.address(1)?);
        ModuleCore::require_owner_or_relayed(chain, msg, account)?;
        ModuleCore::require_unlocked(chain, self.guardian_store, account)?;
        if ModuleCore::is_owner(chain, account, guardian) {
            return Err(Error::OwnerAsGuardian(guardian));
        }

        chain.call(
            msg.to,
            self.guardian_store,
            U256::ZERO,
            GuardianStore::add_guardian_call(account, guardian),
        )?;
        chain.emit(msg.to, Event::GuardianAdded { account, guardian })?;
        Ok(Bytes::new())
    }

    fn revoke_guardian(&self, chain: &mut Chain, msg: &Message, args: Args<'_>) -> Result<Bytes> {
        let (account, guardian) = (args.address(0)?, args.address(1)?);
        ModuleCore::require_owner_or_relayed(chain, msg, account)?;
        ModuleCore::require_unlocked(chain, self.guardian_store, account)?;

        chain.call(
            msg.to,
            self.guardian_store,
            U256::ZERO,
            GuardianStore::revoke_guardian_call(account, guardian),
        )?;
        chain.emit(msg.to, Event::GuardianRevoked { account, guardian })?;
        Ok(Bytes::new())
    }
}

impl ModuleLogic for GuardianManager {
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
            selectors::ADD_GUARDIAN => Some(self.add_guardian(chain, msg, args)),
            selectors::REVOKE_GUARDIAN => Some(self.revoke_guardian(chain, msg, args)),
            _ => None,
        }
    }
}
