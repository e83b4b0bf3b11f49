//! Guardian Store
//!
//! Per-account guardian list and lock timer. The list is a swap-delete vector
//! with a back-index map, so revocation is O(1) and reorders the list. Every
//! mutator requires the caller to be an authorised module of the account.

use crate::abi::{self, Token, selectors};
use crate::account::ModuleCapability;
use crate::chain::{Chain, Contract, Message};
use crate::{Error, Result};
use alloy_primitives::{Address, Bytes, U256};
use std::collections::HashMap;
use tracing::debug;

/// Guardians and lock of one account
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardianConfig {
    guardians: Vec<Address>,
    info: HashMap<Address, usize>,
    lock: u64,
    locker: Address,
}

impl GuardianConfig {
    /// Append a guardian
    pub fn add(&mut self, guardian: Address) -> Result<()> {
        if self.info.contains_key(&guardian) {
            return Err(Error::GuardianExists(guardian));
        }
        self.info.insert(guardian, self.guardians.len());
        self.guardians.push(guardian);
        Ok(())
    }

    /// Remove a guardian, moving the last entry into its slot
    pub fn revoke(&mut self, guardian: Address) -> Result<()> {
        let index = self
            .info
            .remove(&guardian)
            .ok_or(Error::GuardianNotFound(guardian))?;
        let last = self.guardians.len() - 1;
        if index != last {
            let moved = self.guardians[last];
            self.guardians[index] = moved;
            self.info.insert(moved, index);
        }
        self.guardians.pop();
        Ok(())
    }

    /// Store a release time. The locker only changes on a non-zero lock set
    /// by a different module; unlocking leaves it untouched.
    pub fn set_lock(&mut self, caller: Address, release_after: u64) {
        self.lock = release_after;
        if release_after != 0 && caller != self.locker {
            self.locker = caller;
        }
    }

    /// Guardian list snapshot
    pub fn guardians(&self) -> &[Address] {
        &self.guardians
    }

    /// Number of guardians
    pub fn count(&self) -> usize {
        self.guardians.len()
    }

    /// Membership test
    pub fn is_guardian(&self, address: Address) -> bool {
        self.info.contains_key(&address)
    }

    /// Recorded position of a guardian
    pub fn index_of(&self, guardian: Address) -> Option<usize> {
        self.info.get(&guardian).copied()
    }

    /// Raw release time, zero when unlocked
    pub fn lock(&self) -> u64 {
        self.lock
    }

    /// Module that last set a non-zero lock
    pub fn locker(&self) -> Address {
        self.locker
    }

    /// Locked iff the release time is strictly in the future
    pub fn is_locked(&self, now: u64) -> bool {
        self.lock > now
    }
}

/// Guardian store storage
#[derive(Debug, Clone, Default)]
pub struct GuardianStoreState {
    configs: HashMap<Address, GuardianConfig>,
}

/// Guardian store contract code
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardianStore;

impl GuardianStore {
    /// Configuration of `account` (empty if never touched)
    pub fn config(chain: &Chain, store: Address, account: Address) -> GuardianConfig {
        chain
            .storage::<GuardianStoreState>(store)
            .and_then(|state| state.configs.get(&account))
            .cloned()
            .unwrap_or_default()
    }

    /// Guardian membership test
    pub fn is_guardian(chain: &Chain, store: Address, account: Address, guardian: Address) -> bool {
        chain
            .storage::<GuardianStoreState>(store)
            .and_then(|state| state.configs.get(&account))
            .is_some_and(|config| config.is_guardian(guardian))
    }

    /// Guardian count
    pub fn guardian_count(chain: &Chain, store: Address, account: Address) -> usize {
        chain
            .storage::<GuardianStoreState>(store)
            .and_then(|state| state.configs.get(&account))
            .map_or(0, GuardianConfig::count)
    }

    /// True while the account's lock is in the future
    pub fn is_locked(chain: &Chain, store: Address, account: Address) -> bool {
        chain
            .storage::<GuardianStoreState>(store)
            .and_then(|state| state.configs.get(&account))
            .is_some_and(|config| config.is_locked(chain.timestamp()))
    }

    // ============ Call data ============

    /// `addGuardian(account, guardian)`
    pub fn add_guardian_call(account: Address, guardian: Address) -> Bytes {
        abi::encode_call(
            selectors::ADD_GUARDIAN,
            &[Token::Address(account), Token::Address(guardian)],
        )
    }

    /// `revokeGuardian(account, guardian)`
    pub fn revoke_guardian_call(account: Address, guardian: Address) -> Bytes {
        abi::encode_call(
            selectors::REVOKE_GUARDIAN,
            &[Token::Address(account), Token::Address(guardian)],
        )
    }

    /// `setLock(account, releaseAfter)`
    pub fn set_lock_call(account: Address, release_after: u64) -> Bytes {
        abi::encode_call(
            selectors::SET_LOCK,
            &[Token::Address(account), Token::Uint(U256::from(release_after))],
        )
    }

    fn config_mut<'a>(
        chain: &'a mut Chain,
        store: Address,
        cap: &ModuleCapability,
    ) -> Result<&'a mut GuardianConfig> {
        Ok(chain
            .storage_mut::<GuardianStoreState>(store)?
            .configs
            .entry(cap.account())
            .or_default())
    }
}

impl Contract for GuardianStore {
    fn name(&self) -> &str {
        "GuardianStorage"
    }

    fn call(&self, chain: &mut Chain, msg: &Message) -> Result<Bytes> {
        let (selector, args) = abi::split_selector(&msg.data)?;
        let this = msg.to;
        let account = args.address(0)?;

        match selector {
            selectors::ADD_GUARDIAN => {
                let cap = ModuleCapability::authorize(chain, account, msg.sender)?;
                let guardian = args.address(1)?;
                Self::config_mut(chain, this, &cap)?.add(guardian)?;
                debug!(%account, %guardian, module = %cap.module(), "Guardian added");
                Ok(Bytes::new())
            }
            selectors::REVOKE_GUARDIAN => {
                let cap = ModuleCapability::authorize(chain, account, msg.sender)?;
                let guardian = args.address(1)?;
                Self::config_mut(chain, this, &cap)?.revoke(guardian)?;
                debug!(%account, %guardian, module = %cap.module(), "Guardian revoked");
                Ok(Bytes::new())
            }
            selectors::SET_LOCK => {
                let cap = ModuleCapability::authorize(chain, account, msg.sender)?;
                let release_after = args.u64(1)?;
                Self::config_mut(chain, this, &cap)?.set_lock(cap.module(), release_after);
                debug!(%account, release_after, module = %cap.module(), "Lock set");
                Ok(Bytes::new())
            }
            selectors::GUARDIAN_COUNT => {
                let count = Self::guardian_count(chain, this, account);
                Ok(abi::returns(&[Token::Uint(U256::from(count))]))
            }
            selectors::GET_GUARDIANS => {
                let guardians = Self::config(chain, this, account).guardians().to_vec();
                Ok(abi::returns(&[Token::AddressArray(guardians)]))
            }
            selectors::IS_GUARDIAN => {
                let guardian = args.address(1)?;
                let is_guardian = Self::is_guardian(chain, this, account, guardian);
                Ok(abi::returns(&[Token::Bool(is_guardian)]))
            }
            selectors::IS_LOCKED => {
                let locked = Self::is_locked(chain, this, account);
                Ok(abi::returns(&[Token::Bool(locked)]))
            }
            selectors::GET_LOCK => {
                let lock = Self::config(chain, this, account).lock();
                Ok(abi::returns(&[Token::Uint(U256::from(lock))]))
            }
            selectors::GET_LOCKER => {
                let locker = Self::config(chain, this, account).locker();
                Ok(abi::returns(&[Token::Address(locker)]))
            }
            other => Err(Error::UnknownSelector(other)),
        }
    }
}
