//! Base Module capability and module composition
//!
//! A module is a [`ModuleLogic`] (its own operations and per-account setup)
//! combined with a [`SignaturePolicy`] and a [`RelayEngine`] inside a
//! [`RelayedModule`] contract. The composed contract answers the operations
//! every module shares (`init`, `addModule`, `recoverToken`, `execute`,
//! `getNonce`) and hands everything else to the logic.
//!
//! ## Example
//!
//! ```rust,ignore
//! use module_wallet_core::module::{RelayedModule, transfer_manager::TransferManager};
//!
//! let logic = TransferManager::new(registry, guardian_store);
//! let transfer_manager = RelayedModule::owner_only(logic, config.relay).deploy(&mut chain);
//! ```

pub mod guardian_manager;
pub mod lock_manager;
pub mod recovery_manager;
pub mod transfer_manager;

use crate::abi::{self, Args, Token, selectors};
use crate::account::AccountGateway;
use crate::chain::token::Token as Erc20;
use crate::chain::{Chain, Contract, Message};
use crate::guardian::GuardianStore;
use crate::registry::ModuleRegistry;
use crate::relay::{ExecuteRequest, RelayEngine, SignaturePolicy};
use crate::types::{Event, Selector};
use crate::{Error, Result};
use alloy_primitives::{Address, Bytes, U256};
use std::fmt;
use tracing::debug;

// ============================================================================
// Shared capability
// ============================================================================

/// State and helpers shared by every module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleCore {
    registry: Address,
    name: String,
}

impl ModuleCore {
    /// Bind a module to a registry under a readable name
    pub fn new(registry: Address, name: impl Into<String>) -> Self {
        Self {
            registry,
            name: name.into(),
        }
    }

    /// Registry this module consults
    pub fn registry(&self) -> Address {
        self.registry
    }

    /// Readable name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `init(account)`: only the account itself may call it
    pub fn init(&self, chain: &mut Chain, msg: &Message, account: Address) -> Result<()> {
        if msg.sender != account {
            return Err(Error::NotAccount(msg.sender));
        }
        chain.emit(msg.to, Event::ModuleInitialised { account })
    }

    /// True iff `address` is the account's current owner
    pub fn is_owner(chain: &Chain, account: Address, address: Address) -> bool {
        AccountGateway::owner(chain, account) == address
    }

    /// Caller must be the account owner
    pub fn require_owner(chain: &Chain, msg: &Message, account: Address) -> Result<()> {
        if !Self::is_owner(chain, account, msg.sender) {
            return Err(Error::NotOwner(msg.sender));
        }
        Ok(())
    }

    /// Caller must be the account owner or the relay self-call
    pub fn require_owner_or_relayed(chain: &Chain, msg: &Message, account: Address) -> Result<()> {
        if msg.is_relayed() {
            return Ok(());
        }
        Self::require_owner(chain, msg, account)
    }

    /// Caller must be the relay self-call
    pub fn require_relayed(msg: &Message) -> Result<()> {
        if !msg.is_relayed() {
            return Err(Error::NotRelayed);
        }
        Ok(())
    }

    /// Caller must be a guardian of the account or the relay self-call
    pub fn require_guardian_or_relayed(
        chain: &Chain,
        msg: &Message,
        guardian_store: Address,
        account: Address,
    ) -> Result<()> {
        if msg.is_relayed() || GuardianStore::is_guardian(chain, guardian_store, account, msg.sender) {
            return Ok(());
        }
        Err(Error::NotGuardian(msg.sender))
    }

    /// The account must not be locked
    pub fn require_unlocked(chain: &Chain, guardian_store: Address, account: Address) -> Result<()> {
        if GuardianStore::is_locked(chain, guardian_store, account) {
            return Err(Error::AccountLocked(account));
        }
        Ok(())
    }

    /// Authorise a registry-listed module on the account. The caller has
    /// already checked who may add modules.
    pub fn add_module(
        &self,
        chain: &mut Chain,
        this: Address,
        account: Address,
        candidate: Address,
    ) -> Result<()> {
        let output = chain.static_call(
            this,
            self.registry,
            ModuleRegistry::is_registered_module_call(candidate),
        )?;
        if !Args::new(&output).bool(0)? {
            return Err(Error::ModuleNotRegistered(candidate));
        }
        chain.call(
            this,
            account,
            U256::ZERO,
            AccountGateway::authorise_module_call(candidate, true),
        )?;
        debug!(%account, module = %candidate, "Module added");
        Ok(())
    }

    /// Sweep this module's balance of `token` to the registry
    pub fn recover_token(&self, chain: &mut Chain, this: Address, token: Address) -> Result<()> {
        let output = chain.static_call(this, token, Erc20::balance_of_call(this))?;
        let total = Args::new(&output).uint(0)?;
        chain.call(this, token, U256::ZERO, Erc20::transfer_call(self.registry, total))?;
        Ok(())
    }

    /// Call `target` through the account's `invoke`. Gateway failures
    /// propagate unchanged. Empty output is accepted as a call without an
    /// envelope; anything else must decode as one.
    pub fn forward_via_account(
        chain: &mut Chain,
        this: Address,
        account: Address,
        target: Address,
        value: U256,
        data: Bytes,
    ) -> Result<Bytes> {
        let output = chain.call(
            this,
            account,
            U256::ZERO,
            AccountGateway::invoke_call(target, value, data),
        )?;
        if output.is_empty() {
            return Ok(Bytes::new());
        }
        abi::decode_bytes(&output)
    }

    /// Set the account's guardian-store lock from this module
    pub fn set_lock(
        chain: &mut Chain,
        this: Address,
        guardian_store: Address,
        account: Address,
        release_after: u64,
    ) -> Result<()> {
        chain.call(
            this,
            guardian_store,
            U256::ZERO,
            GuardianStore::set_lock_call(account, release_after),
        )?;
        Ok(())
    }
}

/// `init(account)` call data
pub fn init_call(account: Address) -> Bytes {
    abi::encode_call(selectors::MODULE_INIT, &[Token::Address(account)])
}

/// `addModule(account, module)` call data
pub fn add_module_call(account: Address, module: Address) -> Bytes {
    abi::encode_call(
        selectors::ADD_MODULE,
        &[Token::Address(account), Token::Address(module)],
    )
}

/// `recoverToken(token)` call data
pub fn recover_token_call(token: Address) -> Bytes {
    abi::encode_call(selectors::RECOVER_TOKEN, &[Token::Address(token)])
}

// ============================================================================
// Composition
// ============================================================================

/// Module-specific behaviour
pub trait ModuleLogic: Send + Sync + fmt::Debug {
    /// Shared capability
    fn core(&self) -> &ModuleCore;

    /// Per-account setup run when the account authorises the module
    fn on_init(&self, _chain: &mut Chain, _this: Address, _account: Address) -> Result<()> {
        Ok(())
    }

    /// Handle a module-specific operation; `None` if `selector` is not one
    fn dispatch(
        &self,
        chain: &mut Chain,
        msg: &Message,
        selector: Selector,
        args: Args<'_>,
    ) -> Option<Result<Bytes>>;
}

/// Who may call `addModule`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddModuleAuthority {
    /// The account owner, directly
    #[default]
    OwnerOnly,
    /// The account owner, or the module's own relay path
    OwnerOrRelayed,
}

/// Module contract: logic, signature policy and relay engine
#[derive(Debug)]
pub struct RelayedModule<L, P> {
    logic: L,
    policy: P,
    engine: RelayEngine,
    add_module: AddModuleAuthority,
}

impl<L: ModuleLogic, P: SignaturePolicy> RelayedModule<L, P> {
    /// Compose a module. `addModule` is restricted to the owner.
    pub fn new(logic: L, policy: P, engine: RelayEngine) -> Self {
        Self {
            logic,
            policy,
            engine,
            add_module: AddModuleAuthority::OwnerOnly,
        }
    }

    /// Override who may call `addModule`
    pub fn with_add_module_authority(mut self, authority: AddModuleAuthority) -> Self {
        self.add_module = authority;
        self
    }

    /// Module logic
    pub fn logic(&self) -> &L {
        &self.logic
    }

    /// Deploy and record the module's creation
    pub fn deploy(self, chain: &mut Chain) -> Address
    where
        L: 'static,
        P: 'static,
    {
        let name = self.logic.core().name().to_string();
        let address = chain.deploy(self);
        chain.log_genesis(address, Event::ModuleCreated { name });
        address
    }
}

impl<L: ModuleLogic, P: SignaturePolicy> Contract for RelayedModule<L, P> {
    fn name(&self) -> &str {
        self.logic.core().name()
    }

    fn call(&self, chain: &mut Chain, msg: &Message) -> Result<Bytes> {
        let (selector, args) = abi::split_selector(&msg.data)?;
        let this = msg.to;
        let core = self.logic.core();

        match selector {
            selectors::MODULE_INIT => {
                let account = args.address(0)?;
                core.init(chain, msg, account)?;
                self.logic.on_init(chain, this, account)?;
                Ok(Bytes::new())
            }
            selectors::ADD_MODULE => {
                let (account, candidate) = (args.address(0)?, args.address(1)?);
                match self.add_module {
                    AddModuleAuthority::OwnerOnly => ModuleCore::require_owner(chain, msg, account)?,
                    AddModuleAuthority::OwnerOrRelayed => {
                        ModuleCore::require_owner_or_relayed(chain, msg, account)?
                    }
                }
                core.add_module(chain, this, account, candidate)?;
                Ok(Bytes::new())
            }
            selectors::RECOVER_TOKEN => {
                core.recover_token(chain, this, args.address(0)?)?;
                Ok(Bytes::new())
            }
            selectors::EXECUTE => {
                let request = ExecuteRequest::decode(args)?;
                let success = self.engine.execute(chain, msg, &self.policy, request)?;
                Ok(abi::returns(&[Token::Bool(success)]))
            }
            selectors::GET_NONCE => {
                let nonce = RelayEngine::nonce(chain, this, args.address(0)?);
                Ok(abi::returns(&[Token::Uint(nonce)]))
            }
            _ => self
                .logic
                .dispatch(chain, msg, selector, args)
                .unwrap_or_else(|| Err(Error::UnknownSelector(selector))),
        }
    }
}
