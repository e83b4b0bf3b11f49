//! Account Gateway
//!
//! The account holds an owner, a set of authorised modules and a static-call
//! routing table. Every mutating operation must first obtain a
//! [`ModuleCapability`], the single authorization predicate of the gateway,
//! proving the caller is a currently authorised module.
//!
//! ## Example
//!
//! ```rust,ignore
//! use module_wallet_core::account::AccountGateway;
//!
//! let account = chain.deploy(AccountGateway);
//! chain.transact(Transaction::new(deployer, account, AccountGateway::init_call(owner, &[module])));
//! assert_eq!(AccountGateway::owner(&chain, account), owner);
//! ```

use crate::abi::{self, Token, selectors};
use crate::chain::{Chain, Contract, Message};
use crate::module::init_call as module_init_call;
use crate::types::{Event, Selector};
use crate::{Error, Result};
use alloy_primitives::{Address, Bytes, U256};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Per-account storage
#[derive(Debug, Clone, Default)]
pub struct AccountState {
    owner: Address,
    modules: usize,
    authorised: HashSet<Address>,
    enabled: HashMap<Selector, Address>,
}

impl AccountState {
    /// Current owner (zero until initialised)
    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Number of authorised modules
    pub fn module_count(&self) -> usize {
        self.modules
    }

    /// Membership test on the authorised-module set
    pub fn is_authorised(&self, module: Address) -> bool {
        self.authorised.contains(&module)
    }

    /// Module a selector is routed to, if any
    pub fn static_route(&self, selector: Selector) -> Option<Address> {
        self.enabled.get(&selector).copied()
    }

    fn is_initialised(&self) -> bool {
        !self.owner.is_zero() || self.modules != 0
    }
}

/// Proof that `module` is an authorised module of `account` at the time it
/// was obtained. All account mutators consume one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleCapability {
    account: Address,
    module: Address,
}

impl ModuleCapability {
    /// Check `caller` against the account's authorised-module set
    pub fn authorize(chain: &Chain, account: Address, caller: Address) -> Result<Self> {
        if AccountGateway::is_authorised(chain, account, caller) {
            Ok(Self {
                account,
                module: caller,
            })
        } else {
            Err(Error::NotAuthorisedModule { account, caller })
        }
    }

    /// Account the capability applies to
    pub fn account(&self) -> Address {
        self.account
    }

    /// Module holding the capability
    pub fn module(&self) -> Address {
        self.module
    }
}

/// Account contract code
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountGateway;

impl AccountGateway {
    // ============ Readers ============

    /// Account storage, if the account was ever touched
    pub fn state(chain: &Chain, account: Address) -> Option<&AccountState> {
        chain.storage::<AccountState>(account)
    }

    /// Current owner
    pub fn owner(chain: &Chain, account: Address) -> Address {
        Self::state(chain, account)
            .map(AccountState::owner)
            .unwrap_or_default()
    }

    /// True if `module` is authorised on `account`
    pub fn is_authorised(chain: &Chain, account: Address, module: Address) -> bool {
        Self::state(chain, account).is_some_and(|state| state.is_authorised(module))
    }

    /// Number of authorised modules
    pub fn module_count(chain: &Chain, account: Address) -> usize {
        Self::state(chain, account)
            .map(AccountState::module_count)
            .unwrap_or_default()
    }

    /// Module a selector is routed to
    pub fn static_route(chain: &Chain, account: Address, selector: Selector) -> Option<Address> {
        Self::state(chain, account).and_then(|state| state.static_route(selector))
    }

    // ============ Call data ============

    /// `init(owner, modules)`
    pub fn init_call(owner: Address, modules: &[Address]) -> Bytes {
        abi::encode_call(
            selectors::ACCOUNT_INIT,
            &[Token::Address(owner), Token::AddressArray(modules.to_vec())],
        )
    }

    /// `authoriseModule(module, value)`
    pub fn authorise_module_call(module: Address, value: bool) -> Bytes {
        abi::encode_call(
            selectors::AUTHORISE_MODULE,
            &[Token::Address(module), Token::Bool(value)],
        )
    }

    /// `enableStaticCall(module, method)`
    pub fn enable_static_call_call(module: Address, method: Selector) -> Bytes {
        abi::encode_call(
            selectors::ENABLE_STATIC_CALL,
            &[Token::Address(module), Token::Selector(method)],
        )
    }

    /// `setOwner(owner)`
    pub fn set_owner_call(owner: Address) -> Bytes {
        abi::encode_call(selectors::SET_OWNER, &[Token::Address(owner)])
    }

    /// `invoke(target, value, data)`
    pub fn invoke_call(target: Address, value: U256, data: Bytes) -> Bytes {
        abi::encode_call(
            selectors::INVOKE,
            &[Token::Address(target), Token::Uint(value), Token::Bytes(data)],
        )
    }

    // ============ Operations ============

    fn init(chain: &mut Chain, this: Address, owner: Address, modules: Vec<Address>) -> Result<()> {
        if Self::state(chain, this).is_some_and(AccountState::is_initialised) {
            return Err(Error::AlreadyInitialised);
        }
        if modules.is_empty() {
            return Err(Error::NoModules);
        }
        if owner.is_zero() {
            return Err(Error::NullOwner);
        }

        let state = chain.storage_mut::<AccountState>(this)?;
        state.owner = owner;
        state.modules = modules.len();

        for module in modules {
            let state = chain.storage_mut::<AccountState>(this)?;
            if !state.authorised.insert(module) {
                return Err(Error::DuplicateModule(module));
            }
            chain.call(this, module, U256::ZERO, module_init_call(this))?;
            chain.emit(this, Event::AuthorisedModule { module, value: true })?;
        }

        let balance = chain.balance(this);
        if !balance.is_zero() {
            chain.emit(
                this,
                Event::Received {
                    value: balance,
                    sender: Address::ZERO,
                    data: Bytes::new(),
                },
            )?;
        }

        debug!(account = %this, %owner, modules = Self::module_count(chain, this), "Account initialised");
        Ok(())
    }

    fn authorise_module(
        chain: &mut Chain,
        cap: ModuleCapability,
        module: Address,
        value: bool,
    ) -> Result<()> {
        let this = cap.account();
        if Self::is_authorised(chain, this, module) == value {
            return Ok(());
        }

        chain.emit(this, Event::AuthorisedModule { module, value })?;
        let state = chain.storage_mut::<AccountState>(this)?;
        if value {
            state.modules += 1;
            state.authorised.insert(module);
            chain.call(this, module, U256::ZERO, module_init_call(this))?;
        } else {
            if state.modules <= 1 {
                return Err(Error::LastModule);
            }
            state.modules -= 1;
            state.authorised.remove(&module);
        }

        debug!(account = %this, %module, value, by = %cap.module(), "Module authorisation changed");
        Ok(())
    }

    fn enable_static_call(
        chain: &mut Chain,
        cap: ModuleCapability,
        module: Address,
        method: Selector,
    ) -> Result<()> {
        let this = cap.account();
        if !Self::is_authorised(chain, this, module) {
            return Err(Error::StaticRouteNotAuthorised(module));
        }
        chain
            .storage_mut::<AccountState>(this)?
            .enabled
            .insert(method, module);
        chain.emit(this, Event::EnabledStaticCall { module, method })
    }

    fn set_owner(chain: &mut Chain, cap: ModuleCapability, owner: Address) -> Result<()> {
        if owner.is_zero() {
            return Err(Error::NullOwner);
        }
        let this = cap.account();
        chain.storage_mut::<AccountState>(this)?.owner = owner;
        chain.emit(this, Event::OwnerChanged { owner })
    }

    fn invoke(
        chain: &mut Chain,
        cap: ModuleCapability,
        target: Address,
        value: U256,
        data: Bytes,
    ) -> Result<Bytes> {
        let this = cap.account();
        // Downstream failures surface unchanged
        let output = chain.call(this, target, value, data.clone())?;
        chain.emit(
            this,
            Event::Invoked {
                module: cap.module(),
                target,
                value,
                data,
            },
        )?;
        Ok(abi::returns(&[Token::Bytes(output)]))
    }

    fn fallback(chain: &mut Chain, msg: &Message) -> Result<Bytes> {
        let this = msg.to;
        let route = msg
            .selector()
            .and_then(|selector| Self::static_route(chain, this, selector));

        match route {
            Some(module) => {
                if !Self::is_authorised(chain, this, module) {
                    return Err(Error::StaticRouteNotAuthorised(module));
                }
                chain.static_call(this, module, msg.data.clone())
            }
            None => {
                chain.emit(
                    this,
                    Event::Received {
                        value: msg.value,
                        sender: msg.sender,
                        data: msg.data.clone(),
                    },
                )?;
                Ok(Bytes::new())
            }
        }
    }
}

impl Contract for AccountGateway {
    fn name(&self) -> &str {
        "Account"
    }

    fn call(&self, chain: &mut Chain, msg: &Message) -> Result<Bytes> {
        let Ok((selector, args)) = abi::split_selector(&msg.data) else {
            return Self::fallback(chain, msg);
        };
        let this = msg.to;

        match selector {
            selectors::ACCOUNT_INIT => {
                Self::init(chain, this, args.address(0)?, args.address_array(1)?)?;
                Ok(Bytes::new())
            }
            selectors::AUTHORISE_MODULE => {
                let cap = ModuleCapability::authorize(chain, this, msg.sender)?;
                Self::authorise_module(chain, cap, args.address(0)?, args.bool(1)?)?;
                Ok(Bytes::new())
            }
            selectors::ENABLE_STATIC_CALL => {
                let cap = ModuleCapability::authorize(chain, this, msg.sender)?;
                Self::enable_static_call(chain, cap, args.address(0)?, args.selector(1)?)?;
                Ok(Bytes::new())
            }
            selectors::SET_OWNER => {
                let cap = ModuleCapability::authorize(chain, this, msg.sender)?;
                Self::set_owner(chain, cap, args.address(0)?)?;
                Ok(Bytes::new())
            }
            selectors::INVOKE => {
                let cap = ModuleCapability::authorize(chain, this, msg.sender)?;
                Self::invoke(chain, cap, args.address(0)?, args.uint(1)?, args.bytes(2)?)
            }
            selectors::OWNER => Ok(abi::returns(&[Token::Address(Self::owner(chain, this))])),
            selectors::AUTHORISED => {
                let module = args.address(0)?;
                Ok(abi::returns(&[Token::Bool(Self::is_authorised(
                    chain, this, module,
                ))]))
            }
            selectors::ENABLED => {
                let route = Self::static_route(chain, this, args.selector(0)?).unwrap_or_default();
                Ok(abi::returns(&[Token::Address(route)]))
            }
            selectors::MODULES => {
                let count = Self::module_count(chain, this);
                Ok(abi::returns(&[Token::Uint(U256::from(count))]))
            }
            _ => Self::fallback(chain, msg),
        }
    }
}
