//! Module Registry
//!
//! Owner-gated allow-list of vetted modules and upgraders. Modules consult it
//! before authorising another module on an account.

use crate::abi::{self, Token, selectors};
use crate::chain::{Chain, Contract, Message};
use crate::types::Event;
use crate::{Error, Result};
use alloy_primitives::{Address, B256, Bytes, U256};
use std::collections::HashMap;
use tracing::debug;

/// Registry storage
#[derive(Debug, Clone, Default)]
pub struct RegistryState {
    owner: Address,
    modules: HashMap<Address, B256>,
    upgraders: HashMap<Address, B256>,
}

impl RegistryState {
    /// Registry owner
    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Name of a registered module
    pub fn module_info(&self, module: Address) -> Option<B256> {
        self.modules.get(&module).copied()
    }

    /// Name of a registered upgrader
    pub fn upgrader_info(&self, upgrader: Address) -> Option<B256> {
        self.upgraders.get(&upgrader).copied()
    }
}

/// Namespace an entry lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Namespace {
    Module,
    Upgrader,
}

/// Registry contract code
#[derive(Debug, Clone, Copy, Default)]
pub struct ModuleRegistry;

impl ModuleRegistry {
    /// Deploy a registry owned by `owner`
    pub fn deploy(chain: &mut Chain, owner: Address) -> Address {
        let registry = chain.deploy(ModuleRegistry);
        chain.install_state(
            registry,
            RegistryState {
                owner,
                ..Default::default()
            },
        );
        registry
    }

    /// Registry storage
    pub fn state(chain: &Chain, registry: Address) -> Option<&RegistryState> {
        chain.storage::<RegistryState>(registry)
    }

    /// Registry owner
    pub fn owner(chain: &Chain, registry: Address) -> Address {
        Self::state(chain, registry)
            .map(RegistryState::owner)
            .unwrap_or_default()
    }

    /// True if `module` is registered
    pub fn is_registered_module(chain: &Chain, registry: Address, module: Address) -> bool {
        Self::state(chain, registry).is_some_and(|state| state.modules.contains_key(&module))
    }

    /// True if every entry is a registered module
    pub fn are_registered_modules(chain: &Chain, registry: Address, modules: &[Address]) -> bool {
        modules
            .iter()
            .all(|module| Self::is_registered_module(chain, registry, *module))
    }

    /// True if `upgrader` is registered
    pub fn is_registered_upgrader(chain: &Chain, registry: Address, upgrader: Address) -> bool {
        Self::state(chain, registry).is_some_and(|state| state.upgraders.contains_key(&upgrader))
    }

    // ============ Call data ============

    /// `registerModule(module, name)`
    pub fn register_module_call(module: Address, name: &str) -> Bytes {
        abi::encode_call(
            selectors::REGISTER_MODULE,
            &[Token::Address(module), Token::FixedBytes(name_to_bytes32(name))],
        )
    }

    /// `deregisterModule(module)`
    pub fn deregister_module_call(module: Address) -> Bytes {
        abi::encode_call(selectors::DEREGISTER_MODULE, &[Token::Address(module)])
    }

    /// `registerUpgrader(upgrader, name)`
    pub fn register_upgrader_call(upgrader: Address, name: &str) -> Bytes {
        abi::encode_call(
            selectors::REGISTER_UPGRADER,
            &[Token::Address(upgrader), Token::FixedBytes(name_to_bytes32(name))],
        )
    }

    /// `deregisterUpgrader(upgrader)`
    pub fn deregister_upgrader_call(upgrader: Address) -> Bytes {
        abi::encode_call(selectors::DEREGISTER_UPGRADER, &[Token::Address(upgrader)])
    }

    /// `isRegisteredModule(module)`
    pub fn is_registered_module_call(module: Address) -> Bytes {
        abi::encode_call(selectors::IS_REGISTERED_MODULE, &[Token::Address(module)])
    }

    /// `isRegisteredModule(modules)`
    pub fn are_registered_modules_call(modules: &[Address]) -> Bytes {
        abi::encode_call(
            selectors::ARE_REGISTERED_MODULES,
            &[Token::AddressArray(modules.to_vec())],
        )
    }

    /// `changeOwner(owner)`
    pub fn change_owner_call(owner: Address) -> Bytes {
        abi::encode_call(selectors::CHANGE_OWNER, &[Token::Address(owner)])
    }

    /// `recoverToken(token)`
    pub fn recover_token_call(token: Address) -> Bytes {
        abi::encode_call(selectors::RECOVER_TOKEN, &[Token::Address(token)])
    }

    // ============ Operations ============

    fn only_owner(chain: &Chain, registry: Address, caller: Address) -> Result<()> {
        if Self::owner(chain, registry) != caller {
            return Err(Error::NotContractOwner(caller));
        }
        Ok(())
    }

    fn register(
        chain: &mut Chain,
        registry: Address,
        namespace: Namespace,
        entry: Address,
        name: B256,
    ) -> Result<()> {
        let state = chain.storage_mut::<RegistryState>(registry)?;
        let event = match namespace {
            Namespace::Module => {
                if state.modules.contains_key(&entry) {
                    return Err(Error::ModuleAlreadyRegistered(entry));
                }
                state.modules.insert(entry, name);
                Event::ModuleRegistered {
                    module: entry,
                    name,
                }
            }
            Namespace::Upgrader => {
                if state.upgraders.contains_key(&entry) {
                    return Err(Error::UpgraderAlreadyRegistered(entry));
                }
                state.upgraders.insert(entry, name);
                Event::UpgraderRegistered {
                    upgrader: entry,
                    name,
                }
            }
        };
        debug!(%registry, ?namespace, %entry, "Registered");
        chain.emit(registry, event)
    }

    fn deregister(
        chain: &mut Chain,
        registry: Address,
        namespace: Namespace,
        entry: Address,
    ) -> Result<()> {
        let state = chain.storage_mut::<RegistryState>(registry)?;
        let event = match namespace {
            Namespace::Module => {
                state
                    .modules
                    .remove(&entry)
                    .ok_or(Error::ModuleNotRegistered(entry))?;
                Event::ModuleDeregistered { module: entry }
            }
            Namespace::Upgrader => {
                state
                    .upgraders
                    .remove(&entry)
                    .ok_or(Error::UpgraderNotRegistered(entry))?;
                Event::UpgraderDeregistered { upgrader: entry }
            }
        };
        debug!(%registry, ?namespace, %entry, "Deregistered");
        chain.emit(registry, event)
    }

    fn recover_token(chain: &mut Chain, registry: Address, token: Address) -> Result<()> {
        let owner = Self::owner(chain, registry);
        let output = chain.static_call(
            registry,
            token,
            crate::chain::token::Token::balance_of_call(registry),
        )?;
        let total = abi::Args::new(&output).uint(0)?;
        chain.call(
            registry,
            token,
            U256::ZERO,
            crate::chain::token::Token::transfer_call(owner, total),
        )?;
        Ok(())
    }

    fn change_owner(chain: &mut Chain, registry: Address, owner: Address) -> Result<()> {
        if owner.is_zero() {
            return Err(Error::NullOwner);
        }
        chain.storage_mut::<RegistryState>(registry)?.owner = owner;
        chain.emit(registry, Event::RegistryOwnerChanged { owner })
    }
}

/// Left-aligned, zero-padded 32-byte name
pub fn name_to_bytes32(name: &str) -> B256 {
    let mut bytes = [0u8; 32];
    let len = name.len().min(32);
    bytes[..len].copy_from_slice(&name.as_bytes()[..len]);
    B256::from(bytes)
}

impl Contract for ModuleRegistry {
    fn name(&self) -> &str {
        "ModuleRegistry"
    }

    fn call(&self, chain: &mut Chain, msg: &Message) -> Result<Bytes> {
        let (selector, args) = abi::split_selector(&msg.data)?;
        let this = msg.to;

        match selector {
            selectors::REGISTER_MODULE
            | selectors::DEREGISTER_MODULE
            | selectors::REGISTER_UPGRADER
            | selectors::DEREGISTER_UPGRADER
            | selectors::RECOVER_TOKEN
            | selectors::CHANGE_OWNER => Self::only_owner(chain, this, msg.sender)?,
            _ => {}
        }

        match selector {
            selectors::REGISTER_MODULE => {
                Self::register(chain, this, Namespace::Module, args.address(0)?, args.b256(1)?)?;
                Ok(Bytes::new())
            }
            selectors::DEREGISTER_MODULE => {
                Self::deregister(chain, this, Namespace::Module, args.address(0)?)?;
                Ok(Bytes::new())
            }
            selectors::REGISTER_UPGRADER => {
                Self::register(chain, this, Namespace::Upgrader, args.address(0)?, args.b256(1)?)?;
                Ok(Bytes::new())
            }
            selectors::DEREGISTER_UPGRADER => {
                Self::deregister(chain, this, Namespace::Upgrader, args.address(0)?)?;
                Ok(Bytes::new())
            }
            selectors::RECOVER_TOKEN => {
                Self::recover_token(chain, this, args.address(0)?)?;
                Ok(Bytes::new())
            }
            selectors::CHANGE_OWNER => {
                Self::change_owner(chain, this, args.address(0)?)?;
                Ok(Bytes::new())
            }
            selectors::MODULE_INFO => {
                let entry = args.address(0)?;
                let name = Self::state(chain, this)
                    .and_then(|state| state.module_info(entry))
                    .unwrap_or_default();
                Ok(abi::returns(&[Token::FixedBytes(name)]))
            }
            selectors::UPGRADER_INFO => {
                let entry = args.address(0)?;
                let name = Self::state(chain, this)
                    .and_then(|state| state.upgrader_info(entry))
                    .unwrap_or_default();
                Ok(abi::returns(&[Token::FixedBytes(name)]))
            }
            selectors::IS_REGISTERED_MODULE => {
                let registered = Self::is_registered_module(chain, this, args.address(0)?);
                Ok(abi::returns(&[Token::Bool(registered)]))
            }
            selectors::ARE_REGISTERED_MODULES => {
                let modules = args.address_array(0)?;
                let registered = Self::are_registered_modules(chain, this, &modules);
                Ok(abi::returns(&[Token::Bool(registered)]))
            }
            selectors::IS_REGISTERED_UPGRADER => {
                let registered = Self::is_registered_upgrader(chain, this, args.address(0)?);
                Ok(abi::returns(&[Token::Bool(registered)]))
            }
            selectors::OWNER => Ok(abi::returns(&[Token::Address(Self::owner(chain, this))])),
            other => Err(Error::UnknownSelector(other)),
        }
    }
}
