//! # Module Wallet Core
//!
//! Module-gated smart accounts with guardian storage and signed
//! meta-transaction relay.
//!
//! ## Architecture
//!
//! This crate provides:
//! - **Account Gateway**: the account itself. Holds the owner and the set of
//!   authorised modules; only modules may move value or call out through it
//! - **Module Registry**: the curated list of modules an account may adopt
//! - **Guardian Store**: per-account guardians and a time-bounded lock, written
//!   only by authorised modules
//! - **Relay Engine**: executes owner- or guardian-signed calls submitted by a
//!   third-party relayer, with replay protection and gas refunds
//! - **Modules**: transfer, guardian, lock and recovery managers built on the
//!   shared module capability
//!
//! Every contract runs against [`chain::Chain`], a serialized in-process
//! ledger with per-call rollback.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use module_wallet_core::{Chain, Config, Deployment, MetaTransaction};
//! use module_wallet_core::module::guardian_manager::GuardianManager;
//!
//! let mut chain = Chain::default();
//! let system = Deployment::deploy(&mut chain, &Config::default(), registry_owner)?;
//! let account = system.create_account(&mut chain, owner)?;
//!
//! // Owner-signed guardian addition, relayed by anyone
//! let meta = MetaTransaction::new(
//!     system.guardian_manager,
//!     account,
//!     GuardianManager::add_guardian_call(account, guardian),
//! )
//! .with_nonce(nonce_for_block(chain.block_number(), 1));
//! let signatures = meta.sign(&[&owner_key])?;
//! chain.transact(Transaction::new(relayer, system.guardian_manager, meta.execute_calldata(signatures)));
//! ```

pub mod abi;
pub mod account;
pub mod chain;
pub mod config;
pub mod deployment;
pub mod error;
pub mod guardian;
pub mod module;
pub mod registry;
pub mod relay;
pub mod signer;
pub mod types;

// Runtime-dependent modules (require tokio)
#[cfg(feature = "runtime")]
pub mod relayer;

pub use account::{AccountGateway, ModuleCapability};
pub use chain::{Chain, Receipt, Transaction};
pub use config::Config;
pub use deployment::Deployment;
pub use error::{Error, Result};
pub use guardian::GuardianStore;
pub use registry::ModuleRegistry;
pub use relay::{RelayEngine, ReplayProtection, SignaturePolicy, sign_hash};
pub use signer::{MetaTransaction, nonce_for_block};
pub use types::{Event, LogEntry, RecoverableSignature, Selector, keccak256};

#[cfg(feature = "runtime")]
pub use relayer::{Relayer, SharedChain};
