//! Error types for module wallet operations
//!
//! Every failure that aborts a call is one of these variants. Errors are
//! `Clone + Eq` so a downstream failure can be handed back to the original
//! caller unchanged, however many forwarding frames it crossed.

use crate::types::Selector;
use alloy_primitives::{Address, B256, Bytes, U256};
use thiserror::Error;

/// Result type alias for module wallet operations
pub type Result<T> = std::result::Result<T, Error>;

/// Selector of the standard `Error(string)` revert payload
pub const ERROR_STRING_SELECTOR: Selector = Selector::new([0x08, 0xc3, 0x79, 0xa0]);

/// Errors that can occur while executing against the chain
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // ============ Precondition Errors ============
    /// Account `init` was called twice
    #[error("account already initialised")]
    AlreadyInitialised,

    /// Account `init` was called with an empty module list
    #[error("construction requires at least one module")]
    NoModules,

    /// Module appears twice in an `init` list
    #[error("module {0} is already added")]
    DuplicateModule(Address),

    /// Removing the module would leave the account without modules
    #[error("account must have at least one module")]
    LastModule,

    /// Null owner
    #[error("owner cannot be the null address")]
    NullOwner,

    /// Module is not in the registry
    #[error("module {0} is not registered")]
    ModuleNotRegistered(Address),

    /// Module is already in the registry
    #[error("module {0} already exists")]
    ModuleAlreadyRegistered(Address),

    /// Upgrader is not in the registry
    #[error("upgrader {0} does not exist")]
    UpgraderNotRegistered(Address),

    /// Upgrader is already in the registry
    #[error("upgrader {0} already exists")]
    UpgraderAlreadyRegistered(Address),

    /// Operation needs guardians but the account has none
    #[error("no guardians set on {0}")]
    NoGuardians(Address),

    /// Guardian is already registered for the account
    #[error("guardian {0} already exists")]
    GuardianExists(Address),

    /// Guardian is not registered for the account
    #[error("guardian {0} not found")]
    GuardianNotFound(Address),

    /// The account owner cannot be its own guardian
    #[error("owner {0} cannot be a guardian")]
    OwnerAsGuardian(Address),

    /// Account is locked
    #[error("account {0} is locked")]
    AccountLocked(Address),

    /// Account is not locked
    #[error("account {0} is not locked")]
    AccountNotLocked(Address),

    /// Lock was set by another module
    #[error("account {account} was locked by {locker}")]
    LockedByOtherModule { account: Address, locker: Address },

    /// A recovery is already pending
    #[error("recovery already pending for {0}")]
    RecoveryPending(Address),

    /// No recovery is pending
    #[error("no recovery pending for {0}")]
    NoRecoveryPending(Address),

    /// Recovery period has not elapsed
    #[error("recovery period not elapsed: executable after {execute_after}")]
    RecoveryPeriodNotElapsed { execute_after: u64 },

    /// Invalid recovery address
    #[error("invalid recovery address: {0}")]
    InvalidRecoveryAddress(Address),

    // ============ Authorization Errors ============
    /// Caller is not an authorised module of the account
    #[error("caller {caller} is not an authorised module of {account}")]
    NotAuthorisedModule { account: Address, caller: Address },

    /// Static route points to a module that is no longer authorised
    #[error("static route target {0} is not an authorised module")]
    StaticRouteNotAuthorised(Address),

    /// Caller must be the account itself
    #[error("caller {0} must be the account")]
    NotAccount(Address),

    /// Caller must be the account owner
    #[error("caller {0} must be an owner of the account")]
    NotOwner(Address),

    /// Operation may only be reached through `execute`
    #[error("must be called via execute()")]
    NotRelayed,

    /// Caller must be a guardian of the account
    #[error("caller {0} must be a guardian")]
    NotGuardian(Address),

    /// Caller must be the registry (or token) owner
    #[error("caller {0} must be the owner")]
    NotContractOwner(Address),

    // ============ Replay Errors ============
    /// Signed payload was already executed
    #[error("duplicate request {0}")]
    DuplicateRequest(B256),

    /// Nonce is not above the last consumed nonce
    #[error("stale nonce {nonce} (current {current})")]
    StaleNonce { nonce: U256, current: U256 },

    /// Block component of the nonce is beyond the look-ahead window
    #[error("nonce block {block} exceeds bound {bound}")]
    NonceTooFarAhead { block: U256, bound: u64 },

    // ============ Relay Errors ============
    /// Relayed data targets another account
    #[error("relayed data targets {actual}, expected {expected}")]
    TargetMismatch { expected: Address, actual: Address },

    /// Relayed data too short to carry a target account
    #[error("invalid relayed data ({0} bytes)")]
    InvalidData(usize),

    /// Signature blob does not match the required count
    #[error("invalid signatures length: expected {expected}, got {actual}")]
    InvalidSignatureLength { expected: usize, actual: usize },

    /// Account cannot pay the relayer refund
    #[error("cannot refund relayer from {0}")]
    CannotRefund(Address),

    // ============ Cryptographic Errors ============
    /// Recoverable signature with a `v` outside {27, 28}
    #[error("invalid signature v value {0}")]
    InvalidSignatureV(u8),

    /// Signature could not be parsed or recovered
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    /// Recovered signer is not the expected principal
    #[error("invalid signer {0}")]
    InvalidSigner(Address),

    /// Multiple signers not in strictly ascending order (or duplicated)
    #[error("signers must be sorted and unique")]
    UnsortedSigners,

    // ============ Call Errors ============
    /// Raw failure data from a downstream call
    #[error("call reverted: 0x{}", hex::encode(.0))]
    Reverted(Bytes),

    /// Value transfer exceeds the sender's balance
    #[error("insufficient balance in {account}: needed {needed}, available {available}")]
    InsufficientBalance {
        account: Address,
        needed: U256,
        available: U256,
    },

    /// No operation matches the selector
    #[error("unknown selector {0}")]
    UnknownSelector(Selector),

    /// State write attempted inside a static call
    #[error("state modification in static call")]
    StaticCallViolation,

    /// Call stack too deep
    #[error("call depth exceeded")]
    CallDepthExceeded,

    /// Transaction ran out of gas
    #[error("out of gas: limit {limit}")]
    OutOfGas { limit: u64 },

    /// Call data could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// Arithmetic overflow
    #[error("arithmetic overflow")]
    Overflow,

    // ============ Configuration Errors ============
    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Raw failure payload a caller observes for this error.
    ///
    /// Downstream failures keep their original bytes; everything else is
    /// rendered as an `Error(string)` revert.
    pub fn revert_data(&self) -> Bytes {
        match self {
            Error::Reverted(data) => data.clone(),
            other => crate::abi::encode_call(
                ERROR_STRING_SELECTOR,
                &[crate::abi::Token::String(other.to_string())],
            ),
        }
    }

    /// Replay/ordering violation: the payload is dead and must not be retried
    pub fn is_replay(&self) -> bool {
        matches!(
            self,
            Error::DuplicateRequest(_) | Error::StaleNonce { .. } | Error::NonceTooFarAhead { .. }
        )
    }

    /// Caller lacked the required authority
    pub fn is_authorization(&self) -> bool {
        matches!(
            self,
            Error::NotAuthorisedModule { .. }
                | Error::StaticRouteNotAuthorised(_)
                | Error::NotAccount(_)
                | Error::NotOwner(_)
                | Error::NotRelayed
                | Error::NotGuardian(_)
                | Error::NotContractOwner(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Error::Decode(e.to_string())
    }
}
