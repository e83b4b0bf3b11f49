//! Relay Engine
//!
//! Executes signed meta-transactions on behalf of an account. A relayer
//! submits `execute(account, data, nonce, signatures, gasPrice, gasLimit)`
//! to a module; the engine checks uniqueness, target, signature count and
//! refund feasibility, validates the signatures, replays `data` against the
//! module through a trusted self-call and reimburses the relayer from the
//! account when the call required more than one signature.
//!
//! The signature policy and the replay protection scheme are chosen when the
//! module is constructed.
//!
//! ## Example
//!
//! ```rust,ignore
//! use module_wallet_core::relay::{RelayEngine, ReplayProtection, sign_hash};
//!
//! let engine = RelayEngine::new(ReplayProtection::SignHashSet, RelayConfig::default());
//! let hash = sign_hash(module, account, &data, nonce, gas_price, gas_limit);
//! ```

pub mod single_sig;

use crate::abi::{self, Args, Token, selectors};
use crate::account::AccountGateway;
use crate::chain::{Chain, Message};
use crate::config::RelayConfig;
use crate::module::ModuleCore;
use crate::types::{Event, RecoverableSignature, SIGNATURE_LENGTH, eth_signed_message_hash, keccak256};
use crate::{Error, Result};
use alloy_primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{info, instrument, warn};

pub use single_sig::OwnerSignature;

/// Minimum relayed data: selector plus the account word
pub const MIN_RELAYED_DATA: usize = 4 + 32;

// ============================================================================
// Policies
// ============================================================================

/// Replay protection scheme of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayProtection {
    /// Every consumed sign hash is remembered
    SignHashSet,
    /// Strictly increasing `block || counter` nonce per account
    MonotonicNonce,
}

/// Signature requirements of a module
pub trait SignaturePolicy: Send + Sync + fmt::Debug {
    /// Number of signatures `data` needs when relayed for `account`
    fn required_signatures(
        &self,
        chain: &Chain,
        module: Address,
        account: Address,
        data: &[u8],
    ) -> Result<usize>;

    /// Check the recovered signers against the policy
    fn validate_signatures(
        &self,
        chain: &Chain,
        module: Address,
        account: Address,
        data: &[u8],
        sign_hash: &B256,
        signatures: &[RecoverableSignature],
    ) -> Result<()>;
}

// ============================================================================
// Bookkeeping
// ============================================================================

/// Replay bookkeeping of one account
#[derive(Debug, Clone, Default)]
pub struct RelayBook {
    nonce: U256,
    executed: HashSet<B256>,
}

/// Relay storage of a module
#[derive(Debug, Clone, Default)]
pub struct RelayState {
    books: HashMap<Address, RelayBook>,
}

/// Arguments of `execute`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteRequest {
    pub account: Address,
    pub data: Bytes,
    pub nonce: U256,
    pub signatures: Bytes,
    pub gas_price: U256,
    pub gas_limit: U256,
}

impl ExecuteRequest {
    /// Decode from `execute` arguments
    pub fn decode(args: Args<'_>) -> Result<Self> {
        Ok(Self {
            account: args.address(0)?,
            data: args.bytes(1)?,
            nonce: args.uint(2)?,
            signatures: args.bytes(3)?,
            gas_price: args.uint(4)?,
            gas_limit: args.uint(5)?,
        })
    }

    /// `execute(...)` call data
    pub fn encode(&self) -> Bytes {
        abi::encode_call(
            selectors::EXECUTE,
            &[
                Token::Address(self.account),
                Token::Bytes(self.data.clone()),
                Token::Uint(self.nonce),
                Token::Bytes(self.signatures.clone()),
                Token::Uint(self.gas_price),
                Token::Uint(self.gas_limit),
            ],
        )
    }
}

/// Digest signed by the principals of a relayed call: a personal-message hash
/// over `keccak256(0x19 || 0x00 || module || account || 0 || data || nonce ||
/// gasPrice || gasLimit)`.
pub fn sign_hash(
    module: Address,
    account: Address,
    data: &[u8],
    nonce: U256,
    gas_price: U256,
    gas_limit: U256,
) -> B256 {
    let mut packed = Vec::with_capacity(2 + 20 + 20 + 32 * 4 + data.len());
    packed.extend_from_slice(&[0x19, 0x00]);
    packed.extend_from_slice(module.as_slice());
    packed.extend_from_slice(account.as_slice());
    packed.extend_from_slice(&U256::ZERO.to_be_bytes::<32>());
    packed.extend_from_slice(data);
    packed.extend_from_slice(&nonce.to_be_bytes::<32>());
    packed.extend_from_slice(&gas_price.to_be_bytes::<32>());
    packed.extend_from_slice(&gas_limit.to_be_bytes::<32>());
    eth_signed_message_hash(&keccak256(&packed))
}

/// Account named by the first argument of relayed call data
pub fn target_account(data: &[u8]) -> Result<Address> {
    if data.len() < MIN_RELAYED_DATA {
        return Err(Error::InvalidData(data.len()));
    }
    Ok(Address::from_slice(&data[16..MIN_RELAYED_DATA]))
}

/// Block component (upper 128 bits) of a monotonic nonce
pub fn nonce_block(nonce: U256) -> U256 {
    nonce >> 128
}

/// `getNonce(account)` call data
pub fn get_nonce_call(account: Address) -> Bytes {
    abi::encode_call(selectors::GET_NONCE, &[Token::Address(account)])
}

// ============================================================================
// Engine
// ============================================================================

/// Meta-transaction executor embedded in a module
#[derive(Debug, Clone, Copy)]
pub struct RelayEngine {
    replay: ReplayProtection,
    config: RelayConfig,
}

impl RelayEngine {
    /// Create an engine with the given replay protection
    pub fn new(replay: ReplayProtection, config: RelayConfig) -> Self {
        Self { replay, config }
    }

    /// Replay protection scheme
    pub fn replay(&self) -> ReplayProtection {
        self.replay
    }

    /// Last consumed nonce of `account` on `module`
    pub fn nonce(chain: &Chain, module: Address, account: Address) -> U256 {
        chain
            .storage::<RelayState>(module)
            .and_then(|state| state.books.get(&account))
            .map(|book| book.nonce)
            .unwrap_or_default()
    }

    /// True if `hash` was consumed for `account` on `module`
    pub fn is_executed(chain: &Chain, module: Address, account: Address, hash: &B256) -> bool {
        chain
            .storage::<RelayState>(module)
            .and_then(|state| state.books.get(&account))
            .is_some_and(|book| book.executed.contains(hash))
    }

    fn check_and_update_uniqueness(
        &self,
        chain: &mut Chain,
        module: Address,
        account: Address,
        nonce: U256,
        hash: B256,
    ) -> Result<()> {
        let block_number = chain.block_number();
        let book = chain
            .storage_mut::<RelayState>(module)?
            .books
            .entry(account)
            .or_default();

        match self.replay {
            ReplayProtection::SignHashSet => {
                if !book.executed.insert(hash) {
                    return Err(Error::DuplicateRequest(hash));
                }
            }
            ReplayProtection::MonotonicNonce => {
                if nonce <= book.nonce {
                    return Err(Error::StaleNonce {
                        nonce,
                        current: book.nonce,
                    });
                }
                let block = nonce_block(nonce);
                let bound = U256::from(block_number) + U256::from(self.config.block_bound);
                if block > bound {
                    return Err(Error::NonceTooFarAhead {
                        block,
                        bound: self.config.block_bound,
                    });
                }
                book.nonce = nonce;
            }
        }
        Ok(())
    }

    fn ensure_refundable(
        chain: &Chain,
        module: Address,
        account: Address,
        gas_price: U256,
        gas_limit: U256,
    ) -> Result<()> {
        let affordable = gas_limit
            .checked_mul(gas_price)
            .is_some_and(|cost| chain.balance(account) >= cost);
        if !affordable || !AccountGateway::is_authorised(chain, account, module) {
            return Err(Error::CannotRefund(account));
        }
        Ok(())
    }

    /// Every gate before the inner call. Returns the required signature count.
    fn admit<P>(
        &self,
        chain: &mut Chain,
        module: Address,
        policy: &P,
        request: &ExecuteRequest,
        hash: B256,
    ) -> Result<usize>
    where
        P: SignaturePolicy + ?Sized,
    {
        let account = request.account;
        self.check_and_update_uniqueness(chain, module, account, request.nonce, hash)?;

        let target = target_account(&request.data)?;
        if target != account {
            return Err(Error::TargetMismatch {
                expected: account,
                actual: target,
            });
        }

        let required = policy.required_signatures(chain, module, account, &request.data)?;
        let expected = required * SIGNATURE_LENGTH;
        if request.signatures.len() != expected {
            return Err(Error::InvalidSignatureLength {
                expected,
                actual: request.signatures.len(),
            });
        }

        if !request.gas_price.is_zero() && required > 1 {
            Self::ensure_refundable(chain, module, account, request.gas_price, request.gas_limit)?;
        }

        if required > 0 {
            let signatures = RecoverableSignature::split(&request.signatures)?;
            policy.validate_signatures(chain, module, account, &request.data, &hash, &signatures)?;
        }
        Ok(required)
    }

    /// Run `execute`. Gate failures abort; the inner call's failure is
    /// reported as `Ok(false)`.
    #[instrument(skip_all, fields(module = %msg.to, account = %request.account, nonce = %request.nonce))]
    pub fn execute<P>(
        &self,
        chain: &mut Chain,
        msg: &Message,
        policy: &P,
        request: ExecuteRequest,
    ) -> Result<bool>
    where
        P: SignaturePolicy + ?Sized,
    {
        let start_gas = chain.gas_used();
        let module = msg.to;
        let hash = sign_hash(
            module,
            request.account,
            &request.data,
            request.nonce,
            request.gas_price,
            request.gas_limit,
        );

        let required = self
            .admit(chain, module, policy, &request, hash)
            .inspect_err(|error| warn!(%error, sign_hash = %hash, "Relayed call rejected"))?;

        let success = match chain.relay_call(module, request.data.clone()) {
            Ok(_) => true,
            Err(error) => {
                warn!(%error, sign_hash = %hash, "Relayed call failed");
                false
            }
        };

        if !request.gas_price.is_zero() && required > 1 {
            self.refund(chain, module, &request, start_gas, msg.sender)?;
        }

        chain.emit(
            module,
            Event::TransactionExecuted {
                account: request.account,
                success,
                sign_hash: hash,
            },
        )?;
        info!(success, sign_hash = %hash, "Relayed call executed");
        Ok(success)
    }

    fn refund(
        &self,
        chain: &mut Chain,
        module: Address,
        request: &ExecuteRequest,
        start_gas: u64,
        relayer: Address,
    ) -> Result<()> {
        let consumed = chain.gas_used().saturating_sub(start_gas);
        let amount = U256::from(self.config.refund_overhead_gas) + U256::from(consumed);
        if amount > request.gas_limit {
            warn!(%amount, gas_limit = %request.gas_limit, "Refund exceeds signed gas limit, skipping");
            return Ok(());
        }

        let price = request.gas_price.min(chain.tx_gas_price());
        let value = amount.checked_mul(price).ok_or(Error::Overflow)?;
        ModuleCore::forward_via_account(chain, module, request.account, relayer, value, Bytes::new())?;
        info!(%relayer, %value, "Relayer refunded");
        Ok(())
    }
}
