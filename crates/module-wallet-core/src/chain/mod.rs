//! Serialized execution substrate
//!
//! Contracts are stateless code objects deployed at an address. Their state
//! lives in typed storage slots owned by the [`Chain`], which lets a contract
//! re-enter itself (an account calling a module's `init`, a relay engine
//! calling itself) without aliasing any Rust borrow.
//!
//! Every call frame is atomic: balances and storage are snapshotted when the
//! frame starts and restored if it returns an error, and events it emitted are
//! truncated from the log. Gas is metered per frame and is
//! not refunded on revert.
//!
//! ## Example
//!
//! ```rust,ignore
//! use module_wallet_core::chain::{Chain, Transaction};
//!
//! let mut chain = Chain::default();
//! let token = chain.deploy(Token::new(owner));
//! let receipt = chain.transact(Transaction::new(owner, token, calldata).with_gas_price(price));
//! assert!(receipt.is_success());
//! ```

pub mod token;

use crate::config::ChainConfig;
use crate::types::{Event, LogEntry, Selector, keccak256};
use crate::{Error, Result};
use alloy_primitives::{Address, Bytes, U256};
use chrono::Utc;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

// ============================================================================
// Contracts and messages
// ============================================================================

/// Contract code
pub trait Contract: Send + Sync + fmt::Debug {
    /// Human-readable contract name
    fn name(&self) -> &str;

    /// Handle a message addressed to this contract
    fn call(&self, chain: &mut Chain, msg: &Message) -> Result<Bytes>;
}

/// How a frame was entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallKind {
    /// Regular state-changing call
    #[default]
    Call,
    /// Read-only call: storage writes, value transfers and events fail
    Static,
    /// Trusted self-call issued by a relay engine for the inner call of `execute`
    Relayed,
}

/// A call into a contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Immediate caller
    pub sender: Address,
    /// Callee
    pub to: Address,
    /// Native value attached to the call
    pub value: U256,
    /// Call data
    pub data: Bytes,
    /// Frame kind
    pub kind: CallKind,
}

impl Message {
    /// Selector of the call data, if any
    pub fn selector(&self) -> Option<Selector> {
        Selector::of(&self.data)
    }

    /// True for the trusted self-call marker of a relay engine
    pub fn is_relayed(&self) -> bool {
        self.kind == CallKind::Relayed && self.sender == self.to
    }
}

// ============================================================================
// Storage
// ============================================================================

/// Typed contract storage slot
pub trait ContractState: Any + Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn clone_box(&self) -> Box<dyn ContractState>;
}

impl<T> ContractState for T
where
    T: Any + Clone + Default + Send + Sync + fmt::Debug,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn clone_box(&self) -> Box<dyn ContractState> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn ContractState> {
    fn clone(&self) -> Self {
        (**self).clone_box()
    }
}

/// Balances and storage a reverted frame restores. The event log is
/// append-only and rolled back by truncation instead.
#[derive(Debug, Clone, Default)]
struct WorldState {
    balances: HashMap<Address, U256>,
    storage: HashMap<(Address, TypeId), Box<dyn ContractState>>,
}

// ============================================================================
// Transactions
// ============================================================================

/// A top-level transaction signed by an externally owned address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Sender paying for gas
    pub from: Address,
    /// Target contract
    pub to: Address,
    /// Native value
    pub value: U256,
    /// Call data
    pub data: Bytes,
    /// Price per unit of gas
    pub gas_price: U256,
    /// Gas limit
    pub gas_limit: u64,
}

impl Transaction {
    /// Create a zero-value, zero-price transaction with a 1M gas limit
    pub fn new(from: Address, to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            from,
            to,
            value: U256::ZERO,
            data: data.into(),
            gas_price: U256::ZERO,
            gas_limit: 1_000_000,
        }
    }

    /// Attach native value
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    /// Set the gas price
    pub fn with_gas_price(mut self, gas_price: U256) -> Self {
        self.gas_price = gas_price;
        self
    }

    /// Set the gas limit
    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = gas_limit;
        self
    }
}

/// Outcome of a top-level transaction
#[derive(Debug, Clone)]
pub struct Receipt {
    /// Output or error of the outermost call
    pub result: Result<Bytes>,
    /// Gas consumed
    pub gas_used: u64,
    /// Fee charged to the sender
    pub fee: U256,
    /// Events emitted (empty on failure)
    pub logs: Vec<LogEntry>,
}

impl Receipt {
    /// True if the outermost call succeeded
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Events of this transaction
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.logs.iter().map(|entry| &entry.event)
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct TxEnv {
    origin: Address,
    gas_price: U256,
    gas_limit: u64,
}

// ============================================================================
// Chain
// ============================================================================

/// In-process ledger executing one transaction at a time
#[derive(Debug)]
pub struct Chain {
    config: ChainConfig,
    code: HashMap<Address, Arc<dyn Contract>>,
    state: WorldState,
    logs: Vec<LogEntry>,
    block_number: u64,
    timestamp: u64,
    tx: TxEnv,
    gas_used: u64,
    frames: Vec<Address>,
    static_depth: usize,
    deployed: u64,
}

impl Default for Chain {
    fn default() -> Self {
        Self::new(ChainConfig::default())
    }
}

impl Chain {
    /// Create an empty chain at block 1, timestamped now
    pub fn new(config: ChainConfig) -> Self {
        let timestamp = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
        Self {
            config,
            code: HashMap::new(),
            state: WorldState::default(),
            logs: Vec::new(),
            block_number: 1,
            timestamp,
            tx: TxEnv::default(),
            gas_used: 0,
            frames: Vec::new(),
            static_depth: 0,
            deployed: 0,
        }
    }

    /// Chain configuration
    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    // ============ Genesis ============

    /// Deploy contract code at a fresh deterministic address
    pub fn deploy(&mut self, contract: impl Contract + 'static) -> Address {
        loop {
            self.deployed += 1;
            let mut seed = b"module-wallet/deploy".to_vec();
            seed.extend_from_slice(&self.deployed.to_be_bytes());
            let address = Address::from_slice(&keccak256(&seed)[12..]);
            if !self.code.contains_key(&address) {
                self.deploy_at(address, contract);
                return address;
            }
        }
    }

    /// Deploy contract code at a chosen address
    pub fn deploy_at(&mut self, address: Address, contract: impl Contract + 'static) {
        debug!(%address, name = contract.name(), "Deploying contract");
        self.code.insert(address, Arc::new(contract));
    }

    /// Set a native balance outright
    pub fn set_balance(&mut self, address: Address, balance: U256) {
        self.state.balances.insert(address, balance);
    }

    /// Seed a contract's storage slot outside any transaction
    pub fn install_state<T>(&mut self, address: Address, state: T)
    where
        T: ContractState + Clone + Default,
    {
        self.state
            .storage
            .insert((address, TypeId::of::<T>()), Box::new(state));
    }

    // ============ Block environment ============

    /// Current block number
    pub fn block_number(&self) -> u64 {
        self.block_number
    }

    /// Current block timestamp
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Mine `blocks` empty blocks
    pub fn advance_blocks(&mut self, blocks: u64) {
        self.block_number = self.block_number.saturating_add(blocks);
        self.timestamp = self
            .timestamp
            .saturating_add(blocks.saturating_mul(self.config.block_time));
    }

    /// Move the clock forward without mining
    pub fn advance_time(&mut self, seconds: u64) {
        self.timestamp = self.timestamp.saturating_add(seconds);
    }

    // ============ Transaction environment ============

    /// Gas price of the running transaction
    pub fn tx_gas_price(&self) -> U256 {
        self.tx.gas_price
    }

    /// Sender of the running transaction
    pub fn tx_origin(&self) -> Address {
        self.tx.origin
    }

    /// Gas consumed so far by the running transaction
    pub fn gas_used(&self) -> u64 {
        self.gas_used
    }

    /// True inside a read-only frame
    pub fn is_static(&self) -> bool {
        self.static_depth > 0
    }

    /// Consume gas, failing once the transaction limit is crossed
    pub fn charge_gas(&mut self, amount: u64) -> Result<()> {
        self.gas_used = self.gas_used.saturating_add(amount);
        if self.gas_used > self.tx.gas_limit {
            return Err(Error::OutOfGas {
                limit: self.tx.gas_limit,
            });
        }
        Ok(())
    }

    // ============ State ============

    /// Native balance
    pub fn balance(&self, address: Address) -> U256 {
        self.state.balances.get(&address).copied().unwrap_or_default()
    }

    /// True if code is deployed at the address
    pub fn has_code(&self, address: Address) -> bool {
        self.code.contains_key(&address)
    }

    /// Read a contract's storage slot
    pub fn storage<T>(&self, address: Address) -> Option<&T>
    where
        T: ContractState + Clone + Default,
    {
        self.state
            .storage
            .get(&(address, TypeId::of::<T>()))
            .and_then(|slot| (**slot).as_any().downcast_ref::<T>())
    }

    /// Mutable access to the running contract's own storage slot.
    ///
    /// Fails inside static frames and when a contract reaches for storage it
    /// does not own.
    pub fn storage_mut<T>(&mut self, address: Address) -> Result<&mut T>
    where
        T: ContractState + Clone + Default,
    {
        self.ensure_writable()?;
        if self.frames.last() != Some(&address) {
            return Err(Error::Internal(format!(
                "storage of {address} written outside its own frame"
            )));
        }
        self.charge_gas(self.config.gas.storage_write)?;

        let slot = self
            .state
            .storage
            .entry((address, TypeId::of::<T>()))
            .or_insert_with(|| Box::new(T::default()));
        (**slot)
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or_else(|| Error::Internal("storage slot type mismatch".into()))
    }

    /// Append an event from the running contract
    pub fn emit(&mut self, emitter: Address, event: Event) -> Result<()> {
        self.ensure_writable()?;
        self.charge_gas(self.config.gas.log)?;
        trace!(%emitter, ?event, "Event");
        self.logs.push(LogEntry {
            emitter,
            block: self.block_number,
            event,
        });
        Ok(())
    }

    /// Record an event outside any transaction, such as a deployment
    pub fn log_genesis(&mut self, emitter: Address, event: Event) {
        self.logs.push(LogEntry {
            emitter,
            block: self.block_number,
            event,
        });
    }

    /// Full event log
    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.is_static() {
            return Err(Error::StaticCallViolation);
        }
        Ok(())
    }

    fn transfer_value(&mut self, from: Address, to: Address, value: U256) -> Result<()> {
        if value.is_zero() {
            return Ok(());
        }
        self.ensure_writable()?;
        let available = self.balance(from);
        let remaining = available
            .checked_sub(value)
            .ok_or(Error::InsufficientBalance {
                account: from,
                needed: value,
                available,
            })?;
        let credited = self
            .balance(to)
            .checked_add(value)
            .ok_or(Error::Overflow)?;
        self.state.balances.insert(from, remaining);
        self.state.balances.insert(to, credited);
        Ok(())
    }

    // ============ Calls ============

    /// Value-bearing call from the running contract
    pub fn call(&mut self, from: Address, to: Address, value: U256, data: Bytes) -> Result<Bytes> {
        self.execute(Message {
            sender: from,
            to,
            value,
            data,
            kind: CallKind::Call,
        })
    }

    /// Read-only call from the running contract
    pub fn static_call(&mut self, from: Address, to: Address, data: Bytes) -> Result<Bytes> {
        self.execute(Message {
            sender: from,
            to,
            value: U256::ZERO,
            data,
            kind: CallKind::Static,
        })
    }

    /// Trusted self-call of a relay engine
    pub(crate) fn relay_call(&mut self, module: Address, data: Bytes) -> Result<Bytes> {
        self.execute(Message {
            sender: module,
            to: module,
            value: U256::ZERO,
            data,
            kind: CallKind::Relayed,
        })
    }

    /// Read-only query outside any transaction
    pub fn view(&mut self, to: Address, data: impl Into<Bytes>) -> Result<Bytes> {
        let saved = (self.tx, self.gas_used);
        self.tx = TxEnv {
            origin: Address::ZERO,
            gas_price: U256::ZERO,
            gas_limit: self.config.tx_gas_limit,
        };
        self.gas_used = 0;
        let result = self.static_call(Address::ZERO, to, data.into());
        (self.tx, self.gas_used) = saved;
        result
    }

    fn execute(&mut self, msg: Message) -> Result<Bytes> {
        if self.frames.len() >= self.config.max_call_depth {
            return Err(Error::CallDepthExceeded);
        }
        let data_gas = self
            .config
            .gas
            .calldata_byte
            .saturating_mul(msg.data.len() as u64);
        self.charge_gas(self.config.gas.call.saturating_add(data_gas))?;

        let snapshot = self.state.clone();
        let log_mark = self.logs.len();
        let is_static = msg.kind == CallKind::Static;
        if is_static {
            self.static_depth += 1;
        }
        self.frames.push(msg.to);

        let result = self.run_frame(&msg);

        self.frames.pop();
        if is_static {
            self.static_depth -= 1;
        }
        if result.is_err() {
            self.state = snapshot;
            self.logs.truncate(log_mark);
        }
        result
    }

    fn run_frame(&mut self, msg: &Message) -> Result<Bytes> {
        self.transfer_value(msg.sender, msg.to, msg.value)?;
        match self.code.get(&msg.to).cloned() {
            Some(code) => code.call(self, msg),
            None => Ok(Bytes::new()),
        }
    }

    /// Execute a top-level transaction and charge its fee to the sender
    pub fn transact(&mut self, tx: Transaction) -> Receipt {
        let failed = |error: Error| Receipt {
            result: Err(error),
            gas_used: 0,
            fee: U256::ZERO,
            logs: Vec::new(),
        };

        if tx.gas_limit > self.config.tx_gas_limit {
            return failed(Error::OutOfGas {
                limit: self.config.tx_gas_limit,
            });
        }
        let needed = match U256::from(tx.gas_limit)
            .checked_mul(tx.gas_price)
            .and_then(|cost| cost.checked_add(tx.value))
        {
            Some(needed) => needed,
            None => return failed(Error::Overflow),
        };
        let available = self.balance(tx.from);
        if available < needed {
            return failed(Error::InsufficientBalance {
                account: tx.from,
                needed,
                available,
            });
        }

        self.tx = TxEnv {
            origin: tx.from,
            gas_price: tx.gas_price,
            gas_limit: tx.gas_limit,
        };
        self.gas_used = 0;
        let first_log = self.logs.len();

        let result = self.charge_gas(self.config.gas.intrinsic).and_then(|_| {
            self.call(tx.from, tx.to, tx.value, tx.data.clone())
        });

        let gas_used = self.gas_used.min(tx.gas_limit);
        let fee = U256::from(gas_used).saturating_mul(tx.gas_price);
        let balance = self.balance(tx.from);
        self.state.balances.insert(tx.from, balance.saturating_sub(fee));

        let logs = match &result {
            Ok(_) => self.logs[first_log..].to_vec(),
            Err(error) => {
                debug!(from = %tx.from, to = %tx.to, %error, "Transaction reverted");
                Vec::new()
            }
        };

        self.tx = TxEnv::default();
        self.gas_used = 0;

        Receipt {
            result,
            gas_used,
            fee,
            logs,
        }
    }
}
