//! Relayer service
//!
//! Submits signed meta-transactions to module `execute` entry points on a
//! shared chain. Outcomes are remembered by sign hash: once a payload has
//! been executed (successfully or not), or refused by a replay gate, it is
//! never submitted again.

use crate::abi::Args;
use crate::chain::{Chain, Transaction};
use crate::signer::MetaTransaction;
use crate::{Error, Result};
use alloy_primitives::{Address, B256, Bytes, U256};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Chain shared between relayer tasks
pub type SharedChain = Arc<Mutex<Chain>>;

/// Default gas limit of relayer transactions
pub const DEFAULT_TX_GAS_LIMIT: u64 = 2_000_000;

/// Final outcome of a relayed payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayOutcome {
    pub sign_hash: B256,
    /// Inner call succeeded
    pub success: bool,
    pub gas_used: u64,
    /// Fee paid by the relayer
    pub fee: U256,
    /// Number of events emitted
    pub events: usize,
}

/// One relayed submission
#[derive(Debug, Clone)]
pub struct Submission {
    pub meta: MetaTransaction,
    pub signatures: Bytes,
}

impl Submission {
    pub fn new(meta: MetaTransaction, signatures: Bytes) -> Self {
        Self { meta, signatures }
    }
}

/// Relayer bound to an externally owned address
#[derive(Debug, Clone)]
pub struct Relayer {
    address: Address,
    chain: SharedChain,
    outcomes: Arc<DashMap<B256, Result<RelayOutcome>>>,
    tx_gas_limit: u64,
}

impl Relayer {
    /// Relayer sending from `address`
    pub fn new(address: Address, chain: SharedChain) -> Self {
        Self {
            address,
            chain,
            outcomes: Arc::new(DashMap::new()),
            tx_gas_limit: DEFAULT_TX_GAS_LIMIT,
        }
    }

    /// Override the gas limit of relayer transactions
    pub fn with_tx_gas_limit(mut self, gas: u64) -> Self {
        self.tx_gas_limit = gas;
        self
    }

    /// Sending address
    pub fn address(&self) -> Address {
        self.address
    }

    /// Final result recorded for a payload
    pub fn outcome(&self, sign_hash: &B256) -> Option<Result<RelayOutcome>> {
        self.outcomes.get(sign_hash).map(|entry| entry.value().clone())
    }

    /// Number of payloads executed through this relayer
    pub fn executed_count(&self) -> usize {
        self.outcomes.iter().filter(|entry| entry.value().is_ok()).count()
    }

    /// Submit one payload. A payload with a final result returns it without
    /// touching the chain.
    #[instrument(skip_all, fields(module = %submission.meta.module, account = %submission.meta.account))]
    pub async fn submit(&self, submission: Submission) -> Result<RelayOutcome> {
        let sign_hash = submission.meta.sign_hash();
        if let Some(result) = self.outcome(&sign_hash) {
            debug!(%sign_hash, "Payload already final, not resubmitting");
            return result;
        }

        let relayer = self.clone();
        let result = tokio::task::spawn_blocking(move || relayer.send(submission, sign_hash))
            .await
            .map_err(|e| Error::Internal(format!("relayer task failed: {e}")))?;

        match &result {
            Ok(outcome) => {
                info!(%sign_hash, success = outcome.success, fee = %outcome.fee, "Payload relayed");
                self.outcomes.entry(sign_hash).or_insert_with(|| result.clone());
            }
            Err(error) if error.is_replay() => {
                self.outcomes.entry(sign_hash).or_insert_with(|| result.clone());
            }
            Err(_) => {}
        }
        result
    }

    /// Submit payloads concurrently. Results keep the input order.
    pub async fn submit_all(&self, submissions: Vec<Submission>) -> Vec<Result<RelayOutcome>> {
        let handles: Vec<_> = submissions
            .into_iter()
            .map(|submission| {
                let relayer = self.clone();
                tokio::spawn(async move { relayer.submit(submission).await })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(
                handle
                    .await
                    .unwrap_or_else(|e| Err(Error::Internal(format!("relayer task failed: {e}")))),
            );
        }
        results
    }

    fn send(&self, submission: Submission, sign_hash: B256) -> Result<RelayOutcome> {
        let Submission { meta, signatures } = submission;
        let tx = Transaction::new(self.address, meta.module, meta.execute_calldata(signatures))
            .with_gas_price(meta.gas_price)
            .with_gas_limit(self.tx_gas_limit);

        let receipt = self.chain.lock().transact(tx);
        let output = receipt.result.inspect_err(|error| {
            warn!(%sign_hash, %error, "Payload rejected");
        })?;

        Ok(RelayOutcome {
            sign_hash,
            success: Args::new(&output).bool(0)?,
            gas_used: receipt.gas_used,
            fee: receipt.fee,
            events: receipt.logs.len(),
        })
    }
}
