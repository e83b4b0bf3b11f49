//! Tests for the async relayer service

use crate::common::{Harness, RECIPIENT, RELAYER, ether};
use alloy_primitives::{Bytes, U256};
use module_wallet_core::module::transfer_manager::{NATIVE_TOKEN, TransferManager};
use module_wallet_core::relayer::Submission;
use module_wallet_core::types::signer_address;
use module_wallet_core::{Error, Event, MetaTransaction, Relayer, SharedChain};
use parking_lot::Mutex;
use std::sync::Arc;

fn transfer_meta(h: &mut Harness, amount: U256) -> MetaTransaction {
    let data = TransferManager::transfer_token_call(h.account, NATIVE_TOKEN, RECIPIENT, amount, Bytes::new());
    h.meta(h.system.transfer_manager, data)
}

fn owner_submission(h: &Harness, meta: MetaTransaction) -> Submission {
    let signatures = meta.sign(&[&h.owner]).unwrap();
    Submission::new(meta, signatures)
}

fn executed_events(chain: &SharedChain) -> usize {
    chain
        .lock()
        .logs()
        .iter()
        .filter(|entry| matches!(entry.event, Event::TransactionExecuted { .. }))
        .count()
}

#[tokio::test]
async fn test_submit_relays_and_records() {
    let mut h = Harness::new();
    h.chain.set_balance(h.account, ether(2));
    let meta = transfer_meta(&mut h, ether(1));
    let submission = owner_submission(&h, meta.clone());

    let chain: SharedChain = Arc::new(Mutex::new(h.chain));
    let relayer = Relayer::new(RELAYER, chain.clone());

    let outcome = relayer.submit(submission.clone()).await.unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.sign_hash, meta.sign_hash());
    assert_eq!(chain.lock().balance(RECIPIENT), ether(1));

    // resubmission answers from the record
    let again = relayer.submit(submission).await.unwrap();
    assert_eq!(again, outcome);
    assert_eq!(executed_events(&chain), 1);
    assert_eq!(relayer.executed_count(), 1);
}

#[tokio::test]
async fn test_duplicate_payloads_execute_once() {
    let mut h = Harness::new();
    h.chain.set_balance(h.account, ether(5));
    let meta = transfer_meta(&mut h, ether(1));
    let submission = owner_submission(&h, meta);

    let chain: SharedChain = Arc::new(Mutex::new(h.chain));
    let relayer = Relayer::new(RELAYER, chain.clone());

    let results = relayer
        .submit_all(vec![submission.clone(), submission.clone(), submission])
        .await;

    assert_eq!(results.len(), 3);
    assert!(results.iter().any(|result| result.is_ok()));
    assert_eq!(executed_events(&chain), 1);
    assert_eq!(chain.lock().balance(RECIPIENT), ether(1));
}

#[tokio::test]
async fn test_batch_of_distinct_payloads() {
    let mut h = Harness::new();
    h.chain.set_balance(h.account, ether(10));
    let submissions: Vec<Submission> = (0..4)
        .map(|_| {
            let meta = transfer_meta(&mut h, ether(1));
            owner_submission(&h, meta)
        })
        .collect();

    let chain: SharedChain = Arc::new(Mutex::new(h.chain));
    let relayer = Relayer::new(RELAYER, chain.clone());

    // nonces only increase, so submit in order
    for submission in submissions {
        let outcome = relayer.submit(submission).await.unwrap();
        assert!(outcome.success);
    }
    assert_eq!(chain.lock().balance(RECIPIENT), ether(4));
    assert_eq!(relayer.executed_count(), 4);
}

#[tokio::test]
async fn test_replay_rejection_is_final() {
    let mut h = Harness::new();
    h.chain.set_balance(h.account, ether(2));
    let newer = transfer_meta(&mut h, ether(1));
    let older = MetaTransaction {
        nonce: newer.nonce - U256::from(1),
        ..newer.clone()
    };
    let newer = owner_submission(&h, newer);
    let older = owner_submission(&h, older);

    let chain: SharedChain = Arc::new(Mutex::new(h.chain));
    let relayer = Relayer::new(RELAYER, chain.clone());

    assert!(relayer.submit(newer).await.is_ok());
    let hash = older.meta.sign_hash();
    let result = relayer.submit(older).await;

    assert!(matches!(result, Err(Error::StaleNonce { .. })));
    assert!(matches!(relayer.outcome(&hash), Some(Err(Error::StaleNonce { .. }))));
}

#[tokio::test]
async fn test_signature_rejection_is_not_final() {
    let mut h = Harness::new();
    let meta = transfer_meta(&mut h, U256::ZERO);
    let stranger = crate::common::key(0x5a);
    let signatures = meta.sign(&[&stranger]).unwrap();
    let hash = meta.sign_hash();

    let chain: SharedChain = Arc::new(Mutex::new(h.chain));
    let relayer = Relayer::new(RELAYER, chain);

    let result = relayer.submit(Submission::new(meta, signatures)).await;
    assert_eq!(result, Err(Error::InvalidSigner(signer_address(&stranger))));
    assert!(relayer.outcome(&hash).is_none());
}
