//! Unit tests for the relay engine gates, replay protection and refunds

use crate::common::{Harness, RECIPIENT, RELAYER, count_events, ether, executed, key};
use alloy_primitives::{Bytes, U256};
use module_wallet_core::abi::{self, Token, selectors};
use module_wallet_core::module::guardian_manager::GuardianManager;
use module_wallet_core::module::recovery_manager::RecoveryManager;
use module_wallet_core::module::transfer_manager::{NATIVE_TOKEN, TransferManager};
use module_wallet_core::types::signer_address;
use module_wallet_core::{Error, Event, GuardianStore, RelayEngine, nonce_for_block};

fn gwei(amount: u64) -> U256 {
    U256::from(amount) * U256::from(1_000_000_000u64)
}

fn send_call(h: &Harness, amount: U256) -> Bytes {
    TransferManager::transfer_token_call(h.account, NATIVE_TOKEN, RECIPIENT, amount, Bytes::new())
}

// ============================================================================
// Happy path
// ============================================================================

#[test]
fn test_owner_signed_relay_executes() {
    let mut h = Harness::new();
    let guardian = signer_address(&key(0x31));
    let meta = h.meta(
        h.system.guardian_manager,
        GuardianManager::add_guardian_call(h.account, guardian),
    );

    let receipt = h.relay_as_owner(&meta);

    assert!(executed(&receipt));
    assert!(GuardianStore::is_guardian(&h.chain, h.system.guardian_store, h.account, guardian));
    assert_eq!(
        RelayEngine::nonce(&h.chain, h.system.guardian_manager, h.account),
        meta.nonce
    );
    assert!(receipt.events().any(|event| *event
        == Event::TransactionExecuted {
            account: h.account,
            success: true,
            sign_hash: meta.sign_hash(),
        }));
}

#[test]
fn test_get_nonce_view() {
    let mut h = Harness::new();
    h.chain.set_balance(h.account, ether(1));
    let meta = h.meta(h.system.transfer_manager, send_call(&h, ether(1)));
    h.relay_as_owner(&meta);

    let output = h
        .chain
        .view(h.system.transfer_manager, module_wallet_core::relay::get_nonce_call(h.account))
        .unwrap();
    assert_eq!(abi::Args::new(&output).uint(0).unwrap(), meta.nonce);
}

// ============================================================================
// Gates
// ============================================================================

#[test]
fn test_replayed_nonce_is_stale() {
    let mut h = Harness::new();
    h.chain.set_balance(h.account, ether(2));
    let meta = h.meta(h.system.transfer_manager, send_call(&h, ether(1)));

    assert!(executed(&h.relay_as_owner(&meta)));
    let receipt = h.relay_as_owner(&meta);

    assert_eq!(
        receipt.result,
        Err(Error::StaleNonce {
            nonce: meta.nonce,
            current: meta.nonce,
        })
    );
    assert_eq!(h.chain.balance(RECIPIENT), ether(1));
}

#[test]
fn test_lower_nonce_in_same_block_is_stale() {
    let mut h = Harness::new();
    h.chain.set_balance(h.account, ether(2));
    let block = h.chain.block_number();

    let later = h
        .meta(h.system.transfer_manager, send_call(&h, ether(1)))
        .with_nonce(nonce_for_block(block, 5));
    assert!(executed(&h.relay_as_owner(&later)));

    let earlier = later.clone().with_nonce(nonce_for_block(block, 3));
    let receipt = h.relay_as_owner(&earlier);

    assert_eq!(
        receipt.result,
        Err(Error::StaleNonce {
            nonce: earlier.nonce,
            current: later.nonce,
        })
    );
    assert_eq!(h.chain.balance(RECIPIENT), ether(1));
}

#[test]
fn test_nonce_block_bound() {
    let mut h = Harness::new();
    h.chain.set_balance(h.account, ether(2));
    let block = h.chain.block_number();
    let bound = h.config.relay.block_bound;

    let too_far = h
        .meta(h.system.transfer_manager, send_call(&h, ether(1)))
        .with_nonce(nonce_for_block(block + bound + 1, 1));
    let receipt = h.relay_as_owner(&too_far);
    assert_eq!(
        receipt.result,
        Err(Error::NonceTooFarAhead {
            block: U256::from(block + bound + 1),
            bound,
        })
    );

    let at_bound = too_far.with_nonce(nonce_for_block(block + bound, 1));
    assert!(executed(&h.relay_as_owner(&at_bound)));
}

#[test]
fn test_signature_blob_length_must_match() {
    let mut h = Harness::new();
    let meta = h.meta(h.system.transfer_manager, send_call(&h, U256::ZERO));

    let receipt = h.relay(&meta, Bytes::new());
    assert_eq!(
        receipt.result,
        Err(Error::InvalidSignatureLength {
            expected: 65,
            actual: 0,
        })
    );

    let doubled = meta.sign(&[&h.owner, &h.owner]).unwrap();
    let receipt = h.relay(&meta, doubled);
    assert_eq!(
        receipt.result,
        Err(Error::InvalidSignatureLength {
            expected: 65,
            actual: 130,
        })
    );
}

#[test]
fn test_rejected_payload_leaves_nonce_unused() {
    let mut h = Harness::new();
    let meta = h.meta(h.system.transfer_manager, send_call(&h, U256::ZERO));

    assert!(h.relay(&meta, Bytes::new()).result.is_err());
    assert_eq!(
        RelayEngine::nonce(&h.chain, h.system.transfer_manager, h.account),
        U256::ZERO
    );
    assert!(executed(&h.relay_as_owner(&meta)));
}

#[test]
fn test_signature_from_stranger_rejected() {
    let mut h = Harness::new();
    let stranger = key(0x66);
    let meta = h.meta(h.system.transfer_manager, send_call(&h, U256::ZERO));
    let signatures = meta.sign(&[&stranger]).unwrap();

    let receipt = h.relay(&meta, signatures);
    assert_eq!(receipt.result, Err(Error::InvalidSigner(signer_address(&stranger))));
}

#[test]
fn test_data_must_target_the_account() {
    let mut h = Harness::new();
    let other = signer_address(&key(0x44));
    let data = TransferManager::transfer_token_call(other, NATIVE_TOKEN, RECIPIENT, U256::ZERO, Bytes::new());
    let meta = h.meta(h.system.transfer_manager, data);

    let receipt = h.relay_as_owner(&meta);
    assert_eq!(
        receipt.result,
        Err(Error::TargetMismatch {
            expected: h.account,
            actual: other,
        })
    );
}

#[test]
fn test_short_data_rejected() {
    let mut h = Harness::new();
    let mut data = selectors::LOCK.as_slice().to_vec();
    data.extend_from_slice(&[0u8; 10]);
    let meta = h.meta(h.system.transfer_manager, Bytes::from(data));

    assert_eq!(h.relay_as_owner(&meta).result, Err(Error::InvalidData(14)));
}

#[test]
fn test_relayed_entry_points_refuse_direct_calls() {
    let mut h = Harness::with_guardians(1);
    let guardian = h.guardian_addresses()[0];

    let receipt = h.call(
        guardian,
        h.system.recovery_manager,
        RecoveryManager::execute_recovery_call(h.account, RECIPIENT),
    );
    assert_eq!(receipt.result, Err(Error::NotRelayed));
}

// ============================================================================
// Inner call failures
// ============================================================================

#[test]
fn test_inner_failure_reports_false_and_consumes_nonce() {
    let mut h = Harness::new();
    let meta = h.meta(h.system.transfer_manager, send_call(&h, ether(5)));

    let receipt = h.relay_as_owner(&meta);

    assert!(receipt.is_success());
    assert!(!executed(&receipt));
    assert_eq!(
        RelayEngine::nonce(&h.chain, h.system.transfer_manager, h.account),
        meta.nonce
    );
    assert_eq!(
        count_events(&receipt, |event| matches!(
            event,
            Event::TransactionExecuted { success: false, .. }
        )),
        1
    );
    assert_eq!(count_events(&receipt, |event| matches!(event, Event::Transfer { .. })), 0);
}

// ============================================================================
// Refunds
// ============================================================================

#[test]
fn test_single_signature_calls_are_never_refunded() {
    let mut h = Harness::new();
    h.chain.set_balance(h.account, ether(1));
    let meta = h
        .meta(h.system.transfer_manager, send_call(&h, ether(1) / U256::from(10)))
        .with_gas_price(gwei(5));

    let receipt = h.relay_as_owner(&meta);

    assert!(executed(&receipt));
    assert_eq!(h.chain.balance(h.account), ether(1) - ether(1) / U256::from(10));
}

#[test]
fn test_single_signature_calls_skip_refund_feasibility() {
    let mut h = Harness::new();
    let meta = h
        .meta(h.system.transfer_manager, send_call(&h, U256::ZERO))
        .with_gas_price(gwei(5));

    assert_eq!(h.chain.balance(h.account), U256::ZERO);
    assert!(executed(&h.relay_as_owner(&meta)));
}

#[test]
fn test_multi_signature_call_refunds_relayer() {
    let mut h = Harness::with_guardians(3);
    h.chain.set_balance(h.account, ether(1));
    let meta = h
        .meta(
            h.system.recovery_manager,
            RecoveryManager::execute_recovery_call(h.account, RECIPIENT),
        )
        .with_gas_price(gwei(10));
    let signatures = meta.sign_sorted(&h.guardian_keys(2)).unwrap();
    let relayer_before = h.chain.balance(RELAYER);

    let receipt = h.relay(&meta, signatures);

    assert!(executed(&receipt));
    let refund = ether(1) - h.chain.balance(h.account);
    assert!(refund > U256::ZERO);
    assert!(refund <= meta.gas_limit * meta.gas_price);
    assert_eq!(h.chain.balance(RELAYER), relayer_before - receipt.fee + refund);
}

#[test]
fn test_multi_signature_call_requires_refundable_account() {
    let mut h = Harness::with_guardians(3);
    let meta = h
        .meta(
            h.system.recovery_manager,
            RecoveryManager::execute_recovery_call(h.account, RECIPIENT),
        )
        .with_gas_price(gwei(10));
    let signatures = meta.sign_sorted(&h.guardian_keys(2)).unwrap();

    let receipt = h.relay(&meta, signatures);
    assert_eq!(receipt.result, Err(Error::CannotRefund(h.account)));
}

#[test]
fn test_refund_skipped_when_signed_gas_limit_is_too_low() {
    let mut h = Harness::with_guardians(3);
    h.chain.set_balance(h.account, ether(1));
    let meta = h
        .meta(
            h.system.recovery_manager,
            RecoveryManager::execute_recovery_call(h.account, RECIPIENT),
        )
        .with_gas_price(gwei(10))
        .with_gas_limit(U256::from(h.config.relay.refund_overhead_gas));
    let signatures = meta.sign_sorted(&h.guardian_keys(2)).unwrap();

    let receipt = h.relay(&meta, signatures);

    assert!(executed(&receipt));
    assert_eq!(h.chain.balance(h.account), ether(1));
}

// ============================================================================
// Sign-hash replay protection
// ============================================================================

#[test]
fn test_duplicate_sign_hash_rejected() {
    let mut h = Harness::with_guardians(2);
    let meta = h.meta(
        h.system.recovery_manager,
        RecoveryManager::execute_recovery_call(h.account, RECIPIENT),
    );
    let signatures = meta.sign_sorted(&h.guardian_keys(1)).unwrap();

    assert!(executed(&h.relay(&meta, signatures.clone())));
    let receipt = h.relay(&meta, signatures);

    assert_eq!(receipt.result, Err(Error::DuplicateRequest(meta.sign_hash())));
    assert!(RelayEngine::is_executed(
        &h.chain,
        h.system.recovery_manager,
        h.account,
        &meta.sign_hash()
    ));
}

#[test]
fn test_unknown_operation_has_no_signature_requirement() {
    let mut h = Harness::with_guardians(1);
    let data = abi::encode_call(selectors::LOCK, &[Token::Address(h.account)]);
    let meta = h.meta(h.system.recovery_manager, data);

    let receipt = h.relay(&meta, Bytes::new());
    assert_eq!(receipt.result, Err(Error::UnknownSelector(selectors::LOCK)));
}
