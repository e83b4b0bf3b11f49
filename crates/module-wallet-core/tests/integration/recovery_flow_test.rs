//! End-to-end guardian-majority recovery

use crate::common::{Harness, RECIPIENT, RELAYER, executed};
use alloy_primitives::{Address, Bytes, U256};
use k256::ecdsa::SigningKey;
use module_wallet_core::abi::Args;
use module_wallet_core::abi::{self, Token, selectors};
use module_wallet_core::module::lock_manager::LockManager;
use module_wallet_core::module::recovery_manager::RecoveryManager;
use module_wallet_core::types::signer_address;
use module_wallet_core::{AccountGateway, Error, Event, GuardianStore, MetaTransaction};

fn sorted_guardians(h: &Harness) -> Vec<&SigningKey> {
    let mut keys: Vec<&SigningKey> = h.guardians.iter().collect();
    keys.sort_by_key(|key| signer_address(key));
    keys
}

fn start_recovery(h: &mut Harness, signers: usize) -> MetaTransaction {
    let meta = h.meta(
        h.system.recovery_manager,
        RecoveryManager::execute_recovery_call(h.account, RECIPIENT),
    );
    let signatures = meta.sign(&sorted_guardians(h)[..signers]).unwrap();
    let receipt = h.relay(&meta, signatures);
    assert!(executed(&receipt), "{:?}", receipt.result);
    meta
}

fn get_recovery(h: &mut Harness) -> (Address, U256, U256) {
    let data = abi::encode_call(selectors::GET_RECOVERY, &[Token::Address(h.account)]);
    let output = h.chain.view(h.system.recovery_manager, data).unwrap();
    let args = Args::new(&output);
    (
        args.address(0).unwrap(),
        args.uint(1).unwrap(),
        args.uint(2).unwrap(),
    )
}

#[test]
fn test_full_recovery() {
    let mut h = Harness::with_guardians(3);
    let started_at = h.chain.timestamp();
    let period = h.config.security.recovery_period;

    start_recovery(&mut h, 2);

    let (recovery, execute_after, guardian_count) = get_recovery(&mut h);
    assert_eq!(recovery, RECIPIENT);
    assert_eq!(execute_after, U256::from(started_at + period));
    assert_eq!(guardian_count, U256::from(3));
    assert!(GuardianStore::is_locked(&h.chain, h.system.guardian_store, h.account));

    // too early, including the release instant itself
    h.chain.advance_time(period);
    let receipt = h.call(
        RELAYER,
        h.system.recovery_manager,
        RecoveryManager::finalize_recovery_call(h.account),
    );
    assert_eq!(
        receipt.result,
        Err(Error::RecoveryPeriodNotElapsed {
            execute_after: started_at + period,
        })
    );

    h.chain.advance_time(1);
    let receipt = h.call(
        RELAYER,
        h.system.recovery_manager,
        RecoveryManager::finalize_recovery_call(h.account),
    );

    assert!(receipt.is_success(), "{:?}", receipt.result);
    assert_eq!(AccountGateway::owner(&h.chain, h.account), RECIPIENT);
    assert!(!GuardianStore::is_locked(&h.chain, h.system.guardian_store, h.account));
    assert_eq!(get_recovery(&mut h).0, Address::ZERO);
    assert!(receipt.events().any(|event| *event
        == Event::RecoveryFinalized {
            account: h.account,
            recovery: RECIPIENT,
        }));
}

#[test]
fn test_finalize_without_pending_recovery() {
    let mut h = Harness::with_guardians(1);
    let receipt = h.call(
        RELAYER,
        h.system.recovery_manager,
        RecoveryManager::finalize_recovery_call(h.account),
    );
    assert_eq!(receipt.result, Err(Error::NoRecoveryPending(h.account)));
}

#[test]
fn test_recovery_lock_is_not_lifted_by_lock_manager() {
    let mut h = Harness::with_guardians(3);
    start_recovery(&mut h, 2);
    let guardian = h.guardian_addresses()[0];

    let receipt = h.call(guardian, h.system.lock_manager, LockManager::unlock_call(h.account));
    assert_eq!(
        receipt.result,
        Err(Error::LockedByOtherModule {
            account: h.account,
            locker: h.system.recovery_manager,
        })
    );
}

#[test]
fn test_recovery_needs_a_majority() {
    let mut h = Harness::with_guardians(3);
    let meta = h.meta(
        h.system.recovery_manager,
        RecoveryManager::execute_recovery_call(h.account, RECIPIENT),
    );
    let signatures = meta.sign(&sorted_guardians(&h)[..1]).unwrap();

    let receipt = h.relay(&meta, signatures);
    assert_eq!(
        receipt.result,
        Err(Error::InvalidSignatureLength {
            expected: 130,
            actual: 65,
        })
    );
}

#[test]
fn test_recovery_signers_must_be_ascending_and_distinct() {
    let mut h = Harness::with_guardians(3);
    let meta = h.meta(
        h.system.recovery_manager,
        RecoveryManager::execute_recovery_call(h.account, RECIPIENT),
    );

    let mut descending = sorted_guardians(&h)[..2].to_vec();
    descending.reverse();
    let receipt = h.relay(&meta, meta.sign(&descending).unwrap());
    assert_eq!(receipt.result, Err(Error::UnsortedSigners));

    let first = sorted_guardians(&h)[0];
    let receipt = h.relay(&meta, meta.sign(&[first, first]).unwrap());
    assert_eq!(receipt.result, Err(Error::UnsortedSigners));
}

#[test]
fn test_recovery_signers_must_be_guardians() {
    let mut h = Harness::with_guardians(1);
    let meta = h.meta(
        h.system.recovery_manager,
        RecoveryManager::execute_recovery_call(h.account, RECIPIENT),
    );

    let receipt = h.relay(&meta, meta.sign(&[&h.owner]).unwrap());
    assert_eq!(receipt.result, Err(Error::InvalidSigner(h.owner_address())));
}

#[test]
fn test_recovery_without_guardians() {
    let mut h = Harness::new();
    let meta = h.meta(
        h.system.recovery_manager,
        RecoveryManager::execute_recovery_call(h.account, RECIPIENT),
    );

    let receipt = h.relay(&meta, Bytes::new());
    assert_eq!(receipt.result, Err(Error::NoGuardians(h.account)));
}

#[test]
fn test_recovery_address_rules() {
    let mut h = Harness::with_guardians(2);
    let guardian = h.guardian_addresses()[0];
    let owner = h.owner_address();

    for recovery in [Address::ZERO, owner, guardian] {
        let meta = h.meta(
            h.system.recovery_manager,
            RecoveryManager::execute_recovery_call(h.account, recovery),
        );
        let signatures = meta.sign(&sorted_guardians(&h)[..1]).unwrap();
        let receipt = h.relay(&meta, signatures);

        assert!(receipt.is_success());
        assert!(!executed(&receipt), "recovery to {recovery} must fail");
    }
    assert!(!GuardianStore::is_locked(&h.chain, h.system.guardian_store, h.account));
}

#[test]
fn test_one_recovery_at_a_time() {
    let mut h = Harness::with_guardians(2);
    start_recovery(&mut h, 1);

    let meta = h.meta(
        h.system.recovery_manager,
        RecoveryManager::execute_recovery_call(h.account, RELAYER),
    );
    let signatures = meta.sign(&sorted_guardians(&h)[..1]).unwrap();
    assert!(!executed(&h.relay(&meta, signatures)));
    assert_eq!(get_recovery(&mut h).0, RECIPIENT);
}

#[test]
fn test_owner_and_guardian_cancel_recovery() {
    let mut h = Harness::with_guardians(3);
    start_recovery(&mut h, 2);

    let meta = h.meta(
        h.system.recovery_manager,
        RecoveryManager::cancel_recovery_call(h.account),
    );
    let mut signers = vec![&h.owner];
    signers.push(sorted_guardians(&h)[0]);
    let receipt = h.relay(&meta, meta.sign(&signers).unwrap());

    assert!(executed(&receipt), "{:?}", receipt.result);
    assert!(!GuardianStore::is_locked(&h.chain, h.system.guardian_store, h.account));
    assert_eq!(get_recovery(&mut h).0, Address::ZERO);
    assert_eq!(AccountGateway::owner(&h.chain, h.account), h.owner_address());
    assert!(receipt.events().any(|event| *event
        == Event::RecoveryCanceled {
            account: h.account,
            recovery: RECIPIENT,
        }));
}

#[test]
fn test_owner_must_sign_cancellation_first() {
    let mut h = Harness::with_guardians(3);
    start_recovery(&mut h, 2);

    let meta = h.meta(
        h.system.recovery_manager,
        RecoveryManager::cancel_recovery_call(h.account),
    );
    let signers = vec![sorted_guardians(&h)[0], &h.owner];
    let receipt = h.relay(&meta, meta.sign(&signers).unwrap());

    assert!(matches!(
        receipt.result,
        Err(Error::UnsortedSigners) | Err(Error::InvalidSigner(_))
    ));
    assert!(GuardianStore::is_locked(&h.chain, h.system.guardian_store, h.account));
}

#[test]
fn test_guardian_majority_cancels_recovery() {
    let mut h = Harness::with_guardians(3);
    start_recovery(&mut h, 2);

    let meta = h.meta(
        h.system.recovery_manager,
        RecoveryManager::cancel_recovery_call(h.account),
    );
    let receipt = h.relay(&meta, meta.sign(&sorted_guardians(&h)[..2]).unwrap());

    assert!(executed(&receipt));
    assert_eq!(get_recovery(&mut h).0, Address::ZERO);
}
