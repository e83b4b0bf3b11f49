//! Invariant tests for module wallets
//!
//! These tests verify guarantees that must hold for every reachable state:
//! - An initialised account always has an owner and at least one module
//! - The guardian list and its index agree
//! - A relayed payload executes at most once
//! - Failed calls leave no trace

use crate::common::{Harness, RECIPIENT, ether, executed, key};
use alloy_primitives::{Address, Bytes, U256, address};
use module_wallet_core::chain::{Contract, Message};
use module_wallet_core::module::guardian_manager::GuardianManager;
use module_wallet_core::module::recovery_manager::RecoveryManager;
use module_wallet_core::module::transfer_manager::{NATIVE_TOKEN, TransferManager};
use module_wallet_core::types::signer_address;
use module_wallet_core::{AccountGateway, Chain, Error, GuardianStore, Result, Transaction, abi};
use proptest::prelude::*;

/// Module stub that accepts `init` and forwards anything else to its account
#[derive(Debug)]
struct Forwarder {
    account: Address,
}

impl Contract for Forwarder {
    fn name(&self) -> &str {
        "Forwarder"
    }

    fn call(&self, chain: &mut Chain, msg: &Message) -> Result<Bytes> {
        if msg.selector() == Some(abi::selectors::MODULE_INIT) {
            return Ok(Bytes::new());
        }
        chain.call(msg.to, self.account, U256::ZERO, msg.data.clone())
    }
}

const ACCOUNT: Address = address!("00000000000000000000000000000000000acc02");
const OWNER: Address = address!("00000000000000000000000000000000000000a1");

fn forwarder_account() -> (Chain, Address, Address) {
    let mut chain = Chain::default();
    chain.deploy_at(ACCOUNT, AccountGateway);
    let a = chain.deploy(Forwarder { account: ACCOUNT });
    let b = chain.deploy(Forwarder { account: ACCOUNT });
    let receipt = chain.transact(Transaction::new(OWNER, ACCOUNT, AccountGateway::init_call(OWNER, &[a, b])));
    assert!(receipt.is_success(), "{:?}", receipt.result);
    (chain, a, b)
}

// ============================================================================
// Account Invariants
// ============================================================================

/// INVARIANT: An initialised account never drops below one module
#[test]
fn invariant_account_keeps_a_module() {
    let (mut chain, a, b) = forwarder_account();

    let receipt = chain.transact(Transaction::new(OWNER, a, AccountGateway::authorise_module_call(b, false)));
    assert!(receipt.is_success(), "{:?}", receipt.result);
    assert_eq!(AccountGateway::module_count(&chain, ACCOUNT), 1);

    let receipt = chain.transact(Transaction::new(OWNER, a, AccountGateway::authorise_module_call(a, false)));
    assert_eq!(receipt.result, Err(Error::LastModule));
    assert_eq!(AccountGateway::module_count(&chain, ACCOUNT), 1);
    assert!(AccountGateway::is_authorised(&chain, ACCOUNT, a));
}

/// INVARIANT: The module count equals the number of authorised modules
#[test]
fn invariant_module_count_tracks_authorisations() {
    let (mut chain, a, b) = forwarder_account();

    for (module, value) in [(b, false), (b, false), (b, true), (b, true), (b, false)] {
        chain.transact(Transaction::new(OWNER, a, AccountGateway::authorise_module_call(module, value)));
        let authorised = [a, b]
            .iter()
            .filter(|module| AccountGateway::is_authorised(&chain, ACCOUNT, **module))
            .count();
        assert_eq!(AccountGateway::module_count(&chain, ACCOUNT), authorised);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// INVARIANT: No sequence of authorisations empties the module set, and the
    /// count always matches the authorised set
    #[test]
    fn invariant_module_set_never_empties(
        steps in prop::collection::vec((0usize..3, 0usize..3, any::<bool>()), 1..40)
    ) {
        let mut chain = Chain::default();
        chain.deploy_at(ACCOUNT, AccountGateway);
        let modules: Vec<Address> = (0..3)
            .map(|_| chain.deploy(Forwarder { account: ACCOUNT }))
            .collect();
        let receipt = chain.transact(Transaction::new(
            OWNER,
            ACCOUNT,
            AccountGateway::init_call(OWNER, &modules[..2]),
        ));
        prop_assert!(receipt.is_success(), "{:?}", receipt.result);

        for (sender, target, value) in steps {
            chain.transact(Transaction::new(
                OWNER,
                modules[sender],
                AccountGateway::authorise_module_call(modules[target], value),
            ));

            let authorised = modules
                .iter()
                .filter(|module| AccountGateway::is_authorised(&chain, ACCOUNT, **module))
                .count();
            let count = AccountGateway::module_count(&chain, ACCOUNT);
            prop_assert!(count >= 1);
            prop_assert_eq!(count, authorised);
        }
    }
}

/// INVARIANT: The owner is never the zero address
#[test]
fn invariant_owner_never_zero() {
    let (mut chain, a, _) = forwarder_account();

    let receipt = chain.transact(Transaction::new(OWNER, a, AccountGateway::set_owner_call(Address::ZERO)));
    assert_eq!(receipt.result, Err(Error::NullOwner));
    assert_eq!(AccountGateway::owner(&chain, ACCOUNT), OWNER);

    let mut fresh = Chain::default();
    fresh.deploy_at(ACCOUNT, AccountGateway);
    let forwarder = fresh.deploy(Forwarder { account: ACCOUNT });
    let receipt = fresh.transact(Transaction::new(
        OWNER,
        ACCOUNT,
        AccountGateway::init_call(Address::ZERO, &[forwarder]),
    ));
    assert_eq!(receipt.result, Err(Error::NullOwner));
}

// ============================================================================
// Guardian Invariants
// ============================================================================

/// INVARIANT: Every listed guardian is indexed at its position
#[test]
fn invariant_guardian_index_consistent() {
    let mut h = Harness::with_guardians(5);
    let owner = h.owner_address();
    let guardians = h.guardian_addresses();

    for revoked in [guardians[1], guardians[4], guardians[0]] {
        let receipt = h.call(
            owner,
            h.system.guardian_manager,
            GuardianManager::revoke_guardian_call(h.account, revoked),
        );
        assert!(receipt.is_success(), "{:?}", receipt.result);

        let config = GuardianStore::config(&h.chain, h.system.guardian_store, h.account);
        assert!(!config.is_guardian(revoked));
        for (i, guardian) in config.guardians().iter().enumerate() {
            assert_eq!(config.index_of(*guardian), Some(i));
        }
    }
    assert_eq!(
        GuardianStore::guardian_count(&h.chain, h.system.guardian_store, h.account),
        2
    );
}

// ============================================================================
// Relay Invariants
// ============================================================================

/// INVARIANT: A relayed payload executes at most once, whatever its outcome
#[test]
fn invariant_payload_executes_at_most_once() {
    let mut h = Harness::with_guardians(2);
    h.chain.set_balance(h.account, ether(3));

    let transfer = h.meta(
        h.system.transfer_manager,
        TransferManager::transfer_token_call(h.account, NATIVE_TOKEN, RECIPIENT, ether(1), Bytes::new()),
    );
    let recovery = h.meta(
        h.system.recovery_manager,
        RecoveryManager::execute_recovery_call(h.account, signer_address(&key(0x99))),
    );
    let recovery_signatures = recovery.sign_sorted(&h.guardian_keys(1)).unwrap();

    assert!(executed(&h.relay_as_owner(&transfer)));
    assert!(executed(&h.relay(&recovery, recovery_signatures.clone())));

    for _ in 0..3 {
        assert!(h.relay_as_owner(&transfer).result.unwrap_err().is_replay());
        assert!(h.relay(&recovery, recovery_signatures.clone()).result.unwrap_err().is_replay());
    }
    assert_eq!(h.chain.balance(RECIPIENT), ether(1));
}

/// INVARIANT: A failed inner call consumes the payload but changes nothing else
#[test]
fn invariant_failed_inner_call_leaves_no_trace() {
    let mut h = Harness::new();
    h.chain.set_balance(h.account, ether(1));
    let guardians_before = GuardianStore::config(&h.chain, h.system.guardian_store, h.account);

    let meta = h.meta(
        h.system.transfer_manager,
        TransferManager::transfer_token_call(h.account, NATIVE_TOKEN, RECIPIENT, ether(2), Bytes::new()),
    );
    let receipt = h.relay_as_owner(&meta);

    assert!(!executed(&receipt));
    assert_eq!(h.chain.balance(h.account), ether(1));
    assert_eq!(h.chain.balance(RECIPIENT), U256::ZERO);
    assert_eq!(
        GuardianStore::config(&h.chain, h.system.guardian_store, h.account),
        guardians_before
    );
    assert!(h.relay_as_owner(&meta).result.unwrap_err().is_replay());
}

/// INVARIANT: Single-signature payloads never move value to the relayer
#[test]
fn invariant_no_refund_below_two_signatures() {
    let mut h = Harness::with_guardians(1);
    h.chain.set_balance(h.account, ether(1));
    let price = U256::from(50_000_000_000u64);

    let owner_signed = h
        .meta(
            h.system.guardian_manager,
            GuardianManager::add_guardian_call(h.account, RECIPIENT),
        )
        .with_gas_price(price);
    assert!(executed(&h.relay_as_owner(&owner_signed)));

    let guardian_signed = h
        .meta(
            h.system.recovery_manager,
            RecoveryManager::execute_recovery_call(h.account, signer_address(&key(0x98))),
        )
        .with_gas_price(price);
    // two guardians now, so one signature is a majority
    let signatures = guardian_signed.sign(&h.guardian_keys(1)).unwrap();
    assert!(executed(&h.relay(&guardian_signed, signatures)));

    assert_eq!(h.chain.balance(h.account), ether(1));
}
