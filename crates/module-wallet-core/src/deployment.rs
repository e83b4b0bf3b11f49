//! Full system bootstrap
//!
//! Deploys a registry, a guardian store and the four modules, registers the
//! modules and creates accounts wired to them.

use crate::account::AccountGateway;
use crate::chain::{Chain, Transaction};
use crate::config::Config;
use crate::guardian::GuardianStore;
use crate::module::guardian_manager::GuardianManager;
use crate::module::lock_manager::LockManager;
use crate::module::recovery_manager::RecoveryManager;
use crate::module::transfer_manager::TransferManager;
use crate::registry::ModuleRegistry;
use crate::Result;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Addresses of a deployed system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub registry: Address,
    pub guardian_store: Address,
    pub transfer_manager: Address,
    pub guardian_manager: Address,
    pub lock_manager: Address,
    pub recovery_manager: Address,
}

impl Deployment {
    /// Deploy and register everything. `registry_owner` sends the
    /// registration transactions.
    pub fn deploy(chain: &mut Chain, config: &Config, registry_owner: Address) -> Result<Self> {
        let registry = ModuleRegistry::deploy(chain, registry_owner);
        let guardian_store = chain.deploy(GuardianStore);

        let deployment = Self {
            registry,
            guardian_store,
            transfer_manager: TransferManager::deploy(chain, registry, guardian_store, config.relay),
            guardian_manager: GuardianManager::deploy(chain, registry, guardian_store, config.relay),
            lock_manager: LockManager::deploy(
                chain,
                registry,
                guardian_store,
                config.relay,
                config.security,
            ),
            recovery_manager: RecoveryManager::deploy(
                chain,
                registry,
                guardian_store,
                config.relay,
                config.security,
            ),
        };

        for (module, name) in deployment.named_modules() {
            chain
                .transact(Transaction::new(
                    registry_owner,
                    registry,
                    ModuleRegistry::register_module_call(module, name),
                ))
                .result?;
        }
        info!(%registry, %guardian_store, "System deployed");
        Ok(deployment)
    }

    /// Module addresses
    pub fn modules(&self) -> [Address; 4] {
        [
            self.transfer_manager,
            self.guardian_manager,
            self.lock_manager,
            self.recovery_manager,
        ]
    }

    fn named_modules(&self) -> [(Address, &'static str); 4] {
        [
            (self.transfer_manager, "TransferManager"),
            (self.guardian_manager, "GuardianManager"),
            (self.lock_manager, "LockManager"),
            (self.recovery_manager, "RecoveryManager"),
        ]
    }

    /// Create an account owned by `owner` with every module authorised
    pub fn create_account(&self, chain: &mut Chain, owner: Address) -> Result<Address> {
        let account = chain.deploy(AccountGateway);
        chain
            .transact(Transaction::new(
                owner,
                account,
                AccountGateway::init_call(owner, &self.modules()),
            ))
            .result?;
        info!(%account, %owner, "Account created");
        Ok(account)
    }
}
