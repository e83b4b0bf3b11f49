//! Transfer manager: owner-signed native and token transfers
//!
//! Also answers `isValidSignature(bytes32,bytes)` on behalf of the account
//! through a static route enabled when the account authorises the module.

use super::{ModuleCore, ModuleLogic, RelayedModule};
use crate::abi::{self, Args, Token, selectors};
use crate::account::AccountGateway;
use crate::chain::token::Token as Erc20;
use crate::chain::{Chain, Message};
use crate::config::RelayConfig;
use crate::types::{Event, RecoverableSignature, Selector};
use crate::Result;
use alloy_primitives::{Address, B256, Bytes, U256, address};
use tracing::debug;

/// Sentinel token address for native value
pub const NATIVE_TOKEN: Address = address!("EeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE");

/// Value returned by `isValidSignature` for a valid owner signature
pub const ERC1271_MAGIC: Selector = selectors::IS_VALID_SIGNATURE;

/// Transfer manager logic
#[derive(Debug, Clone)]
pub struct TransferManager {
    core: ModuleCore,
    guardian_store: Address,
}

impl TransferManager {
    /// Create the logic
    pub fn new(registry: Address, guardian_store: Address) -> Self {
        Self {
            core: ModuleCore::new(registry, "TransferManager"),
            guardian_store,
        }
    }

    /// Deploy as an owner-signed module
    pub fn deploy(
        chain: &mut Chain,
        registry: Address,
        guardian_store: Address,
        relay: RelayConfig,
    ) -> Address {
        RelayedModule::owner_only(Self::new(registry, guardian_store), relay).deploy(chain)
    }

    /// `transferToken(account, token, to, amount, data)` call data
    pub fn transfer_token_call(
        account: Address,
        token: Address,
        to: Address,
        amount: U256,
        data: Bytes,
    ) -> Bytes {
        abi::encode_call(
            selectors::TRANSFER_TOKEN,
            &[
                Token::Address(account),
                Token::Address(token),
                Token::Address(to),
                Token::Uint(amount),
                Token::Bytes(data),
            ],
        )
    }

    /// `isValidSignature(hash, signature)` call data
    pub fn is_valid_signature_call(hash: B256, signature: &[u8]) -> Bytes {
        abi::encode_call(
            selectors::IS_VALID_SIGNATURE,
            &[
                Token::FixedBytes(hash),
                Token::Bytes(Bytes::copy_from_slice(signature)),
            ],
        )
    }

    fn transfer_token(&self, chain: &mut Chain, msg: &Message, args: Args<'_>) -> Result<Bytes> {
        let account = args.address(0)?;
        let token = args.address(1)?;
        let to = args.address(2)?;
        let amount = args.uint(3)?;
        let data = args.bytes(4)?;

        ModuleCore::require_owner_or_relayed(chain, msg, account)?;
        ModuleCore::require_unlocked(chain, self.guardian_store, account)?;

        let this = msg.to;
        if token == NATIVE_TOKEN {
            ModuleCore::forward_via_account(chain, this, account, to, amount, data.clone())?;
        } else {
            ModuleCore::forward_via_account(
                chain,
                this,
                account,
                token,
                U256::ZERO,
                Erc20::transfer_call(to, amount),
            )?;
        }

        debug!(%account, %token, %to, %amount, "Transfer");
        chain.emit(
            this,
            Event::Transfer {
                account,
                token,
                to,
                amount,
                data,
            },
        )?;
        Ok(Bytes::new())
    }

    /// The account is the caller of a routed static call
    fn is_valid_signature(&self, chain: &Chain, msg: &Message, args: Args<'_>) -> Result<Bytes> {
        let account = msg.sender;
        let hash = args.b256(0)?;
        let signature = RecoverableSignature::from_slice(&args.bytes(1)?)?;
        let signer = signature.recover(&hash)?;

        let magic = if ModuleCore::is_owner(chain, account, signer) {
            ERC1271_MAGIC
        } else {
            Selector::default()
        };
        Ok(abi::returns(&[Token::Selector(magic)]))
    }
}

impl ModuleLogic for TransferManager {
    fn core(&self) -> &ModuleCore {
        &self.core
    }

    fn on_init(&self, chain: &mut Chain, this: Address, account: Address) -> Result<()> {
        chain.call(
            this,
            account,
            U256::ZERO,
            AccountGateway::enable_static_call_call(this, selectors::IS_VALID_SIGNATURE),
        )?;
        Ok(())
    }

    fn dispatch(
        &self,
        chain: &mut Chain,
        msg: &Message,
        selector: Selector,
        args: Args<'_>,
    ) -> Option<Result<Bytes>> {
        match selector {
            selectors::TRANSFER_TOKEN => Some(self.transfer_token(chain, msg, args)),
            selectors::IS_VALID_SIGNATURE => Some(self.is_valid_signature(chain, msg, args)),
            _ => None,
        }
    }
}
