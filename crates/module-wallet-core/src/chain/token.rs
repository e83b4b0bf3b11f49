//! Minimal fungible token used for token sweeps and transfers

use super::{Chain, Contract, Message};
use crate::abi::{self, Token as AbiToken, selectors};
use crate::types::Event;
use crate::{Error, Result};
use alloy_primitives::{Address, Bytes, U256};
use std::collections::HashMap;

/// Token balances
#[derive(Debug, Clone, Default)]
pub struct TokenState {
    balances: HashMap<Address, U256>,
    total_supply: U256,
}

/// Fungible token with an owner-gated `mint`
#[derive(Debug, Clone)]
pub struct Token {
    symbol: String,
    owner: Address,
}

impl Token {
    /// Create a token whose supply is minted by `owner`
    pub fn new(symbol: impl Into<String>, owner: Address) -> Self {
        Self {
            symbol: symbol.into(),
            owner,
        }
    }

    /// Balance of `holder`
    pub fn balance_of(chain: &Chain, token: Address, holder: Address) -> U256 {
        chain
            .storage::<TokenState>(token)
            .and_then(|state| state.balances.get(&holder).copied())
            .unwrap_or_default()
    }

    /// Total minted supply
    pub fn total_supply(chain: &Chain, token: Address) -> U256 {
        chain
            .storage::<TokenState>(token)
            .map(|state| state.total_supply)
            .unwrap_or_default()
    }

    /// `transfer(to, amount)` call data
    pub fn transfer_call(to: Address, amount: U256) -> Bytes {
        abi::encode_call(
            selectors::TRANSFER,
            &[AbiToken::Address(to), AbiToken::Uint(amount)],
        )
    }

    /// `balanceOf(holder)` call data
    pub fn balance_of_call(holder: Address) -> Bytes {
        abi::encode_call(selectors::BALANCE_OF, &[AbiToken::Address(holder)])
    }

    /// `mint(to, amount)` call data
    pub fn mint_call(to: Address, amount: U256) -> Bytes {
        abi::encode_call(
            selectors::MINT,
            &[AbiToken::Address(to), AbiToken::Uint(amount)],
        )
    }

    fn move_balance(
        chain: &mut Chain,
        token: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> Result<()> {
        let state = chain.storage_mut::<TokenState>(token)?;
        let available = state.balances.get(&from).copied().unwrap_or_default();
        let remaining = available
            .checked_sub(amount)
            .ok_or(Error::InsufficientBalance {
                account: from,
                needed: amount,
                available,
            })?;
        state.balances.insert(from, remaining);
        let credited = state
            .balances
            .get(&to)
            .copied()
            .unwrap_or_default()
            .checked_add(amount)
            .ok_or(Error::Overflow)?;
        state.balances.insert(to, credited);
        chain.emit(token, Event::TokenTransfer { from, to, amount })
    }
}

impl Contract for Token {
    fn name(&self) -> &str {
        &self.symbol
    }

    fn call(&self, chain: &mut Chain, msg: &Message) -> Result<Bytes> {
        let (selector, args) = abi::split_selector(&msg.data)?;
        match selector {
            selectors::TRANSFER => {
                let (to, amount) = (args.address(0)?, args.uint(1)?);
                Self::move_balance(chain, msg.to, msg.sender, to, amount)?;
                Ok(abi::returns(&[AbiToken::Bool(true)]))
            }
            selectors::BALANCE_OF => {
                let holder = args.address(0)?;
                let balance = Self::balance_of(chain, msg.to, holder);
                Ok(abi::returns(&[AbiToken::Uint(balance)]))
            }
            selectors::MINT => {
                if msg.sender != self.owner {
                    return Err(Error::NotContractOwner(msg.sender));
                }
                let (to, amount) = (args.address(0)?, args.uint(1)?);
                let state = chain.storage_mut::<TokenState>(msg.to)?;
                state.total_supply = state
                    .total_supply
                    .checked_add(amount)
                    .ok_or(Error::Overflow)?;
                let balance = state.balances.entry(to).or_default();
                *balance = balance.checked_add(amount).ok_or(Error::Overflow)?;
                chain.emit(
                    msg.to,
                    Event::TokenTransfer {
                        from: Address::ZERO,
                        to,
                        amount,
                    },
                )?;
                Ok(Bytes::new())
            }
            other => Err(Error::UnknownSelector(other)),
        }
    }
}
