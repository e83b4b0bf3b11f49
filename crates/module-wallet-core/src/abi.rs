//! Call-data codec
//!
//! A minimal head/tail encoder and positional decoder covering the argument
//! types used by the account, registry, guardian storage and module
//! operations. Static arguments occupy one 32-byte head word; dynamic ones
//! (`bytes`, `string`, `address[]`) store an offset in the head and their
//! length-prefixed payload in the tail.

use crate::error::ERROR_STRING_SELECTOR;
use crate::types::Selector;
use crate::{Error, Result};
use alloy_primitives::{Address, B256, Bytes, U256};

const WORD: usize = 32;

/// Operation selectors, `keccak256(signature)[:4]`
pub mod selectors {
    use crate::types::Selector;

    // ============ Account ============
    /// init(address,address[])
    pub const ACCOUNT_INIT: Selector = Selector::new([0x3c, 0x5a, 0x3c, 0xea]);
    /// authoriseModule(address,bool)
    pub const AUTHORISE_MODULE: Selector = Selector::new([0x1f, 0x17, 0x73, 0x2d]);
    /// enableStaticCall(address,bytes4)
    pub const ENABLE_STATIC_CALL: Selector = Selector::new([0x13, 0xda, 0x30, 0xb2]);
    /// setOwner(address)
    pub const SET_OWNER: Selector = Selector::new([0x13, 0xaf, 0x40, 0x35]);
    /// invoke(address,uint256,bytes)
    pub const INVOKE: Selector = Selector::new([0x8f, 0x6f, 0x03, 0x32]);
    /// owner()
    pub const OWNER: Selector = Selector::new([0x8d, 0xa5, 0xcb, 0x5b]);
    /// authorised(address)
    pub const AUTHORISED: Selector = Selector::new([0xd6, 0xeb, 0x1b, 0xbf]);
    /// enabled(bytes4)
    pub const ENABLED: Selector = Selector::new([0x5f, 0x54, 0x89, 0x2b]);
    /// modules()
    pub const MODULES: Selector = Selector::new([0xf7, 0xe8, 0x0e, 0x98]);

    // ============ Module ============
    /// init(address)
    pub const MODULE_INIT: Selector = Selector::new([0x19, 0xab, 0x45, 0x3c]);
    /// addModule(address,address)
    pub const ADD_MODULE: Selector = Selector::new([0x5a, 0x1d, 0xb8, 0xc4]);
    /// recoverToken(address)
    pub const RECOVER_TOKEN: Selector = Selector::new([0x9b, 0xe6, 0x5a, 0x60]);
    /// execute(address,bytes,uint256,bytes,uint256,uint256)
    pub const EXECUTE: Selector = Selector::new([0xaa, 0xca, 0xaf, 0x88]);
    /// getNonce(address)
    pub const GET_NONCE: Selector = Selector::new([0x2d, 0x03, 0x35, 0xab]);

    // ============ Registry ============
    /// registerModule(address,bytes32)
    pub const REGISTER_MODULE: Selector = Selector::new([0x0f, 0x03, 0x56, 0xd0]);
    /// deregisterModule(address)
    pub const DEREGISTER_MODULE: Selector = Selector::new([0x78, 0xb1, 0xfa, 0x74]);
    /// registerUpgrader(address,bytes32)
    pub const REGISTER_UPGRADER: Selector = Selector::new([0x3f, 0x49, 0x85, 0xcf]);
    /// deregisterUpgrader(address)
    pub const DEREGISTER_UPGRADER: Selector = Selector::new([0x8b, 0x27, 0xf7, 0xf5]);
    /// moduleInfo(address)
    pub const MODULE_INFO: Selector = Selector::new([0x56, 0xb9, 0x7e, 0xc1]);
    /// upgraderInfo(address)
    pub const UPGRADER_INFO: Selector = Selector::new([0xce, 0x03, 0xc0, 0xa2]);
    /// isRegisteredModule(address)
    pub const IS_REGISTERED_MODULE: Selector = Selector::new([0x0b, 0xcd, 0x4e, 0xbb]);
    /// isRegisteredModule(address[])
    pub const ARE_REGISTERED_MODULES: Selector = Selector::new([0x6b, 0xb1, 0x8a, 0x54]);
    /// isRegisteredUpgrader(address)
    pub const IS_REGISTERED_UPGRADER: Selector = Selector::new([0x63, 0x04, 0x7b, 0xd8]);
    /// changeOwner(address)
    pub const CHANGE_OWNER: Selector = Selector::new([0xa6, 0xf9, 0xda, 0xe1]);

    // ============ Guardian storage and managers ============
    /// addGuardian(address,address)
    pub const ADD_GUARDIAN: Selector = Selector::new([0xc6, 0x84, 0x52, 0x10]);
    /// revokeGuardian(address,address)
    pub const REVOKE_GUARDIAN: Selector = Selector::new([0x1d, 0x97, 0xd8, 0xcc]);
    /// guardianCount(address)
    pub const GUARDIAN_COUNT: Selector = Selector::new([0x50, 0x40, 0xfb, 0x76]);
    /// getGuardians(address)
    pub const GET_GUARDIANS: Selector = Selector::new([0xf1, 0x88, 0x58, 0xab]);
    /// isGuardian(address,address)
    pub const IS_GUARDIAN: Selector = Selector::new([0xd4, 0xee, 0x97, 0x34]);
    /// setLock(address,uint256)
    pub const SET_LOCK: Selector = Selector::new([0xb0, 0xfc, 0x29, 0xe6]);
    /// isLocked(address)
    pub const IS_LOCKED: Selector = Selector::new([0x4a, 0x4f, 0xbe, 0xec]);
    /// getLock(address)
    pub const GET_LOCK: Selector = Selector::new([0x6b, 0x9d, 0xb4, 0xe6]);
    /// getLocker(address)
    pub const GET_LOCKER: Selector = Selector::new([0x91, 0x98, 0x84, 0xbf]);
    /// lock(address)
    pub const LOCK: Selector = Selector::new([0xf4, 0x35, 0xf5, 0xa7]);
    /// unlock(address)
    pub const UNLOCK: Selector = Selector::new([0x2f, 0x6c, 0x49, 0x3c]);

    // ============ Recovery ============
    /// executeRecovery(address,address)
    pub const EXECUTE_RECOVERY: Selector = Selector::new([0xb0, 0xba, 0x4d, 0xa0]);
    /// finalizeRecovery(address)
    pub const FINALIZE_RECOVERY: Selector = Selector::new([0x31, 0x5a, 0x7a, 0xf3]);
    /// cancelRecovery(address)
    pub const CANCEL_RECOVERY: Selector = Selector::new([0xc9, 0x0d, 0xb4, 0x47]);
    /// getRecovery(address)
    pub const GET_RECOVERY: Selector = Selector::new([0x97, 0x69, 0xc3, 0xfe]);

    // ============ Transfers and tokens ============
    /// transferToken(address,address,address,uint256,bytes)
    pub const TRANSFER_TOKEN: Selector = Selector::new([0x2d, 0xf5, 0x46, 0xf4]);
    /// isValidSignature(bytes32,bytes)
    pub const IS_VALID_SIGNATURE: Selector = Selector::new([0x16, 0x26, 0xba, 0x7e]);
    /// transfer(address,uint256)
    pub const TRANSFER: Selector = Selector::new([0xa9, 0x05, 0x9c, 0xbb]);
    /// balanceOf(address)
    pub const BALANCE_OF: Selector = Selector::new([0x70, 0xa0, 0x82, 0x31]);
    /// mint(address,uint256)
    pub const MINT: Selector = Selector::new([0x40, 0xc1, 0x0f, 0x19]);

    /// Every selector with its canonical signature
    pub const ALL: &[(&str, Selector)] = &[
        ("init(address,address[])", ACCOUNT_INIT),
        ("authoriseModule(address,bool)", AUTHORISE_MODULE),
        ("enableStaticCall(address,bytes4)", ENABLE_STATIC_CALL),
        ("setOwner(address)", SET_OWNER),
        ("invoke(address,uint256,bytes)", INVOKE),
        ("owner()", OWNER),
        ("authorised(address)", AUTHORISED),
        ("enabled(bytes4)", ENABLED),
        ("modules()", MODULES),
        ("init(address)", MODULE_INIT),
        ("addModule(address,address)", ADD_MODULE),
        ("recoverToken(address)", RECOVER_TOKEN),
        ("execute(address,bytes,uint256,bytes,uint256,uint256)", EXECUTE),
        ("getNonce(address)", GET_NONCE),
        ("registerModule(address,bytes32)", REGISTER_MODULE),
        ("deregisterModule(address)", DEREGISTER_MODULE),
        ("registerUpgrader(address,bytes32)", REGISTER_UPGRADER),
        ("deregisterUpgrader(address)", DEREGISTER_UPGRADER),
        ("moduleInfo(address)", MODULE_INFO),
        ("upgraderInfo(address)", UPGRADER_INFO),
        ("isRegisteredModule(address)", IS_REGISTERED_MODULE),
        ("isRegisteredModule(address[])", ARE_REGISTERED_MODULES),
        ("isRegisteredUpgrader(address)", IS_REGISTERED_UPGRADER),
        ("changeOwner(address)", CHANGE_OWNER),
        ("addGuardian(address,address)", ADD_GUARDIAN),
        ("revokeGuardian(address,address)", REVOKE_GUARDIAN),
        ("guardianCount(address)", GUARDIAN_COUNT),
        ("getGuardians(address)", GET_GUARDIANS),
        ("isGuardian(address,address)", IS_GUARDIAN),
        ("setLock(address,uint256)", SET_LOCK),
        ("isLocked(address)", IS_LOCKED),
        ("getLock(address)", GET_LOCK),
        ("getLocker(address)", GET_LOCKER),
        ("lock(address)", LOCK),
        ("unlock(address)", UNLOCK),
        ("executeRecovery(address,address)", EXECUTE_RECOVERY),
        ("finalizeRecovery(address)", FINALIZE_RECOVERY),
        ("cancelRecovery(address)", CANCEL_RECOVERY),
        ("getRecovery(address)", GET_RECOVERY),
        ("transferToken(address,address,address,uint256,bytes)", TRANSFER_TOKEN),
        ("isValidSignature(bytes32,bytes)", IS_VALID_SIGNATURE),
        ("transfer(address,uint256)", TRANSFER),
        ("balanceOf(address)", BALANCE_OF),
        ("mint(address,uint256)", MINT),
    ];
}

/// A single encodable argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Address(Address),
    Uint(U256),
    Bool(bool),
    FixedBytes(B256),
    /// `bytes4`, left aligned in its word
    Selector(Selector),
    Bytes(Bytes),
    String(String),
    AddressArray(Vec<Address>),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        matches!(self, Token::Bytes(_) | Token::String(_) | Token::AddressArray(_))
    }
}

fn uint_word(value: U256) -> [u8; WORD] {
    value.to_be_bytes::<WORD>()
}

fn usize_word(value: usize) -> [u8; WORD] {
    uint_word(U256::from(value))
}

fn address_word(address: &Address) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[12..].copy_from_slice(address.as_slice());
    word
}

fn static_word(token: &Token) -> [u8; WORD] {
    match token {
        Token::Address(address) => address_word(address),
        Token::Uint(value) => uint_word(*value),
        Token::Bool(value) => usize_word(usize::from(*value)),
        Token::FixedBytes(value) => value.0,
        Token::Selector(selector) => {
            let mut word = [0u8; WORD];
            word[..4].copy_from_slice(selector.as_slice());
            word
        }
        // Dynamic tokens never reach the head directly
        Token::Bytes(_) | Token::String(_) | Token::AddressArray(_) => [0u8; WORD],
    }
}

fn padded(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(WORD + data.len() + WORD);
    out.extend_from_slice(&usize_word(data.len()));
    out.extend_from_slice(data);
    let padding = (WORD - data.len() % WORD) % WORD;
    out.extend(std::iter::repeat_n(0u8, padding));
    out
}

fn dynamic_tail(token: &Token) -> Vec<u8> {
    match token {
        Token::Bytes(data) => padded(data),
        Token::String(text) => padded(text.as_bytes()),
        Token::AddressArray(addresses) => {
            let mut out = Vec::with_capacity(WORD * (addresses.len() + 1));
            out.extend_from_slice(&usize_word(addresses.len()));
            for address in addresses {
                out.extend_from_slice(&address_word(address));
            }
            out
        }
        _ => Vec::new(),
    }
}

/// Encode a sequence of arguments
pub fn encode(tokens: &[Token]) -> Vec<u8> {
    let head_len = tokens.len() * WORD;
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&usize_word(head_len + tail.len()));
            tail.extend(dynamic_tail(token));
        } else {
            head.extend_from_slice(&static_word(token));
        }
    }

    head.extend(tail);
    head
}

/// Encode a call: selector followed by the arguments
pub fn encode_call(selector: Selector, tokens: &[Token]) -> Bytes {
    let mut data = selector.as_slice().to_vec();
    data.extend(encode(tokens));
    data.into()
}

/// Encode return values
pub fn returns(tokens: &[Token]) -> Bytes {
    encode(tokens).into()
}

/// Split call data into its selector and arguments
pub fn split_selector(data: &[u8]) -> Result<(Selector, Args<'_>)> {
    let selector = Selector::of(data).ok_or_else(|| Error::Decode("missing selector".into()))?;
    Ok((selector, Args::new(&data[4..])))
}

/// Decode the single-`bytes` success envelope returned by `invoke`
pub fn decode_bytes(output: &[u8]) -> Result<Bytes> {
    Args::new(output).bytes(0)
}

/// Extract the message of an `Error(string)` revert payload
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let (selector, args) = split_selector(data).ok()?;
    if selector != ERROR_STRING_SELECTOR {
        return None;
    }
    args.string(0).ok()
}

/// Positional argument decoder
#[derive(Debug, Clone, Copy)]
pub struct Args<'a> {
    data: &'a [u8],
}

impl<'a> Args<'a> {
    /// Wrap encoded arguments (without selector)
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Raw argument bytes
    pub fn raw(&self) -> &'a [u8] {
        self.data
    }

    fn word_at(&self, offset: usize) -> Result<&'a [u8]> {
        offset
            .checked_add(WORD)
            .and_then(|end| self.data.get(offset..end))
            .ok_or_else(|| Error::Decode(format!("word at offset {offset} out of range")))
    }

    fn word(&self, index: usize) -> Result<&'a [u8]> {
        self.word_at(index * WORD)
    }

    fn usize_at(&self, offset: usize) -> Result<usize> {
        let value = U256::from_be_slice(self.word_at(offset)?);
        usize::try_from(value).map_err(|_| Error::Decode(format!("length {value} too large")))
    }

    /// Address argument (low 20 bytes of the word)
    pub fn address(&self, index: usize) -> Result<Address> {
        Ok(Address::from_slice(&self.word(index)?[12..]))
    }

    /// Unsigned integer argument
    pub fn uint(&self, index: usize) -> Result<U256> {
        Ok(U256::from_be_slice(self.word(index)?))
    }

    /// Unsigned integer argument that must fit in 64 bits
    pub fn u64(&self, index: usize) -> Result<u64> {
        u64::try_from(self.uint(index)?).map_err(|_| Error::Overflow)
    }

    /// Boolean argument
    pub fn bool(&self, index: usize) -> Result<bool> {
        Ok(!self.uint(index)?.is_zero())
    }

    /// 32-byte argument
    pub fn b256(&self, index: usize) -> Result<B256> {
        Ok(B256::from_slice(self.word(index)?))
    }

    /// `bytes4` argument
    pub fn selector(&self, index: usize) -> Result<Selector> {
        Selector::of(self.word(index)?).ok_or_else(|| Error::Decode("bad bytes4".into()))
    }

    fn dynamic(&self, index: usize) -> Result<(usize, usize)> {
        let offset = self.usize_at(index * WORD)?;
        let len = self.usize_at(offset)?;
        Ok((offset + WORD, len))
    }

    /// Dynamic `bytes` argument
    pub fn bytes(&self, index: usize) -> Result<Bytes> {
        let (start, len) = self.dynamic(index)?;
        let payload = start
            .checked_add(len)
            .and_then(|end| self.data.get(start..end))
            .ok_or_else(|| Error::Decode(format!("bytes argument {index} out of range")))?;
        Ok(Bytes::copy_from_slice(payload))
    }

    /// Dynamic `string` argument
    pub fn string(&self, index: usize) -> Result<String> {
        let bytes = self.bytes(index)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::Decode(e.to_string()))
    }

    /// Dynamic `address[]` argument
    pub fn address_array(&self, index: usize) -> Result<Vec<Address>> {
        let (start, len) = self.dynamic(index)?;
        (0..len)
            .map(|i| {
                let word = self.word_at(start + i * WORD)?;
                Ok(Address::from_slice(&word[12..]))
            })
            .collect()
    }
}
