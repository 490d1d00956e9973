//! Decoder for `abi.encode`d data into a [Token] tree.
//!
//! Unlike encoding, decoding needs the Solidity types up front, so callers
//! describe them with [ParamType]. The decoder is strict: offsets pointing
//! outside the data, dirty upper bytes of addresses and bools other than 0 or
//! 1 are rejected, because decoded values come from the counterparty.

use super::{
    error::{Error, Result},
    token::{Token, SLOT_SIZE},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Uint,
    Address,
    Bool,
    /// `bytes32` and friends, kept as a word.
    FixedBytes,
    Bytes,
    Array(Box<ParamType>),
    FixedArray(Box<ParamType>, usize),
    Tuple(Vec<ParamType>),
}

impl ParamType {
    pub fn is_dynamic(&self) -> bool {
        match self {
            ParamType::Uint | ParamType::Address | ParamType::Bool | ParamType::FixedBytes => false,
            ParamType::Bytes | ParamType::Array(_) => true,
            ParamType::FixedArray(inner, _) => inner.is_dynamic(),
            ParamType::Tuple(members) => members.iter().any(ParamType::is_dynamic),
        }
    }

    fn head_len(&self) -> usize {
        match self {
            _ if self.is_dynamic() => SLOT_SIZE,
            ParamType::FixedArray(inner, len) => inner.head_len() * len,
            ParamType::Tuple(members) => members.iter().map(ParamType::head_len).sum(),
            _ => SLOT_SIZE,
        }
    }
}

/// Decode `abi.encode(v0, v1, ...)` where `vi` has type `types[i]`.
///
/// To decode a single dynamic value encoded with `abi.encode(value)`, pass a
/// one-element slice; the leading offset is part of the outer tuple.
pub fn decode(types: &[ParamType], data: &[u8]) -> Result<Vec<Token>> {
    decode_sequence(types, data, 0)
}

/// Decode a single value of type `ty` encoded with `abi.encode(value)`.
pub fn decode_one(ty: &ParamType, data: &[u8]) -> Result<Token> {
    let mut tokens = decode_sequence(core::slice::from_ref(ty), data, 0)?;
    tokens.pop().ok_or(Error::InvalidData("empty decoding"))
}

fn read_word(data: &[u8], pos: usize) -> Result<[u8; SLOT_SIZE]> {
    let end = pos.checked_add(SLOT_SIZE).ok_or(Error::InvalidData("offset overflow"))?;
    let slice = data.get(pos..end).ok_or(Error::OutOfBounds {
        offset: pos,
        needed: SLOT_SIZE,
    })?;
    let mut word = [0u8; SLOT_SIZE];
    word.copy_from_slice(slice);
    Ok(word)
}

fn read_usize(data: &[u8], pos: usize) -> Result<usize> {
    let word = read_word(data, pos)?;
    if word[..SLOT_SIZE - 8].iter().any(|b| *b != 0) {
        return Err(Error::InvalidData("length or offset does not fit"));
    }
    let mut be = [0u8; 8];
    be.copy_from_slice(&word[SLOT_SIZE - 8..]);
    usize::try_from(u64::from_be_bytes(be)).map_err(|_| Error::InvalidData("length or offset does not fit"))
}

fn decode_sequence(types: &[ParamType], data: &[u8], base: usize) -> Result<Vec<Token>> {
    let mut tokens = Vec::with_capacity(types.len());
    let mut head = base;
    for ty in types {
        if ty.is_dynamic() {
            let offset = read_usize(data, head)?;
            let pos = base
                .checked_add(offset)
                .ok_or(Error::InvalidData("offset overflow"))?;
            tokens.push(decode_at(ty, data, pos)?);
        } else {
            tokens.push(decode_at(ty, data, head)?);
        }
        head += ty.head_len();
    }
    Ok(tokens)
}

fn decode_at(ty: &ParamType, data: &[u8], pos: usize) -> Result<Token> {
    match ty {
        ParamType::Uint | ParamType::FixedBytes => Ok(Token::Word(read_word(data, pos)?)),
        ParamType::Address => {
            let word = read_word(data, pos)?;
            if word[..SLOT_SIZE - 20].iter().any(|b| *b != 0) {
                return Err(Error::InvalidData("address with dirty upper bytes"));
            }
            Ok(Token::Word(word))
        }
        ParamType::Bool => {
            let word = read_word(data, pos)?;
            if word[..SLOT_SIZE - 1].iter().any(|b| *b != 0) || word[SLOT_SIZE - 1] > 1 {
                return Err(Error::InvalidData("bool is neither 0 nor 1"));
            }
            Ok(Token::Word(word))
        }
        ParamType::Bytes => {
            let len = read_usize(data, pos)?;
            let start = pos + SLOT_SIZE;
            let bytes = start
                .checked_add(len)
                .and_then(|end| data.get(start..end))
                .ok_or(Error::OutOfBounds {
                    offset: start,
                    needed: len,
                })?;
            Ok(Token::Bytes(bytes.to_vec()))
        }
        ParamType::Array(inner) => {
            let len = read_usize(data, pos)?;
            // Every element needs at least one slot, which bounds the
            // allocation by the size of the input.
            let remaining = data.len().saturating_sub(pos + SLOT_SIZE);
            if len > remaining / SLOT_SIZE {
                return Err(Error::OutOfBounds {
                    offset: pos + SLOT_SIZE,
                    needed: len.saturating_mul(SLOT_SIZE),
                });
            }
            let types = vec![(**inner).clone(); len];
            Ok(Token::Array(decode_sequence(&types, data, pos + SLOT_SIZE)?))
        }
        ParamType::FixedArray(inner, len) => {
            let types = vec![(**inner).clone(); *len];
            Ok(Token::FixedArray(decode_sequence(&types, data, pos)?))
        }
        ParamType::Tuple(members) => Ok(Token::Tuple(decode_sequence(members, data, pos)?)),
    }
}
