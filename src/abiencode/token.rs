//! Intermediate representation between serde and the slot layout of
//! Solidity's ABI.
//!
//! Serializing a value first produces a [Token] tree (see
//! [ser][super::ser]), which knows for every node whether it is dynamic and
//! how many slots it needs. Writing the tree then is a single head/tail pass
//! without having to serialize the value more than once. The decoder produces
//! the same tree, so outcome and state decoding can share the accessors
//! below.

use super::{
    error::{Error, Result},
    types::{Address, Hash, U256},
};

/// Size of one ABI slot in bytes.
pub const SLOT_SIZE: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A single right-aligned value: uintN, intN, bool, address or a decoded
    /// bytesN.
    Word([u8; SLOT_SIZE]),
    /// Raw static bytes, left-aligned and padded to whole slots. This is what
    /// `serialize_bytes` produces, which is used for `bytesN`, [Hash],
    /// [Address] and [U256].
    FixedBytes(Vec<u8>),
    /// `bytes` and `string`.
    Bytes(Vec<u8>),
    /// `T[]`
    Array(Vec<Token>),
    /// `T[N]`
    FixedArray(Vec<Token>),
    /// Structs and tuples.
    Tuple(Vec<Token>),
}

fn padded_len(len: usize) -> usize {
    (len + SLOT_SIZE - 1) / SLOT_SIZE * SLOT_SIZE
}

pub(super) fn usize_word(value: usize) -> [u8; SLOT_SIZE] {
    let mut word = [0u8; SLOT_SIZE];
    word[SLOT_SIZE - 8..].copy_from_slice(&(value as u64).to_be_bytes());
    word
}

impl Token {
    pub fn is_dynamic(&self) -> bool {
        match self {
            Token::Word(_) | Token::FixedBytes(_) => false,
            Token::Bytes(_) | Token::Array(_) => true,
            Token::FixedArray(tokens) | Token::Tuple(tokens) => tokens.iter().any(Token::is_dynamic),
        }
    }

    /// Number of bytes this token occupies in the head of its parent.
    fn head_len(&self) -> usize {
        if self.is_dynamic() {
            SLOT_SIZE
        } else {
            self.encoded_len()
        }
    }

    /// Number of bytes of the complete encoding of this token.
    pub fn encoded_len(&self) -> usize {
        match self {
            Token::Word(_) => SLOT_SIZE,
            Token::FixedBytes(bytes) => padded_len(bytes.len()),
            Token::Bytes(bytes) => SLOT_SIZE + padded_len(bytes.len()),
            Token::Array(tokens) => SLOT_SIZE + sequence_len(tokens),
            Token::FixedArray(tokens) | Token::Tuple(tokens) => sequence_len(tokens),
        }
    }

    pub(super) fn write<W: Writer>(&self, w: &mut W) {
        match self {
            Token::Word(word) => w.write(word),
            Token::FixedBytes(bytes) => write_padded(bytes, w),
            Token::Bytes(bytes) => {
                w.write(&usize_word(bytes.len()));
                write_padded(bytes, w);
            }
            Token::Array(tokens) => {
                w.write(&usize_word(tokens.len()));
                write_sequence(tokens, w);
            }
            Token::FixedArray(tokens) | Token::Tuple(tokens) => write_sequence(tokens, w),
        }
    }

    pub fn into_word(self) -> Result<[u8; SLOT_SIZE]> {
        match self {
            Token::Word(word) => Ok(word),
            Token::FixedBytes(bytes) if bytes.len() == SLOT_SIZE => {
                let mut word = [0u8; SLOT_SIZE];
                word.copy_from_slice(&bytes);
                Ok(word)
            }
            _ => Err(Error::UnexpectedToken("a single word")),
        }
    }

    pub fn into_u256(self) -> Result<U256> {
        Ok(U256::from_big_endian(&self.into_word()?))
    }

    pub fn into_address(self) -> Result<Address> {
        let word = self.into_word()?;
        if word[..SLOT_SIZE - 20].iter().any(|b| *b != 0) {
            return Err(Error::InvalidData("address with dirty upper bytes"));
        }
        let mut addr = Address::default();
        addr.0.copy_from_slice(&word[SLOT_SIZE - 20..]);
        Ok(addr)
    }

    pub fn into_hash(self) -> Result<Hash> {
        Ok(Hash(self.into_word()?))
    }

    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            Token::Bytes(bytes) => Ok(bytes),
            _ => Err(Error::UnexpectedToken("bytes")),
        }
    }

    /// Elements of a fixed or dynamic array.
    pub fn into_array(self) -> Result<Vec<Token>> {
        match self {
            Token::Array(tokens) | Token::FixedArray(tokens) => Ok(tokens),
            _ => Err(Error::UnexpectedToken("an array")),
        }
    }

    pub fn into_tuple(self) -> Result<Vec<Token>> {
        match self {
            Token::Tuple(tokens) => Ok(tokens),
            _ => Err(Error::UnexpectedToken("a tuple")),
        }
    }
}

fn write_padded<W: Writer>(bytes: &[u8], w: &mut W) {
    for chunk in bytes.chunks(SLOT_SIZE) {
        if chunk.len() == SLOT_SIZE {
            w.write(chunk);
        } else {
            let mut slot = [0u8; SLOT_SIZE];
            slot[..chunk.len()].copy_from_slice(chunk);
            w.write(&slot);
        }
    }
}

fn sequence_len(tokens: &[Token]) -> usize {
    tokens
        .iter()
        .map(|t| {
            if t.is_dynamic() {
                SLOT_SIZE + t.encoded_len()
            } else {
                t.encoded_len()
            }
        })
        .sum()
}

/// Write the tokens as the members of one tuple: static members and offsets
/// in the head, followed by the content of dynamic members in the tail.
///
/// Offsets are relative to the beginning of the head.
pub(super) fn write_sequence<W: Writer>(tokens: &[Token], w: &mut W) {
    let mut offset: usize = tokens.iter().map(Token::head_len).sum();
    for token in tokens {
        if token.is_dynamic() {
            w.write(&usize_word(offset));
            offset += token.encoded_len();
        } else {
            token.write(w);
        }
    }
    for token in tokens.iter().filter(|t| t.is_dynamic()) {
        token.write(w);
    }
}

/// Sink for encoded slots.
///
/// Every call receives exactly one slot of [SLOT_SIZE] bytes.
pub trait Writer {
    fn write(&mut self, slot: &[u8]);
}

impl Writer for Vec<u8> {
    fn write(&mut self, slot: &[u8]) {
        self.extend_from_slice(slot);
    }
}
