//! Incremental `keccak256(abi.encodePacked(...))`.
//!
//! Packed encoding is not self-describing (types shorter than 32 bytes are
//! not padded, but array elements are), so it cannot go through the serde
//! serializer. Callers spell out the Solidity types instead.

use super::types::{Address, Hash, U256};
use sha3::{Digest, Keccak256};

#[derive(Default)]
pub struct PackedHasher {
    hasher: Keccak256,
}

impl PackedHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// `bytes1` / `uint8`
    pub fn byte(mut self, b: u8) -> Self {
        self.hasher.update([b]);
        self
    }

    pub fn address(mut self, addr: &Address) -> Self {
        self.hasher.update(addr.0);
        self
    }

    pub fn uint(mut self, value: U256) -> Self {
        let mut word = [0u8; 32];
        value.to_big_endian(&mut word);
        self.hasher.update(word);
        self
    }

    pub fn bytes32(mut self, hash: &Hash) -> Self {
        self.hasher.update(hash.0);
        self
    }

    /// Raw bytes (`bytes` or `string` in packed mode are not padded).
    pub fn bytes(mut self, data: &[u8]) -> Self {
        self.hasher.update(data);
        self
    }

    /// `address[]`: in packed mode array elements are still padded to 32
    /// bytes each, and there is no length prefix.
    pub fn address_array(mut self, addrs: &[Address]) -> Self {
        for addr in addrs {
            let mut word = [0u8; 32];
            word[12..].copy_from_slice(&addr.0);
            self.hasher.update(word);
        }
        self
    }

    pub fn finish(self) -> Hash {
        Hash(self.hasher.finalize().into())
    }
}
