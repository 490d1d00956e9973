use super::{to_writer, token::Writer, types::Hash, Error};

use serde::Serialize;
use sha3::{Digest, Keccak256};

#[derive(Default)]
pub struct Keccak256Writer {
    hasher: Keccak256,
}

impl Writer for Keccak256Writer {
    fn write(&mut self, slot: &[u8]) {
        self.hasher.update(slot);
    }
}

impl Keccak256Writer {
    pub fn finalize(self) -> Hash {
        Hash(self.hasher.finalize().into())
    }
}

/// `keccak256(abi.encode(value))` without materializing the encoding.
pub fn to_hash<T>(value: &T) -> Result<Hash, Error>
where
    T: Serialize + ?Sized,
{
    let mut writer = Keccak256Writer::default();
    to_writer(value, &mut writer)?;
    Ok(writer.finalize())
}

pub fn keccak256(data: &[u8]) -> Hash {
    Hash(Keccak256::digest(data).into())
}

/// First four bytes of the hash of a canonical function signature such as
/// `"transfer(address,uint256)"`.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash.0[..4]);
    out
}
