//! Signer using the k256 Rust crate (implementation of ecdsa in Rust).

use crate::abiencode::types::{Address, Hash, Signature};
use k256::{
    ecdsa::{
        recoverable,
        signature::{hazmat::PrehashSigner, Signature as k256Signature},
        SigningKey, VerifyingKey,
    },
    elliptic_curve::sec1::ToEncodedPoint,
    PublicKey,
};
use sha3::{Digest, Keccak256};

use super::{hash_to_eth_signed_msg_hash, Error};

fn address_from_uncompressed(point: &[u8]) -> Address {
    // Throw away the first byte (0x04), which is not part of the public key,
    // it only tags the point as uncompressed.
    let hash: [u8; 32] = Keccak256::digest(&point[1..]).into();
    let mut addr = Address([0; 20]);
    addr.0.copy_from_slice(&hash[32 - 20..]);
    addr
}

impl From<&VerifyingKey> for Address {
    fn from(key: &VerifyingKey) -> Self {
        address_from_uncompressed(key.to_encoded_point(false).as_bytes())
    }
}

impl From<&PublicKey> for Address {
    fn from(key: &PublicKey) -> Self {
        address_from_uncompressed(key.to_encoded_point(false).as_bytes())
    }
}

#[derive(Debug, Clone)]
pub struct Signer {
    key: SigningKey,
    addr: Address,
}

impl Signer {
    pub fn new<R: rand::RngCore + rand::CryptoRng>(rng: &mut R) -> Self {
        Self::from_signing_key(SigningKey::random(rng))
    }

    pub fn from_bytes(private_key: &[u8; 32]) -> Result<Self, Error> {
        Ok(Self::from_signing_key(SigningKey::from_bytes(private_key)?))
    }

    pub(super) fn from_signing_key(key: SigningKey) -> Self {
        let addr = Address::from(&key.verifying_key());
        Self { key, addr }
    }

    pub fn address(&self) -> Address {
        self.addr
    }

    pub fn sign_eth(&self, msg: Hash) -> Result<Signature, Error> {
        // "\x19Ethereum Signed Message:\n32" format
        let hash = hash_to_eth_signed_msg_hash(msg);

        let sig: recoverable::Signature = self.key.sign_prehash(&hash.0)?;

        // This Signature type already has the format we need: 65 bytes
        // containing r, s and v in this order. But we still have to add 27 to
        // v for the signature to be valid in the EVM.
        let mut sig_bytes = [0u8; 65];
        sig_bytes.copy_from_slice(sig.as_bytes());
        sig_bytes[64] += 27;

        Ok(Signature(sig_bytes))
    }
}

/// Address that produced `eth_sig` over `msg` (prefixed with the Ethereum
/// signed message header).
pub fn recover_signer(msg: Hash, eth_sig: &Signature) -> Result<Address, Error> {
    let hash = hash_to_eth_signed_msg_hash(msg);

    // Undo adding the 27, to go back to the format expected below
    let mut sig_bytes: [u8; 65] = eth_sig.0;
    sig_bytes[64] = match sig_bytes[64] {
        v @ (27 | 28) => v - 27,
        v => return Err(Error::InvalidRecoveryId(v)),
    };

    let sig = recoverable::Signature::from_bytes(&sig_bytes)?;
    let verifying_key = sig.recover_verifying_key_from_digest_bytes(&hash.0.into())?;
    Ok(Address::from(&verifying_key))
}
