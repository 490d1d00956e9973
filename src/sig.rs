//! Handles the creation and verification of (Ethereum) Signatures, and the
//! derivation of per-app signing keys from a participant's identity key.

use crate::abiencode::types::{Address, Hash, Signature};
use sha3::{Digest, Keccak256};

mod signer;
mod xkey;

pub use signer::{recover_signer, Signer};
pub use xkey::{ExtendedPrivateKey, IdentityKey, KeyError};


#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed signature: {0}")]
    Malformed(#[from] k256::ecdsa::Error),
    #[error("signature recovery id must be 27 or 28, got {0}")]
    InvalidRecoveryId(u8),
    #[error("wrong signer: expected {expected}, recovered {recovered}")]
    InvalidSignature { expected: Address, recovered: Address },
    #[error("signatures are not sorted by signer address")]
    NotSorted,
    #[error("expected {expected} signatures, got {got}")]
    SignatureCount { expected: usize, got: usize },
}

/// Add the `\x19Ethereum Signed Message\n<length>` prefix to hash.
///
/// This is the format expected by the Solidity contracts.
fn hash_to_eth_signed_msg_hash(hash: Hash) -> Hash {
    // Packed encoding => We can't use the serializer
    let mut hasher = Keccak256::new();
    hasher.update(b"\x19Ethereum Signed Message:\n32");
    hasher.update(hash.0);
    Hash(hasher.finalize().into())
}

/// Fails with [Error::InvalidSignature] unless `signature` over `digest` was
/// produced by `expected`.
pub fn verify_signature(expected: Address, digest: Hash, signature: &Signature) -> Result<(), Error> {
    let recovered = recover_signer(digest, signature)?;
    if recovered != expected {
        return Err(Error::InvalidSignature {
            expected,
            recovered,
        });
    }
    Ok(())
}

/// Order signatures ascending by the address that signed `digest`.
///
/// The on-chain verifier walks owners in ascending order and rejects
/// otherwise valid signatures submitted out of order.
pub fn sort_signatures_by_signer_address(
    digest: Hash,
    signatures: &[Signature],
) -> Result<Vec<Signature>, Error> {
    let mut with_signer = signatures
        .iter()
        .map(|sig| Ok((recover_signer(digest, sig)?, *sig)))
        .collect::<Result<Vec<_>, Error>>()?;
    with_signer.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(with_signer.into_iter().map(|(_, sig)| sig).collect())
}

/// Check `signatures` the way the verifier contract does: one per signer,
/// each recovering to the signer at the same position, signers strictly
/// ascending.
pub fn verify_signatures(
    digest: Hash,
    signatures: &[Signature],
    signers: &[Address],
) -> Result<(), Error> {
    if signatures.len() != signers.len() {
        return Err(Error::SignatureCount {
            expected: signers.len(),
            got: signatures.len(),
        });
    }
    let recovered = signatures
        .iter()
        .map(|sig| recover_signer(digest, sig))
        .collect::<Result<Vec<_>, Error>>()?;
    if recovered.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(Error::NotSorted);
    }
    for (recovered, expected) in recovered.into_iter().zip(signers) {
        if recovered != *expected {
            return Err(Error::InvalidSignature {
                expected: *expected,
                recovered,
            });
        }
    }
    Ok(())
}
