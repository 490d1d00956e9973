//! Commitments: signed off-chain statements either party can take on-chain
//! on its own if the counterparty stalls.

mod conditional;
mod set_state;

pub use conditional::ConditionalTransactionCommitment;
pub use set_state::SetStateCommitment;

use serde::Serialize;

use crate::{
    abiencode::{
        self,
        types::{Address, Hash, Signature, U256},
    },
    sig::{self, recover_signer},
};

#[derive(Debug, thiserror::Error)]
pub enum CommitmentError {
    #[error("commitment needs 2 signatures, has {0}")]
    MissingSignatures(usize),
    #[error("{0} is not a signer of this commitment")]
    UnknownSigner(Address),
    #[error(transparent)]
    Sig(#[from] sig::Error),
    #[error(transparent)]
    Abi(#[from] abiencode::Error),
}

/// A transaction ready to be submitted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MinimalTransaction {
    pub to: Address,
    pub value: U256,
    pub data: Vec<u8>,
}

/// Any commitment a flow writes to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitmentRecord {
    SetState(SetStateCommitment),
    Conditional(ConditionalTransactionCommitment),
}

impl CommitmentRecord {
    pub fn hash_to_sign(&self) -> Result<Hash, CommitmentError> {
        match self {
            CommitmentRecord::SetState(c) => Ok(c.hash_to_sign()),
            CommitmentRecord::Conditional(c) => Ok(c.hash_to_sign()?),
        }
    }

    pub fn signatures(&self) -> Vec<Signature> {
        match self {
            CommitmentRecord::SetState(c) => c.signatures(),
            CommitmentRecord::Conditional(c) => c.signatures(),
        }
    }
}

/// `bytes` element of a `bytes[] signatures` argument.
#[derive(Serialize, Debug, Clone, Copy)]
#[serde(transparent)]
struct SigBytes(#[serde(with = "abiencode::as_bytes")] Signature);

/// Add `new` to `signatures` after checking each against `signers`. A second
/// signature by the same signer replaces the first.
fn add_verified(
    signatures: &mut Vec<(Address, Signature)>,
    digest: Hash,
    signers: &[Address],
    new: impl IntoIterator<Item = Signature>,
) -> Result<(), CommitmentError> {
    for signature in new {
        let signer = recover_signer(digest, &signature)?;
        if !signers.contains(&signer) {
            return Err(CommitmentError::UnknownSigner(signer));
        }
        signatures.retain(|(s, _)| *s != signer);
        signatures.push((signer, signature));
    }
    signatures.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(())
}

/// Both signatures, ascending by signer, or [CommitmentError::MissingSignatures].
fn sorted_pair(signatures: &[(Address, Signature)]) -> Result<Vec<SigBytes>, CommitmentError> {
    if signatures.len() != 2 {
        return Err(CommitmentError::MissingSignatures(signatures.len()));
    }
    Ok(signatures.iter().map(|(_, s)| SigBytes(*s)).collect())
}

/// Call data `selector(signature) || abi.encode(args...)`.
fn call_data<T: Serialize>(signature: &str, args: &T) -> Result<Vec<u8>, abiencode::Error> {
    let mut data = abiencode::selector(signature).to_vec();
    abiencode::to_fn_args_writer(args, &mut data)?;
    Ok(data)
}
