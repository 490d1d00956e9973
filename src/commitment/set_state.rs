use serde::Serialize;

use super::{add_verified, call_data, sorted_pair, CommitmentError, MinimalTransaction, SigBytes};
use crate::{
    abiencode::{
        keccak256,
        types::{Address, Hash, Signature, U256},
        PackedHasher,
    },
    channel::{AppInstance, AppInstanceProposal, ChannelError},
    identity::AppIdentity,
};

const SET_STATE_SIGNATURE: &str =
    "setState((uint256,address[],address,uint256),(bytes32,uint256,uint256,bytes[]))";

/// Assertion that the app identified by `app_identity` is at
/// `version_number` with state hash `app_state_hash`, as accepted by the
/// challenge registry's `setState`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetStateCommitment {
    pub challenge_registry: Address,
    pub app_identity: AppIdentity,
    pub app_state_hash: Hash,
    pub version_number: U256,
    pub state_timeout: U256,
    signatures: Vec<(Address, Signature)>,
}

#[derive(Serialize)]
struct SignedAppChallengeUpdate {
    app_state_hash: Hash,
    version_number: U256,
    timeout: U256,
    signatures: Vec<SigBytes>,
}

#[derive(Serialize)]
struct SetStateArgs<'a> {
    app_identity: &'a AppIdentity,
    req: SignedAppChallengeUpdate,
}

impl SetStateCommitment {
    pub fn new(
        challenge_registry: Address,
        app_identity: AppIdentity,
        app_state_hash: Hash,
        version_number: U256,
        state_timeout: U256,
    ) -> Self {
        Self {
            challenge_registry,
            app_identity,
            app_state_hash,
            version_number,
            state_timeout,
            signatures: Vec::new(),
        }
    }

    /// Commitment to the latest state of `app`.
    pub fn for_app(challenge_registry: Address, app: &AppInstance) -> Self {
        Self::new(
            challenge_registry,
            app.identity(),
            app.state_hash(),
            app.latest_version_number.into(),
            app.state_timeout,
        )
    }

    /// Commitment to the initial state of a proposed app, at version 0.
    pub fn for_proposal(
        challenge_registry: Address,
        proposal: &AppInstanceProposal,
    ) -> Result<Self, ChannelError> {
        Ok(Self::new(
            challenge_registry,
            proposal.identity()?,
            keccak256(&proposal.initial_state),
            U256::zero(),
            proposal.state_timeout,
        ))
    }

    pub fn identity_hash(&self) -> Hash {
        self.app_identity.identity_hash()
    }

    /// `keccak256(abi.encodePacked(bytes1(0x19), identityHash, versionNumber, timeout, appStateHash))`
    pub fn hash_to_sign(&self) -> Hash {
        PackedHasher::new()
            .byte(0x19)
            .bytes32(&self.identity_hash())
            .uint(self.version_number)
            .uint(self.state_timeout)
            .bytes32(&self.app_state_hash)
            .finish()
    }

    /// Attach signatures. Each must recover to one of the app's participants.
    pub fn add_signatures(
        &mut self,
        signatures: impl IntoIterator<Item = Signature>,
    ) -> Result<(), CommitmentError> {
        let digest = self.hash_to_sign();
        add_verified(
            &mut self.signatures,
            digest,
            &self.app_identity.participants,
            signatures,
        )
    }

    /// Signatures ordered by signer address.
    pub fn signatures(&self) -> Vec<Signature> {
        self.signatures.iter().map(|(_, s)| *s).collect()
    }

    pub fn is_fully_signed(&self) -> bool {
        self.signatures.len() == 2
    }

    pub fn get_signed_transaction(&self) -> Result<MinimalTransaction, CommitmentError> {
        let args = SetStateArgs {
            app_identity: &self.app_identity,
            req: SignedAppChallengeUpdate {
                app_state_hash: self.app_state_hash,
                version_number: self.version_number,
                timeout: self.state_timeout,
                signatures: sorted_pair(&self.signatures)?,
            },
        };
        Ok(MinimalTransaction {
            to: self.challenge_registry,
            value: U256::zero(),
            data: call_data(SET_STATE_SIGNATURE, &args)?,
        })
    }

    /// Block at which a challenge with this state, included on-chain at
    /// `inclusion_block`, can no longer be answered.
    pub fn finalizes_at(&self, inclusion_block: U256) -> U256 {
        inclusion_block.saturating_add(self.state_timeout)
    }
}
