//! Apps that were proposed but not yet installed.

use super::{
    outcome::{Deposit, InterpreterParams, OutcomeType},
    AppInstance, ChannelError,
};
use crate::{
    abiencode::types::{Address, Hash, U256},
    identity::{app_participants, compute_identity_hash, AppIdentity},
    sig::IdentityKey,
};

/// Solidity type strings of an app's state and action, carried along so the
/// counterparty knows how to interpret them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AbiEncodings {
    pub state_encoding: String,
    pub action_encoding: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInstanceProposal {
    pub identity_hash: Hash,
    pub multisig_address: Address,
    pub app_definition: Address,
    pub abi_encodings: AbiEncodings,
    /// `abi.encode` of the initial state.
    pub initial_state: Vec<u8>,
    pub outcome_type: OutcomeType,
    pub initiator_deposit: U256,
    pub initiator_deposit_token: Address,
    pub responder_deposit: U256,
    pub responder_deposit_token: Address,
    pub default_timeout: U256,
    pub state_timeout: U256,
    pub app_seq_no: u32,
    pub proposed_by: IdentityKey,
    pub proposed_to: IdentityKey,
}

/// Everything needed to build a proposal, as exchanged by the Propose flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalTerms {
    pub app_definition: Address,
    pub abi_encodings: AbiEncodings,
    pub initial_state: Vec<u8>,
    pub outcome_type: OutcomeType,
    pub initiator_deposit: U256,
    pub initiator_deposit_token: Address,
    pub responder_deposit: U256,
    pub responder_deposit_token: Address,
    pub default_timeout: U256,
    pub state_timeout: U256,
}

impl AppInstanceProposal {
    /// Build the proposal occupying `app_seq_no`. Both parties call this with
    /// the same inputs and arrive at the same identity hash.
    pub fn new(
        terms: ProposalTerms,
        multisig_address: Address,
        app_seq_no: u32,
        proposed_by: IdentityKey,
        proposed_to: IdentityKey,
    ) -> Result<Self, ChannelError> {
        let participants = app_participants(&[proposed_by, proposed_to], app_seq_no)?;
        let identity_hash = compute_identity_hash(
            terms.app_definition,
            app_seq_no.into(),
            &participants,
            terms.default_timeout,
        );
        Ok(Self {
            identity_hash,
            multisig_address,
            app_definition: terms.app_definition,
            abi_encodings: terms.abi_encodings,
            initial_state: terms.initial_state,
            outcome_type: terms.outcome_type,
            initiator_deposit: terms.initiator_deposit,
            initiator_deposit_token: terms.initiator_deposit_token,
            responder_deposit: terms.responder_deposit,
            responder_deposit_token: terms.responder_deposit_token,
            default_timeout: terms.default_timeout,
            state_timeout: terms.state_timeout,
            app_seq_no,
            proposed_by,
            proposed_to,
        })
    }

    pub fn participants(&self) -> Result<[Address; 2], ChannelError> {
        Ok(app_participants(&[self.proposed_by, self.proposed_to], self.app_seq_no)?)
    }

    pub fn identity(&self) -> Result<AppIdentity, ChannelError> {
        Ok(AppIdentity {
            channel_nonce: self.app_seq_no.into(),
            participants: self.participants()?,
            app_definition: self.app_definition,
            default_timeout: self.default_timeout,
        })
    }

    /// The two deposits, paid from each party's free balance address.
    pub fn deposits(&self) -> Result<[Deposit; 2], ChannelError> {
        Ok([
            Deposit {
                depositor: self.proposed_by.derive_address(0)?,
                amount: self.initiator_deposit,
                token: self.initiator_deposit_token,
            },
            Deposit {
                depositor: self.proposed_to.derive_address(0)?,
                amount: self.responder_deposit,
                token: self.responder_deposit_token,
            },
        ])
    }

    /// The installed app this proposal turns into, version 0 with the
    /// initial state.
    pub fn to_app_instance(&self) -> Result<AppInstance, ChannelError> {
        let [initiator, responder] = self.deposits()?;
        let interpreter_params = InterpreterParams::compute(self.outcome_type, initiator, responder)?;
        Ok(AppInstance {
            identity_hash: self.identity_hash,
            multisig_address: self.multisig_address,
            initiator_identifier: self.proposed_by,
            responder_identifier: self.proposed_to,
            participants: self.participants()?,
            app_definition: self.app_definition,
            abi_encodings: self.abi_encodings.clone(),
            default_timeout: self.default_timeout,
            state_timeout: self.state_timeout,
            app_seq_no: self.app_seq_no,
            latest_state: self.initial_state.clone(),
            latest_version_number: 0,
            outcome_type: self.outcome_type,
            interpreter_params: Some(interpreter_params),
            initiator_deposit: self.initiator_deposit,
            initiator_deposit_token: self.initiator_deposit_token,
            responder_deposit: self.responder_deposit,
            responder_deposit_token: self.responder_deposit_token,
        })
    }
}
