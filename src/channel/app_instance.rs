use super::{
    outcome::{InterpreterParams, OutcomeType},
    AbiEncodings, ChannelError,
};
use crate::{
    abiencode::{
        keccak256,
        types::{Address, Hash, U256},
    },
    identity::AppIdentity,
    sig::IdentityKey,
};

/// An installed app (or the free balance app).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInstance {
    pub identity_hash: Hash,
    pub multisig_address: Address,
    pub initiator_identifier: IdentityKey,
    pub responder_identifier: IdentityKey,
    /// Signing addresses at `app_seq_no`, sorted.
    pub participants: [Address; 2],
    pub app_definition: Address,
    pub abi_encodings: AbiEncodings,
    pub default_timeout: U256,
    /// Challenge window of the latest state.
    pub state_timeout: U256,
    pub app_seq_no: u32,
    /// `abi.encode` of the latest state.
    pub latest_state: Vec<u8>,
    pub latest_version_number: u64,
    pub outcome_type: OutcomeType,
    /// `None` only for the free balance, which is never uninstalled.
    pub interpreter_params: Option<InterpreterParams>,
    pub initiator_deposit: U256,
    pub initiator_deposit_token: Address,
    pub responder_deposit: U256,
    pub responder_deposit_token: Address,
}

impl AppInstance {
    pub fn identity(&self) -> AppIdentity {
        AppIdentity {
            channel_nonce: self.app_seq_no.into(),
            participants: self.participants,
            app_definition: self.app_definition,
            default_timeout: self.default_timeout,
        }
    }

    /// `keccak256(abi.encode(latestState))`
    pub fn state_hash(&self) -> Hash {
        keccak256(&self.latest_state)
    }

    /// The next version of this app with `state`. The version number grows by
    /// exactly one.
    pub fn set_state(&self, state: Vec<u8>, state_timeout: U256) -> Result<Self, ChannelError> {
        let latest_version_number = self
            .latest_version_number
            .checked_add(1)
            .ok_or(ChannelError::Overflow)?;
        Ok(Self {
            latest_state: state,
            latest_version_number,
            state_timeout,
            ..self.clone()
        })
    }

    pub fn interpreter_params(&self) -> Result<&InterpreterParams, ChannelError> {
        self.interpreter_params
            .as_ref()
            .ok_or(ChannelError::NoSuchApp(self.identity_hash))
    }

    /// Counterparty of `me` in this app.
    pub fn counterparty_of(&self, me: &IdentityKey) -> Result<IdentityKey, ChannelError> {
        if *me == self.initiator_identifier {
            Ok(self.responder_identifier)
        } else if *me == self.responder_identifier {
            Ok(self.initiator_identifier)
        } else {
            Err(ChannelError::NotParticipant(me.to_string()))
        }
    }
}
