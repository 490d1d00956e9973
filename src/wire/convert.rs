use super::proto::{self, envelope};
use crate::{
    abiencode::types::{Address, Hash, Signature, U256},
    channel::{AbiEncodings, OutcomeType, ProposalTerms},
    messages::{
        CustomData, InstallParams, ProcessId, ProposeParams, ProtocolMessage, ProtocolParams,
        SetupParams, TakeActionParams, UninstallParams, UpdateParams,
    },
    sig::{IdentityKey, KeyError},
};

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("{0} has the wrong length")]
    ByteLengthMismatch(&'static str),
    #[error("{0} is missing")]
    ExpectedSome(&'static str),
    #[error("unknown protocol {0:?}")]
    UnknownProtocol(String),
    #[error("unknown outcome type {0}")]
    UnknownOutcomeType(u32),
    #[error("invalid identity key: {0}")]
    IdentityKey(#[from] KeyError),
}

fn fixed<const N: usize>(bytes: Vec<u8>, what: &'static str) -> Result<[u8; N], ConversionError> {
    bytes
        .try_into()
        .or(Err(ConversionError::ByteLengthMismatch(what)))
}

fn address(bytes: Vec<u8>, what: &'static str) -> Result<Address, ConversionError> {
    Ok(Address(fixed(bytes, what)?))
}

fn hash(bytes: Vec<u8>, what: &'static str) -> Result<Hash, ConversionError> {
    Ok(Hash(fixed(bytes, what)?))
}

fn signature(bytes: Vec<u8>) -> Result<Signature, ConversionError> {
    Ok(Signature(fixed(bytes, "signature")?))
}

fn uint(bytes: Vec<u8>, what: &'static str) -> Result<U256, ConversionError> {
    Ok(U256::from_big_endian(&fixed::<32>(bytes, what)?))
}

fn uint_bytes(value: U256) -> Vec<u8> {
    let mut out = vec![0u8; 32];
    value.to_big_endian(&mut out);
    out
}

struct Channel {
    multisig_address: Address,
    initiator_identifier: IdentityKey,
    responder_identifier: IdentityKey,
}

fn channel_ref(
    multisig_address: Address,
    initiator_identifier: &IdentityKey,
    responder_identifier: &IdentityKey,
) -> Option<proto::ChannelRef> {
    Some(proto::ChannelRef {
        multisig_address: multisig_address.0.to_vec(),
        initiator_identifier: initiator_identifier.to_bytes().to_vec(),
        responder_identifier: responder_identifier.to_bytes().to_vec(),
    })
}

impl TryFrom<Option<proto::ChannelRef>> for Channel {
    type Error = ConversionError;

    fn try_from(value: Option<proto::ChannelRef>) -> Result<Self, Self::Error> {
        let value = value.ok_or(ConversionError::ExpectedSome("channel"))?;
        Ok(Channel {
            multisig_address: address(value.multisig_address, "multisig_address")?,
            initiator_identifier: IdentityKey::from_bytes(&value.initiator_identifier)?,
            responder_identifier: IdentityKey::from_bytes(&value.responder_identifier)?,
        })
    }
}

impl From<ProtocolParams> for envelope::Params {
    fn from(value: ProtocolParams) -> Self {
        match value {
            ProtocolParams::Setup(p) => envelope::Params::Setup(proto::SetupParamsMsg {
                channel: channel_ref(
                    p.multisig_address,
                    &p.initiator_identifier,
                    &p.responder_identifier,
                ),
            }),
            ProtocolParams::Propose(p) => envelope::Params::Propose(proto::ProposeParamsMsg {
                channel: channel_ref(
                    p.multisig_address,
                    &p.initiator_identifier,
                    &p.responder_identifier,
                ),
                app_definition: p.terms.app_definition.0.to_vec(),
                state_encoding: p.terms.abi_encodings.state_encoding,
                action_encoding: p.terms.abi_encodings.action_encoding,
                initial_state: p.terms.initial_state,
                outcome_type: p.terms.outcome_type.as_u32(),
                initiator_deposit: uint_bytes(p.terms.initiator_deposit),
                initiator_deposit_token: p.terms.initiator_deposit_token.0.to_vec(),
                responder_deposit: uint_bytes(p.terms.responder_deposit),
                responder_deposit_token: p.terms.responder_deposit_token.0.to_vec(),
                default_timeout: uint_bytes(p.terms.default_timeout),
                state_timeout: uint_bytes(p.terms.state_timeout),
            }),
            ProtocolParams::Install(p) => envelope::Params::Install(proto::InstallParamsMsg {
                channel: channel_ref(
                    p.multisig_address,
                    &p.initiator_identifier,
                    &p.responder_identifier,
                ),
                identity_hash: p.identity_hash.0.to_vec(),
            }),
            ProtocolParams::Uninstall(p) => envelope::Params::Uninstall(proto::UninstallParamsMsg {
                channel: channel_ref(
                    p.multisig_address,
                    &p.initiator_identifier,
                    &p.responder_identifier,
                ),
                identity_hash: p.identity_hash.0.to_vec(),
                action: p.action,
            }),
            ProtocolParams::TakeAction(p) => {
                envelope::Params::TakeAction(proto::TakeActionParamsMsg {
                    channel: channel_ref(
                        p.multisig_address,
                        &p.initiator_identifier,
                        &p.responder_identifier,
                    ),
                    identity_hash: p.identity_hash.0.to_vec(),
                    action: p.action,
                    state_timeout: p.state_timeout.map(uint_bytes),
                })
            }
            ProtocolParams::Update(p) => envelope::Params::Update(proto::UpdateParamsMsg {
                channel: channel_ref(
                    p.multisig_address,
                    &p.initiator_identifier,
                    &p.responder_identifier,
                ),
                identity_hash: p.identity_hash.0.to_vec(),
                new_state: p.new_state,
                state_timeout: p.state_timeout.map(uint_bytes),
            }),
        }
    }
}

impl TryFrom<envelope::Params> for ProtocolParams {
    type Error = ConversionError;

    fn try_from(value: envelope::Params) -> Result<Self, Self::Error> {
        Ok(match value {
            envelope::Params::Setup(p) => {
                let c = Channel::try_from(p.channel)?;
                ProtocolParams::Setup(SetupParams {
                    multisig_address: c.multisig_address,
                    initiator_identifier: c.initiator_identifier,
                    responder_identifier: c.responder_identifier,
                })
            }
            envelope::Params::Propose(p) => {
                let c = Channel::try_from(p.channel)?;
                let outcome_type = OutcomeType::from_u32(p.outcome_type)
                    .ok_or(ConversionError::UnknownOutcomeType(p.outcome_type))?;
                ProtocolParams::Propose(ProposeParams {
                    multisig_address: c.multisig_address,
                    initiator_identifier: c.initiator_identifier,
                    responder_identifier: c.responder_identifier,
                    terms: ProposalTerms {
                        app_definition: address(p.app_definition, "app_definition")?,
                        abi_encodings: AbiEncodings {
                            state_encoding: p.state_encoding,
                            action_encoding: p.action_encoding,
                        },
                        initial_state: p.initial_state,
                        outcome_type,
                        initiator_deposit: uint(p.initiator_deposit, "initiator_deposit")?,
                        initiator_deposit_token: address(
                            p.initiator_deposit_token,
                            "initiator_deposit_token",
                        )?,
                        responder_deposit: uint(p.responder_deposit, "responder_deposit")?,
                        responder_deposit_token: address(
                            p.responder_deposit_token,
                            "responder_deposit_token",
                        )?,
                        default_timeout: uint(p.default_timeout, "default_timeout")?,
                        state_timeout: uint(p.state_timeout, "state_timeout")?,
                    },
                })
            }
            envelope::Params::Install(p) => {
                let c = Channel::try_from(p.channel)?;
                ProtocolParams::Install(InstallParams {
                    multisig_address: c.multisig_address,
                    initiator_identifier: c.initiator_identifier,
                    responder_identifier: c.responder_identifier,
                    identity_hash: hash(p.identity_hash, "identity_hash")?,
                })
            }
            envelope::Params::Uninstall(p) => {
                let c = Channel::try_from(p.channel)?;
                ProtocolParams::Uninstall(UninstallParams {
                    multisig_address: c.multisig_address,
                    initiator_identifier: c.initiator_identifier,
                    responder_identifier: c.responder_identifier,
                    identity_hash: hash(p.identity_hash, "identity_hash")?,
                    action: p.action,
                })
            }
            envelope::Params::TakeAction(p) => {
                let c = Channel::try_from(p.channel)?;
                ProtocolParams::TakeAction(TakeActionParams {
                    multisig_address: c.multisig_address,
                    initiator_identifier: c.initiator_identifier,
                    responder_identifier: c.responder_identifier,
                    identity_hash: hash(p.identity_hash, "identity_hash")?,
                    action: p.action,
                    state_timeout: p
                        .state_timeout
                        .map(|t| uint(t, "state_timeout"))
                        .transpose()?,
                })
            }
            envelope::Params::Update(p) => {
                let c = Channel::try_from(p.channel)?;
                ProtocolParams::Update(UpdateParams {
                    multisig_address: c.multisig_address,
                    initiator_identifier: c.initiator_identifier,
                    responder_identifier: c.responder_identifier,
                    identity_hash: hash(p.identity_hash, "identity_hash")?,
                    new_state: p.new_state,
                    state_timeout: p
                        .state_timeout
                        .map(|t| uint(t, "state_timeout"))
                        .transpose()?,
                })
            }
        })
    }
}

impl From<ProtocolMessage> for proto::Envelope {
    fn from(value: ProtocolMessage) -> Self {
        Self {
            protocol: value.protocol.as_str().to_string(),
            process_id: value.process_id.0.to_vec(),
            seq: value.seq,
            to_identity_key: value.to_identity_key.to_bytes().to_vec(),
            signature: value.custom_data.signature.map(|s| s.0.to_vec()),
            signature2: value.custom_data.signature2.map(|s| s.0.to_vec()),
            params: value.params.map(Into::into),
        }
    }
}

impl TryFrom<proto::Envelope> for ProtocolMessage {
    type Error = ConversionError;

    fn try_from(value: proto::Envelope) -> Result<Self, Self::Error> {
        Ok(ProtocolMessage {
            protocol: value
                .protocol
                .parse()
                .map_err(ConversionError::UnknownProtocol)?,
            process_id: ProcessId(fixed(value.process_id, "process_id")?),
            seq: value.seq,
            to_identity_key: IdentityKey::from_bytes(&value.to_identity_key)?,
            params: value.params.map(ProtocolParams::try_from).transpose()?,
            custom_data: CustomData {
                signature: value.signature.map(signature).transpose()?,
                signature2: value.signature2.map(signature).transpose()?,
            },
        })
    }
}
