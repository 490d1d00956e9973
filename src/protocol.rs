//! The protocol flows: Setup, Propose, Install, Uninstall, TakeAction and
//! Update, each with an initiator and a responder role.
//!
//! Flows are pure state machines over [Step]s. Everything they need from the
//! store is loaded by the runner before the first step.

mod exchange;
mod install;
mod propose;
mod setup;
mod take_action;
mod uninstall;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use crate::{
    abiencode::types::{Address, Hash, Signature},
    apps::AppRegistry,
    channel::StateChannel,
    config::{EngineConfig, NetworkContext},
    engine::{ProtocolError, ProtocolFlow, StepOutput, ValidationError},
    messages::{CustomData, ProcessId, Protocol, ProtocolMessage, ProtocolParams},
    sig::{self, IdentityKey},
};

/// What a flow knows about the node it runs on.
#[derive(Debug, Clone)]
pub struct FlowContext {
    pub config: Arc<EngineConfig>,
    pub apps: Arc<AppRegistry>,
    pub me: IdentityKey,
    pub process_id: ProcessId,
}

impl FlowContext {
    pub fn network(&self) -> &NetworkContext {
        &self.config.network
    }

    fn message(
        &self,
        protocol: Protocol,
        seq: i32,
        to: IdentityKey,
        params: Option<ProtocolParams>,
        custom_data: CustomData,
    ) -> ProtocolMessage {
        ProtocolMessage {
            protocol,
            process_id: self.process_id,
            seq,
            to_identity_key: to,
            params,
            custom_data,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Role {
    Initiator,
    Responder,
}

impl Role {
    /// Verify a signature received from the other role. A bad signature
    /// from the initiator and a bad reply from the responder are reported
    /// differently.
    fn verify_counterparty(
        self,
        expected: Address,
        digest: Hash,
        signature: &Signature,
    ) -> Result<(), ProtocolError> {
        sig::verify_signature(expected, digest, signature).map_err(|e| match self {
            Role::Initiator => ProtocolError::InvalidCounterpartySignature(e),
            Role::Responder => ProtocolError::InvalidSignature(e),
        })
    }
}

/// The other participant, after checking that this node plays `role`.
fn counterparty(
    ctx: &FlowContext,
    params: &ProtocolParams,
    role: Role,
) -> Result<IdentityKey, ProtocolError> {
    let (mine, theirs, name) = match role {
        Role::Initiator => (
            params.initiator_identifier(),
            params.responder_identifier(),
            "initiator",
        ),
        Role::Responder => (
            params.responder_identifier(),
            params.initiator_identifier(),
            "responder",
        ),
    };
    if *mine != ctx.me {
        return Err(ValidationError::WrongRole(name).into());
    }
    Ok(*theirs)
}

/// On an existing channel both identifiers of a run must be its owners.
fn check_participants(
    ctx: &FlowContext,
    counterparty: IdentityKey,
    channel: Option<&StateChannel>,
) -> Result<(), ProtocolError> {
    let channel = match channel {
        Some(channel) => channel,
        None => return Ok(()),
    };
    let not_owner = |key: IdentityKey| ValidationError::NotParticipant {
        multisig: channel.multisig_address(),
        key,
    };
    let owner = channel
        .counterparty_of(&ctx.me)
        .map_err(|_| not_owner(ctx.me))?;
    if owner != counterparty {
        return Err(not_owner(counterparty).into());
    }
    Ok(())
}

fn require_channel(
    channel: Option<StateChannel>,
    multisig_address: Address,
) -> Result<StateChannel, ProtocolError> {
    channel.ok_or_else(|| ValidationError::NoChannel(multisig_address).into())
}

fn expect_start(input: StepOutput) -> Result<(), ProtocolError> {
    match input {
        StepOutput::Start => Ok(()),
        _ => Err(ProtocolError::UnexpectedMessage("expected start")),
    }
}

fn expect_done(input: StepOutput) -> Result<(), ProtocolError> {
    match input {
        StepOutput::Done => Ok(()),
        _ => Err(ProtocolError::UnexpectedMessage("expected step completion")),
    }
}

fn expect_signature(input: StepOutput) -> Result<Signature, ProtocolError> {
    match input {
        StepOutput::Signature(sig) => Ok(sig),
        _ => Err(ProtocolError::UnexpectedMessage("expected signature")),
    }
}

fn expect_reply(input: StepOutput) -> Result<ProtocolMessage, ProtocolError> {
    match input {
        StepOutput::Reply(msg) => Ok(msg),
        _ => Err(ProtocolError::UnexpectedMessage("expected reply")),
    }
}

fn signature_of(sig: Option<Signature>, what: &'static str) -> Result<Signature, ProtocolError> {
    sig.ok_or_else(|| ValidationError::MissingSignature(what).into())
}

/// The initiator role of `params.protocol()`.
pub fn initiator_flow(
    ctx: FlowContext,
    params: ProtocolParams,
    channel: Option<StateChannel>,
) -> Result<Box<dyn ProtocolFlow>, ProtocolError> {
    let counterparty = counterparty(&ctx, &params, Role::Initiator)?;
    check_participants(&ctx, counterparty, channel.as_ref())?;
    let flow: Box<dyn ProtocolFlow> = match &params {
        ProtocolParams::Setup(p) => Box::new(setup::initiator(ctx, counterparty, p, channel)?),
        ProtocolParams::Propose(p) => Box::new(propose::initiator(ctx, counterparty, p, channel)?),
        ProtocolParams::Install(p) => Box::new(install::initiator(ctx, counterparty, p, channel)?),
        ProtocolParams::Uninstall(p) => {
            Box::new(uninstall::initiator(ctx, counterparty, p, channel)?)
        }
        ProtocolParams::TakeAction(_) | ProtocolParams::Update(_) => {
            Box::new(take_action::initiator(ctx, counterparty, &params, channel)?)
        }
    };
    Ok(flow)
}

/// The responder role for the first message `msg` of a run.
pub fn responder_flow(
    ctx: FlowContext,
    msg: ProtocolMessage,
    channel: Option<StateChannel>,
) -> Result<Box<dyn ProtocolFlow>, ProtocolError> {
    let params = msg
        .params
        .ok_or(ValidationError::MissingParams(msg.protocol))?;
    if params.protocol() != msg.protocol {
        return Err(ValidationError::ProtocolMismatch {
            expected: msg.protocol,
            got: params.protocol(),
        }
        .into());
    }
    let counterparty = counterparty(&ctx, &params, Role::Responder)?;
    check_participants(&ctx, counterparty, channel.as_ref())?;
    let signature = signature_of(msg.custom_data.signature, "initiator signature")?;
    let flow: Box<dyn ProtocolFlow> = match &params {
        ProtocolParams::Setup(p) => {
            Box::new(setup::responder(ctx, counterparty, p, channel, signature)?)
        }
        ProtocolParams::Propose(p) => {
            Box::new(propose::responder(ctx, counterparty, p, channel, signature)?)
        }
        ProtocolParams::Install(p) => {
            Box::new(install::responder(ctx, counterparty, p, channel, signature)?)
        }
        ProtocolParams::Uninstall(p) => {
            Box::new(uninstall::responder(ctx, counterparty, p, channel, signature)?)
        }
        ProtocolParams::TakeAction(_) | ProtocolParams::Update(_) => Box::new(
            take_action::responder(ctx, counterparty, &params, channel, signature)?,
        ),
    };
    Ok(flow)
}
