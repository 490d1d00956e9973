//! TakeAction and Update: a new signed state for an installed app, one
//! version above the last.

use super::{
    exchange::{Exchange, ExchangeSpec, PersistAt},
    require_channel, FlowContext,
};
use crate::{
    abiencode::types::{Hash, Signature, U256},
    channel::StateChannel,
    commitment::SetStateCommitment,
    engine::{FlowOutcome, PersistKind, ProtocolError, Step, ValidationError},
    messages::{Protocol, ProtocolParams},
    sig::IdentityKey,
};

enum Change<'a> {
    Action(&'a [u8]),
    State(&'a [u8]),
}

fn change_of(params: &ProtocolParams) -> Result<(Hash, Change<'_>, Option<U256>), ProtocolError> {
    match params {
        ProtocolParams::TakeAction(p) => {
            Ok((p.identity_hash, Change::Action(&p.action), p.state_timeout))
        }
        ProtocolParams::Update(p) => Ok((p.identity_hash, Change::State(&p.new_state), p.state_timeout)),
        other => Err(ValidationError::ProtocolMismatch {
            expected: Protocol::TakeAction,
            got: other.protocol(),
        }
        .into()),
    }
}

fn take_action(
    ctx: &FlowContext,
    params: &ProtocolParams,
    channel: Option<StateChannel>,
) -> Result<ExchangeSpec, ProtocolError> {
    let channel = require_channel(channel, params.multisig_address())?;
    let (identity_hash, change, state_timeout) = change_of(params)?;
    let app = channel.get_app_instance(&identity_hash)?;
    let logic = ctx.apps.get(&app.app_definition)?;
    let new_state = match change {
        Change::Action(action) => logic.apply_action(&app.latest_state, action)?,
        Change::State(state) => {
            logic.validate_state(state)?;
            state.to_vec()
        }
    };
    let state_timeout = state_timeout.unwrap_or(app.default_timeout);
    let key_index = app.app_seq_no;
    let next = channel.set_state(&identity_hash, new_state, state_timeout)?;

    let commitment = SetStateCommitment::for_app(
        ctx.network().challenge_registry,
        next.get_app_instance(&identity_hash)?,
    );
    Ok(ExchangeSpec {
        commitment,
        key_index,
        persist: Step::PersistApp {
            kind: PersistKind::UpdateInstance,
            channel: next.clone(),
            identity_hash,
        },
        persist_at: PersistAt::AfterCommitment,
        outcome: FlowOutcome {
            protocol: params.protocol(),
            channel: next,
            identity_hash: Some(identity_hash),
        },
    })
}

pub(super) fn initiator(
    ctx: FlowContext,
    counterparty: IdentityKey,
    params: &ProtocolParams,
    channel: Option<StateChannel>,
) -> Result<Exchange, ProtocolError> {
    let spec = take_action(&ctx, params, channel)?;
    Ok(Exchange::initiator(ctx, counterparty, params.clone(), spec))
}

pub(super) fn responder(
    ctx: FlowContext,
    counterparty: IdentityKey,
    params: &ProtocolParams,
    channel: Option<StateChannel>,
    signature: Signature,
) -> Result<Exchange, ProtocolError> {
    let spec = take_action(&ctx, params, channel)?;
    Ok(Exchange::responder(ctx, counterparty, signature, spec))
}
