use super::{
    exchange::{Exchange, ExchangeSpec, PersistAt},
    require_channel, FlowContext,
};
use crate::{
    abiencode::types::Signature,
    channel::{compute_free_balance_increments, StateChannel},
    commitment::SetStateCommitment,
    engine::{FlowOutcome, PersistKind, ProtocolError, Step},
    messages::{Protocol, ProtocolParams, UninstallParams},
    sig::IdentityKey,
};

/// Remove the app and credit its outcome to the free balance. Both parties
/// compute the outcome themselves from the app's latest state, after the
/// optional final action.
fn uninstall(
    ctx: &FlowContext,
    params: &UninstallParams,
    channel: Option<StateChannel>,
) -> Result<ExchangeSpec, ProtocolError> {
    let channel = require_channel(channel, params.multisig_address)?;
    let app = channel.get_app_instance(&params.identity_hash)?;
    let logic = ctx.apps.get(&app.app_definition)?;

    let final_state = match &params.action {
        Some(action) => logic.apply_action(&app.latest_state, action)?,
        None => app.latest_state.clone(),
    };
    let outcome = logic.compute_outcome(&final_state)?;
    let increments = compute_free_balance_increments(app.interpreter_params()?, &outcome)?;
    let next = channel.uninstall_app(&params.identity_hash, &increments)?;

    let commitment = SetStateCommitment::for_app(
        ctx.network().challenge_registry,
        next.free_balance()?,
    );
    Ok(ExchangeSpec {
        commitment,
        key_index: 0,
        persist: Step::PersistApp {
            kind: PersistKind::RemoveInstance,
            channel: next.clone(),
            identity_hash: params.identity_hash,
        },
        persist_at: PersistAt::AfterCommitment,
        outcome: FlowOutcome {
            protocol: Protocol::Uninstall,
            channel: next,
            identity_hash: Some(params.identity_hash),
        },
    })
}

pub(super) fn initiator(
    ctx: FlowContext,
    counterparty: IdentityKey,
    params: &UninstallParams,
    channel: Option<StateChannel>,
) -> Result<Exchange, ProtocolError> {
    let spec = uninstall(&ctx, params, channel)?;
    Ok(Exchange::initiator(
        ctx,
        counterparty,
        ProtocolParams::Uninstall(params.clone()),
        spec,
    ))
}

pub(super) fn responder(
    ctx: FlowContext,
    counterparty: IdentityKey,
    params: &UninstallParams,
    channel: Option<StateChannel>,
    signature: Signature,
) -> Result<Exchange, ProtocolError> {
    let spec = uninstall(&ctx, params, channel)?;
    Ok(Exchange::responder(ctx, counterparty, signature, spec))
}
