use super::{
    exchange::{Exchange, ExchangeSpec, PersistAt},
    FlowContext,
};
use crate::{
    abiencode::types::Signature,
    channel::StateChannel,
    commitment::SetStateCommitment,
    engine::{FlowOutcome, ProtocolError, Step},
    messages::{Protocol, ProtocolParams, SetupParams},
    sig::IdentityKey,
};

/// The channel after setup. A channel created by an early proposal keeps
/// its proposals.
fn set_up(
    ctx: &FlowContext,
    params: &SetupParams,
    channel: Option<StateChannel>,
) -> Result<ExchangeSpec, ProtocolError> {
    let config = &ctx.config;
    let timeout = config.free_balance_default_timeout();
    let initial_state_timeout = config.free_balance_initial_state_timeout();
    let next = match channel {
        Some(existing) => existing.setup(ctx.network(), timeout, initial_state_timeout)?,
        None => StateChannel::setup_channel(
            ctx.network(),
            params.multisig_address,
            [params.initiator_identifier, params.responder_identifier],
            timeout,
            initial_state_timeout,
        )?,
    };
    let commitment = SetStateCommitment::for_app(
        ctx.network().challenge_registry,
        next.free_balance()?,
    );
    Ok(ExchangeSpec {
        commitment,
        key_index: 0,
        persist: Step::PersistChannel(next.clone()),
        persist_at: PersistAt::AfterCommitment,
        outcome: FlowOutcome {
            protocol: Protocol::Setup,
            channel: next,
            identity_hash: None,
        },
    })
}

pub(super) fn initiator(
    ctx: FlowContext,
    counterparty: IdentityKey,
    params: &SetupParams,
    channel: Option<StateChannel>,
) -> Result<Exchange, ProtocolError> {
    let spec = set_up(&ctx, params, channel)?;
    Ok(Exchange::initiator(
        ctx,
        counterparty,
        ProtocolParams::Setup(params.clone()),
        spec,
    ))
}

pub(super) fn responder(
    ctx: FlowContext,
    counterparty: IdentityKey,
    params: &SetupParams,
    channel: Option<StateChannel>,
    signature: Signature,
) -> Result<Exchange, ProtocolError> {
    let spec = set_up(&ctx, params, channel)?;
    Ok(Exchange::responder(ctx, counterparty, signature, spec))
}
