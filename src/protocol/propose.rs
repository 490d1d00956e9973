use super::{
    exchange::{Exchange, ExchangeSpec, PersistAt},
    FlowContext,
};
use crate::{
    abiencode::types::Signature,
    channel::{AppInstanceProposal, StateChannel},
    commitment::SetStateCommitment,
    engine::{FlowOutcome, PersistKind, ProtocolError, Step},
    messages::{ProposeParams, Protocol, ProtocolParams},
    sig::IdentityKey,
};

/// Add the proposal at the channel's next sequence number. A proposal may
/// arrive before setup, in which case the channel is created empty and
/// persisted as a whole.
fn propose(
    ctx: &FlowContext,
    params: &ProposeParams,
    channel: Option<StateChannel>,
) -> Result<ExchangeSpec, ProtocolError> {
    ctx.apps
        .get(&params.terms.app_definition)?
        .validate_state(&params.terms.initial_state)?;
    let (channel, fresh) = match channel {
        Some(channel) => (channel, false),
        None => (
            StateChannel::create_empty_channel(
                ctx.network(),
                params.multisig_address,
                [params.initiator_identifier, params.responder_identifier],
            )?,
            true,
        ),
    };

    let proposal = AppInstanceProposal::new(
        params.terms.clone(),
        params.multisig_address,
        channel.num_proposed_apps(),
        params.initiator_identifier,
        params.responder_identifier,
    )?;
    let identity_hash = proposal.identity_hash;
    let key_index = proposal.app_seq_no;
    let commitment = SetStateCommitment::for_proposal(ctx.network().challenge_registry, &proposal)?;
    let next = channel.add_proposal(proposal)?;

    let persist = if fresh {
        Step::PersistChannel(next.clone())
    } else {
        Step::PersistApp {
            kind: PersistKind::CreateProposal,
            channel: next.clone(),
            identity_hash,
        }
    };
    Ok(ExchangeSpec {
        commitment,
        key_index,
        persist,
        persist_at: PersistAt::BeforeSigning,
        outcome: FlowOutcome {
            protocol: Protocol::Propose,
            channel: next,
            identity_hash: Some(identity_hash),
        },
    })
}

pub(super) fn initiator(
    ctx: FlowContext,
    counterparty: IdentityKey,
    params: &ProposeParams,
    channel: Option<StateChannel>,
) -> Result<Exchange, ProtocolError> {
    let spec = propose(&ctx, params, channel)?;
    Ok(Exchange::initiator(
        ctx,
        counterparty,
        ProtocolParams::Propose(params.clone()),
        spec,
    ))
}

pub(super) fn responder(
    ctx: FlowContext,
    counterparty: IdentityKey,
    params: &ProposeParams,
    channel: Option<StateChannel>,
    signature: Signature,
) -> Result<Exchange, ProtocolError> {
    let spec = propose(&ctx, params, channel)?;
    Ok(Exchange::responder(ctx, counterparty, signature, spec))
}
