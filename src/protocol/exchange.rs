//! A two-message exchange of signatures on a single set-state commitment.
//!
//! Setup, Propose, Uninstall, TakeAction and Update all follow this shape and
//! differ only in the commitment, the signing key and when the new channel is
//! persisted.

use std::collections::VecDeque;

use super::{
    expect_done, expect_reply, expect_signature, expect_start, signature_of, FlowContext, Role,
};
use crate::{
    abiencode::types::Signature,
    channel::ChannelError,
    commitment::{CommitmentRecord, SetStateCommitment},
    engine::{FlowOutcome, ProtocolError, ProtocolFlow, Step, StepOutput, Suspend},
    messages::{CustomData, Protocol, ProtocolParams, UNASSIGNED_SEQ_NO},
    sig::IdentityKey,
};

/// Whether the new channel is persisted before signing or after the
/// commitment is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum PersistAt {
    BeforeSigning,
    AfterCommitment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Persist,
    Sign,
    SendAndWait,
    WriteCommitment,
    Reply,
}

pub(super) struct Exchange {
    ctx: FlowContext,
    protocol: Protocol,
    role: Role,
    counterparty: IdentityKey,
    /// Sent along with the opening message.
    params: Option<ProtocolParams>,
    /// The initiator's signature, on the responder's side.
    incoming: Option<Signature>,
    commitment: SetStateCommitment,
    key_index: u32,
    persist: Step,
    outcome: FlowOutcome,
    my_signature: Option<Signature>,
    plan: VecDeque<Action>,
    pending: Option<Action>,
}

/// Inputs shared by both roles.
pub(super) struct ExchangeSpec {
    pub commitment: SetStateCommitment,
    pub key_index: u32,
    pub persist: Step,
    pub persist_at: PersistAt,
    pub outcome: FlowOutcome,
}

impl Exchange {
    pub(super) fn initiator(
        ctx: FlowContext,
        counterparty: IdentityKey,
        params: ProtocolParams,
        spec: ExchangeSpec,
    ) -> Self {
        let plan = match spec.persist_at {
            PersistAt::BeforeSigning => vec![
                Action::Persist,
                Action::Sign,
                Action::SendAndWait,
                Action::WriteCommitment,
            ],
            PersistAt::AfterCommitment => vec![
                Action::Sign,
                Action::SendAndWait,
                Action::WriteCommitment,
                Action::Persist,
            ],
        };
        Self::build(ctx, Role::Initiator, counterparty, Some(params), None, spec, plan)
    }

    pub(super) fn responder(
        ctx: FlowContext,
        counterparty: IdentityKey,
        incoming: Signature,
        spec: ExchangeSpec,
    ) -> Self {
        let plan = match spec.persist_at {
            PersistAt::BeforeSigning => vec![
                Action::Persist,
                Action::Sign,
                Action::WriteCommitment,
                Action::Reply,
            ],
            PersistAt::AfterCommitment => vec![
                Action::Sign,
                Action::WriteCommitment,
                Action::Persist,
                Action::Reply,
            ],
        };
        Self::build(ctx, Role::Responder, counterparty, None, Some(incoming), spec, plan)
    }

    fn build(
        ctx: FlowContext,
        role: Role,
        counterparty: IdentityKey,
        params: Option<ProtocolParams>,
        incoming: Option<Signature>,
        spec: ExchangeSpec,
        plan: Vec<Action>,
    ) -> Self {
        Self {
            ctx,
            protocol: spec.outcome.protocol,
            role,
            counterparty,
            params,
            incoming,
            commitment: spec.commitment,
            key_index: spec.key_index,
            persist: spec.persist,
            outcome: spec.outcome,
            my_signature: None,
            plan: plan.into(),
            pending: None,
        }
    }

    /// Check `signature` against the counterparty's key and attach it.
    fn accept_counterparty(&mut self, signature: Signature) -> Result<(), ProtocolError> {
        let expected = self
            .counterparty
            .derive_address(self.key_index)
            .map_err(ChannelError::from)?;
        self.role
            .verify_counterparty(expected, self.commitment.hash_to_sign(), &signature)?;
        self.commitment.add_signatures([signature])?;
        Ok(())
    }

    fn next_step(&mut self, action: Action) -> Step {
        match action {
            Action::Persist => self.persist.clone(),
            Action::Sign => Step::Sign {
                digest: self.commitment.hash_to_sign(),
                key_index: self.key_index,
            },
            Action::SendAndWait => Step::SendAndWait(self.ctx.message(
                self.protocol,
                0,
                self.counterparty,
                self.params.take(),
                CustomData {
                    signature: self.my_signature,
                    signature2: None,
                },
            )),
            Action::WriteCommitment => Step::WriteCommitment {
                protocol: self.protocol,
                identity_hash: self.commitment.identity_hash(),
                record: CommitmentRecord::SetState(self.commitment.clone()),
            },
            Action::Reply => Step::Send(self.ctx.message(
                self.protocol,
                UNASSIGNED_SEQ_NO,
                self.counterparty,
                None,
                CustomData {
                    signature: self.my_signature,
                    signature2: None,
                },
            )),
        }
    }
}

impl ProtocolFlow for Exchange {
    fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn resume(&mut self, input: StepOutput) -> Result<Suspend, ProtocolError> {
        match self.pending.take() {
            None => {
                expect_start(input)?;
                // The responder checks the initiator before doing anything.
                if let Some(signature) = self.incoming.take() {
                    self.accept_counterparty(signature)?;
                }
            }
            Some(Action::Sign) => {
                let signature = expect_signature(input)?;
                self.commitment.add_signatures([signature])?;
                self.my_signature = Some(signature);
            }
            Some(Action::SendAndWait) => {
                let reply = expect_reply(input)?;
                let signature = signature_of(reply.custom_data.signature, "responder signature")?;
                self.accept_counterparty(signature)?;
            }
            Some(_) => expect_done(input)?,
        }

        match self.plan.pop_front() {
            Some(action) => {
                let step = self.next_step(action);
                self.pending = Some(action);
                Ok(Suspend::Yield(step))
            }
            None => Ok(Suspend::Complete(self.outcome.clone())),
        }
    }
}
