//! Install moves a proposal into the installed apps and debits both deposits
//! from the free balance.
//!
//! Two commitments are signed: the conditional transaction paying out the
//! app, then the free balance update. Neither party signs the debit before
//! it holds the fully signed conditional transaction.
//!
//! ```text
//! initiator                                  responder
//!   Sign(conditional)
//!   SendAndWait(seq 0: conditional_I) ----->
//!                                              verify conditional_I
//!                                              Sign(conditional)
//!                                              WriteCommitment(conditional)
//!                                              Sign(free balance)
//!              <----- SendAndWait(seq 1: conditional_R, free_balance_R)
//!   verify conditional_R
//!   WriteCommitment(conditional)
//!   verify free_balance_R
//!   Sign(free balance)
//!   WriteCommitment(free balance)
//!   PersistApp(CreateInstance)
//!   Send(free_balance_I) ------------------->
//!                                              verify free_balance_I
//!                                              WriteCommitment(free balance)
//!                                              PersistApp(CreateInstance)
//! ```

use tracing::debug;

use super::{
    expect_done, expect_reply, expect_signature, expect_start, require_channel, signature_of,
    FlowContext, Role,
};
use crate::{
    abiencode::types::{Address, Hash, Signature},
    channel::{ChannelError, StateChannel},
    commitment::{CommitmentRecord, ConditionalTransactionCommitment, SetStateCommitment},
    engine::{FlowOutcome, PersistKind, ProtocolError, ProtocolFlow, Step, StepOutput, Suspend},
    messages::{CustomData, InstallParams, Protocol, ProtocolParams, UNASSIGNED_SEQ_NO},
    sig::IdentityKey,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Start,
    SigningConditional,
    AwaitingReply,
    WritingConditional,
    SigningFreeBalance,
    WritingFreeBalance,
    Persisting,
    SendingFreeBalance,
}

pub(super) struct Install {
    ctx: FlowContext,
    role: Role,
    counterparty: IdentityKey,
    params: Option<ProtocolParams>,
    identity_hash: Hash,
    next: StateChannel,
    conditional: ConditionalTransactionCommitment,
    free_balance: SetStateCommitment,
    /// Counterparty signatures received ahead of the step that checks them.
    their_conditional: Option<Signature>,
    their_free_balance: Option<Signature>,
    my_conditional: Option<Signature>,
    my_free_balance: Option<Signature>,
    stage: Stage,
}

fn install(
    ctx: FlowContext,
    role: Role,
    counterparty: IdentityKey,
    params: &InstallParams,
    channel: Option<StateChannel>,
) -> Result<Install, ProtocolError> {
    let channel = require_channel(channel, params.multisig_address)?;
    let next = channel.install_app(&params.identity_hash)?;
    let free_balance_app = next.free_balance()?;
    let conditional = ConditionalTransactionCommitment::new(
        ctx.network(),
        next.multisig_address(),
        next.multisig_owners()?,
        free_balance_app.identity_hash,
        next.get_app_instance(&params.identity_hash)?,
    )?;
    let free_balance =
        SetStateCommitment::for_app(ctx.network().challenge_registry, free_balance_app);
    Ok(Install {
        ctx,
        role,
        counterparty,
        params: None,
        identity_hash: params.identity_hash,
        next,
        conditional,
        free_balance,
        their_conditional: None,
        their_free_balance: None,
        my_conditional: None,
        my_free_balance: None,
        stage: Stage::Start,
    })
}

pub(super) fn initiator(
    ctx: FlowContext,
    counterparty: IdentityKey,
    params: &InstallParams,
    channel: Option<StateChannel>,
) -> Result<Install, ProtocolError> {
    let mut flow = install(ctx, Role::Initiator, counterparty, params, channel)?;
    flow.params = Some(ProtocolParams::Install(params.clone()));
    Ok(flow)
}

pub(super) fn responder(
    ctx: FlowContext,
    counterparty: IdentityKey,
    params: &InstallParams,
    channel: Option<StateChannel>,
    signature: Signature,
) -> Result<Install, ProtocolError> {
    let mut flow = install(ctx, Role::Responder, counterparty, params, channel)?;
    flow.their_conditional = Some(signature);
    Ok(flow)
}

impl Install {
    /// Both commitments are signed with the free balance key.
    fn counterparty_address(&self) -> Result<Address, ProtocolError> {
        Ok(self
            .counterparty
            .derive_address(0)
            .map_err(ChannelError::from)?)
    }

    fn accept_conditional(&mut self) -> Result<(), ProtocolError> {
        let signature = signature_of(self.their_conditional.take(), "conditional signature")?;
        let expected = self.counterparty_address()?;
        self.role
            .verify_counterparty(expected, self.conditional.hash_to_sign()?, &signature)?;
        self.conditional.add_signatures([signature])?;
        Ok(())
    }

    fn accept_free_balance(&mut self) -> Result<(), ProtocolError> {
        let signature = signature_of(self.their_free_balance.take(), "free balance signature")?;
        let expected = self.counterparty_address()?;
        self.role
            .verify_counterparty(expected, self.free_balance.hash_to_sign(), &signature)?;
        self.free_balance.add_signatures([signature])?;
        Ok(())
    }

    fn sign_conditional(&mut self) -> Result<Suspend, ProtocolError> {
        self.stage = Stage::SigningConditional;
        Ok(Suspend::Yield(Step::Sign {
            digest: self.conditional.hash_to_sign()?,
            key_index: 0,
        }))
    }

    fn sign_free_balance(&mut self) -> Result<Suspend, ProtocolError> {
        self.stage = Stage::SigningFreeBalance;
        Ok(Suspend::Yield(Step::Sign {
            digest: self.free_balance.hash_to_sign(),
            key_index: 0,
        }))
    }

    fn write_conditional(&mut self) -> Result<Suspend, ProtocolError> {
        self.stage = Stage::WritingConditional;
        Ok(Suspend::Yield(Step::WriteCommitment {
            protocol: Protocol::Install,
            identity_hash: self.identity_hash,
            record: CommitmentRecord::Conditional(self.conditional.clone()),
        }))
    }

    fn write_free_balance(&mut self) -> Result<Suspend, ProtocolError> {
        self.stage = Stage::WritingFreeBalance;
        Ok(Suspend::Yield(Step::WriteCommitment {
            protocol: Protocol::Install,
            identity_hash: self.free_balance.identity_hash(),
            record: CommitmentRecord::SetState(self.free_balance.clone()),
        }))
    }

    fn persist(&mut self) -> Result<Suspend, ProtocolError> {
        self.stage = Stage::Persisting;
        debug!(app = %self.identity_hash, "persisting installed app");
        Ok(Suspend::Yield(Step::PersistApp {
            kind: PersistKind::CreateInstance,
            channel: self.next.clone(),
            identity_hash: self.identity_hash,
        }))
    }

    fn send(&mut self, seq: i32, custom_data: CustomData, wait: bool) -> Suspend {
        let msg = self.ctx.message(
            Protocol::Install,
            seq,
            self.counterparty,
            self.params.take(),
            custom_data,
        );
        if wait {
            self.stage = Stage::AwaitingReply;
            Suspend::Yield(Step::SendAndWait(msg))
        } else {
            self.stage = Stage::SendingFreeBalance;
            Suspend::Yield(Step::Send(msg))
        }
    }

    fn complete(&self) -> Suspend {
        Suspend::Complete(FlowOutcome {
            protocol: Protocol::Install,
            channel: self.next.clone(),
            identity_hash: Some(self.identity_hash),
        })
    }

    fn resume_initiator(&mut self, input: StepOutput) -> Result<Suspend, ProtocolError> {
        match self.stage {
            Stage::Start => {
                expect_start(input)?;
                self.sign_conditional()
            }
            Stage::SigningConditional => {
                let signature = expect_signature(input)?;
                self.conditional.add_signatures([signature])?;
                self.my_conditional = Some(signature);
                let custom_data = CustomData {
                    signature: Some(signature),
                    signature2: None,
                };
                Ok(self.send(0, custom_data, true))
            }
            Stage::AwaitingReply => {
                let reply = expect_reply(input)?;
                self.their_conditional = reply.custom_data.signature;
                self.their_free_balance = reply.custom_data.signature2;
                self.accept_conditional()?;
                self.write_conditional()
            }
            Stage::WritingConditional => {
                expect_done(input)?;
                self.accept_free_balance()?;
                self.sign_free_balance()
            }
            Stage::SigningFreeBalance => {
                let signature = expect_signature(input)?;
                self.free_balance.add_signatures([signature])?;
                self.my_free_balance = Some(signature);
                self.write_free_balance()
            }
            Stage::WritingFreeBalance => {
                expect_done(input)?;
                self.persist()
            }
            Stage::Persisting => {
                expect_done(input)?;
                let custom_data = CustomData {
                    signature: self.my_free_balance,
                    signature2: None,
                };
                Ok(self.send(UNASSIGNED_SEQ_NO, custom_data, false))
            }
            Stage::SendingFreeBalance => {
                expect_done(input)?;
                Ok(self.complete())
            }
        }
    }

    fn resume_responder(&mut self, input: StepOutput) -> Result<Suspend, ProtocolError> {
        match self.stage {
            Stage::Start => {
                expect_start(input)?;
                self.accept_conditional()?;
                self.sign_conditional()
            }
            Stage::SigningConditional => {
                let signature = expect_signature(input)?;
                self.conditional.add_signatures([signature])?;
                self.my_conditional = Some(signature);
                self.write_conditional()
            }
            Stage::WritingConditional => {
                expect_done(input)?;
                self.sign_free_balance()
            }
            Stage::SigningFreeBalance => {
                let signature = expect_signature(input)?;
                self.free_balance.add_signatures([signature])?;
                self.my_free_balance = Some(signature);
                let custom_data = CustomData {
                    signature: self.my_conditional,
                    signature2: Some(signature),
                };
                Ok(self.send(1, custom_data, true))
            }
            Stage::AwaitingReply => {
                let reply = expect_reply(input)?;
                self.their_free_balance = reply.custom_data.signature;
                self.accept_free_balance()?;
                self.write_free_balance()
            }
            Stage::WritingFreeBalance => {
                expect_done(input)?;
                self.persist()
            }
            Stage::Persisting => {
                expect_done(input)?;
                Ok(self.complete())
            }
            Stage::SendingFreeBalance => Err(ProtocolError::UnexpectedMessage(
                "responder sends no final message",
            )),
        }
    }
}

impl ProtocolFlow for Install {
    fn protocol(&self) -> Protocol {
        Protocol::Install
    }

    fn resume(&mut self, input: StepOutput) -> Result<Suspend, ProtocolError> {
        match self.role {
            Role::Initiator => self.resume_initiator(input),
            Role::Responder => self.resume_responder(input),
        }
    }
}
