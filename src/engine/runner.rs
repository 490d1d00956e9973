use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::{
    error::{ProtocolError, ProtocolRunError, ValidationError},
    handlers::HandlerTable,
    locks::ChannelLocks,
    mailbox::{Delivery, Mailbox},
    step::{FlowOutcome, Opcode, PersistKind, ProtocolFlow, Step, StepOutput, Suspend},
};
use crate::{
    abiencode::types::{Address, Hash},
    apps::AppRegistry,
    config::EngineConfig,
    messages::{ProcessId, Protocol, ProtocolMessage, ProtocolParams},
    protocol::{self, FlowContext},
    sig::IdentityKey,
    store::Store,
};

struct Inner {
    config: Arc<EngineConfig>,
    identity: IdentityKey,
    store: Arc<dyn Store>,
    apps: Arc<AppRegistry>,
    handlers: HandlerTable,
    mailbox: Mailbox,
    locks: ChannelLocks,
}

/// Runs protocol flows for one identity. Cheap to clone, all clones share
/// the same mailbox and locks.
#[derive(Clone)]
pub struct ProtocolRunner {
    inner: Arc<Inner>,
}

struct RunInfo {
    protocol: Protocol,
    process_id: ProcessId,
    multisig_address: Address,
}

impl RunInfo {
    fn fail(
        &self,
        source: ProtocolError,
        last_completed: Option<Opcode>,
        failed_at: Option<Opcode>,
    ) -> ProtocolRunError {
        ProtocolRunError {
            protocol: self.protocol,
            process_id: self.process_id,
            multisig_address: self.multisig_address,
            last_completed,
            failed_at,
            source,
        }
    }
}

impl ProtocolRunner {
    pub fn new(
        config: EngineConfig,
        identity: IdentityKey,
        store: Arc<dyn Store>,
        apps: AppRegistry,
        handlers: HandlerTable,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config: Arc::new(config),
                identity,
                store,
                apps: Arc::new(apps),
                handlers,
                mailbox: Mailbox::new(),
                locks: ChannelLocks::new(),
            }),
        }
    }

    pub fn identity(&self) -> &IdentityKey {
        &self.inner.identity
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.inner.store
    }

    fn context(&self, process_id: ProcessId) -> FlowContext {
        FlowContext {
            config: self.inner.config.clone(),
            apps: self.inner.apps.clone(),
            me: self.inner.identity,
            process_id,
        }
    }

    /// Run the initiator role of `params.protocol()` under a fresh process
    /// id.
    pub async fn initiate_protocol(
        &self,
        params: ProtocolParams,
    ) -> Result<FlowOutcome, ProtocolRunError> {
        self.initiate_protocol_with_id(ProcessId::random(), params)
            .await
    }

    #[instrument(skip_all, fields(protocol = %params.protocol(), process_id = %process_id))]
    pub async fn initiate_protocol_with_id(
        &self,
        process_id: ProcessId,
        params: ProtocolParams,
    ) -> Result<FlowOutcome, ProtocolRunError> {
        let run = RunInfo {
            protocol: params.protocol(),
            process_id,
            multisig_address: params.multisig_address(),
        };
        info!(multisig = %run.multisig_address, "initiating protocol");

        let _guards = self.inner.locks.acquire(&params.lock_names()).await;
        let channel = self
            .load_channel(run.multisig_address)
            .await
            .map_err(|e| run.fail(e, None, None))?;
        let ctx = self.context(process_id);
        let mut flow = protocol::initiator_flow(ctx, params, channel)
            .map_err(|e| run.fail(e, None, None))?;
        self.drive(&run, flow.as_mut()).await
    }

    /// Handle an inbound message. The first message of a run starts the
    /// responder role and returns its outcome, later ones are handed to the
    /// run waiting for them.
    #[instrument(skip_all, fields(protocol = %msg.protocol, process_id = %msg.process_id, seq = msg.seq))]
    pub async fn run_protocol_with_message(
        &self,
        msg: ProtocolMessage,
    ) -> Result<Option<FlowOutcome>, ProtocolRunError> {
        if msg.seq != 0 {
            if self.inner.mailbox.deliver(msg) != Delivery::Delivered {
                debug!("message not handed to a run");
            }
            return Ok(None);
        }
        if !self.inner.mailbox.mark_seen(msg.process_id, msg.seq) {
            warn!("dropping duplicate first message");
            return Ok(None);
        }

        let params = match &msg.params {
            Some(params) => params.clone(),
            None => {
                return Err(ProtocolRunError {
                    protocol: msg.protocol,
                    process_id: msg.process_id,
                    multisig_address: Address::default(),
                    last_completed: None,
                    failed_at: None,
                    source: ValidationError::MissingParams(msg.protocol).into(),
                })
            }
        };
        let run = RunInfo {
            protocol: msg.protocol,
            process_id: msg.process_id,
            multisig_address: params.multisig_address(),
        };
        info!(multisig = %run.multisig_address, "responding to protocol");

        let _guards = self.inner.locks.acquire(&params.lock_names()).await;
        let channel = self
            .load_channel(run.multisig_address)
            .await
            .map_err(|e| run.fail(e, None, None))?;
        let ctx = self.context(msg.process_id);
        let mut flow =
            protocol::responder_flow(ctx, msg, channel).map_err(|e| run.fail(e, None, None))?;
        self.drive(&run, flow.as_mut()).await.map(Some)
    }

    /// Drop a proposal that will not be installed, e.g. after the install
    /// timed out. Only the local copy of the channel changes.
    #[instrument(skip(self))]
    pub async fn reject_proposal(
        &self,
        multisig_address: Address,
        identity_hash: Hash,
    ) -> Result<FlowOutcome, ProtocolRunError> {
        let run = RunInfo {
            protocol: Protocol::Propose,
            process_id: ProcessId::default(),
            multisig_address,
        };
        let _guards = self
            .inner
            .locks
            .acquire(&[multisig_address.to_string()])
            .await;
        let channel = self
            .load_channel(multisig_address)
            .await
            .map_err(|e| run.fail(e, None, None))?
            .ok_or_else(|| run.fail(ValidationError::NoChannel(multisig_address).into(), None, None))?;
        let channel = channel
            .remove_proposal(&identity_hash)
            .map_err(|e| run.fail(e.into(), None, None))?;
        self.dispatch(
            run.process_id,
            Step::PersistApp {
                kind: PersistKind::Reject,
                channel: channel.clone(),
                identity_hash,
            },
        )
        .await
        .map_err(|e| run.fail(e, None, Some(Opcode::PersistApp)))?;
        info!("proposal rejected");
        Ok(FlowOutcome {
            protocol: Protocol::Propose,
            channel,
            identity_hash: Some(identity_hash),
        })
    }

    async fn load_channel(
        &self,
        multisig_address: Address,
    ) -> Result<Option<crate::channel::StateChannel>, ProtocolError> {
        self.inner
            .store
            .get_state_channel_if_exists(multisig_address)
            .await
            .map_err(|e| ProtocolError::Persistence(e.into()))
    }

    /// Resume `flow` with the result of each step it yields until it
    /// completes. The first failure ends the run.
    async fn drive(
        &self,
        run: &RunInfo,
        flow: &mut dyn ProtocolFlow,
    ) -> Result<FlowOutcome, ProtocolRunError> {
        let mut input = StepOutput::Start;
        let mut last_completed = None;
        loop {
            let step = match flow.resume(input) {
                Ok(Suspend::Yield(step)) => step,
                Ok(Suspend::Complete(outcome)) => {
                    info!(protocol = %flow.protocol(), "protocol completed");
                    return Ok(outcome);
                }
                Err(e) => {
                    warn!(error = %e, last_completed = ?last_completed, "protocol failed");
                    return Err(run.fail(e, last_completed, None));
                }
            };
            let opcode = step.opcode();
            debug!(%opcode, "dispatching step");
            input = match self.dispatch(run.process_id, step).await {
                Ok(output) => output,
                Err(e) => {
                    warn!(error = %e, %opcode, "step failed");
                    return Err(run.fail(e, last_completed, Some(opcode)));
                }
            };
            last_completed = Some(opcode);
        }
    }

    async fn dispatch(&self, process_id: ProcessId, step: Step) -> Result<StepOutput, ProtocolError> {
        let handlers = &self.inner.handlers;
        match step {
            Step::Sign { digest, key_index } => handlers
                .signer()?
                .sign(digest, key_index)
                .await
                .map(StepOutput::Signature)
                .map_err(ProtocolError::Signing),
            Step::Send(msg) => {
                handlers
                    .transport(Opcode::Send)?
                    .deliver(msg)
                    .await
                    .map_err(ProtocolError::Transport)?;
                Ok(StepOutput::Done)
            }
            Step::SendAndWait(msg) => {
                let transport = handlers.transport(Opcode::SendAndWait)?;
                let timeout = self.inner.config.send_and_wait_timeout();
                let reply = self.inner.mailbox.wait_for(process_id);
                if let Err(e) = transport.deliver(msg).await {
                    self.inner.mailbox.cancel(&process_id);
                    return Err(ProtocolError::Transport(e));
                }
                match tokio::time::timeout(timeout, reply).await {
                    Ok(Ok(msg)) => Ok(StepOutput::Reply(msg)),
                    // The sender only goes away through cancel, which runs
                    // after a timeout.
                    Ok(Err(_)) | Err(_) => {
                        self.inner.mailbox.cancel(&process_id);
                        Err(ProtocolError::Timeout(timeout))
                    }
                }
            }
            Step::PersistChannel(channel) => {
                handlers
                    .persistence(Opcode::PersistChannel)?
                    .persist_channel(&channel)
                    .await
                    .map_err(ProtocolError::Persistence)?;
                Ok(StepOutput::Done)
            }
            Step::PersistApp {
                kind,
                channel,
                identity_hash,
            } => {
                handlers
                    .persistence(Opcode::PersistApp)?
                    .persist_app(kind, &channel, identity_hash)
                    .await
                    .map_err(ProtocolError::Persistence)?;
                Ok(StepOutput::Done)
            }
            Step::WriteCommitment {
                protocol,
                identity_hash,
                record,
            } => {
                handlers
                    .persistence(Opcode::WriteCommitment)?
                    .write_commitment(protocol, identity_hash, &record)
                    .await
                    .map_err(ProtocolError::Persistence)?;
                Ok(StepOutput::Done)
            }
        }
    }
}
