use core::fmt;

use crate::{
    abiencode::types::{Hash, Signature},
    channel::StateChannel,
    commitment::CommitmentRecord,
    engine::ProtocolError,
    messages::{Protocol, ProtocolMessage},
};

/// Kinds of suspension points a flow can yield.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Sign,
    Send,
    SendAndWait,
    PersistChannel,
    PersistApp,
    WriteCommitment,
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// App lifecycle transitions recorded by [Step::PersistApp].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistKind {
    CreateProposal,
    RemoveProposal,
    CreateInstance,
    UpdateInstance,
    RemoveInstance,
    /// Local removal of a proposal that will never be installed.
    Reject,
}

/// A request from a flow to the host, together with its payload.
#[derive(Debug, Clone)]
pub enum Step {
    Sign {
        digest: Hash,
        key_index: u32,
    },
    Send(ProtocolMessage),
    SendAndWait(ProtocolMessage),
    PersistChannel(StateChannel),
    PersistApp {
        kind: PersistKind,
        /// The channel after the transition.
        channel: StateChannel,
        identity_hash: Hash,
    },
    WriteCommitment {
        protocol: Protocol,
        identity_hash: Hash,
        record: CommitmentRecord,
    },
}

impl Step {
    pub fn opcode(&self) -> Opcode {
        match self {
            Step::Sign { .. } => Opcode::Sign,
            Step::Send(_) => Opcode::Send,
            Step::SendAndWait(_) => Opcode::SendAndWait,
            Step::PersistChannel(_) => Opcode::PersistChannel,
            Step::PersistApp { .. } => Opcode::PersistApp,
            Step::WriteCommitment { .. } => Opcode::WriteCommitment,
        }
    }
}

/// What a flow is resumed with.
#[derive(Debug, Clone)]
pub enum StepOutput {
    /// First resume of a run.
    Start,
    Signature(Signature),
    Reply(ProtocolMessage),
    /// The step had no result.
    Done,
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct FlowOutcome {
    pub protocol: Protocol,
    /// The channel as persisted by the run.
    pub channel: StateChannel,
    /// The app the run was about, if any.
    pub identity_hash: Option<Hash>,
}

#[derive(Debug)]
pub enum Suspend {
    Yield(Step),
    Complete(FlowOutcome),
}

/// One role of one protocol, as an explicit state machine.
///
/// The driver calls [resume][ProtocolFlow::resume] with [StepOutput::Start]
/// first and then with the result of each yielded step, until the flow
/// completes or fails.
pub trait ProtocolFlow: Send {
    fn protocol(&self) -> Protocol;

    fn resume(&mut self, input: StepOutput) -> Result<Suspend, ProtocolError>;
}
