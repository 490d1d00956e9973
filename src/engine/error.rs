use std::time::Duration;

use super::{HandlerError, Opcode};
use crate::{
    abiencode::{self, types::Address},
    apps::AppError,
    channel::{ChannelError, OutcomeError},
    commitment::CommitmentError,
    messages::{ProcessId, Protocol},
    sig::{self, IdentityKey},
};

/// Bad or missing input, detected before any side effect.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("no channel with multisig {0}")]
    NoChannel(Address),
    #[error("first message of a {0} run carries no params")]
    MissingParams(Protocol),
    #[error("{got} params in a {expected} message")]
    ProtocolMismatch { expected: Protocol, got: Protocol },
    #[error("this node is not the {0} of the run")]
    WrongRole(&'static str),
    #[error("{key} is not an owner of channel {multisig}")]
    NotParticipant { multisig: Address, key: IdentityKey },
    #[error("message is missing {0}")]
    MissingSignature(&'static str),
    #[error(transparent)]
    App(#[from] AppError),
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The initiator's signature did not verify on the responder's side.
    #[error("invalid signature: {0}")]
    InvalidSignature(#[source] sig::Error),
    /// A signature the responder sent back did not verify.
    #[error("invalid counterparty signature: {0}")]
    InvalidCounterpartySignature(#[source] sig::Error),
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    #[error("persistence failed: {0}")]
    Persistence(#[source] HandlerError),
    #[error(transparent)]
    Outcome(#[from] OutcomeError),
    #[error("transport failed: {0}")]
    Transport(#[source] HandlerError),
    #[error("signing failed: {0}")]
    Signing(#[source] HandlerError),
    #[error("no handler registered for {0}")]
    NoHandler(Opcode),
    #[error("unexpected step result: {0}")]
    UnexpectedMessage(&'static str),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error(transparent)]
    Commitment(#[from] CommitmentError),
    #[error(transparent)]
    Abi(#[from] abiencode::Error),
}

impl ProtocolError {
    /// Whether running the protocol again may succeed. Everything else
    /// needs a change of input or operator attention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProtocolError::Timeout(_) | ProtocolError::Transport(_))
    }
}

impl From<AppError> for ProtocolError {
    fn from(e: AppError) -> Self {
        ProtocolError::Validation(e.into())
    }
}

/// A failed run, with enough context to resume or reconcile by hand.
#[derive(Debug, thiserror::Error)]
#[error(
    "{protocol} run {process_id} on channel {multisig_address} failed {}: {source}",
    fmt_position(.failed_at, .last_completed)
)]
pub struct ProtocolRunError {
    pub protocol: Protocol,
    pub process_id: ProcessId,
    pub multisig_address: Address,
    pub last_completed: Option<Opcode>,
    /// `None` if the flow failed between steps.
    pub failed_at: Option<Opcode>,
    #[source]
    pub source: ProtocolError,
}

fn fmt_position(failed_at: &Option<Opcode>, last_completed: &Option<Opcode>) -> String {
    match (failed_at, last_completed) {
        (None, None) => "before the first step".to_string(),
        (Some(failed), None) => format!("at {}", failed),
        (Some(failed), Some(last)) => format!("at {} after {}", failed, last),
        (None, Some(last)) => format!("after {}", last),
    }
}

impl ProtocolRunError {
    pub fn is_retryable(&self) -> bool {
        self.source.is_retryable()
    }
}
