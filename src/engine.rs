//! Generic driver for protocol flows.
//!
//! A flow never performs I/O itself. It yields a [Step] describing what it
//! needs, the runner dispatches the step to the registered handler and
//! resumes the flow with the result.

mod error;
mod handlers;
mod locks;
mod mailbox;
mod runner;
mod step;

pub use error::{ProtocolError, ProtocolRunError, ValidationError};
pub use handlers::{HandlerError, HandlerTable, KeySigner, PersistHandler, SignHandler, Transport};
pub use locks::{ChannelGuards, ChannelLocks};
pub use mailbox::{Delivery, Mailbox};
pub use runner::ProtocolRunner;
pub use step::{FlowOutcome, Opcode, PersistKind, ProtocolFlow, Step, StepOutput, Suspend};
