//! Channel and app data model.
//!
//! All types here are values: every transition returns a new version and
//! leaves the old one untouched, so a failed write can never corrupt the last
//! durable version.

mod app_instance;
mod free_balance;
mod outcome;
mod proposal;
mod state_channel;

pub use app_instance::AppInstance;
pub use free_balance::{FreeBalance, ETH_TOKEN_ADDRESS};
pub use outcome::{
    compute_free_balance_increments, Deposit, InterpreterParams, OutcomeError, OutcomeType,
    TokenIndexedBalances,
};
pub use proposal::{AbiEncodings, AppInstanceProposal, ProposalTerms};
pub use state_channel::StateChannel;

use crate::{
    abiencode::{
        self,
        types::{Address, Hash, U256},
    },
    sig::KeyError,
};

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel {0} has no free balance, run setup first")]
    NotSetUp(Address),
    #[error("channel {0} already has a free balance")]
    AlreadySetUp(Address),
    #[error("app {0} is already proposed or installed")]
    AppExists(Hash),
    #[error("no proposal with identity hash {0}")]
    NoSuchProposal(Hash),
    #[error("no installed app with identity hash {0}")]
    NoSuchApp(Hash),
    #[error("multisig address mismatch: expected {expected}, computed {computed}")]
    MultisigMismatch { expected: Address, computed: Address },
    #[error("app sequence number {got} does not match the next free slot {expected}")]
    AppSeqNo { expected: u32, got: u32 },
    #[error("{owner} has {balance} of token {token}, needs {amount}")]
    InsufficientFunds {
        token: Address,
        owner: Address,
        balance: U256,
        amount: U256,
    },
    #[error("balance overflow")]
    Overflow,
    #[error("{0} is not a participant of this channel")]
    NotParticipant(String),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Abi(#[from] abiencode::Error),
    #[error(transparent)]
    Outcome(#[from] OutcomeError),
}
