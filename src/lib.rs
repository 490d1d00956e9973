//! Off-chain engine for two-party state channels.
//!
//! Two parties sharing an on-chain multisig run protocols (Setup, Propose,
//! Install, Uninstall, TakeAction, Update) that exchange signed commitments.
//! Each run leaves both sides with the same new version of the
//! [StateChannel][channel::StateChannel] and with commitments either side can
//! take on-chain alone if the other stops cooperating.

pub mod abiencode {
    mod de;
    mod error;
    mod hashing;
    mod packed;
    mod ser;
    mod token;

    pub mod as_bytes;
    pub mod as_dyn_array;
    pub mod types;

    pub use de::{decode, decode_one, ParamType};
    pub use error::{Error, Result};
    pub use hashing::{keccak256, selector, to_hash, Keccak256Writer};
    pub use packed::PackedHasher;
    pub use ser::{to_bytes, to_fn_args, to_fn_args_writer, to_token, to_writer, Serializer};
    pub use token::{Token, Writer};

    #[cfg(test)]
    mod tests;
}
pub mod sig;

pub mod apps;
pub mod channel;
pub mod commitment;
pub mod config;
pub mod identity;

pub mod engine;
pub mod messages;
pub mod protocol;
pub mod store;
pub mod wire;

pub use abiencode::types::{Address, Hash, Signature, U256};
pub use engine::{ProtocolRunError, ProtocolRunner};
