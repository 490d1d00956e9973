//! Byte-level framing of [ProtocolMessage][crate::messages::ProtocolMessage]s.

mod convert;
mod encoding;
pub mod proto;

use core::fmt::Debug;

pub use convert::ConversionError;
pub use encoding::{decode_message, encode_message, ProtoBufEncodingLayer};

use crate::sig::IdentityKey;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("encoded message is {0} bytes, frames hold at most 65535")]
    TooLarge(usize),
    #[error("frame announces {expected} bytes, has {got}")]
    Truncated { expected: usize, got: usize },
    #[error(transparent)]
    Encode(#[from] prost::EncodeError),
    #[error(transparent)]
    Decode(#[from] prost::DecodeError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// Low-level byte transport to the other participant.
pub trait BytesBus: Debug + Send + Sync {
    fn send_to_participant(&self, to: &IdentityKey, frame: &[u8]) -> std::io::Result<()>;
}
