//! Error type and Return values used by the encoder and decoder.

use serde::ser;

/// Represents all possible errors that can happen while encoding or decoding.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The value contains a type that is not directly representable in
    /// Solidity types.
    ///
    /// For example floating point numbers, enums, options and maps. While we
    /// could default to some representation we don't do this, as it would
    /// force a specific representation on the Solidity side. Implement a
    /// custom serialize method instead.
    #[error("type is not representable in abi encoding: {0}")]
    TypeNotRepresentable(&'static str),
    /// Although the type is representable in Solidity (currently only used for
    /// `char`), the encoder does not implement this functionality.
    #[error("type is not yet implemented: {0}")]
    TypeNotYetSupported(&'static str),
    #[error("{0}")]
    Custom(String),
    /// The data ends before a slot that has to be read.
    #[error("abi data too short: need {needed} bytes at offset {offset}")]
    OutOfBounds { offset: usize, needed: usize },
    /// The data is long enough but its content is not a valid encoding, for
    /// example a bool that is neither 0 nor 1.
    #[error("invalid abi data: {0}")]
    InvalidData(&'static str),
    /// A decoded token did not have the shape the caller asked for.
    #[error("unexpected token, expected {0}")]
    UnexpectedToken(&'static str),
}

impl ser::Error for Error {
    fn custom<T>(msg: T) -> Self
    where
        T: core::fmt::Display,
    {
        Error::Custom(msg.to_string())
    }
}

/// Alias for `Result` using the [Error] returned by the encoder.
pub type Result<T> = core::result::Result<T, Error>;
