//! Serialize any `&[u8]` as solidity `bytes` (dynamic length bytes).
//!
//! Without this, it would be serialized to a `uint8[]` of fixed or dynamic
//! length.
//!
//! # Example usage
//! ```
//! use serde::Serialize;
//! use statechannel::abiencode::as_bytes;
//!
//! #[derive(Serialize, Debug)]
//! pub struct Call {
//!     #[serde(with = "as_bytes")]
//!     pub data: Vec<u8>,
//! }
//! ```

use super::ser::MARK_BYTES_NAME;
use serde::{Serialize, Serializer};

struct Raw<'a>(&'a [u8]);

impl<'a> Serialize for Raw<'a> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(self.0)
    }
}

pub fn serialize<T, S>(v: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: AsRef<[u8]> + ?Sized,
    S: Serializer,
{
    serializer.serialize_newtype_struct(MARK_BYTES_NAME, &Raw(v.as_ref()))
}
