use super::{
    error::{Error, Result},
    token::{write_sequence, Token, Writer, SLOT_SIZE},
};
use serde::{
    ser::{self, Impossible},
    Serialize,
};

/// Type name used for marking a newtype as Solidity `bytes`.
///
/// `serialize_bytes` is needed for fixed-size types like `bytes32` (and our
/// [Address][super::types::Address] and [U256][super::types::U256]), so
/// dynamic `bytes` need a different way in. [as_bytes][super::as_bytes]
/// wraps the data in a newtype struct with this name, which no normal Rust
/// type will ever have.
pub(super) const MARK_BYTES_NAME: &str = ":$&_BYTES";

/// Serializer turning any [Serialize] value into a [Token] tree.
///
/// Mapping of serde's data model:
/// - integers and `bool` become a right-aligned word (signed integers are
///   sign-extended).
/// - `serialize_bytes` becomes static, left-aligned bytes (`bytesN`).
/// - `str` becomes `string` (same encoding as `bytes`).
/// - sequences become `T[]`, tuples `T[N]`, structs and tuple structs
///   Solidity structs.
/// - newtype structs are transparent.
/// - Options, units, maps and enums are rejected, see
///   [Error::TypeNotRepresentable].
pub struct Serializer;

fn uint_word(be_bytes: &[u8]) -> Token {
    let mut word = [0u8; SLOT_SIZE];
    word[SLOT_SIZE - be_bytes.len()..].copy_from_slice(be_bytes);
    Token::Word(word)
}

fn int_word(be_bytes: &[u8], negative: bool) -> Token {
    let mut word = if negative {
        [0xffu8; SLOT_SIZE]
    } else {
        [0u8; SLOT_SIZE]
    };
    word[SLOT_SIZE - be_bytes.len()..].copy_from_slice(be_bytes);
    Token::Word(word)
}

pub fn to_token<T>(value: &T) -> Result<Token>
where
    T: Serialize + ?Sized,
{
    value.serialize(Serializer)
}

/// Encode `value` like `abi.encode(value)` does.
pub fn to_writer<T, W>(value: &T, writer: &mut W) -> Result<()>
where
    T: Serialize + ?Sized,
    W: Writer,
{
    let token = to_token(value)?;
    write_sequence(core::slice::from_ref(&token), writer);
    Ok(())
}

/// Encode the members of `value` as function arguments, i.e. without the
/// offset a dynamic struct would get when encoded on its own. Prepend the
/// 4-byte function selector to get call data.
pub fn to_fn_args_writer<T, W>(value: &T, writer: &mut W) -> Result<()>
where
    T: Serialize + ?Sized,
    W: Writer,
{
    match to_token(value)? {
        Token::Tuple(members) => write_sequence(&members, writer),
        token => write_sequence(core::slice::from_ref(&token), writer),
    }
    Ok(())
}

pub fn to_bytes<T>(value: &T) -> Result<Vec<u8>>
where
    T: Serialize + ?Sized,
{
    let mut buf = Vec::new();
    to_writer(value, &mut buf)?;
    Ok(buf)
}

pub fn to_fn_args<T>(value: &T) -> Result<Vec<u8>>
where
    T: Serialize + ?Sized,
{
    let mut buf = Vec::new();
    to_fn_args_writer(value, &mut buf)?;
    Ok(buf)
}

#[derive(Clone, Copy)]
enum Kind {
    Array,
    FixedArray,
    Tuple,
}

pub struct Collector {
    kind: Kind,
    tokens: Vec<Token>,
}

impl Collector {
    fn new(kind: Kind, len: Option<usize>) -> Self {
        Self {
            kind,
            tokens: Vec::with_capacity(len.unwrap_or(0)),
        }
    }

    fn push<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.tokens.push(value.serialize(Serializer)?);
        Ok(())
    }

    fn finish(self) -> Token {
        match self.kind {
            Kind::Array => Token::Array(self.tokens),
            Kind::FixedArray => Token::FixedArray(self.tokens),
            Kind::Tuple => Token::Tuple(self.tokens),
        }
    }
}

impl ser::Serializer for Serializer {
    type Ok = Token;
    type Error = Error;

    type SerializeSeq = Collector;
    type SerializeTuple = Collector;
    type SerializeTupleStruct = Collector;
    type SerializeTupleVariant = Impossible<Token, Error>;
    type SerializeMap = Impossible<Token, Error>;
    type SerializeStruct = Collector;
    type SerializeStructVariant = Impossible<Token, Error>;

    fn serialize_bool(self, v: bool) -> Result<Token> {
        Ok(uint_word(&[v as u8]))
    }

    fn serialize_i8(self, v: i8) -> Result<Token> {
        Ok(int_word(&v.to_be_bytes(), v < 0))
    }

    fn serialize_i16(self, v: i16) -> Result<Token> {
        Ok(int_word(&v.to_be_bytes(), v < 0))
    }

    fn serialize_i32(self, v: i32) -> Result<Token> {
        Ok(int_word(&v.to_be_bytes(), v < 0))
    }

    fn serialize_i64(self, v: i64) -> Result<Token> {
        Ok(int_word(&v.to_be_bytes(), v < 0))
    }

    fn serialize_i128(self, v: i128) -> Result<Token> {
        Ok(int_word(&v.to_be_bytes(), v < 0))
    }

    fn serialize_u8(self, v: u8) -> Result<Token> {
        Ok(uint_word(&v.to_be_bytes()))
    }

    fn serialize_u16(self, v: u16) -> Result<Token> {
        Ok(uint_word(&v.to_be_bytes()))
    }

    fn serialize_u32(self, v: u32) -> Result<Token> {
        Ok(uint_word(&v.to_be_bytes()))
    }

    fn serialize_u64(self, v: u64) -> Result<Token> {
        Ok(uint_word(&v.to_be_bytes()))
    }

    fn serialize_u128(self, v: u128) -> Result<Token> {
        Ok(uint_word(&v.to_be_bytes()))
    }

    fn serialize_f32(self, _: f32) -> Result<Token> {
        Err(Error::TypeNotRepresentable("f32"))
    }

    fn serialize_f64(self, _: f64) -> Result<Token> {
        Err(Error::TypeNotRepresentable("f64"))
    }

    fn serialize_char(self, _: char) -> Result<Token> {
        Err(Error::TypeNotYetSupported("char"))
    }

    fn serialize_str(self, v: &str) -> Result<Token> {
        Ok(Token::Bytes(v.as_bytes().to_vec()))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Token> {
        Ok(Token::FixedBytes(v.to_vec()))
    }

    fn serialize_none(self) -> Result<Token> {
        Err(Error::TypeNotRepresentable("option"))
    }

    fn serialize_some<T>(self, _: &T) -> Result<Token>
    where
        T: Serialize + ?Sized,
    {
        Err(Error::TypeNotRepresentable("option"))
    }

    fn serialize_unit(self) -> Result<Token> {
        Err(Error::TypeNotRepresentable("unit"))
    }

    fn serialize_unit_struct(self, _: &'static str) -> Result<Token> {
        Err(Error::TypeNotRepresentable("unit struct"))
    }

    fn serialize_unit_variant(self, _: &'static str, _: u32, _: &'static str) -> Result<Token> {
        Err(Error::TypeNotRepresentable("enum"))
    }

    fn serialize_newtype_struct<T>(self, name: &'static str, value: &T) -> Result<Token>
    where
        T: Serialize + ?Sized,
    {
        let token = value.serialize(self)?;
        if name != MARK_BYTES_NAME {
            return Ok(token);
        }
        match token {
            Token::FixedBytes(bytes) => Ok(Token::Bytes(bytes)),
            _ => Err(Error::Custom("as_bytes must wrap serialize_bytes".to_string())),
        }
    }

    fn serialize_newtype_variant<T>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: &T,
    ) -> Result<Token>
    where
        T: Serialize + ?Sized,
    {
        Err(Error::TypeNotRepresentable("enum"))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<Collector> {
        Ok(Collector::new(Kind::Array, len))
    }

    fn serialize_tuple(self, len: usize) -> Result<Collector> {
        Ok(Collector::new(Kind::FixedArray, Some(len)))
    }

    fn serialize_tuple_struct(self, _: &'static str, len: usize) -> Result<Collector> {
        Ok(Collector::new(Kind::Tuple, Some(len)))
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(Error::TypeNotRepresentable("enum"))
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Self::SerializeMap> {
        Err(Error::TypeNotRepresentable("map"))
    }

    fn serialize_struct(self, _: &'static str, len: usize) -> Result<Collector> {
        Ok(Collector::new(Kind::Tuple, Some(len)))
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(Error::TypeNotRepresentable("enum"))
    }
}

impl ser::SerializeSeq for Collector {
    type Ok = Token;
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.push(value)
    }

    fn end(self) -> Result<Token> {
        Ok(self.finish())
    }
}

impl ser::SerializeTuple for Collector {
    type Ok = Token;
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.push(value)
    }

    fn end(self) -> Result<Token> {
        Ok(self.finish())
    }
}

impl ser::SerializeTupleStruct for Collector {
    type Ok = Token;
    type Error = Error;

    fn serialize_field<T>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.push(value)
    }

    fn end(self) -> Result<Token> {
        Ok(self.finish())
    }
}

impl ser::SerializeStruct for Collector {
    type Ok = Token;
    type Error = Error;

    fn serialize_field<T>(&mut self, _key: &'static str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.push(value)
    }

    fn end(self) -> Result<Token> {
        Ok(self.finish())
    }
}
