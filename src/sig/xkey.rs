//! BIP32 extended keys.
//!
//! A participant's identity key is an extended public key. The address a
//! participant uses for the app with sequence number `n` is the one of the
//! non-hardened child `n`, so both parties can compute each other's signing
//! addresses from public information alone. The free balance and the multisig
//! owners use child 0.

use core::{fmt, str::FromStr};

use hmac::{Hmac, Mac};
use k256::{
    elliptic_curve::{sec1::ToEncodedPoint, PrimeField},
    ProjectivePoint, PublicKey, Scalar, SecretKey,
};
use serde::{de, Deserialize, Deserializer};
use sha2::Sha512;

use super::Signer;
use crate::abiencode::types::Address;

type HmacSha512 = Hmac<Sha512>;

/// Child indices at or above this value are hardened and can only be derived
/// from the private key.
pub const HARDENED_OFFSET: u32 = 1 << 31;

const MASTER_KEY_SALT: &[u8] = b"Bitcoin seed";

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("hardened index {0} cannot be derived from a public key")]
    Hardened(u32),
    #[error("derivation of child {0} produced an invalid key")]
    InvalidChild(u32),
    #[error("invalid extended key encoding")]
    Encoding,
    #[error("invalid extended key hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Splits the HMAC-SHA512 output into the scalar tweak (left half) and the new
/// chain code (right half).
fn hmac_split(key: &[u8], parts: &[&[u8]]) -> Result<(Option<Scalar>, [u8; 32]), KeyError> {
    let mut mac = HmacSha512::new_from_slice(key).map_err(|_| KeyError::Encoding)?;
    for part in parts {
        mac.update(part);
    }
    let out = mac.finalize().into_bytes();

    let mut left = [0u8; 32];
    left.copy_from_slice(&out[..32]);
    let mut chain_code = [0u8; 32];
    chain_code.copy_from_slice(&out[32..]);

    let tweak: Option<Scalar> = Scalar::from_repr(left.into()).into();
    Ok((tweak, chain_code))
}

/// Extended public key: compressed secp256k1 point and chain code.
///
/// Rendered as `0x` followed by 130 hex characters (33 + 32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdentityKey {
    key: [u8; 33],
    chain_code: [u8; 32],
}

impl IdentityKey {
    pub const ENCODED_LEN: usize = 65;

    pub fn new(public_key: &PublicKey, chain_code: [u8; 32]) -> Self {
        let mut key = [0u8; 33];
        key.copy_from_slice(public_key.to_encoded_point(true).as_bytes());
        Self { key, chain_code }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(KeyError::Encoding);
        }
        // Validates that the point is on the curve.
        let public_key = PublicKey::from_sec1_bytes(&bytes[..33]).map_err(|_| KeyError::Encoding)?;
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&bytes[33..]);
        Ok(Self::new(&public_key, chain_code))
    }

    pub fn to_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[..33].copy_from_slice(&self.key);
        out[33..].copy_from_slice(&self.chain_code);
        out
    }

    pub fn public_key(&self) -> Result<PublicKey, KeyError> {
        PublicKey::from_sec1_bytes(&self.key).map_err(|_| KeyError::Encoding)
    }

    /// Non-hardened child key derivation (BIP32 `CKDpub`).
    pub fn derive_child(&self, index: u32) -> Result<Self, KeyError> {
        if index >= HARDENED_OFFSET {
            return Err(KeyError::Hardened(index));
        }
        let (tweak, chain_code) = hmac_split(&self.chain_code, &[&self.key[..], &index.to_be_bytes()[..]])?;
        let tweak = tweak.ok_or(KeyError::InvalidChild(index))?;

        let point = ProjectivePoint::GENERATOR * tweak + self.public_key()?.to_projective();
        let child = PublicKey::from_affine(point.to_affine()).map_err(|_| KeyError::InvalidChild(index))?;
        Ok(Self::new(&child, chain_code))
    }

    /// Ethereum address of child `index`.
    pub fn derive_address(&self, index: u32) -> Result<Address, KeyError> {
        Ok(Address::from(&self.derive_child(index)?.public_key()?))
    }
}

impl fmt::Debug for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.to_bytes()))
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl FromStr for IdentityKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s))?;
        Self::from_bytes(&bytes)
    }
}

impl<'de> Deserialize<'de> for IdentityKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Extended private key, the local counterpart of an [IdentityKey].
#[derive(Clone)]
pub struct ExtendedPrivateKey {
    secret: SecretKey,
    chain_code: [u8; 32],
}

impl fmt::Debug for ExtendedPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedPrivateKey")
            .field("public", &self.public_key())
            .finish_non_exhaustive()
    }
}

impl ExtendedPrivateKey {
    /// BIP32 master key generation from a seed.
    pub fn from_seed(seed: &[u8]) -> Result<Self, KeyError> {
        let (secret, chain_code) = hmac_split(MASTER_KEY_SALT, &[seed])?;
        let secret = secret
            .filter(|s| !bool::from(s.is_zero()))
            .ok_or(KeyError::InvalidChild(0))?;
        Ok(Self {
            secret: SecretKey::from_be_bytes(&secret.to_bytes()).map_err(|_| KeyError::Encoding)?,
            chain_code,
        })
    }

    pub fn random<R: rand::RngCore + rand::CryptoRng>(rng: &mut R) -> Result<Self, KeyError> {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_be_bytes().into()
    }

    pub fn chain_code(&self) -> [u8; 32] {
        self.chain_code
    }

    pub fn public_key(&self) -> IdentityKey {
        IdentityKey::new(&self.secret.public_key(), self.chain_code)
    }

    /// Child key derivation (BIP32 `CKDpriv`), hardened or not.
    pub fn derive_child(&self, index: u32) -> Result<Self, KeyError> {
        let (tweak, chain_code) = if index >= HARDENED_OFFSET {
            hmac_split(
                &self.chain_code,
                &[&[0u8][..], &self.secret_bytes()[..], &index.to_be_bytes()[..]],
            )?
        } else {
            hmac_split(
                &self.chain_code,
                &[&self.public_key().key[..], &index.to_be_bytes()[..]],
            )?
        };
        let tweak = tweak.ok_or(KeyError::InvalidChild(index))?;

        let child: Scalar = tweak + *self.secret.to_nonzero_scalar();
        if bool::from(child.is_zero()) {
            return Err(KeyError::InvalidChild(index));
        }
        Ok(Self {
            secret: SecretKey::from_be_bytes(&child.to_bytes()).map_err(|_| KeyError::InvalidChild(index))?,
            chain_code,
        })
    }

    /// Signer for child `index`, whose address equals
    /// `self.public_key().derive_address(index)`.
    pub fn derive_signer(&self, index: u32) -> Result<Signer, KeyError> {
        let child = self.derive_child(index)?;
        Signer::from_bytes(&child.secret_bytes()).map_err(|_| KeyError::InvalidChild(index))
    }
}
