//! Identifiers both parties must compute identically from public information:
//! app identity hashes, per-app signing addresses and the channel's multisig
//! address.

use serde::Serialize;

use crate::{
    abiencode::{
        self, as_bytes, as_dyn_array,
        types::{Address, Hash, U256},
        PackedHasher,
    },
    sig::{IdentityKey, KeyError},
};

/// Hash identifying an app instance, matching the verifier contract's
/// `appIdentityToHash`:
/// `keccak256(abi.encodePacked(channelNonce, keccak256(abi.encodePacked(participants)), appDefinition, defaultTimeout))`.
pub fn compute_identity_hash(
    app_definition: Address,
    channel_nonce: U256,
    participants: &[Address],
    default_timeout: U256,
) -> Hash {
    let participants_hash = PackedHasher::new().address_array(participants).finish();
    PackedHasher::new()
        .uint(channel_nonce)
        .bytes32(&participants_hash)
        .address(&app_definition)
        .uint(default_timeout)
        .finish()
}

/// Address a participant signs with for the app at `index` (its `appSeqNo`,
/// 0 for the free balance).
pub fn derive_participant_address(identity: &IdentityKey, index: u32) -> Result<Address, KeyError> {
    identity.derive_address(index)
}

/// The two signing addresses of the app at `app_seq_no`, sorted ascending as
/// the verifier expects.
pub fn app_participants(
    keys: &[IdentityKey; 2],
    app_seq_no: u32,
) -> Result<[Address; 2], KeyError> {
    let mut addrs = [
        derive_participant_address(&keys[0], app_seq_no)?,
        derive_participant_address(&keys[1], app_seq_no)?,
    ];
    addrs.sort();
    Ok(addrs)
}

/// Owners of the multisig: both index-0 addresses, sorted.
pub fn multisig_owners(keys: &[IdentityKey; 2]) -> Result<[Address; 2], KeyError> {
    app_participants(keys, 0)
}

#[derive(Serialize)]
struct SetupArgs<'a> {
    owners: &'a [Address],
}

/// CREATE2 address of the multisig proxy deployed by `proxy_factory` for
/// `owners`.
///
/// The salt is derived from the proxy's `setup(address[])` initializer call
/// and a zero nonce, the init code is the proxy bytecode followed by the
/// mastercopy address as constructor argument.
pub fn compute_multisig_address(
    owners: &[Address],
    proxy_factory: Address,
    minimum_viable_multisig: Address,
    proxy_bytecode: &[u8],
) -> Result<Address, abiencode::Error> {
    let mut initializer = abiencode::selector("setup(address[])").to_vec();
    abiencode::to_fn_args_writer(&SetupArgs { owners }, &mut initializer)?;

    let salt = PackedHasher::new()
        .bytes32(&abiencode::keccak256(&initializer))
        .uint(U256::zero())
        .finish();

    let constructor_args = abiencode::to_bytes(&minimum_viable_multisig)?;
    let init_code_hash = PackedHasher::new()
        .bytes(proxy_bytecode)
        .bytes(&constructor_args)
        .finish();

    let hash = PackedHasher::new()
        .byte(0xff)
        .address(&proxy_factory)
        .bytes32(&salt)
        .bytes32(&init_code_hash)
        .finish();
    let mut addr = Address::default();
    addr.0.copy_from_slice(&hash.0[12..]);
    Ok(addr)
}

/// Call data passed along with the identity to the verifier. The verifier
/// takes the participants as `address[]`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    pub channel_nonce: U256,
    #[serde(with = "as_dyn_array")]
    pub participants: [Address; 2],
    pub app_definition: Address,
    pub default_timeout: U256,
}

impl AppIdentity {
    pub fn identity_hash(&self) -> Hash {
        compute_identity_hash(
            self.app_definition,
            self.channel_nonce,
            &self.participants,
            self.default_timeout,
        )
    }
}

/// Raw call data, serialized as Solidity `bytes`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct CallData(#[serde(with = "as_bytes")] pub Vec<u8>);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sig::ExtendedPrivateKey;

    fn keys() -> [IdentityKey; 2] {
        [
            ExtendedPrivateKey::from_seed(b"alice-alice-alice").unwrap().public_key(),
            ExtendedPrivateKey::from_seed(b"bob-bob-bob-bob-bob").unwrap().public_key(),
        ]
    }

    #[test]
    fn identity_hash_matches_packed_layout() {
        let participants: [Address; 2] = [Address([0x11; 20]), Address([0x22; 20])];
        let app: Address = Address([0x33; 20]);

        let mut inner = Vec::new();
        for p in &participants {
            inner.extend_from_slice(&[0u8; 12]);
            inner.extend_from_slice(&p.0);
        }
        let mut outer = Vec::new();
        outer.extend_from_slice(&{
            let mut w = [0u8; 32];
            w[31] = 5;
            w
        });
        outer.extend_from_slice(&abiencode::keccak256(&inner).0);
        outer.extend_from_slice(&app.0);
        outer.extend_from_slice(&{
            let mut w = [0u8; 32];
            w[30..].copy_from_slice(&100u16.to_be_bytes());
            w
        });

        assert_eq!(
            compute_identity_hash(app, 5.into(), &participants, 100.into()),
            abiencode::keccak256(&outer)
        );
    }

    #[test]
    fn both_sides_agree_on_participants() {
        let [a, b] = keys();
        let ab = app_participants(&[a, b], 3).unwrap();
        let ba = app_participants(&[b, a], 3).unwrap();
        assert_eq!(ab, ba);
        assert!(ab[0] < ab[1]);
        assert_eq!(
            compute_identity_hash(Address::ZERO, 3.into(), &ab, 10.into()),
            compute_identity_hash(Address::ZERO, 3.into(), &ba, 10.into())
        );
        assert_ne!(app_participants(&[a, b], 4).unwrap(), ab);
    }

    #[test]
    fn multisig_address_is_order_independent_and_depends_on_factory() {
        let owners = multisig_owners(&keys()).unwrap();
        let bytecode = [0x60, 0x80, 0x60, 0x40];
        let factory = Address([0xfa; 20]);
        let mastercopy = Address([0xcc; 20]);

        let first = compute_multisig_address(&owners, factory, mastercopy, &bytecode).unwrap();
        let [x, y] = keys();
        let again = compute_multisig_address(&multisig_owners(&[y, x]).unwrap(), factory, mastercopy, &bytecode).unwrap();
        assert_eq!(first, again);

        let other = compute_multisig_address(&owners, Address([0xfb; 20]), mastercopy, &bytecode).unwrap();
        assert_ne!(first, other);
    }
}
