//! The free balance: the channel's ledger of spendable balances.
//!
//! It is stored as the `latest_state` of the free balance app instance,
//! encoded as
//! `tuple(address[] tokenAddresses, tuple(address to, uint256 amount)[][] balances, bytes32[] activeApps)`.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{outcome::TokenIndexedBalances, ChannelError};
use crate::abiencode::{
    self, decode_one,
    types::{Address, Hash, U256},
    ParamType, Token,
};

/// Asset used by convention for the chain's native currency.
pub const ETH_TOKEN_ADDRESS: Address = Address::ZERO;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FreeBalance {
    balances: TokenIndexedBalances,
    active_apps: Vec<Hash>,
}

#[derive(Serialize)]
struct CoinTransfer {
    to: Address,
    amount: U256,
}

#[derive(Serialize)]
struct FreeBalanceStateAbi {
    token_addresses: Vec<Address>,
    balances: Vec<Vec<CoinTransfer>>,
    active_apps: Vec<Hash>,
}

fn state_type() -> ParamType {
    let transfer = ParamType::Tuple(vec![ParamType::Address, ParamType::Uint]);
    ParamType::Tuple(vec![
        ParamType::Array(Box::new(ParamType::Address)),
        ParamType::Array(Box::new(ParamType::Array(Box::new(transfer)))),
        ParamType::Array(Box::new(ParamType::FixedBytes)),
    ])
}

fn next(fields: &mut impl Iterator<Item = Token>) -> Result<Token, abiencode::Error> {
    fields
        .next()
        .ok_or(abiencode::Error::UnexpectedToken("free balance field"))
}

impl FreeBalance {
    /// Zero balances in `token` for every participant.
    pub fn new(token: Address, participants: &[Address]) -> Self {
        let for_token = participants.iter().map(|p| (*p, U256::zero())).collect();
        Self {
            balances: BTreeMap::from([(token, for_token)]),
            active_apps: Vec::new(),
        }
    }

    pub fn balance_of(&self, token: &Address, owner: &Address) -> U256 {
        self.balances
            .get(token)
            .and_then(|b| b.get(owner))
            .copied()
            .unwrap_or_default()
    }

    pub fn for_token(&self, token: &Address) -> BTreeMap<Address, U256> {
        self.balances.get(token).cloned().unwrap_or_default()
    }

    pub fn token_indexed_balances(&self) -> &TokenIndexedBalances {
        &self.balances
    }

    pub fn active_apps(&self) -> &[Hash] {
        &self.active_apps
    }

    /// Credit every entry of `increments`, creating missing tokens and
    /// recipients with a zero balance first.
    pub fn increment(&self, increments: &TokenIndexedBalances) -> Result<Self, ChannelError> {
        let mut next = self.clone();
        for (token, per_owner) in increments {
            let balances = next.balances.entry(*token).or_default();
            for (owner, amount) in per_owner {
                let balance = balances.entry(*owner).or_default();
                *balance = balance.checked_add(*amount).ok_or(ChannelError::Overflow)?;
            }
        }
        Ok(next)
    }

    /// Debit every entry of `decrements`. Balances never go negative.
    pub fn decrement(&self, decrements: &TokenIndexedBalances) -> Result<Self, ChannelError> {
        let mut next = self.clone();
        for (token, per_owner) in decrements {
            for (owner, amount) in per_owner {
                if amount.is_zero() {
                    continue;
                }
                let balance = next
                    .balances
                    .get_mut(token)
                    .and_then(|b| b.get_mut(owner));
                match balance {
                    Some(balance) if *balance >= *amount => *balance -= *amount,
                    balance => {
                        return Err(ChannelError::InsufficientFunds {
                            token: *token,
                            owner: *owner,
                            balance: balance.map(|b| *b).unwrap_or_default(),
                            amount: *amount,
                        })
                    }
                }
            }
        }
        Ok(next)
    }

    pub fn with_active_app(&self, identity_hash: Hash) -> Self {
        let mut next = self.clone();
        if !next.active_apps.contains(&identity_hash) {
            next.active_apps.push(identity_hash);
        }
        next
    }

    pub fn without_active_app(&self, identity_hash: &Hash) -> Self {
        let mut next = self.clone();
        next.active_apps.retain(|h| h != identity_hash);
        next
    }

    pub fn encode(&self) -> Result<Vec<u8>, abiencode::Error> {
        let abi = FreeBalanceStateAbi {
            token_addresses: self.balances.keys().copied().collect(),
            balances: self
                .balances
                .values()
                .map(|per_owner| {
                    per_owner
                        .iter()
                        .map(|(to, amount)| CoinTransfer {
                            to: *to,
                            amount: *amount,
                        })
                        .collect()
                })
                .collect(),
            active_apps: self.active_apps.clone(),
        };
        abiencode::to_bytes(&abi)
    }

    pub fn decode(data: &[u8]) -> Result<Self, abiencode::Error> {
        let mut fields = decode_one(&state_type(), data)?.into_tuple()?.into_iter();
        let tokens = next(&mut fields)?.into_array()?;
        let balances = next(&mut fields)?.into_array()?;
        let active_apps = next(&mut fields)?.into_array()?;
        if tokens.len() != balances.len() {
            return Err(abiencode::Error::InvalidData("token and balance lists differ"));
        }

        let mut out = FreeBalance::default();
        for (token, per_owner) in tokens.into_iter().zip(balances) {
            let entry = out.balances.entry(token.into_address()?).or_default();
            for transfer in per_owner.into_array()? {
                let mut pair = transfer.into_tuple()?.into_iter();
                let to = next(&mut pair)?.into_address()?;
                let amount = next(&mut pair)?.into_u256()?;
                entry.insert(to, amount);
            }
        }
        for app in active_apps {
            out.active_apps.push(app.into_hash()?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: Address = Address([0xa1; 20]);
    const BOB: Address = Address([0xb0; 20]);

    fn funded() -> FreeBalance {
        let inc = BTreeMap::from([(
            ETH_TOKEN_ADDRESS,
            BTreeMap::from([(ALICE, U256::from(10)), (BOB, U256::from(5))]),
        )]);
        FreeBalance::new(ETH_TOKEN_ADDRESS, &[ALICE, BOB])
            .increment(&inc)
            .unwrap()
    }

    #[test]
    fn new_free_balance_is_zero() {
        let fb = FreeBalance::new(ETH_TOKEN_ADDRESS, &[ALICE, BOB]);
        assert_eq!(fb.balance_of(&ETH_TOKEN_ADDRESS, &ALICE), U256::zero());
        assert_eq!(fb.for_token(&ETH_TOKEN_ADDRESS).len(), 2);
        assert!(fb.active_apps().is_empty());
    }

    #[test]
    fn decrement_never_goes_negative() {
        let fb = funded();
        let too_much = BTreeMap::from([(ETH_TOKEN_ADDRESS, BTreeMap::from([(BOB, U256::from(6))]))]);
        assert!(matches!(
            fb.decrement(&too_much),
            Err(ChannelError::InsufficientFunds { .. })
        ));

        let unknown_token = BTreeMap::from([(Address([1; 20]), BTreeMap::from([(BOB, U256::from(1))]))]);
        assert!(fb.decrement(&unknown_token).is_err());

        let ok = BTreeMap::from([(ETH_TOKEN_ADDRESS, BTreeMap::from([(BOB, U256::from(5))]))]);
        assert_eq!(
            fb.decrement(&ok).unwrap().balance_of(&ETH_TOKEN_ADDRESS, &BOB),
            U256::zero()
        );
        // The original value is untouched.
        assert_eq!(fb.balance_of(&ETH_TOKEN_ADDRESS, &BOB), U256::from(5));
    }

    #[test]
    fn increment_initializes_new_entries() {
        let token = Address([7; 20]);
        let carol = Address([0xc0; 20]);
        let inc = BTreeMap::from([(token, BTreeMap::from([(carol, U256::from(3))]))]);
        let fb = funded().increment(&inc).unwrap();
        assert_eq!(fb.balance_of(&token, &carol), U256::from(3));
        assert_eq!(fb.balance_of(&ETH_TOKEN_ADDRESS, &ALICE), U256::from(10));
    }

    #[test]
    fn encoding_survives_decoding() {
        let fb = funded()
            .with_active_app(Hash([9; 32]))
            .with_active_app(Hash([8; 32]));
        let decoded = FreeBalance::decode(&fb.encode().unwrap()).unwrap();
        assert_eq!(decoded, fb);
        assert_eq!(decoded.active_apps(), &[Hash([9; 32]), Hash([8; 32])]);
        assert!(decoded.without_active_app(&Hash([9; 32])).active_apps() == [Hash([8; 32])]);
    }
}
