//! Settlement: turning an app's final outcome into free balance increments.
//!
//! Every outcome type has exactly one interpreter on-chain. The interpreter
//! parameters are fixed at install time and bound the payout, so a
//! malicious counterparty cannot settle for more than was deposited.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::abiencode::{
    self, decode_one,
    types::{Address, U256},
    ParamType,
};

/// Asset address -> recipient address -> amount.
pub type TokenIndexedBalances = BTreeMap<Address, BTreeMap<Address, U256>>;

#[derive(Debug, thiserror::Error)]
pub enum OutcomeError {
    #[error("malformed outcome: {0}")]
    Abi(#[from] abiencode::Error),
    #[error("unknown two-party outcome {0}")]
    UnknownOutcome(U256),
    #[error("outcome pays {total} of token {token}, limit is {limit}")]
    ExceedsLimit {
        token: Address,
        total: U256,
        limit: U256,
    },
    #[error("outcome has {got} token lists, expected {expected}")]
    TokenCount { expected: usize, got: usize },
    #[error("outcome amounts overflow")]
    Overflow,
    #[error("outcome type {0:?} requires both deposits in the same token")]
    MixedTokens(OutcomeType),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeType {
    /// Outcome is `uint256` 0 (pay player 0), 1 (pay player 1) or 2 (split).
    TwoPartyFixedOutcome,
    /// Outcome is `tuple(address to, uint256 amount)[2]` in one asset.
    SingleAssetTwoPartyCoinTransfer,
    /// Outcome is `tuple(address to, uint256 amount)[][]`, one list per asset.
    MultiAssetMultiPartyCoinTransfer,
}

impl OutcomeType {
    pub fn as_u32(self) -> u32 {
        match self {
            OutcomeType::TwoPartyFixedOutcome => 0,
            OutcomeType::SingleAssetTwoPartyCoinTransfer => 1,
            OutcomeType::MultiAssetMultiPartyCoinTransfer => 2,
        }
    }

    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(OutcomeType::TwoPartyFixedOutcome),
            1 => Some(OutcomeType::SingleAssetTwoPartyCoinTransfer),
            2 => Some(OutcomeType::MultiAssetMultiPartyCoinTransfer),
            _ => None,
        }
    }
}

/// Parameters handed to the outcome interpreter in the conditional
/// transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpreterParams {
    TwoPartyFixed {
        player_addrs: [Address; 2],
        amount: U256,
        token: Address,
    },
    SingleAsset {
        limit: U256,
        token: Address,
    },
    MultiAsset {
        limit: Vec<U256>,
        token_addresses: Vec<Address>,
    },
}

#[derive(Serialize)]
struct TwoPartyFixedAbi {
    player_addrs: [Address; 2],
    amount: U256,
    token: Address,
}

#[derive(Serialize)]
struct SingleAssetAbi {
    limit: U256,
    token: Address,
}

#[derive(Serialize)]
struct MultiAssetAbi<'a> {
    limit: &'a [U256],
    token_addresses: &'a [Address],
}

/// One side of an install: who deposits what.
#[derive(Debug, Clone, Copy)]
pub struct Deposit {
    pub depositor: Address,
    pub amount: U256,
    pub token: Address,
}

impl InterpreterParams {
    /// Parameters for an app funded by `initiator` and `responder`. Fixed and
    /// single-asset outcomes can only move one asset.
    pub fn compute(
        outcome_type: OutcomeType,
        initiator: Deposit,
        responder: Deposit,
    ) -> Result<Self, OutcomeError> {
        let sum = initiator
            .amount
            .checked_add(responder.amount)
            .ok_or(OutcomeError::Overflow)?;
        match outcome_type {
            OutcomeType::TwoPartyFixedOutcome => {
                if initiator.token != responder.token {
                    return Err(OutcomeError::MixedTokens(outcome_type));
                }
                Ok(InterpreterParams::TwoPartyFixed {
                    player_addrs: [initiator.depositor, responder.depositor],
                    amount: sum,
                    token: initiator.token,
                })
            }
            OutcomeType::SingleAssetTwoPartyCoinTransfer => {
                if initiator.token != responder.token {
                    return Err(OutcomeError::MixedTokens(outcome_type));
                }
                Ok(InterpreterParams::SingleAsset {
                    limit: sum,
                    token: initiator.token,
                })
            }
            OutcomeType::MultiAssetMultiPartyCoinTransfer => {
                if initiator.token == responder.token {
                    Ok(InterpreterParams::MultiAsset {
                        limit: vec![sum],
                        token_addresses: vec![initiator.token],
                    })
                } else {
                    Ok(InterpreterParams::MultiAsset {
                        limit: vec![initiator.amount, responder.amount],
                        token_addresses: vec![initiator.token, responder.token],
                    })
                }
            }
        }
    }

    pub fn outcome_type(&self) -> OutcomeType {
        match self {
            InterpreterParams::TwoPartyFixed { .. } => OutcomeType::TwoPartyFixedOutcome,
            InterpreterParams::SingleAsset { .. } => OutcomeType::SingleAssetTwoPartyCoinTransfer,
            InterpreterParams::MultiAsset { .. } => OutcomeType::MultiAssetMultiPartyCoinTransfer,
        }
    }

    /// `abi.encode` of the interpreter's params struct.
    pub fn encode(&self) -> Result<Vec<u8>, abiencode::Error> {
        match self {
            InterpreterParams::TwoPartyFixed {
                player_addrs,
                amount,
                token,
            } => abiencode::to_bytes(&TwoPartyFixedAbi {
                player_addrs: *player_addrs,
                amount: *amount,
                token: *token,
            }),
            InterpreterParams::SingleAsset { limit, token } => abiencode::to_bytes(&SingleAssetAbi {
                limit: *limit,
                token: *token,
            }),
            InterpreterParams::MultiAsset {
                limit,
                token_addresses,
            } => abiencode::to_bytes(&MultiAssetAbi {
                limit,
                token_addresses,
            }),
        }
    }
}

fn coin_transfer_type() -> ParamType {
    ParamType::Tuple(vec![ParamType::Address, ParamType::Uint])
}

fn add_to(
    increments: &mut TokenIndexedBalances,
    token: Address,
    to: Address,
    amount: U256,
) -> Result<(), OutcomeError> {
    let entry = increments.entry(token).or_default().entry(to).or_default();
    *entry = entry.checked_add(amount).ok_or(OutcomeError::Overflow)?;
    Ok(())
}

fn decode_transfers(transfers: Vec<abiencode::Token>) -> Result<Vec<(Address, U256)>, OutcomeError> {
    transfers
        .into_iter()
        .map(|transfer| {
            let mut fields = transfer.into_tuple()?.into_iter();
            match (fields.next(), fields.next()) {
                (Some(to), Some(amount)) => Ok((to.into_address()?, amount.into_u256()?)),
                _ => Err(abiencode::Error::UnexpectedToken("coin transfer").into()),
            }
        })
        .collect()
}

fn checked_total(transfers: &[(Address, U256)]) -> Result<U256, OutcomeError> {
    transfers.iter().try_fold(U256::zero(), |acc, (_, amount)| {
        acc.checked_add(*amount).ok_or(OutcomeError::Overflow)
    })
}

/// Free balance increments for the app outcome `encoded_outcome` interpreted
/// with `params`.
///
/// Any malformed outcome is an error, there is no partial settlement.
pub fn compute_free_balance_increments(
    params: &InterpreterParams,
    encoded_outcome: &[u8],
) -> Result<TokenIndexedBalances, OutcomeError> {
    let mut increments = TokenIndexedBalances::new();
    match params {
        InterpreterParams::TwoPartyFixed {
            player_addrs,
            amount,
            token,
        } => {
            let outcome = decode_one(&ParamType::Uint, encoded_outcome)?.into_u256()?;
            match outcome.low_u32() {
                _ if outcome > U256::from(2) => return Err(OutcomeError::UnknownOutcome(outcome)),
                0 => add_to(&mut increments, *token, player_addrs[0], *amount)?,
                1 => add_to(&mut increments, *token, player_addrs[1], *amount)?,
                _ => {
                    // Odd amounts leave the extra wei with the second player.
                    let half = *amount / 2;
                    add_to(&mut increments, *token, player_addrs[0], half)?;
                    add_to(&mut increments, *token, player_addrs[1], *amount - half)?;
                }
            }
        }
        InterpreterParams::SingleAsset { limit, token } => {
            let ty = ParamType::FixedArray(Box::new(coin_transfer_type()), 2);
            let transfers = decode_transfers(decode_one(&ty, encoded_outcome)?.into_array()?)?;
            let total = checked_total(&transfers)?;
            if total > *limit {
                return Err(OutcomeError::ExceedsLimit {
                    token: *token,
                    total,
                    limit: *limit,
                });
            }
            for (to, amount) in transfers {
                add_to(&mut increments, *token, to, amount)?;
            }
        }
        InterpreterParams::MultiAsset {
            limit,
            token_addresses,
        } => {
            let ty = ParamType::Array(Box::new(ParamType::Array(Box::new(coin_transfer_type()))));
            let per_token = decode_one(&ty, encoded_outcome)?.into_array()?;
            if per_token.len() != token_addresses.len() || limit.len() != token_addresses.len() {
                return Err(OutcomeError::TokenCount {
                    expected: token_addresses.len(),
                    got: per_token.len(),
                });
            }
            for ((transfers, token), limit) in per_token.into_iter().zip(token_addresses).zip(limit) {
                let transfers = decode_transfers(transfers.into_array()?)?;
                let total = checked_total(&transfers)?;
                if total > *limit {
                    return Err(OutcomeError::ExceedsLimit {
                        token: *token,
                        total,
                        limit: *limit,
                    });
                }
                for (to, amount) in transfers {
                    add_to(&mut increments, *token, to, amount)?;
                }
            }
        }
    }
    Ok(increments)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: Address = Address([0xa1; 20]);
    const BOB: Address = Address([0xb0; 20]);
    const TOKEN: Address = Address([0x70; 20]);

    #[derive(Serialize)]
    struct Transfer(Address, U256);

    fn fixed(amount: u64) -> InterpreterParams {
        InterpreterParams::TwoPartyFixed {
            player_addrs: [ALICE, BOB],
            amount: amount.into(),
            token: Address::ZERO,
        }
    }

    #[test]
    fn fixed_outcome_split_gives_odd_wei_to_second_player() {
        let outcome = abiencode::to_bytes(&2u8).unwrap();
        let inc = compute_free_balance_increments(&fixed(5), &outcome).unwrap();
        assert_eq!(inc[&Address::ZERO][&ALICE], U256::from(2));
        assert_eq!(inc[&Address::ZERO][&BOB], U256::from(3));
    }

    #[test]
    fn fixed_outcome_pays_winner() {
        let outcome = abiencode::to_bytes(&1u8).unwrap();
        let inc = compute_free_balance_increments(&fixed(2), &outcome).unwrap();
        assert_eq!(inc[&Address::ZERO].get(&ALICE), None);
        assert_eq!(inc[&Address::ZERO][&BOB], U256::from(2));

        let outcome = abiencode::to_bytes(&3u8).unwrap();
        assert!(matches!(
            compute_free_balance_increments(&fixed(2), &outcome),
            Err(OutcomeError::UnknownOutcome(_))
        ));
    }

    #[test]
    fn single_asset_respects_limit() {
        let params = InterpreterParams::SingleAsset {
            limit: 10.into(),
            token: TOKEN,
        };
        let ok = abiencode::to_bytes(&[Transfer(ALICE, 4.into()), Transfer(BOB, 6.into())]).unwrap();
        let inc = compute_free_balance_increments(&params, &ok).unwrap();
        assert_eq!(inc[&TOKEN][&ALICE], U256::from(4));
        assert_eq!(inc[&TOKEN][&BOB], U256::from(6));

        let too_much = abiencode::to_bytes(&[Transfer(ALICE, 5.into()), Transfer(BOB, 6.into())]).unwrap();
        assert!(matches!(
            compute_free_balance_increments(&params, &too_much),
            Err(OutcomeError::ExceedsLimit { .. })
        ));
    }

    #[test]
    fn multi_asset_pays_per_token() {
        let params = InterpreterParams::compute(
            OutcomeType::MultiAssetMultiPartyCoinTransfer,
            Deposit {
                depositor: ALICE,
                amount: 3.into(),
                token: Address::ZERO,
            },
            Deposit {
                depositor: BOB,
                amount: 7.into(),
                token: TOKEN,
            },
        )
        .unwrap();
        let outcome = abiencode::to_bytes(&vec![
            vec![Transfer(BOB, 3.into())],
            vec![Transfer(ALICE, 7.into())],
        ])
        .unwrap();
        let inc = compute_free_balance_increments(&params, &outcome).unwrap();
        assert_eq!(inc[&Address::ZERO][&BOB], U256::from(3));
        assert_eq!(inc[&TOKEN][&ALICE], U256::from(7));

        let wrong_count = abiencode::to_bytes(&vec![vec![Transfer(BOB, 3.into())]]).unwrap();
        assert!(matches!(
            compute_free_balance_increments(&params, &wrong_count),
            Err(OutcomeError::TokenCount { .. })
        ));
    }

    #[test]
    fn garbage_outcome_is_rejected() {
        let params = InterpreterParams::SingleAsset {
            limit: 10.into(),
            token: TOKEN,
        };
        assert!(matches!(
            compute_free_balance_increments(&params, &[1, 2, 3]),
            Err(OutcomeError::Abi(_))
        ));
    }

    #[test]
    fn fixed_and_single_asset_need_one_token() {
        let a = Deposit {
            depositor: ALICE,
            amount: 1.into(),
            token: Address::ZERO,
        };
        let b = Deposit {
            depositor: BOB,
            amount: 1.into(),
            token: TOKEN,
        };
        assert!(matches!(
            InterpreterParams::compute(OutcomeType::TwoPartyFixedOutcome, a, b),
            Err(OutcomeError::MixedTokens(_))
        ));
    }
}
