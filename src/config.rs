//! Engine configuration, usually read from a TOML file.
//!
//! ```toml
//! send_and_wait_timeout_ms = 10000
//!
//! [network]
//! challenge_registry = "0x..."
//! proxy_factory = "0x..."
//! proxy_bytecode = "0x6080..."
//! ```

use serde::{Deserialize, Deserializer};

use crate::{
    abiencode::types::{Address, U256},
    channel::OutcomeType,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("{0} must not be zero")]
    Zero(&'static str),
}

/// Addresses of the on-chain contracts the channel commitments refer to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NetworkContext {
    pub challenge_registry: Address,
    pub proxy_factory: Address,
    pub minimum_viable_multisig: Address,
    /// App definition of the free balance.
    pub identity_app: Address,
    pub conditional_transaction_delegate_target: Address,
    pub two_party_fixed_outcome_interpreter: Address,
    pub single_asset_two_party_coin_transfer_interpreter: Address,
    pub multi_asset_multi_party_coin_transfer_interpreter: Address,
    /// Creation code of the multisig proxy, without constructor arguments.
    #[serde(deserialize_with = "hex_bytes")]
    pub proxy_bytecode: Vec<u8>,
}

impl NetworkContext {
    /// Interpreter contract settling apps with `outcome_type`.
    pub fn interpreter_for(&self, outcome_type: OutcomeType) -> Address {
        match outcome_type {
            OutcomeType::TwoPartyFixedOutcome => self.two_party_fixed_outcome_interpreter,
            OutcomeType::SingleAssetTwoPartyCoinTransfer => {
                self.single_asset_two_party_coin_transfer_interpreter
            }
            OutcomeType::MultiAssetMultiPartyCoinTransfer => {
                self.multi_asset_multi_party_coin_transfer_interpreter
            }
        }
    }
}

fn hex_bytes<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    hex::decode(s.trim_start_matches("0x")).map_err(serde::de::Error::custom)
}

fn default_send_and_wait_timeout_ms() -> u64 {
    10_000
}

/// Two days, in seconds.
fn default_free_balance_timeout() -> u64 {
    172_800
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub network: NetworkContext,
    /// How long a flow waits for the counterparty's reply.
    #[serde(default = "default_send_and_wait_timeout_ms")]
    pub send_and_wait_timeout_ms: u64,
    /// Default timeout of the free balance app.
    #[serde(default = "default_free_balance_timeout")]
    pub free_balance_default_timeout: u64,
    /// State timeout of the free balance at setup.
    #[serde(default = "default_free_balance_timeout")]
    pub free_balance_initial_state_timeout: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            network: NetworkContext::default(),
            send_and_wait_timeout_ms: default_send_and_wait_timeout_ms(),
            free_balance_default_timeout: default_free_balance_timeout(),
            free_balance_initial_state_timeout: default_free_balance_timeout(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        if config.send_and_wait_timeout_ms == 0 {
            return Err(ConfigError::Zero("send_and_wait_timeout_ms"));
        }
        Ok(config)
    }

    pub fn send_and_wait_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.send_and_wait_timeout_ms)
    }

    pub fn free_balance_default_timeout(&self) -> U256 {
        self.free_balance_default_timeout.into()
    }

    pub fn free_balance_initial_state_timeout(&self) -> U256 {
        self.free_balance_initial_state_timeout.into()
    }
}
