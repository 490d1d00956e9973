//! Off-chain evaluation of app logic.
//!
//! On-chain, an app definition is a contract with pure `applyAction` and
//! `computeOutcome` functions. Both parties need the same results off-chain,
//! so every app definition a node accepts has a registered [AppLogic].

use std::{collections::HashMap, fmt, sync::Arc};

use crate::abiencode::types::Address;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("no app logic registered for {0}")]
    Unknown(Address),
    #[error("invalid action: {0}")]
    InvalidAction(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
}

/// Pure state transition and outcome functions of one app definition.
/// States, actions and outcomes are `abi.encode`d.
pub trait AppLogic: Send + Sync + fmt::Debug {
    fn apply_action(&self, state: &[u8], action: &[u8]) -> Result<Vec<u8>, AppError>;

    fn compute_outcome(&self, state: &[u8]) -> Result<Vec<u8>, AppError>;

    /// Checked before a state proposed or set directly by a party is signed.
    fn validate_state(&self, _state: &[u8]) -> Result<(), AppError> {
        Ok(())
    }
}

fn is_word_aligned(bytes: &[u8]) -> bool {
    !bytes.is_empty() && bytes.len() % 32 == 0
}

/// The outcome is the state itself. An action is taken as the next state.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityApp;

impl AppLogic for IdentityApp {
    fn apply_action(&self, _state: &[u8], action: &[u8]) -> Result<Vec<u8>, AppError> {
        if !is_word_aligned(action) {
            return Err(AppError::InvalidAction(format!(
                "{} bytes is not an encoded state",
                action.len()
            )));
        }
        Ok(action.to_vec())
    }

    fn compute_outcome(&self, state: &[u8]) -> Result<Vec<u8>, AppError> {
        self.validate_state(state)?;
        Ok(state.to_vec())
    }

    fn validate_state(&self, state: &[u8]) -> Result<(), AppError> {
        if !is_word_aligned(state) {
            return Err(AppError::InvalidState(format!(
                "{} bytes is not an encoded state",
                state.len()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppRegistry {
    apps: HashMap<Address, Arc<dyn AppLogic>>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with [IdentityApp] at `identity_app`.
    pub fn with_identity_app(identity_app: Address) -> Self {
        let mut registry = Self::new();
        registry.register(identity_app, Arc::new(IdentityApp));
        registry
    }

    pub fn register(&mut self, app_definition: Address, logic: Arc<dyn AppLogic>) {
        self.apps.insert(app_definition, logic);
    }

    pub fn get(&self, app_definition: &Address) -> Result<Arc<dyn AppLogic>, AppError> {
        self.apps
            .get(app_definition)
            .cloned()
            .ok_or(AppError::Unknown(*app_definition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_app_passes_state_through() {
        let registry = AppRegistry::with_identity_app(Address([1; 20]));
        let app = registry.get(&Address([1; 20])).unwrap();
        let state = vec![7u8; 64];
        assert_eq!(app.compute_outcome(&state).unwrap(), state);
        assert_eq!(app.apply_action(&state, &[9; 32]).unwrap(), vec![9; 32]);
        assert!(app.apply_action(&state, &[9; 31]).is_err());
    }

    #[test]
    fn identity_app_rejects_unaligned_states() {
        let app = IdentityApp;
        assert!(app.validate_state(&[0; 32]).is_ok());
        for state in [&[][..], &[0; 31][..], &[0; 33][..]] {
            assert!(matches!(
                app.validate_state(state),
                Err(AppError::InvalidState(_))
            ));
        }
    }

    #[test]
    fn unknown_definition_is_an_error() {
        let registry = AppRegistry::new();
        assert!(matches!(
            registry.get(&Address([2; 20])),
            Err(AppError::Unknown(addr)) if addr == Address([2; 20])
        ));
    }
}
