//! Persistence of channels and commitments.

mod memory;

use std::sync::Arc;

use async_trait::async_trait;

pub use memory::MemoryStore;

use crate::{
    abiencode::types::{Address, Hash},
    channel::{AppInstance, AppInstanceProposal, ChannelError, StateChannel},
    commitment::{
        CommitmentRecord, ConditionalTransactionCommitment, MinimalTransaction, SetStateCommitment,
    },
    engine::{HandlerError, PersistHandler, PersistKind},
    messages::Protocol,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no channel with multisig {0}")]
    NoChannel(Address),
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("storage backend: {0}")]
    Backend(String),
}

/// A key/value store for channels, keyed by multisig address, and
/// commitments, keyed by app identity hash.
///
/// Every call applies fully or not at all.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_state_channel(&self, multisig_address: Address) -> Result<StateChannel, StoreError> {
        self.get_state_channel_if_exists(multisig_address)
            .await?
            .ok_or(StoreError::NoChannel(multisig_address))
    }

    async fn get_state_channel_if_exists(
        &self,
        multisig_address: Address,
    ) -> Result<Option<StateChannel>, StoreError>;

    /// Store `channel`, replacing any previous version.
    async fn create_state_channel(&self, channel: StateChannel) -> Result<(), StoreError>;

    async fn create_app_proposal(
        &self,
        multisig_address: Address,
        proposal: AppInstanceProposal,
        num_proposed_apps: u32,
    ) -> Result<(), StoreError>;

    async fn remove_app_proposal(
        &self,
        multisig_address: Address,
        identity_hash: Hash,
    ) -> Result<(), StoreError>;

    async fn create_app_instance(
        &self,
        multisig_address: Address,
        app: AppInstance,
        free_balance: AppInstance,
    ) -> Result<(), StoreError>;

    async fn update_app_instance(
        &self,
        multisig_address: Address,
        app: AppInstance,
    ) -> Result<(), StoreError>;

    async fn remove_app_instance(
        &self,
        multisig_address: Address,
        identity_hash: Hash,
        free_balance: AppInstance,
    ) -> Result<(), StoreError>;

    async fn save_latest_set_state_commitment(
        &self,
        identity_hash: Hash,
        commitment: SetStateCommitment,
    ) -> Result<(), StoreError>;

    async fn get_latest_set_state_commitment(
        &self,
        identity_hash: Hash,
    ) -> Result<Option<SetStateCommitment>, StoreError>;

    async fn save_conditional_transaction_commitment(
        &self,
        identity_hash: Hash,
        commitment: ConditionalTransactionCommitment,
    ) -> Result<(), StoreError>;

    async fn get_conditional_transaction_commitment(
        &self,
        identity_hash: Hash,
    ) -> Result<Option<ConditionalTransactionCommitment>, StoreError>;

    async fn save_withdrawal_commitment(
        &self,
        multisig_address: Address,
        commitment: MinimalTransaction,
    ) -> Result<(), StoreError>;

    async fn get_withdrawal_commitment(
        &self,
        multisig_address: Address,
    ) -> Result<Option<MinimalTransaction>, StoreError>;
}

/// Runs the persistence steps of a flow against a [Store].
pub struct StorePersistence {
    store: Arc<dyn Store>,
}

impl StorePersistence {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PersistHandler for StorePersistence {
    async fn persist_channel(&self, channel: &StateChannel) -> Result<(), HandlerError> {
        Ok(self.store.create_state_channel(channel.clone()).await?)
    }

    async fn persist_app(
        &self,
        kind: PersistKind,
        channel: &StateChannel,
        identity_hash: Hash,
    ) -> Result<(), HandlerError> {
        let multisig = channel.multisig_address();
        match kind {
            PersistKind::CreateProposal => {
                let proposal = channel
                    .get_proposal(&identity_hash)
                    .map_err(StoreError::from)?
                    .clone();
                self.store
                    .create_app_proposal(multisig, proposal, channel.num_proposed_apps())
                    .await?
            }
            PersistKind::RemoveProposal | PersistKind::Reject => {
                self.store.remove_app_proposal(multisig, identity_hash).await?
            }
            PersistKind::CreateInstance => {
                let app = channel
                    .get_app_instance(&identity_hash)
                    .map_err(StoreError::from)?
                    .clone();
                let free_balance = channel.free_balance().map_err(StoreError::from)?.clone();
                self.store
                    .create_app_instance(multisig, app, free_balance)
                    .await?
            }
            PersistKind::UpdateInstance => {
                let app = channel
                    .get_app_instance(&identity_hash)
                    .map_err(StoreError::from)?
                    .clone();
                self.store.update_app_instance(multisig, app).await?
            }
            PersistKind::RemoveInstance => {
                let free_balance = channel.free_balance().map_err(StoreError::from)?.clone();
                self.store
                    .remove_app_instance(multisig, identity_hash, free_balance)
                    .await?
            }
        }
        Ok(())
    }

    async fn write_commitment(
        &self,
        _protocol: Protocol,
        identity_hash: Hash,
        record: &CommitmentRecord,
    ) -> Result<(), HandlerError> {
        match record {
            CommitmentRecord::SetState(c) => {
                self.store
                    .save_latest_set_state_commitment(identity_hash, c.clone())
                    .await?
            }
            CommitmentRecord::Conditional(c) => {
                self.store
                    .save_conditional_transaction_commitment(identity_hash, c.clone())
                    .await?
            }
        }
        Ok(())
    }
}
