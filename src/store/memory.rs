use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{Store, StoreError};
use crate::{
    abiencode::types::{Address, Hash},
    channel::{AppInstance, AppInstanceProposal, StateChannel},
    commitment::{ConditionalTransactionCommitment, MinimalTransaction, SetStateCommitment},
};

#[derive(Default)]
struct Tables {
    channels: HashMap<Address, StateChannel>,
    set_state: HashMap<Hash, SetStateCommitment>,
    conditional: HashMap<Hash, ConditionalTransactionCommitment>,
    withdrawal: HashMap<Address, MinimalTransaction>,
}

impl Tables {
    fn channel(&self, multisig_address: Address) -> Result<&StateChannel, StoreError> {
        self.channels
            .get(&multisig_address)
            .ok_or(StoreError::NoChannel(multisig_address))
    }

    fn apply(
        &mut self,
        multisig_address: Address,
        f: impl FnOnce(&StateChannel) -> StateChannel,
    ) -> Result<(), StoreError> {
        let next = f(self.channel(multisig_address)?);
        self.channels.insert(multisig_address, next);
        Ok(())
    }
}

/// [Store] keeping everything in memory. Writes take a single write lock,
/// so readers see either the old or the new version of a channel.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_state_channel_if_exists(
        &self,
        multisig_address: Address,
    ) -> Result<Option<StateChannel>, StoreError> {
        Ok(self.tables.read().channels.get(&multisig_address).cloned())
    }

    async fn create_state_channel(&self, channel: StateChannel) -> Result<(), StoreError> {
        self.tables
            .write()
            .channels
            .insert(channel.multisig_address(), channel);
        Ok(())
    }

    async fn create_app_proposal(
        &self,
        multisig_address: Address,
        proposal: AppInstanceProposal,
        num_proposed_apps: u32,
    ) -> Result<(), StoreError> {
        self.tables.write().apply(multisig_address, |c| {
            c.record_proposal(proposal, num_proposed_apps)
        })
    }

    async fn remove_app_proposal(
        &self,
        multisig_address: Address,
        identity_hash: Hash,
    ) -> Result<(), StoreError> {
        self.tables
            .write()
            .apply(multisig_address, |c| c.record_proposal_removed(&identity_hash))
    }

    async fn create_app_instance(
        &self,
        multisig_address: Address,
        app: AppInstance,
        free_balance: AppInstance,
    ) -> Result<(), StoreError> {
        self.tables.write().apply(multisig_address, |c| {
            c.record_app_installed(app, free_balance)
        })
    }

    async fn update_app_instance(
        &self,
        multisig_address: Address,
        app: AppInstance,
    ) -> Result<(), StoreError> {
        self.tables
            .write()
            .apply(multisig_address, |c| c.record_app_updated(app))
    }

    async fn remove_app_instance(
        &self,
        multisig_address: Address,
        identity_hash: Hash,
        free_balance: AppInstance,
    ) -> Result<(), StoreError> {
        self.tables.write().apply(multisig_address, |c| {
            c.record_app_removed(&identity_hash, free_balance)
        })
    }

    async fn save_latest_set_state_commitment(
        &self,
        identity_hash: Hash,
        commitment: SetStateCommitment,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        // A redelivered older commitment must not replace a newer one.
        let stale = tables
            .set_state
            .get(&identity_hash)
            .map_or(false, |c| c.version_number > commitment.version_number);
        if !stale {
            tables.set_state.insert(identity_hash, commitment);
        }
        Ok(())
    }

    async fn get_latest_set_state_commitment(
        &self,
        identity_hash: Hash,
    ) -> Result<Option<SetStateCommitment>, StoreError> {
        Ok(self.tables.read().set_state.get(&identity_hash).cloned())
    }

    async fn save_conditional_transaction_commitment(
        &self,
        identity_hash: Hash,
        commitment: ConditionalTransactionCommitment,
    ) -> Result<(), StoreError> {
        self.tables
            .write()
            .conditional
            .insert(identity_hash, commitment);
        Ok(())
    }

    async fn get_conditional_transaction_commitment(
        &self,
        identity_hash: Hash,
    ) -> Result<Option<ConditionalTransactionCommitment>, StoreError> {
        Ok(self.tables.read().conditional.get(&identity_hash).cloned())
    }

    async fn save_withdrawal_commitment(
        &self,
        multisig_address: Address,
        commitment: MinimalTransaction,
    ) -> Result<(), StoreError> {
        self.tables
            .write()
            .withdrawal
            .insert(multisig_address, commitment);
        Ok(())
    }

    async fn get_withdrawal_commitment(
        &self,
        multisig_address: Address,
    ) -> Result<Option<MinimalTransaction>, StoreError> {
        Ok(self.tables.read().withdrawal.get(&multisig_address).cloned())
    }
}
