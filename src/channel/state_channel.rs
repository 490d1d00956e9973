use std::{collections::BTreeMap, sync::Arc};

use im::HashMap;
use tracing::debug;

use super::{
    app_instance::AppInstance,
    free_balance::{FreeBalance, ETH_TOKEN_ADDRESS},
    outcome::{OutcomeType, TokenIndexedBalances},
    proposal::AppInstanceProposal,
    AbiEncodings, ChannelError,
};
use crate::{
    abiencode::types::{Address, Hash, U256},
    config::NetworkContext,
    identity::{compute_identity_hash, compute_multisig_address, multisig_owners},
    sig::IdentityKey,
};

/// A bilateral channel between two identity keys, identified by its multisig
/// address.
///
/// Proposals and apps live in persistent maps, so cloning a channel (which
/// every transition does) shares all untouched entries with the previous
/// version.
#[derive(Debug, Clone, PartialEq)]
pub struct StateChannel {
    multisig_address: Address,
    user_identity_keys: [IdentityKey; 2],
    proposed_app_instances: HashMap<Hash, Arc<AppInstanceProposal>>,
    app_instances: HashMap<Hash, Arc<AppInstance>>,
    free_balance: Option<Arc<AppInstance>>,
    num_proposed_apps: u32,
}

impl StateChannel {
    /// A channel without free balance, as created when a proposal arrives
    /// before setup. Fails if `multisig_address` is not the one the keys
    /// deploy to.
    pub fn create_empty_channel(
        network: &NetworkContext,
        multisig_address: Address,
        user_identity_keys: [IdentityKey; 2],
    ) -> Result<Self, ChannelError> {
        let owners = multisig_owners(&user_identity_keys)?;
        let computed = compute_multisig_address(
            &owners,
            network.proxy_factory,
            network.minimum_viable_multisig,
            &network.proxy_bytecode,
        )?;
        if computed != multisig_address {
            return Err(ChannelError::MultisigMismatch {
                expected: multisig_address,
                computed,
            });
        }
        Ok(Self {
            multisig_address,
            user_identity_keys,
            proposed_app_instances: HashMap::new(),
            app_instances: HashMap::new(),
            free_balance: None,
            // Sequence number 0 belongs to the free balance.
            num_proposed_apps: 1,
        })
    }

    /// A channel with a fresh free balance holding zero of the native asset
    /// for both owners.
    pub fn setup_channel(
        network: &NetworkContext,
        multisig_address: Address,
        user_identity_keys: [IdentityKey; 2],
        free_balance_timeout: U256,
        initial_state_timeout: U256,
    ) -> Result<Self, ChannelError> {
        Self::create_empty_channel(network, multisig_address, user_identity_keys)?.setup(
            network,
            free_balance_timeout,
            initial_state_timeout,
        )
    }

    /// Install the free balance into a channel that does not have one yet,
    /// keeping any proposals it already carries.
    pub fn setup(
        &self,
        network: &NetworkContext,
        free_balance_timeout: U256,
        initial_state_timeout: U256,
    ) -> Result<Self, ChannelError> {
        if self.free_balance.is_some() {
            return Err(ChannelError::AlreadySetUp(self.multisig_address));
        }
        let owners = multisig_owners(&self.user_identity_keys)?;
        let state = FreeBalance::new(ETH_TOKEN_ADDRESS, &owners).encode()?;
        let free_balance = AppInstance {
            identity_hash: compute_identity_hash(
                network.identity_app,
                U256::zero(),
                &owners,
                free_balance_timeout,
            ),
            multisig_address: self.multisig_address,
            initiator_identifier: self.user_identity_keys[0],
            responder_identifier: self.user_identity_keys[1],
            participants: owners,
            app_definition: network.identity_app,
            abi_encodings: AbiEncodings {
                state_encoding: "tuple(address[] tokenAddresses, tuple(address to, uint256 amount)[][] balances, bytes32[] activeApps)".to_string(),
                action_encoding: None,
            },
            default_timeout: free_balance_timeout,
            state_timeout: initial_state_timeout,
            app_seq_no: 0,
            latest_state: state,
            latest_version_number: 0,
            outcome_type: OutcomeType::MultiAssetMultiPartyCoinTransfer,
            interpreter_params: None,
            initiator_deposit: U256::zero(),
            initiator_deposit_token: ETH_TOKEN_ADDRESS,
            responder_deposit: U256::zero(),
            responder_deposit_token: ETH_TOKEN_ADDRESS,
        };
        let mut next = self.clone();
        next.free_balance = Some(Arc::new(free_balance));
        Ok(next)
    }

    pub fn multisig_address(&self) -> Address {
        self.multisig_address
    }

    pub fn user_identity_keys(&self) -> &[IdentityKey; 2] {
        &self.user_identity_keys
    }

    pub fn num_proposed_apps(&self) -> u32 {
        self.num_proposed_apps
    }

    pub fn is_set_up(&self) -> bool {
        self.free_balance.is_some()
    }

    pub fn multisig_owners(&self) -> Result<[Address; 2], ChannelError> {
        Ok(multisig_owners(&self.user_identity_keys)?)
    }

    pub fn counterparty_of(&self, me: &IdentityKey) -> Result<IdentityKey, ChannelError> {
        match self.user_identity_keys {
            [a, b] if a == *me => Ok(b),
            [a, b] if b == *me => Ok(a),
            _ => Err(ChannelError::NotParticipant(me.to_string())),
        }
    }

    pub fn get_proposal(&self, identity_hash: &Hash) -> Result<&AppInstanceProposal, ChannelError> {
        self.proposed_app_instances
            .get(identity_hash)
            .map(|p| p.as_ref())
            .ok_or(ChannelError::NoSuchProposal(*identity_hash))
    }

    pub fn get_app_instance(&self, identity_hash: &Hash) -> Result<&AppInstance, ChannelError> {
        self.app_instances
            .get(identity_hash)
            .map(|a| a.as_ref())
            .ok_or(ChannelError::NoSuchApp(*identity_hash))
    }

    pub fn proposals(&self) -> impl Iterator<Item = &AppInstanceProposal> {
        self.proposed_app_instances.values().map(|p| p.as_ref())
    }

    pub fn app_instances(&self) -> impl Iterator<Item = &AppInstance> {
        self.app_instances.values().map(|a| a.as_ref())
    }

    /// Number of installed apps, not counting the free balance.
    pub fn num_active_apps(&self) -> usize {
        self.app_instances.len()
    }

    pub fn free_balance(&self) -> Result<&AppInstance, ChannelError> {
        self.free_balance
            .as_deref()
            .ok_or(ChannelError::NotSetUp(self.multisig_address))
    }

    pub fn free_balance_state(&self) -> Result<FreeBalance, ChannelError> {
        Ok(FreeBalance::decode(&self.free_balance()?.latest_state)?)
    }

    pub fn free_balance_for_token(&self, token: &Address) -> Result<BTreeMap<Address, U256>, ChannelError> {
        Ok(self.free_balance_state()?.for_token(token))
    }

    pub fn token_indexed_free_balances(&self) -> Result<TokenIndexedBalances, ChannelError> {
        Ok(self.free_balance_state()?.token_indexed_balances().clone())
    }

    fn contains_app(&self, identity_hash: &Hash) -> bool {
        self.proposed_app_instances.contains_key(identity_hash)
            || self.app_instances.contains_key(identity_hash)
    }

    /// Next version of the free balance app holding `state`.
    fn next_free_balance(&self, state: &FreeBalance) -> Result<AppInstance, ChannelError> {
        let current = self.free_balance()?;
        current.set_state(state.encode()?, current.default_timeout)
    }

    /// Add `proposal`, which must occupy the next sequence number. The
    /// counter moves on by one.
    pub fn add_proposal(&self, proposal: AppInstanceProposal) -> Result<Self, ChannelError> {
        if proposal.app_seq_no != self.num_proposed_apps {
            return Err(ChannelError::AppSeqNo {
                expected: self.num_proposed_apps,
                got: proposal.app_seq_no,
            });
        }
        if self.contains_app(&proposal.identity_hash) {
            return Err(ChannelError::AppExists(proposal.identity_hash));
        }
        let num_proposed_apps = self.num_proposed_apps + 1;
        Ok(self.record_proposal(proposal, num_proposed_apps))
    }

    pub fn remove_proposal(&self, identity_hash: &Hash) -> Result<Self, ChannelError> {
        self.get_proposal(identity_hash)?;
        Ok(self.record_proposal_removed(identity_hash))
    }

    /// Turn the proposal into an installed app and debit both deposits from
    /// the free balance.
    pub fn install_app(&self, identity_hash: &Hash) -> Result<Self, ChannelError> {
        let proposal = self.get_proposal(identity_hash)?;
        let app = proposal.to_app_instance()?;

        let mut decrements = TokenIndexedBalances::new();
        for deposit in proposal.deposits()? {
            let entry = decrements
                .entry(deposit.token)
                .or_insert_with(BTreeMap::new)
                .entry(deposit.depositor)
                .or_default();
            *entry = entry.checked_add(deposit.amount).ok_or(ChannelError::Overflow)?;
        }
        let state = self
            .free_balance_state()?
            .decrement(&decrements)?
            .with_active_app(*identity_hash);
        let free_balance = self.next_free_balance(&state)?;

        debug!(app = %identity_hash, seq_no = app.app_seq_no, "installing app");
        Ok(self.record_app_installed(app, free_balance))
    }

    /// Remove an installed app and credit `increments` (its interpreted
    /// outcome) to the free balance.
    pub fn uninstall_app(
        &self,
        identity_hash: &Hash,
        increments: &TokenIndexedBalances,
    ) -> Result<Self, ChannelError> {
        self.get_app_instance(identity_hash)?;
        let state = self
            .free_balance_state()?
            .increment(increments)?
            .without_active_app(identity_hash);
        let free_balance = self.next_free_balance(&state)?;
        Ok(self.record_app_removed(identity_hash, free_balance))
    }

    /// Credit `increments` to the free balance, as after a deposit into the
    /// multisig.
    pub fn increment_free_balance(
        &self,
        increments: &TokenIndexedBalances,
    ) -> Result<Self, ChannelError> {
        let state = self.free_balance_state()?.increment(increments)?;
        let mut next = self.clone();
        next.free_balance = Some(Arc::new(self.next_free_balance(&state)?));
        Ok(next)
    }

    /// Replace the latest state of an installed app, bumping its version.
    pub fn set_state(
        &self,
        identity_hash: &Hash,
        state: Vec<u8>,
        state_timeout: U256,
    ) -> Result<Self, ChannelError> {
        let app = self.get_app_instance(identity_hash)?.set_state(state, state_timeout)?;
        Ok(self.record_app_updated(app))
    }

    // The record_* methods apply an already validated transition. Stores use
    // them to replay persisted records onto their copy of the channel.

    pub fn record_proposal(&self, proposal: AppInstanceProposal, num_proposed_apps: u32) -> Self {
        let mut next = self.clone();
        next.proposed_app_instances = self
            .proposed_app_instances
            .update(proposal.identity_hash, Arc::new(proposal));
        next.num_proposed_apps = num_proposed_apps.max(self.num_proposed_apps);
        next
    }

    pub fn record_proposal_removed(&self, identity_hash: &Hash) -> Self {
        let mut next = self.clone();
        next.proposed_app_instances = self.proposed_app_instances.without(identity_hash);
        next
    }

    pub fn record_app_installed(&self, app: AppInstance, free_balance: AppInstance) -> Self {
        let mut next = self.clone();
        next.proposed_app_instances = self.proposed_app_instances.without(&app.identity_hash);
        next.app_instances = self.app_instances.update(app.identity_hash, Arc::new(app));
        next.free_balance = Some(Arc::new(free_balance));
        next
    }

    pub fn record_app_updated(&self, app: AppInstance) -> Self {
        let mut next = self.clone();
        next.app_instances = self.app_instances.update(app.identity_hash, Arc::new(app));
        next
    }

    pub fn record_app_removed(&self, identity_hash: &Hash, free_balance: AppInstance) -> Self {
        let mut next = self.clone();
        next.app_instances = self.app_instances.without(identity_hash);
        next.free_balance = Some(Arc::new(free_balance));
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        channel::{compute_free_balance_increments, ProposalTerms},
        sig::ExtendedPrivateKey,
    };

    fn network() -> NetworkContext {
        NetworkContext {
            proxy_bytecode: vec![0x60, 0x80],
            ..NetworkContext::default()
        }
    }

    fn keys() -> [IdentityKey; 2] {
        [
            ExtendedPrivateKey::from_seed(b"initiator seed").unwrap().public_key(),
            ExtendedPrivateKey::from_seed(b"responder seed").unwrap().public_key(),
        ]
    }

    fn multisig() -> Address {
        compute_multisig_address(
            &multisig_owners(&keys()).unwrap(),
            network().proxy_factory,
            network().minimum_viable_multisig,
            &network().proxy_bytecode,
        )
        .unwrap()
    }

    fn channel() -> StateChannel {
        StateChannel::setup_channel(&network(), multisig(), keys(), 100.into(), 100.into()).unwrap()
    }

    fn fund(channel: &StateChannel, amount: u64) -> StateChannel {
        let owners = channel.multisig_owners().unwrap();
        let inc = BTreeMap::from([(
            ETH_TOKEN_ADDRESS,
            owners.iter().map(|o| (*o, U256::from(amount))).collect(),
        )]);
        channel.increment_free_balance(&inc).unwrap()
    }

    fn proposal(channel: &StateChannel, outcome_type: OutcomeType) -> AppInstanceProposal {
        let [a, b] = keys();
        AppInstanceProposal::new(
            ProposalTerms {
                app_definition: Address([0x1d; 20]),
                abi_encodings: AbiEncodings::default(),
                initial_state: crate::abiencode::to_bytes(&2u8).unwrap(),
                outcome_type,
                initiator_deposit: 1.into(),
                initiator_deposit_token: ETH_TOKEN_ADDRESS,
                responder_deposit: 1.into(),
                responder_deposit_token: ETH_TOKEN_ADDRESS,
                default_timeout: 10.into(),
                state_timeout: 10.into(),
            },
            channel.multisig_address(),
            channel.num_proposed_apps(),
            a,
            b,
        )
        .unwrap()
    }

    #[test]
    fn setup_starts_counter_at_one() {
        let channel = channel();
        assert_eq!(channel.num_proposed_apps(), 1);
        assert_eq!(channel.num_active_apps(), 0);
        let fb = channel.free_balance().unwrap();
        assert_eq!(fb.app_seq_no, 0);
        assert_eq!(fb.latest_version_number, 0);
        let balances = channel.free_balance_for_token(&ETH_TOKEN_ADDRESS).unwrap();
        assert_eq!(balances.len(), 2);
        assert!(balances.values().all(|b| b.is_zero()));
        assert!(matches!(
            channel.setup(&network(), 1.into(), 1.into()),
            Err(ChannelError::AlreadySetUp(_))
        ));
    }

    #[test]
    fn wrong_multisig_is_rejected() {
        assert!(matches!(
            StateChannel::create_empty_channel(&network(), Address([1; 20]), keys()),
            Err(ChannelError::MultisigMismatch { .. })
        ));
    }

    #[test]
    fn proposals_bump_the_counter_and_keep_old_versions() {
        let v0 = channel();
        let p = proposal(&v0, OutcomeType::TwoPartyFixedOutcome);
        let hash = p.identity_hash;
        let v1 = v0.add_proposal(p.clone()).unwrap();

        assert_eq!(v1.num_proposed_apps(), 2);
        assert!(v1.get_proposal(&hash).is_ok());
        assert!(v0.get_proposal(&hash).is_err());
        assert!(matches!(
            v1.add_proposal(p),
            Err(ChannelError::AppSeqNo { .. })
        ));

        let v2 = v1.remove_proposal(&hash).unwrap();
        assert_eq!(v2.num_proposed_apps(), 2);
        assert!(v2.get_proposal(&hash).is_err());
    }

    #[test]
    fn install_then_uninstall_restores_balances() {
        let funded = fund(&channel(), 5);
        let owners = funded.multisig_owners().unwrap();
        let p = proposal(&funded, OutcomeType::TwoPartyFixedOutcome);
        let hash = p.identity_hash;

        let funded_version = funded.free_balance().unwrap().latest_version_number;
        let installed = funded.add_proposal(p).unwrap().install_app(&hash).unwrap();
        assert_eq!(installed.num_active_apps(), 1);
        assert_eq!(
            installed.free_balance().unwrap().latest_version_number,
            funded_version + 1
        );
        for owner in &owners {
            assert_eq!(
                installed.free_balance_state().unwrap().balance_of(&ETH_TOKEN_ADDRESS, owner),
                U256::from(4)
            );
        }
        assert_eq!(installed.free_balance_state().unwrap().active_apps(), &[hash]);

        let app = installed.get_app_instance(&hash).unwrap();
        let increments =
            compute_free_balance_increments(app.interpreter_params().unwrap(), &app.latest_state)
                .unwrap();
        let uninstalled = installed.uninstall_app(&hash, &increments).unwrap();

        assert_eq!(uninstalled.num_active_apps(), 0);
        assert_eq!(
            uninstalled.free_balance().unwrap().latest_version_number,
            funded_version + 2
        );
        assert_eq!(
            uninstalled.free_balance_for_token(&ETH_TOKEN_ADDRESS).unwrap(),
            funded.free_balance_for_token(&ETH_TOKEN_ADDRESS).unwrap()
        );
        assert!(uninstalled.free_balance_state().unwrap().active_apps().is_empty());
    }

    #[test]
    fn install_without_funds_fails() {
        let channel = channel();
        let p = proposal(&channel, OutcomeType::TwoPartyFixedOutcome);
        let hash = p.identity_hash;
        assert!(matches!(
            channel.add_proposal(p).unwrap().install_app(&hash),
            Err(ChannelError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn set_state_bumps_version_by_one() {
        let funded = fund(&channel(), 5);
        let p = proposal(&funded, OutcomeType::TwoPartyFixedOutcome);
        let hash = p.identity_hash;
        let installed = funded.add_proposal(p).unwrap().install_app(&hash).unwrap();

        let updated = installed.set_state(&hash, vec![1; 32], 20.into()).unwrap();
        let app = updated.get_app_instance(&hash).unwrap();
        assert_eq!(app.latest_version_number, 1);
        assert_eq!(app.state_timeout, U256::from(20));
        assert_eq!(installed.get_app_instance(&hash).unwrap().latest_version_number, 0);
    }
}
