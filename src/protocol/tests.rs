//! Two runners talking to each other over an in-process transport.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::{
    abiencode::{
        self,
        types::{Address, Hash, U256},
    },
    apps::{AppError, AppRegistry},
    channel::{AbiEncodings, OutcomeType, ProposalTerms, StateChannel, ETH_TOKEN_ADDRESS},
    config::{EngineConfig, NetworkContext},
    engine::{
        FlowOutcome, HandlerError, HandlerTable, KeySigner, Opcode, ProtocolError,
        ProtocolRunError, ProtocolRunner, Transport, ValidationError,
    },
    identity::{compute_multisig_address, multisig_owners},
    messages::{
        CustomData, InstallParams, ProcessId, ProposeParams, Protocol, ProtocolMessage,
        ProtocolParams, SetupParams, TakeActionParams, UninstallParams, UpdateParams,
    },
    sig::{ExtendedPrivateKey, IdentityKey},
    store::{MemoryStore, Store, StorePersistence},
};

type RunResult = Result<Option<FlowOutcome>, ProtocolRunError>;

/// Hands every message to the peer runner on its own task, as a network
/// would.
#[derive(Default)]
struct Loopback {
    peer: Mutex<Option<ProtocolRunner>>,
    runs: Mutex<Vec<JoinHandle<RunResult>>>,
}

impl Loopback {
    fn connect(&self, peer: ProtocolRunner) {
        *self.peer.lock() = Some(peer);
    }

    /// Wait for everything the peer is still doing with our messages.
    async fn settle(&self) -> Vec<RunResult> {
        let handles: Vec<_> = self.runs.lock().drain(..).collect();
        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        results
    }
}

#[async_trait]
impl Transport for Loopback {
    async fn deliver(&self, msg: ProtocolMessage) -> Result<(), HandlerError> {
        let peer = self
            .peer
            .lock()
            .clone()
            .ok_or_else(|| HandlerError::Transport("not connected".to_string()))?;
        let handle = tokio::spawn(async move { peer.run_protocol_with_message(msg).await });
        self.runs.lock().push(handle);
        Ok(())
    }
}

/// Accepts everything and delivers nothing.
struct Blackhole;

#[async_trait]
impl Transport for Blackhole {
    async fn deliver(&self, _msg: ProtocolMessage) -> Result<(), HandlerError> {
        Ok(())
    }
}

struct Node {
    key: ExtendedPrivateKey,
    store: Arc<MemoryStore>,
    transport: Arc<Loopback>,
    runner: ProtocolRunner,
}

fn runner(
    key: &ExtendedPrivateKey,
    store: Arc<MemoryStore>,
    transport: Arc<dyn Transport>,
    config: &EngineConfig,
) -> ProtocolRunner {
    let handlers = HandlerTable::new()
        .with_signer(Arc::new(KeySigner::new(key.clone())))
        .with_transport(transport)
        .with_persistence(Arc::new(StorePersistence::new(store.clone())));
    ProtocolRunner::new(
        config.clone(),
        key.public_key(),
        store,
        AppRegistry::with_identity_app(config.network.identity_app),
        handlers,
    )
}

fn node(seed: &[u8], config: &EngineConfig) -> Node {
    let key = ExtendedPrivateKey::from_seed(seed).unwrap();
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(Loopback::default());
    let runner = runner(&key, store.clone(), transport.clone(), config);
    Node {
        key,
        store,
        transport,
        runner,
    }
}

fn config() -> EngineConfig {
    EngineConfig {
        network: NetworkContext {
            challenge_registry: Address([0xc0; 20]),
            identity_app: Address([0x1a; 20]),
            two_party_fixed_outcome_interpreter: Address([0x2f; 20]),
            conditional_transaction_delegate_target: Address([0xde; 20]),
            proxy_bytecode: vec![0x60, 0x80, 0x60, 0x40],
            ..NetworkContext::default()
        },
        send_and_wait_timeout_ms: 5_000,
        ..EngineConfig::default()
    }
}

fn uint(value: u64) -> Vec<u8> {
    abiencode::to_bytes(&U256::from(value)).unwrap()
}

struct Pair {
    config: EngineConfig,
    alice: Node,
    bob: Node,
    multisig: Address,
}

impl Pair {
    fn new(config: EngineConfig) -> Self {
        let alice = node(b"alice", &config);
        let bob = node(b"bob", &config);
        alice.transport.connect(bob.runner.clone());
        bob.transport.connect(alice.runner.clone());
        let owners =
            multisig_owners(&[alice.key.public_key(), bob.key.public_key()]).unwrap();
        let multisig = compute_multisig_address(
            &owners,
            config.network.proxy_factory,
            config.network.minimum_viable_multisig,
            &config.network.proxy_bytecode,
        )
        .unwrap();
        Self {
            config,
            alice,
            bob,
            multisig,
        }
    }

    fn setup_params(&self) -> ProtocolParams {
        ProtocolParams::Setup(SetupParams {
            multisig_address: self.multisig,
            initiator_identifier: self.alice.key.public_key(),
            responder_identifier: self.bob.key.public_key(),
        })
    }

    fn terms(&self) -> ProposalTerms {
        ProposalTerms {
            app_definition: self.config.network.identity_app,
            abi_encodings: AbiEncodings {
                state_encoding: "uint256".to_string(),
                action_encoding: Some("uint256".to_string()),
            },
            // Two-party fixed outcome 2 splits the pot.
            initial_state: uint(2),
            outcome_type: OutcomeType::TwoPartyFixedOutcome,
            initiator_deposit: 1.into(),
            initiator_deposit_token: ETH_TOKEN_ADDRESS,
            responder_deposit: 1.into(),
            responder_deposit_token: ETH_TOKEN_ADDRESS,
            default_timeout: 100.into(),
            state_timeout: 100.into(),
        }
    }

    fn propose_params(&self) -> ProtocolParams {
        ProtocolParams::Propose(ProposeParams {
            multisig_address: self.multisig,
            initiator_identifier: self.alice.key.public_key(),
            responder_identifier: self.bob.key.public_key(),
            terms: self.terms(),
        })
    }

    fn install_params(&self, identity_hash: Hash) -> ProtocolParams {
        ProtocolParams::Install(InstallParams {
            multisig_address: self.multisig,
            initiator_identifier: self.alice.key.public_key(),
            responder_identifier: self.bob.key.public_key(),
            identity_hash,
        })
    }

    fn uninstall_params(&self, identity_hash: Hash, action: Option<Vec<u8>>) -> ProtocolParams {
        ProtocolParams::Uninstall(UninstallParams {
            multisig_address: self.multisig,
            initiator_identifier: self.alice.key.public_key(),
            responder_identifier: self.bob.key.public_key(),
            identity_hash,
            action,
        })
    }

    async fn channels(&self) -> (StateChannel, StateChannel) {
        (
            self.alice.store.get_state_channel(self.multisig).await.unwrap(),
            self.bob.store.get_state_channel(self.multisig).await.unwrap(),
        )
    }

    /// Run `params` from alice and wait for bob to finish as well.
    async fn run(&self, params: ProtocolParams) -> FlowOutcome {
        let outcome = self.alice.runner.initiate_protocol(params).await.unwrap();
        for result in self.alice.transport.settle().await {
            result.unwrap();
        }
        outcome
    }

    /// Credit `amount` of the native asset to both owners on both sides.
    async fn fund(&self, amount: u64) {
        for store in [&self.alice.store, &self.bob.store] {
            let channel = store.get_state_channel(self.multisig).await.unwrap();
            let owners = channel.multisig_owners().unwrap();
            let increments = BTreeMap::from([(
                ETH_TOKEN_ADDRESS,
                owners.iter().map(|o| (*o, U256::from(amount))).collect(),
            )]);
            store
                .create_state_channel(channel.increment_free_balance(&increments).unwrap())
                .await
                .unwrap();
        }
    }

    async fn set_up(&self) {
        self.run(self.setup_params()).await;
    }

    async fn installed_app(&self) -> Hash {
        self.set_up().await;
        self.fund(5).await;
        let proposed = self.run(self.propose_params()).await;
        let identity_hash = proposed.identity_hash.unwrap();
        self.run(self.install_params(identity_hash)).await;
        identity_hash
    }
}

/// Alice on her own store, with messages going nowhere and a short timeout.
fn unanswered(pair: &Pair) -> ProtocolRunner {
    let mut config = pair.config.clone();
    config.send_and_wait_timeout_ms = 50;
    runner(
        &pair.alice.key,
        pair.alice.store.clone(),
        Arc::new(Blackhole),
        &config,
    )
}

/// `params` with `initiator` in place of alice.
fn initiated_by(mut params: ProtocolParams, initiator: IdentityKey) -> ProtocolParams {
    match &mut params {
        ProtocolParams::Setup(p) => p.initiator_identifier = initiator,
        ProtocolParams::Propose(p) => p.initiator_identifier = initiator,
        ProtocolParams::Install(p) => p.initiator_identifier = initiator,
        ProtocolParams::Uninstall(p) => p.initiator_identifier = initiator,
        ProtocolParams::TakeAction(p) => p.initiator_identifier = initiator,
        ProtocolParams::Update(p) => p.initiator_identifier = initiator,
    }
    params
}

/// Opening message of a run from `from` to bob, signed by `from`.
fn opening_message(
    pair: &Pair,
    from: &ExtendedPrivateKey,
    params: ProtocolParams,
) -> ProtocolMessage {
    let signature = from.derive_signer(1).unwrap().sign_eth(Hash([7; 32])).unwrap();
    ProtocolMessage {
        protocol: params.protocol(),
        process_id: ProcessId::random(),
        seq: 0,
        to_identity_key: pair.bob.key.public_key(),
        params: Some(initiated_by(params, from.public_key())),
        custom_data: CustomData {
            signature: Some(signature),
            signature2: None,
        },
    }
}

async fn commitment_version(store: &MemoryStore, identity_hash: Hash) -> Option<U256> {
    store
        .get_latest_set_state_commitment(identity_hash)
        .await
        .unwrap()
        .map(|c| c.version_number)
}

fn balances(channel: &StateChannel) -> BTreeMap<Address, U256> {
    channel.free_balance_for_token(&ETH_TOKEN_ADDRESS).unwrap()
}

#[tokio::test]
async fn setup_creates_the_same_free_balance_on_both_sides() {
    let pair = Pair::new(config());
    let outcome = pair.run(pair.setup_params()).await;
    assert_eq!(outcome.protocol, Protocol::Setup);

    let (alice, bob) = pair.channels().await;
    assert_eq!(alice, bob);
    assert_eq!(alice.num_proposed_apps(), 1);
    let fb = alice.free_balance().unwrap();

    let commitment = pair
        .bob
        .store
        .get_latest_set_state_commitment(fb.identity_hash)
        .await
        .unwrap()
        .unwrap();
    assert!(commitment.is_fully_signed());
    assert!(commitment.get_signed_transaction().is_ok());
}

#[tokio::test]
async fn propose_agrees_on_identity_hash_and_counter() {
    let pair = Pair::new(config());
    pair.set_up().await;

    let first = pair.run(pair.propose_params()).await;
    let second = pair.run(pair.propose_params()).await;
    let (alice, bob) = pair.channels().await;

    assert_eq!(alice.num_proposed_apps(), 3);
    assert_eq!(bob.num_proposed_apps(), 3);
    let first = first.identity_hash.unwrap();
    let second = second.identity_hash.unwrap();
    assert_ne!(first, second);
    for hash in [first, second] {
        assert_eq!(alice.get_proposal(&hash).unwrap(), bob.get_proposal(&hash).unwrap());
    }
    assert_eq!(alice.get_proposal(&first).unwrap().app_seq_no, 1);
    assert_eq!(alice.get_proposal(&second).unwrap().app_seq_no, 2);
}

#[tokio::test]
async fn propose_before_setup_creates_the_channel() {
    let pair = Pair::new(config());
    let outcome = pair.run(pair.propose_params()).await;
    let (alice, bob) = pair.channels().await;
    assert!(!alice.is_set_up());
    assert_eq!(alice, bob);
    assert!(alice.get_proposal(&outcome.identity_hash.unwrap()).is_ok());

    // Setup keeps the early proposal.
    pair.set_up().await;
    let (alice, _) = pair.channels().await;
    assert!(alice.is_set_up());
    assert_eq!(alice.proposals().count(), 1);
}

#[tokio::test]
async fn propose_of_unknown_app_is_rejected_up_front() {
    let pair = Pair::new(config());
    pair.set_up().await;
    let mut params = pair.propose_params();
    if let ProtocolParams::Propose(p) = &mut params {
        p.terms.app_definition = Address([0xee; 20]);
    }
    let err = pair.alice.runner.initiate_protocol(params).await.unwrap_err();
    assert!(matches!(
        err.source,
        ProtocolError::Validation(ValidationError::App(_))
    ));
    assert_eq!(err.last_completed, None);
    let (alice, _) = pair.channels().await;
    assert_eq!(alice.num_proposed_apps(), 1);
}

#[tokio::test]
async fn install_debits_both_deposits() {
    let pair = Pair::new(config());
    pair.set_up().await;
    pair.fund(5).await;
    let before = balances(&pair.channels().await.0);

    let proposed = pair.run(pair.propose_params()).await;
    let identity_hash = proposed.identity_hash.unwrap();
    pair.run(pair.install_params(identity_hash)).await;

    let (alice, bob) = pair.channels().await;
    assert_eq!(alice, bob);
    assert_eq!(alice.num_active_apps(), 1);
    assert!(alice.get_proposal(&identity_hash).is_err());
    for (owner, balance) in balances(&alice) {
        assert_eq!(balance + 1, before[&owner]);
    }

    for store in [&pair.alice.store, &pair.bob.store] {
        let conditional = store
            .get_conditional_transaction_commitment(identity_hash)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(conditional.signatures().len(), 2);
        let fb = store
            .get_latest_set_state_commitment(alice.free_balance().unwrap().identity_hash)
            .await
            .unwrap()
            .unwrap();
        assert!(fb.is_fully_signed());
        assert_eq!(fb.version_number, U256::from(2));
    }
}

#[tokio::test]
async fn take_action_and_update_bump_the_version() {
    let pair = Pair::new(config());
    let identity_hash = pair.installed_app().await;

    pair.run(ProtocolParams::TakeAction(TakeActionParams {
        multisig_address: pair.multisig,
        initiator_identifier: pair.alice.key.public_key(),
        responder_identifier: pair.bob.key.public_key(),
        identity_hash,
        action: uint(0),
        state_timeout: None,
    }))
    .await;
    let (alice, bob) = pair.channels().await;
    let app = alice.get_app_instance(&identity_hash).unwrap();
    assert_eq!(app, bob.get_app_instance(&identity_hash).unwrap());
    assert_eq!(app.latest_version_number, 1);
    assert_eq!(app.latest_state, uint(0));
    assert_eq!(app.state_timeout, app.default_timeout);

    pair.run(ProtocolParams::Update(UpdateParams {
        multisig_address: pair.multisig,
        initiator_identifier: pair.alice.key.public_key(),
        responder_identifier: pair.bob.key.public_key(),
        identity_hash,
        new_state: uint(1),
        state_timeout: Some(7.into()),
    }))
    .await;
    let (alice, _) = pair.channels().await;
    let app = alice.get_app_instance(&identity_hash).unwrap();
    assert_eq!(app.latest_version_number, 2);
    assert_eq!(app.state_timeout, U256::from(7));

    let commitment = pair
        .alice
        .store
        .get_latest_set_state_commitment(identity_hash)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(commitment.version_number, U256::from(2));
    assert!(commitment.is_fully_signed());
}

#[tokio::test]
async fn update_to_a_malformed_state_is_rejected_before_signing() {
    let pair = Pair::new(config());
    let identity_hash = pair.installed_app().await;
    let (before, _) = pair.channels().await;

    let err = pair
        .alice
        .runner
        .initiate_protocol(ProtocolParams::Update(UpdateParams {
            multisig_address: pair.multisig,
            initiator_identifier: pair.alice.key.public_key(),
            responder_identifier: pair.bob.key.public_key(),
            identity_hash,
            new_state: vec![1; 31],
            state_timeout: None,
        }))
        .await
        .unwrap_err();
    assert!(matches!(
        err.source,
        ProtocolError::Validation(ValidationError::App(AppError::InvalidState(_)))
    ));
    assert_eq!(err.last_completed, None);
    let (after, _) = pair.channels().await;
    assert_eq!(after, before);
}

#[tokio::test]
async fn uninstall_with_split_restores_balances() {
    let pair = Pair::new(config());
    pair.set_up().await;
    pair.fund(5).await;
    let before = balances(&pair.channels().await.0);

    let proposed = pair.run(pair.propose_params()).await;
    let identity_hash = proposed.identity_hash.unwrap();
    pair.run(pair.install_params(identity_hash)).await;
    pair.run(pair.uninstall_params(identity_hash, None)).await;

    let (alice, bob) = pair.channels().await;
    assert_eq!(alice, bob);
    assert_eq!(alice.num_active_apps(), 0);
    assert_eq!(balances(&alice), before);
    assert!(alice.free_balance_state().unwrap().active_apps().is_empty());
}

#[tokio::test]
async fn uninstall_applies_the_final_action() {
    let pair = Pair::new(config());
    let identity_hash = pair.installed_app().await;
    let (channel, _) = pair.channels().await;
    let before = balances(&channel);
    let [alice_fb, bob_fb] = [
        pair.alice.key.public_key().derive_address(0).unwrap(),
        pair.bob.key.public_key().derive_address(0).unwrap(),
    ];

    // Outcome 0 pays the whole pot to the proposer.
    pair.run(pair.uninstall_params(identity_hash, Some(uint(0)))).await;
    let (alice, _) = pair.channels().await;
    let after = balances(&alice);
    assert_eq!(after[&alice_fb], before[&alice_fb] + 2);
    assert_eq!(after[&bob_fb], before[&bob_fb]);
}

#[tokio::test]
async fn responder_rejects_a_forged_initiator_signature() {
    let pair = Pair::new(config());
    pair.set_up().await;
    let (alice_before, bob_before) = pair.channels().await;

    let mallory = ExtendedPrivateKey::from_seed(b"mallory").unwrap();
    let forged = mallory.derive_signer(1).unwrap().sign_eth(Hash([7; 32])).unwrap();
    let msg = ProtocolMessage {
        protocol: Protocol::Propose,
        process_id: ProcessId::random(),
        seq: 0,
        to_identity_key: pair.bob.key.public_key(),
        params: Some(pair.propose_params()),
        custom_data: CustomData {
            signature: Some(forged),
            signature2: None,
        },
    };

    let err = pair.bob.runner.run_protocol_with_message(msg).await.unwrap_err();
    assert!(matches!(err.source, ProtocolError::InvalidSignature(_)));
    assert!(!err.is_retryable());

    let (alice_after, bob_after) = pair.channels().await;
    assert_eq!(alice_after, alice_before);
    assert_eq!(bob_after, bob_before);
    assert_eq!(bob_after.proposals().count(), 0);
}

#[tokio::test]
async fn responder_ignores_proposals_from_a_stranger() {
    let pair = Pair::new(config());
    pair.set_up().await;
    let (alice_before, bob_before) = pair.channels().await;

    let mallory = ExtendedPrivateKey::from_seed(b"mallory").unwrap();
    let msg = opening_message(&pair, &mallory, pair.propose_params());
    let err = pair.bob.runner.run_protocol_with_message(msg).await.unwrap_err();
    match &err.source {
        ProtocolError::Validation(ValidationError::NotParticipant { multisig, key }) => {
            assert_eq!(*multisig, pair.multisig);
            assert_eq!(*key, mallory.public_key());
        }
        other => panic!("expected NotParticipant, got {:?}", other),
    }
    assert_eq!(err.last_completed, None);
    assert!(!err.is_retryable());

    let (alice_after, bob_after) = pair.channels().await;
    assert_eq!(alice_after, alice_before);
    assert_eq!(bob_after, bob_before);
    assert_eq!(bob_after.num_proposed_apps(), 1);

    // The counters still agree, so alice can propose as usual.
    pair.run(pair.propose_params()).await;
    let (alice, bob) = pair.channels().await;
    assert_eq!(alice, bob);
    assert_eq!(bob.num_proposed_apps(), 2);
}

#[tokio::test]
async fn responder_ignores_app_protocols_from_a_stranger() {
    let pair = Pair::new(config());
    let installed = pair.installed_app().await;
    let proposed = pair.run(pair.propose_params()).await.identity_hash.unwrap();
    let (alice_before, bob_before) = pair.channels().await;
    let bob_commitment = commitment_version(&pair.bob.store, installed).await;

    let mallory = ExtendedPrivateKey::from_seed(b"mallory").unwrap();
    let runs = [
        pair.install_params(proposed),
        pair.uninstall_params(installed, None),
        ProtocolParams::TakeAction(TakeActionParams {
            multisig_address: pair.multisig,
            initiator_identifier: pair.alice.key.public_key(),
            responder_identifier: pair.bob.key.public_key(),
            identity_hash: installed,
            action: uint(0),
            state_timeout: None,
        }),
        ProtocolParams::Update(UpdateParams {
            multisig_address: pair.multisig,
            initiator_identifier: pair.alice.key.public_key(),
            responder_identifier: pair.bob.key.public_key(),
            identity_hash: installed,
            new_state: uint(1),
            state_timeout: None,
        }),
    ];
    for params in runs {
        let protocol = params.protocol();
        let msg = opening_message(&pair, &mallory, params);
        let err = pair.bob.runner.run_protocol_with_message(msg).await.unwrap_err();
        assert!(
            matches!(
                err.source,
                ProtocolError::Validation(ValidationError::NotParticipant { .. })
            ),
            "{} from a stranger: {:?}",
            protocol,
            err.source
        );
    }

    let (alice_after, bob_after) = pair.channels().await;
    assert_eq!(alice_after, alice_before);
    assert_eq!(bob_after, bob_before);
    assert!(bob_after.get_proposal(&proposed).is_ok());
    assert_eq!(bob_after.num_active_apps(), 1);
    assert_eq!(commitment_version(&pair.bob.store, installed).await, bob_commitment);
}

#[tokio::test]
async fn initiator_refuses_a_stranger_as_responder() {
    let pair = Pair::new(config());
    pair.set_up().await;
    let (before, _) = pair.channels().await;

    let mallory = ExtendedPrivateKey::from_seed(b"mallory").unwrap();
    let mut params = pair.propose_params();
    if let ProtocolParams::Propose(p) = &mut params {
        p.responder_identifier = mallory.public_key();
    }
    let err = pair.alice.runner.initiate_protocol(params).await.unwrap_err();
    assert!(matches!(
        err.source,
        ProtocolError::Validation(ValidationError::NotParticipant { key, .. })
            if key == mallory.public_key()
    ));
    assert_eq!(err.last_completed, None);
    let (after, _) = pair.channels().await;
    assert_eq!(after, before);
}

#[tokio::test]
async fn missing_reply_times_out_without_side_effects() {
    let pair = Pair::new(config());
    let alice = unanswered(&pair);

    let err = alice.initiate_protocol(pair.setup_params()).await.unwrap_err();
    assert!(matches!(err.source, ProtocolError::Timeout(_)));
    assert!(err.is_retryable());
    assert_eq!(err.failed_at, Some(Opcode::SendAndWait));
    assert_eq!(err.last_completed, Some(Opcode::Sign));
    assert!(pair
        .alice
        .store
        .get_state_channel_if_exists(pair.multisig)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn orphaned_proposal_can_be_rejected() {
    let pair = Pair::new(config());
    pair.set_up().await;
    let alice = unanswered(&pair);

    let err = alice.initiate_protocol(pair.propose_params()).await.unwrap_err();
    assert!(matches!(err.source, ProtocolError::Timeout(_)));

    // The proposal was persisted before the exchange and stays behind.
    let (channel, _) = pair.channels().await;
    let orphan = channel.proposals().next().unwrap().identity_hash;
    assert_eq!(channel.num_proposed_apps(), 2);

    let outcome = alice.reject_proposal(pair.multisig, orphan).await.unwrap();
    assert_eq!(outcome.identity_hash, Some(orphan));
    let (channel, _) = pair.channels().await;
    assert_eq!(channel.proposals().count(), 0);
    assert_eq!(channel.num_proposed_apps(), 2);
}

#[tokio::test]
async fn missing_handler_fails_the_step() {
    let config = config();
    let pair = Pair::new(config.clone());
    let alice = ProtocolRunner::new(
        config.clone(),
        pair.alice.key.public_key(),
        pair.alice.store.clone(),
        AppRegistry::with_identity_app(config.network.identity_app),
        HandlerTable::new(),
    );
    let err = alice.initiate_protocol(pair.setup_params()).await.unwrap_err();
    assert!(matches!(err.source, ProtocolError::NoHandler(Opcode::Sign)));
    assert_eq!(err.failed_at, Some(Opcode::Sign));
}

#[tokio::test]
async fn only_the_named_initiator_can_initiate() {
    let pair = Pair::new(config());
    let err = pair
        .bob
        .runner
        .initiate_protocol(pair.setup_params())
        .await
        .unwrap_err();
    assert!(matches!(
        err.source,
        ProtocolError::Validation(ValidationError::WrongRole("initiator"))
    ));
}

#[tokio::test]
async fn install_of_unknown_proposal_fails() {
    let pair = Pair::new(config());
    pair.set_up().await;
    let err = pair
        .alice
        .runner
        .initiate_protocol(pair.install_params(Hash([3; 32])))
        .await
        .unwrap_err();
    assert!(matches!(err.source, ProtocolError::Channel(_)));
}

#[tokio::test]
async fn concurrent_proposals_are_serialized() {
    let pair = Pair::new(config());
    pair.set_up().await;

    let runs = (0..3).map(|_| {
        let runner = pair.alice.runner.clone();
        let params = pair.propose_params();
        tokio::spawn(async move { runner.initiate_protocol(params).await })
    });
    let mut hashes = Vec::new();
    for run in runs.collect::<Vec<_>>() {
        hashes.push(run.await.unwrap().unwrap().identity_hash.unwrap());
    }
    for result in pair.alice.transport.settle().await {
        result.unwrap();
    }

    let (alice, bob) = pair.channels().await;
    assert_eq!(alice.num_proposed_apps(), 4);
    assert_eq!(alice, bob);
    hashes.sort();
    hashes.dedup();
    assert_eq!(hashes.len(), 3);
}
