use serde::Serialize;

use super::{add_verified, call_data, sorted_pair, CommitmentError, MinimalTransaction, SigBytes};
use crate::{
    abiencode::{
        self, keccak256,
        types::{Address, Hash, Signature, U256},
        PackedHasher,
    },
    channel::{AppInstance, ChannelError},
    config::NetworkContext,
    identity::CallData,
};

const EXEC_TRANSACTION_SIGNATURE: &str = "execTransaction(address,uint256,bytes,uint8,bytes[])";
const EXECUTE_EFFECT_SIGNATURE: &str =
    "executeEffectOfInterpretedAppOutcome(address,bytes32,bytes32,address,bytes)";

/// Multisig operation: `delegatecall` into the target.
const DELEGATE_CALL: u8 = 1;

/// A multisig transaction that pays out an app's outcome once it is
/// finalized on-chain. Signed by both owners at install time, before any
/// free balance is debited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalTransactionCommitment {
    pub multisig_address: Address,
    pub multisig_owners: [Address; 2],
    pub delegate_target: Address,
    pub challenge_registry: Address,
    pub free_balance_identity_hash: Hash,
    pub app_identity_hash: Hash,
    pub interpreter_address: Address,
    pub interpreter_params: Vec<u8>,
    signatures: Vec<(Address, Signature)>,
}

#[derive(Serialize)]
struct ExecuteEffectArgs {
    challenge_registry: Address,
    free_balance_identity_hash: Hash,
    app_identity_hash: Hash,
    interpreter_address: Address,
    interpreter_params: CallData,
}

#[derive(Serialize)]
struct ExecTransactionArgs {
    to: Address,
    value: U256,
    data: CallData,
    operation: u8,
    signatures: Vec<SigBytes>,
}

impl ConditionalTransactionCommitment {
    pub fn new(
        network: &NetworkContext,
        multisig_address: Address,
        multisig_owners: [Address; 2],
        free_balance_identity_hash: Hash,
        app: &AppInstance,
    ) -> Result<Self, ChannelError> {
        let params = app.interpreter_params()?;
        Ok(Self {
            multisig_address,
            multisig_owners,
            delegate_target: network.conditional_transaction_delegate_target,
            challenge_registry: network.challenge_registry,
            free_balance_identity_hash,
            app_identity_hash: app.identity_hash,
            interpreter_address: network.interpreter_for(params.outcome_type()),
            interpreter_params: params.encode()?,
            signatures: Vec::new(),
        })
    }

    /// Call data of the delegate call.
    fn effect_data(&self) -> Result<Vec<u8>, abiencode::Error> {
        call_data(
            EXECUTE_EFFECT_SIGNATURE,
            &ExecuteEffectArgs {
                challenge_registry: self.challenge_registry,
                free_balance_identity_hash: self.free_balance_identity_hash,
                app_identity_hash: self.app_identity_hash,
                interpreter_address: self.interpreter_address,
                interpreter_params: CallData(self.interpreter_params.clone()),
            },
        )
    }

    /// `keccak256(abi.encodePacked(bytes1(0x19), owners, to, value, keccak256(data), uint8(operation)))`
    pub fn hash_to_sign(&self) -> Result<Hash, abiencode::Error> {
        Ok(PackedHasher::new()
            .byte(0x19)
            .address_array(&self.multisig_owners)
            .address(&self.delegate_target)
            .uint(U256::zero())
            .bytes32(&keccak256(&self.effect_data()?))
            .byte(DELEGATE_CALL)
            .finish())
    }

    pub fn add_signatures(
        &mut self,
        signatures: impl IntoIterator<Item = Signature>,
    ) -> Result<(), CommitmentError> {
        let digest = self.hash_to_sign()?;
        add_verified(&mut self.signatures, digest, &self.multisig_owners, signatures)
    }

    pub fn signatures(&self) -> Vec<Signature> {
        self.signatures.iter().map(|(_, s)| *s).collect()
    }

    pub fn get_signed_transaction(&self) -> Result<MinimalTransaction, CommitmentError> {
        let args = ExecTransactionArgs {
            to: self.delegate_target,
            value: U256::zero(),
            data: CallData(self.effect_data()?),
            operation: DELEGATE_CALL,
            signatures: sorted_pair(&self.signatures)?,
        };
        Ok(MinimalTransaction {
            to: self.multisig_address,
            value: U256::zero(),
            data: call_data(EXEC_TRANSACTION_SIGNATURE, &args)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        abiencode::selector,
        channel::{AbiEncodings, InterpreterParams, OutcomeType, ETH_TOKEN_ADDRESS},
        sig::{ExtendedPrivateKey, Signer},
    };

    fn owner_keys() -> [ExtendedPrivateKey; 2] {
        [
            ExtendedPrivateKey::from_seed(b"first owner").unwrap(),
            ExtendedPrivateKey::from_seed(b"second owner").unwrap(),
        ]
    }

    fn app(owners: [Address; 2]) -> AppInstance {
        let [a, b] = owner_keys().map(|k| k.public_key());
        AppInstance {
            identity_hash: Hash([0xaa; 32]),
            multisig_address: Address([0x55; 20]),
            initiator_identifier: a,
            responder_identifier: b,
            participants: owners,
            app_definition: Address([0xad; 20]),
            abi_encodings: AbiEncodings::default(),
            default_timeout: 10.into(),
            state_timeout: 10.into(),
            app_seq_no: 1,
            latest_state: vec![0; 32],
            latest_version_number: 0,
            outcome_type: OutcomeType::TwoPartyFixedOutcome,
            interpreter_params: Some(InterpreterParams::TwoPartyFixed {
                player_addrs: owners,
                amount: 2.into(),
                token: ETH_TOKEN_ADDRESS,
            }),
            initiator_deposit: 1.into(),
            initiator_deposit_token: ETH_TOKEN_ADDRESS,
            responder_deposit: 1.into(),
            responder_deposit_token: ETH_TOKEN_ADDRESS,
        }
    }

    fn owners_and_signers() -> ([Address; 2], Vec<Signer>) {
        let signers: Vec<Signer> = owner_keys()
            .iter()
            .map(|k| k.derive_signer(0).unwrap())
            .collect();
        let mut owners = [signers[0].address(), signers[1].address()];
        owners.sort();
        (owners, signers)
    }

    #[test]
    fn uses_the_interpreter_of_the_outcome_type() {
        let network = NetworkContext {
            two_party_fixed_outcome_interpreter: Address([0x21; 20]),
            ..NetworkContext::default()
        };
        let (owners, _) = owners_and_signers();
        let c = ConditionalTransactionCommitment::new(
            &network,
            Address([0x55; 20]),
            owners,
            Hash([0xfb; 32]),
            &app(owners),
        )
        .unwrap();
        assert_eq!(c.interpreter_address, Address([0x21; 20]));
        assert_eq!(c.interpreter_params.len(), 4 * 32);
    }

    #[test]
    fn owners_sign_the_delegate_call() {
        let (owners, signers) = owners_and_signers();
        let mut c = ConditionalTransactionCommitment::new(
            &NetworkContext::default(),
            Address([0x55; 20]),
            owners,
            Hash([0xfb; 32]),
            &app(owners),
        )
        .unwrap();
        let digest = c.hash_to_sign().unwrap();
        for signer in &signers {
            c.add_signatures([signer.sign_eth(digest).unwrap()]).unwrap();
        }
        let tx = c.get_signed_transaction().unwrap();
        assert_eq!(tx.to, Address([0x55; 20]));
        assert_eq!(tx.data[..4], selector(EXEC_TRANSACTION_SIGNATURE));

        // A different app needs a different signature.
        let mut other = c.clone();
        other.app_identity_hash = Hash([0xbb; 32]);
        assert_ne!(other.hash_to_sign().unwrap(), digest);
    }
}
