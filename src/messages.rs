//! Messages exchanged between the two participants of a protocol run.

use core::{fmt, str::FromStr};

use crate::{
    abiencode::types::{Address, Hash, Signature, U256},
    channel::ProposalTerms,
    sig::IdentityKey,
};

/// `seq` of the last message of a run, which expects no reply.
pub const UNASSIGNED_SEQ_NO: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Setup,
    Propose,
    Install,
    Uninstall,
    TakeAction,
    Update,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Setup => "setup",
            Protocol::Propose => "propose",
            Protocol::Install => "install",
            Protocol::Uninstall => "uninstall",
            Protocol::TakeAction => "takeAction",
            Protocol::Update => "update",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "setup" => Ok(Protocol::Setup),
            "propose" => Ok(Protocol::Propose),
            "install" => Ok(Protocol::Install),
            "uninstall" => Ok(Protocol::Uninstall),
            "takeAction" => Ok(Protocol::TakeAction),
            "update" => Ok(Protocol::Update),
            other => Err(other.to_string()),
        }
    }
}

/// Identifies one protocol run on both sides.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ProcessId(pub [u8; 16]);

impl ProcessId {
    pub fn random() -> Self {
        ProcessId(rand::random())
    }
}

impl fmt::Debug for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Signatures carried by a message. Install replies carry two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CustomData {
    pub signature: Option<Signature>,
    pub signature2: Option<Signature>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolMessage {
    pub protocol: Protocol,
    pub process_id: ProcessId,
    pub seq: i32,
    pub to_identity_key: IdentityKey,
    /// Only set on the first message of a run.
    pub params: Option<ProtocolParams>,
    pub custom_data: CustomData,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupParams {
    pub multisig_address: Address,
    pub initiator_identifier: IdentityKey,
    pub responder_identifier: IdentityKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposeParams {
    pub multisig_address: Address,
    pub initiator_identifier: IdentityKey,
    pub responder_identifier: IdentityKey,
    pub terms: ProposalTerms,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallParams {
    pub multisig_address: Address,
    pub initiator_identifier: IdentityKey,
    pub responder_identifier: IdentityKey,
    /// The proposal to install.
    pub identity_hash: Hash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallParams {
    pub multisig_address: Address,
    pub initiator_identifier: IdentityKey,
    pub responder_identifier: IdentityKey,
    pub identity_hash: Hash,
    /// Applied to the latest state before the outcome is computed.
    pub action: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TakeActionParams {
    pub multisig_address: Address,
    pub initiator_identifier: IdentityKey,
    pub responder_identifier: IdentityKey,
    pub identity_hash: Hash,
    pub action: Vec<u8>,
    /// Defaults to the app's `default_timeout`.
    pub state_timeout: Option<U256>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateParams {
    pub multisig_address: Address,
    pub initiator_identifier: IdentityKey,
    pub responder_identifier: IdentityKey,
    pub identity_hash: Hash,
    pub new_state: Vec<u8>,
    pub state_timeout: Option<U256>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolParams {
    Setup(SetupParams),
    Propose(ProposeParams),
    Install(InstallParams),
    Uninstall(UninstallParams),
    TakeAction(TakeActionParams),
    Update(UpdateParams),
}

macro_rules! common_field {
    ($self:ident, $field:ident) => {
        match $self {
            ProtocolParams::Setup(p) => &p.$field,
            ProtocolParams::Propose(p) => &p.$field,
            ProtocolParams::Install(p) => &p.$field,
            ProtocolParams::Uninstall(p) => &p.$field,
            ProtocolParams::TakeAction(p) => &p.$field,
            ProtocolParams::Update(p) => &p.$field,
        }
    };
}

impl ProtocolParams {
    pub fn protocol(&self) -> Protocol {
        match self {
            ProtocolParams::Setup(_) => Protocol::Setup,
            ProtocolParams::Propose(_) => Protocol::Propose,
            ProtocolParams::Install(_) => Protocol::Install,
            ProtocolParams::Uninstall(_) => Protocol::Uninstall,
            ProtocolParams::TakeAction(_) => Protocol::TakeAction,
            ProtocolParams::Update(_) => Protocol::Update,
        }
    }

    pub fn multisig_address(&self) -> Address {
        *common_field!(self, multisig_address)
    }

    pub fn initiator_identifier(&self) -> &IdentityKey {
        common_field!(self, initiator_identifier)
    }

    pub fn responder_identifier(&self) -> &IdentityKey {
        common_field!(self, responder_identifier)
    }

    /// Names of the locks a run holds for its whole duration.
    pub fn lock_names(&self) -> Vec<String> {
        vec![self.multisig_address().to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_names_parse_back() {
        for protocol in [
            Protocol::Setup,
            Protocol::Propose,
            Protocol::Install,
            Protocol::Uninstall,
            Protocol::TakeAction,
            Protocol::Update,
        ] {
            assert_eq!(protocol.as_str().parse::<Protocol>(), Ok(protocol));
        }
        assert!("withdraw".parse::<Protocol>().is_err());
    }

    #[test]
    fn lock_is_the_multisig() {
        let key = crate::sig::ExtendedPrivateKey::from_seed(b"lock test")
            .unwrap()
            .public_key();
        let params = ProtocolParams::Install(InstallParams {
            multisig_address: Address([0xab; 20]),
            initiator_identifier: key,
            responder_identifier: key,
            identity_hash: Hash::default(),
        });
        assert_eq!(params.protocol(), Protocol::Install);
        assert_eq!(
            params.lock_names(),
            vec!["0xabababababababababababababababababababab".to_string()]
        );
    }
}
