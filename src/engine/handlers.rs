//! The host side of a run: who signs, who delivers, who persists.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Opcode, PersistKind, ProtocolError};
use crate::{
    abiencode::types::{Hash, Signature},
    channel::StateChannel,
    commitment::CommitmentRecord,
    messages::{Protocol, ProtocolMessage},
    sig::{self, ExtendedPrivateKey, KeyError},
    store::StoreError,
};

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("{0}")]
    Transport(String),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Sig(#[from] sig::Error),
}

/// Produces signatures with the local identity. Never hands out key
/// material, only signatures by the key at `key_index`.
#[async_trait]
pub trait SignHandler: Send + Sync {
    async fn sign(&self, digest: Hash, key_index: u32) -> Result<Signature, HandlerError>;
}

/// Signs with children of an in-memory [ExtendedPrivateKey].
#[derive(Debug, Clone)]
pub struct KeySigner {
    key: ExtendedPrivateKey,
}

impl KeySigner {
    pub fn new(key: ExtendedPrivateKey) -> Self {
        Self { key }
    }
}

#[async_trait]
impl SignHandler for KeySigner {
    async fn sign(&self, digest: Hash, key_index: u32) -> Result<Signature, HandlerError> {
        Ok(self.key.derive_signer(key_index)?.sign_eth(digest)?)
    }
}

/// Delivers messages to the counterparty. Replies come back through
/// [ProtocolRunner::run_protocol_with_message][super::ProtocolRunner::run_protocol_with_message].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, msg: ProtocolMessage) -> Result<(), HandlerError>;
}

#[async_trait]
pub trait PersistHandler: Send + Sync {
    async fn persist_channel(&self, channel: &StateChannel) -> Result<(), HandlerError>;

    async fn persist_app(
        &self,
        kind: PersistKind,
        channel: &StateChannel,
        identity_hash: Hash,
    ) -> Result<(), HandlerError>;

    async fn write_commitment(
        &self,
        protocol: Protocol,
        identity_hash: Hash,
        record: &CommitmentRecord,
    ) -> Result<(), HandlerError>;
}

/// Handlers per step kind, registered once when the runner is built.
#[derive(Clone, Default)]
pub struct HandlerTable {
    signer: Option<Arc<dyn SignHandler>>,
    transport: Option<Arc<dyn Transport>>,
    persistence: Option<Arc<dyn PersistHandler>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_signer(mut self, signer: Arc<dyn SignHandler>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_persistence(mut self, persistence: Arc<dyn PersistHandler>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub(super) fn signer(&self) -> Result<&dyn SignHandler, ProtocolError> {
        self.signer
            .as_deref()
            .ok_or(ProtocolError::NoHandler(Opcode::Sign))
    }

    pub(super) fn transport(&self, opcode: Opcode) -> Result<&dyn Transport, ProtocolError> {
        self.transport
            .as_deref()
            .ok_or(ProtocolError::NoHandler(opcode))
    }

    pub(super) fn persistence(&self, opcode: Opcode) -> Result<&dyn PersistHandler, ProtocolError> {
        self.persistence
            .as_deref()
            .ok_or(ProtocolError::NoHandler(opcode))
    }
}
