//! Keyed store collaborator holding commands, positions and speeds.
//!
//! Values are stored as MessagePack bytes, every write is published to the
//! subscribers of its namespace.
use std::fmt::Display;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

mod logger;
mod memory;

pub use logger::log_changes;
pub use memory::MemoryStore;

/// The maps of the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Namespace {
    /// Job commands keyed by job name
    Command,
    /// Latest position sample keyed by entity
    Position,
    /// Latest speed observation keyed by entity
    Speed,
}

impl Namespace {
    pub fn name(&self) -> &'static str {
        match self {
            Namespace::Command => "command",
            Namespace::Position => "position",
            Namespace::Speed => "speed",
        }
    }
}

impl Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Updated,
}

/// A single write to the store as seen by subscribers
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub namespace: Namespace,
    pub key: String,
    pub value: Vec<u8>,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    /// Decode the written value
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        decode(&self.value)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Error encoding value: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("Error decoding value: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(rmp_serde::to_vec(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// Stream of changes to one namespace.
///
/// Delivery is in write order, a subscription only sees writes made after
/// it was created.
pub struct Subscription {
    namespace: Namespace,
    events: flume::Receiver<ChangeEvent>,
}

impl Subscription {
    pub(crate) fn new(namespace: Namespace, events: flume::Receiver<ChangeEvent>) -> Self {
        Self { namespace, events }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// Wait for the next change, `None` once the store is gone
    pub async fn next(&self) -> Option<ChangeEvent> {
        self.events.recv_async().await.ok()
    }

    /// Next change if one is already buffered
    pub fn try_next(&self) -> Option<ChangeEvent> {
        self.events.try_recv().ok()
    }
}

/// A keyed map of byte values with change subscriptions per namespace
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Write a value, replacing any previous value of the key
    async fn put(&self, namespace: Namespace, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    async fn get(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Receive every future write to `namespace`
    async fn subscribe(&self, namespace: Namespace) -> Result<Subscription, StoreError>;
}

/// Typed access to a [Store]
#[async_trait]
pub trait StoreExt: Store {
    async fn put_value<T: Serialize + Sync + ?Sized>(
        &self,
        namespace: Namespace,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        self.put(namespace, key, encode(value)?).await
    }

    async fn get_value<T: DeserializeOwned + Send>(
        &self,
        namespace: Namespace,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        match self.get(namespace, key).await? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl<S: Store + ?Sized> StoreExt for S {}
