//! Seams to the outside world: slot persistence, credential lookup and the event
//! sink. The engine is generic over all three; in-memory implementations are
//! provided for tests and the CLI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

use medlock_core::SlotId;

use crate::events::ControllerEvent;

/// Persisted shape of one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRecord {
    pub slot_id: SlotId,

    /// Identifier of what the slot holds (e.g. a patient or order number).
    pub content_id: Option<String>,

    pub occupied: bool,

    /// An unlock or dispense was under way when the record was written.
    pub opening: bool,

    pub is_active: bool,

    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Error)]
#[error("Slot store error: {0}")]
pub struct StoreError(pub String);

/// Durable storage of slot records.
pub trait SlotStore: Send + Sync + 'static {
    fn load_slots(&self) -> impl Future<Output = Result<Vec<SlotRecord>, StoreError>> + Send;

    fn save_slot(&self, record: &SlotRecord) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Store kept in process memory. Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemorySlotStore {
    records: Arc<Mutex<BTreeMap<SlotId, SlotRecord>>>,
}

impl MemorySlotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = SlotRecord>) -> Self {
        let store = Self::new();
        store
            .lock()
            .extend(records.into_iter().map(|r| (r.slot_id, r)));
        store
    }

    pub fn get(&self, slot: SlotId) -> Option<SlotRecord> {
        self.lock().get(&slot).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<SlotId, SlotRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SlotStore for MemorySlotStore {
    async fn load_slots(&self) -> Result<Vec<SlotRecord>, StoreError> {
        Ok(self.lock().values().cloned().collect())
    }

    async fn save_slot(&self, record: &SlotRecord) -> Result<(), StoreError> {
        self.lock().insert(record.slot_id, record.clone());
        Ok(())
    }
}

/// Who a credential belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
}

/// Resolves an opaque credential (passkey, badge number) to an identity.
pub trait CredentialLookup: Send + Sync + 'static {
    fn lookup(&self, credential: &str) -> impl Future<Output = Option<Identity>> + Send;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCredentials {
    entries: HashMap<String, Identity>,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(
        mut self,
        credential: impl Into<String>,
        user_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        self.entries.insert(
            credential.into(),
            Identity {
                user_id: user_id.into(),
                display_name: display_name.into(),
            },
        );
        self
    }
}

impl CredentialLookup for MemoryCredentials {
    async fn lookup(&self, credential: &str) -> Option<Identity> {
        self.entries.get(credential).cloned()
    }
}

/// Receives controller events. Must not block.
pub trait EventSink: Send + Sync + 'static {
    fn emit(&self, event: ControllerEvent);
}

/// Forwards events into a bounded channel; events are dropped when it is full.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    tx: mpsc::Sender<ControllerEvent>,
}

impl ChannelEventSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ControllerEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: ControllerEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(?event, "Event channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: ControllerEvent) {}
}

/// Everything the engine needs from the host application.
#[derive(Debug, Clone)]
pub struct Collaborators<S, C, E> {
    pub store: S,
    pub credentials: C,
    pub events: E,
}

impl<S, C, E> Collaborators<S, C, E>
where
    S: SlotStore,
    C: CredentialLookup,
    E: EventSink,
{
    pub fn new(store: S, credentials: C, events: E) -> Self {
        Self {
            store,
            credentials,
            events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: u8) -> SlotRecord {
        SlotRecord {
            slot_id: SlotId::new(n).unwrap(),
            content_id: Some(format!("HN-{n}")),
            occupied: true,
            opening: false,
            is_active: true,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_shared_between_clones() {
        let store = MemorySlotStore::new();
        let clone = store.clone();
        store.save_slot(&record(3)).await.unwrap();
        let loaded = clone.load_slots().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].content_id.as_deref(), Some("HN-3"));
    }

    #[tokio::test]
    async fn test_credentials_lookup() {
        let credentials = MemoryCredentials::new().with("1234", "u-1", "Nurse Joy");
        assert_eq!(
            credentials.lookup("1234").await.map(|i| i.user_id),
            Some("u-1".to_string())
        );
        assert!(credentials.lookup("9999").await.is_none());
    }

    #[tokio::test]
    async fn test_channel_sink_drops_when_full() {
        let (sink, mut rx) = ChannelEventSink::new(1);
        sink.emit(ControllerEvent::Connection { connected: true });
        sink.emit(ControllerEvent::Connection { connected: false });
        assert!(matches!(
            rx.recv().await,
            Some(ControllerEvent::Connection { connected: true })
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_record_serializes() {
        let json = serde_json::to_value(record(7)).unwrap();
        assert_eq!(json["slot_id"], 7);
        assert_eq!(json["occupied"], true);
    }
}
