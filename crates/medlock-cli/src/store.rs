//! Slot records kept in a JSON file between bench runs.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use medlock_controller::{SlotRecord, SlotStore, StoreError};
use medlock_core::SlotId;

#[derive(Debug)]
pub struct JsonSlotStore {
    path: PathBuf,
    records: Mutex<BTreeMap<SlotId, SlotRecord>>,
}

impl JsonSlotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<SlotId, SlotRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SlotStore for JsonSlotStore {
    async fn load_slots(&self) -> Result<Vec<SlotRecord>, StoreError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No slot records yet");
                return Ok(Vec::new());
            }
            Err(e) => return Err(StoreError(format!("{}: {e}", self.path.display()))),
        };
        let records: Vec<SlotRecord> = serde_json::from_str(&contents)
            .map_err(|e| StoreError(format!("{}: {e}", self.path.display())))?;

        let mut cache = self.lock();
        cache.clear();
        cache.extend(records.iter().map(|r| (r.slot_id, r.clone())));
        Ok(records)
    }

    async fn save_slot(&self, record: &SlotRecord) -> Result<(), StoreError> {
        let json = {
            let mut cache = self.lock();
            cache.insert(record.slot_id, record.clone());
            let records: Vec<&SlotRecord> = cache.values().collect();
            serde_json::to_string_pretty(&records).map_err(|e| StoreError(e.to_string()))?
        };
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| StoreError(format!("{}: {e}", self.path.display())))
    }
}
