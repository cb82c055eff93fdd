/*!
 * Telegram history.
 *
 * Bounded ring buffer of recent bus traffic, fed by a match-all dispatcher
 * registration that also sees outgoing telegrams. The buffer is persisted as
 * JSON on unload and restored on load so the recent-traffic view survives a
 * restart.
 */
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use buslink_core::types::Value;

use crate::dispatcher::{telegram_callback, RegistrationHandle, TelegramDispatcher};
use crate::error::{KnxError, Result};
use crate::project::GroupObjectDirectory;
use crate::telegram::Telegram;

/// One recorded telegram, enriched with project data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelegramRecord {
    /// Destination group address in its display form
    pub destination: String,
    /// Project name of the destination group object, empty when unknown
    pub destination_name: String,
    /// "Incoming" or "Outgoing"
    pub direction: String,
    /// Raw payload bytes, absent for read requests
    pub payload: Option<Vec<u8>>,
    /// Source individual address in its display form
    pub source: String,
    /// Project name of the sending device, empty when unknown
    pub source_name: String,
    /// Payload type name
    pub telegramtype: String,
    /// When the telegram was recorded
    pub timestamp: DateTime<Utc>,
    /// Unit of the decoded value, when the DPT declares one
    pub unit: Option<String>,
    /// Decoded value, absent when no DPT is known or decoding failed
    pub value: Option<Value>,
}

impl TelegramRecord {
    /// Build a record from a telegram, enriching through the directory
    pub fn from_telegram(telegram: &Telegram, directory: &GroupObjectDirectory) -> Self {
        let object = directory.object(&telegram.destination);
        let (value, unit) = match object.and_then(|info| info.transcoder.as_ref()) {
            Some(transcoder) => {
                let value = telegram.payload.raw().and_then(|raw| {
                    match transcoder.from_knx(raw) {
                        Ok(value) => Some(value),
                        Err(e) => {
                            warn!(
                                "History could not decode {} with DPT {}: {}",
                                telegram,
                                transcoder.dpt_id(),
                                e
                            );
                            None
                        }
                    }
                });
                (value, transcoder.unit().map(str::to_string))
            }
            None => (None, None),
        };

        Self {
            destination: telegram.destination.to_string(),
            destination_name: object.map(|info| info.name.clone()).unwrap_or_default(),
            direction: telegram.direction.to_string(),
            payload: telegram.payload.raw().map(|raw| raw.to_vec()),
            source: telegram.source.to_string(),
            source_name: directory
                .sender_name(telegram.source.raw())
                .unwrap_or_default()
                .to_string(),
            telegramtype: telegram.payload.telegram_type().to_string(),
            timestamp: Utc::now(),
            unit,
            value,
        }
    }
}

/// Bounded most-recent-first history of bus telegrams
pub struct TelegramHistory {
    capacity: usize,
    records: Mutex<VecDeque<TelegramRecord>>,
    directory: Arc<GroupObjectDirectory>,
}

impl std::fmt::Debug for TelegramHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self.records.lock().map(|r| r.len()).unwrap_or(0);
        f.debug_struct("TelegramHistory")
            .field("capacity", &self.capacity)
            .field("records", &len)
            .finish()
    }
}

impl TelegramHistory {
    /// Create an empty history holding at most `capacity` records
    pub fn new(capacity: usize, directory: Arc<GroupObjectDirectory>) -> Arc<Self> {
        Arc::new(Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            directory,
        })
    }

    /// Register the history on a dispatcher; it records all traffic in both
    /// directions
    pub fn attach(self: &Arc<Self>, dispatcher: &TelegramDispatcher) -> Result<RegistrationHandle> {
        let history = Arc::clone(self);
        dispatcher.register(
            telegram_callback(move |telegram| {
                let history = Arc::clone(&history);
                async move {
                    history.record(&telegram);
                    Ok(())
                }
            }),
            Vec::new(),
            true,
        )
    }

    /// Record one telegram, evicting the oldest once full
    pub fn record(&self, telegram: &Telegram) {
        let record = TelegramRecord::from_telegram(telegram, &self.directory);
        if let Ok(mut records) = self.records.lock() {
            if records.len() == self.capacity {
                records.pop_front();
            }
            records.push_back(record);
        }
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Whether the history is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the history, most recent record first
    pub fn snapshot(&self) -> Vec<TelegramRecord> {
        self.records
            .lock()
            .map(|records| records.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    /// Persist the history as JSON; called on unload.
    ///
    /// The file holds the records most recent first, the same order
    /// [`snapshot`](Self::snapshot) presents them in.
    pub fn save(&self, path: &Path) -> Result<()> {
        let records: Vec<TelegramRecord> = self
            .records
            .lock()
            .map_err(|_| KnxError::other("Failed to lock telegram history"))?
            .iter()
            .rev()
            .cloned()
            .collect();
        let json = serde_json::to_string(&records)?;
        std::fs::write(path, json)?;
        debug!("Saved {} telegram records to {}", records.len(), path.display());
        Ok(())
    }

    /// Restore the history from JSON; called on load.
    ///
    /// A missing or corrupt file leaves the history empty and is not an
    /// error, the bus simply starts with no recorded traffic.
    pub fn load(&self, path: &Path) {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(_) => return,
        };
        let mut restored: Vec<TelegramRecord> = match serde_json::from_str(&json) {
            Ok(records) => records,
            Err(e) => {
                warn!("Discarding corrupt telegram history at {}: {}", path.display(), e);
                return;
            }
        };
        // The file is most recent first; the ring stores oldest first
        restored.truncate(self.capacity);
        if let Ok(mut records) = self.records.lock() {
            *records = restored.into_iter().rev().collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    use crate::address::{GroupAddress, IndividualAddress};
    use crate::dpt::TemperatureTranscoder;
    use crate::project::GroupObjectInfo;
    use crate::telegram::TelegramPayload;

    fn directory() -> Arc<GroupObjectDirectory> {
        let mut directory = GroupObjectDirectory::new();
        directory.insert(
            GroupAddress::parse("1/2/3").unwrap(),
            GroupObjectInfo {
                name: "Living room temperature".to_string(),
                transcoder: Some(Arc::new(TemperatureTranscoder)),
            },
        );
        directory.insert_sender(
            IndividualAddress::parse("1.1.5").unwrap().raw(),
            "Sensor module",
        );
        Arc::new(directory)
    }

    fn temperature_telegram() -> Telegram {
        // 21.0 degrees
        Telegram::incoming(
            IndividualAddress::parse("1.1.5").unwrap(),
            GroupAddress::parse("1/2/3").unwrap(),
            TelegramPayload::GroupValueWrite(Bytes::from_static(&[0x0c, 0x1a])),
        )
    }

    fn plain_telegram(destination: &str) -> Telegram {
        Telegram::incoming(
            IndividualAddress::parse("2.0.1").unwrap(),
            GroupAddress::parse(destination).unwrap(),
            TelegramPayload::GroupValueWrite(Bytes::from_static(&[1])),
        )
    }

    #[test]
    fn test_record_enrichment() {
        let history = TelegramHistory::new(10, directory());
        history.record(&temperature_telegram());

        let snapshot = history.snapshot();
        assert_eq!(snapshot.len(), 1);
        let record = &snapshot[0];
        assert_eq!(record.destination, "1/2/3");
        assert_eq!(record.destination_name, "Living room temperature");
        assert_eq!(record.source_name, "Sensor module");
        assert_eq!(record.telegramtype, "GroupValueWrite");
        assert_eq!(record.unit.as_deref(), Some("°C"));
        assert_eq!(record.value, Some(Value::Float(21.0)));
    }

    #[test]
    fn test_unknown_address_stays_unenriched() {
        let history = TelegramHistory::new(10, directory());
        history.record(&plain_telegram("7/7/7"));

        let record = &history.snapshot()[0];
        assert_eq!(record.destination_name, "");
        assert_eq!(record.value, None);
        assert_eq!(record.payload, Some(vec![1]));
    }

    #[test]
    fn test_ring_eviction_and_order() {
        let history = TelegramHistory::new(3, directory());
        for destination in ["1/0/1", "1/0/2", "1/0/3", "1/0/4"] {
            history.record(&plain_telegram(destination));
        }

        let destinations: Vec<String> = history
            .snapshot()
            .into_iter()
            .map(|record| record.destination)
            .collect();
        // Most recent first, oldest evicted
        assert_eq!(destinations, vec!["1/0/4", "1/0/3", "1/0/2"]);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = std::env::temp_dir().join("buslink-history-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("history.json");

        let history = TelegramHistory::new(10, directory());
        history.record(&temperature_telegram());
        history.record(&plain_telegram("7/7/7"));
        history.save(&path).unwrap();

        let restored = TelegramHistory::new(10, directory());
        restored.load(&path);
        assert_eq!(restored.snapshot(), history.snapshot());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_saved_file_is_most_recent_first() {
        let dir = std::env::temp_dir().join("buslink-history-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("order.json");

        let history = TelegramHistory::new(10, directory());
        history.record(&plain_telegram("1/2/3"));
        history.record(&plain_telegram("1/2/4"));
        history.save(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json[0]["destination"], "1/2/4");
        assert_eq!(json[1]["destination"], "1/2/3");

        // Loading keeps the newest record at the front of the snapshot
        let restored = TelegramHistory::new(10, directory());
        restored.load(&path);
        assert_eq!(restored.snapshot()[0].destination, "1/2/4");

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_corrupt_file_leaves_history_empty() {
        let dir = std::env::temp_dir().join("buslink-history-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("corrupt.json");
        std::fs::write(&path, "not json at all").unwrap();

        let history = TelegramHistory::new(10, directory());
        history.load(&path);
        assert!(history.is_empty());

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_attach_records_both_directions() {
        let dispatcher = TelegramDispatcher::new();
        let history = TelegramHistory::new(10, directory());
        history.attach(&dispatcher).unwrap();

        dispatcher.dispatch(&temperature_telegram()).unwrap();
        let outgoing = Telegram::outgoing(
            IndividualAddress::parse("15.15.250").unwrap(),
            GroupAddress::parse("1/2/3").unwrap(),
            TelegramPayload::GroupValueRead,
        );
        dispatcher.dispatch(&outgoing).unwrap();

        // Callbacks run on spawned tasks
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(history.len(), 2);
    }
}
