use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::api::ApiError;
use crate::config::LogSettings;
use crate::ring_buffer::RingBuffer;

pub const MAX_LOGS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Access,
    Audit,
    Error,
    Common,
    Connection,
    Query,
    Table,
    Stdin,
    Monitoring,
}

impl LogCategory {
    pub const ALL: [Self; 9] = [
        Self::Access,
        Self::Audit,
        Self::Error,
        Self::Common,
        Self::Connection,
        Self::Query,
        Self::Table,
        Self::Stdin,
        Self::Monitoring,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Audit => "audit",
            Self::Error => "error",
            Self::Common => "common",
            Self::Connection => "connection",
            Self::Query => "query",
            Self::Table => "table",
            Self::Stdin => "stdin",
            Self::Monitoring => "monitoring",
        }
    }

    fn default_level(self) -> LogLevel {
        match self {
            Self::Error => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogCategory {
    type Err = LogStoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| LogStoreError::UnknownCategory(value.to_string()))
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = LogStoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(LogStoreError::UnknownLevel(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStoreMode {
    #[default]
    Forwarding,
    InMemory,
}

pub type LogDetails = BTreeMap<String, Value>;

/// Builds a details map from `(key, value)` pairs.
#[must_use]
pub fn details<const N: usize>(pairs: [(&str, Value); N]) -> LogDetails {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub category: LogCategory,
    pub level: LogLevel,
    pub message: String,
    #[serde(default)]
    pub details: LogDetails,
}

/// Receives a copy of every recorded entry. Implementations must not block
/// or panic; delivery failures stay inside the forwarder.
pub trait LogForwarder: Send + Sync {
    fn forward(&self, entry: &LogEntry);

    fn clear_remote(&self, _category: Option<LogCategory>) {}
}

#[async_trait]
pub trait LogApi: Send + Sync {
    async fn post_log(&self, entry: &LogEntry) -> Result<(), ApiError>;
    async fn cleanup_logs(&self, max_files: u32) -> Result<(), ApiError>;
    async fn clear_logs(&self, category: Option<LogCategory>) -> Result<(), ApiError>;
}

#[derive(Debug, Error)]
pub enum LogStoreError {
    #[error("unknown log category `{0}`")]
    UnknownCategory(String),
    #[error("unknown log level `{0}`")]
    UnknownLevel(String),
    #[error("failed to serialize log export: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to parse log export: {source}")]
    Parse {
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogExport {
    pub timestamp: DateTime<Utc>,
    pub logs: BTreeMap<String, Vec<LogEntry>>,
}

pub struct LogStore {
    capacity: usize,
    buffers: Mutex<BTreeMap<LogCategory, RingBuffer<LogEntry>>>,
    min_level: RwLock<LogLevel>,
    forwarder: Option<Arc<dyn LogForwarder>>,
}

impl fmt::Debug for LogStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogStore")
            .field("capacity", &self.capacity)
            .field("min_level", &*self.min_level.read())
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}

impl LogStore {
    #[must_use]
    pub fn in_memory(capacity: usize) -> Self {
        Self::build(capacity, None)
    }

    #[must_use]
    pub fn forwarding(capacity: usize, forwarder: Arc<dyn LogForwarder>) -> Self {
        Self::build(capacity, Some(forwarder))
    }

    #[must_use]
    pub fn from_settings(settings: &LogSettings, forwarder: Option<Arc<dyn LogForwarder>>) -> Self {
        let forwarder = match settings.mode {
            LogStoreMode::InMemory => None,
            LogStoreMode::Forwarding => {
                if forwarder.is_none() {
                    tracing::warn!("log forwarding requested without a forwarder; keeping logs in memory");
                }
                forwarder
            }
        };
        let store = Self::build(settings.max_entries_per_category, forwarder);
        store.set_min_level(settings.min_level);
        store
    }

    fn build(capacity: usize, forwarder: Option<Arc<dyn LogForwarder>>) -> Self {
        Self {
            capacity: capacity.max(1),
            buffers: Mutex::new(BTreeMap::new()),
            min_level: RwLock::new(LogLevel::Debug),
            forwarder,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn mode(&self) -> LogStoreMode {
        if self.forwarder.is_some() {
            LogStoreMode::Forwarding
        } else {
            LogStoreMode::InMemory
        }
    }

    #[must_use]
    pub fn min_level(&self) -> LogLevel {
        *self.min_level.read()
    }

    pub fn set_min_level(&self, level: LogLevel) {
        *self.min_level.write() = level;
    }

    pub fn record(&self, category: LogCategory, message: impl Into<String>, details: LogDetails) {
        self.record_at(category, category.default_level(), message, details);
    }

    pub fn record_at(
        &self,
        category: LogCategory,
        level: LogLevel,
        message: impl Into<String>,
        details: LogDetails,
    ) {
        if level < self.min_level() {
            return;
        }

        let entry = LogEntry {
            timestamp: Utc::now(),
            category,
            level,
            message: message.into(),
            details,
        };
        mirror_to_tracing(&entry);

        {
            let mut buffers = self.buffers.lock();
            buffers
                .entry(category)
                .or_insert_with(|| RingBuffer::new(self.capacity))
                .push(entry.clone());
        }

        if let Some(forwarder) = &self.forwarder {
            forwarder.forward(&entry);
        }
    }

    /// Records under a category given by name. Unknown names land in
    /// `common` with the requested name kept in the details.
    pub fn record_named(&self, category: &str, message: impl Into<String>, mut details: LogDetails) {
        match category.parse::<LogCategory>() {
            Ok(category) => self.record(category, message, details),
            Err(_) => {
                details.insert(
                    "requestedCategory".to_string(),
                    Value::String(category.to_string()),
                );
                self.record(LogCategory::Common, message, details);
            }
        }
    }

    #[must_use]
    pub fn entries(&self, category: LogCategory) -> Vec<LogEntry> {
        self.buffers
            .lock()
            .get(&category)
            .map(RingBuffer::to_vec)
            .unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self, category: LogCategory) -> usize {
        self.buffers.lock().get(&category).map_or(0, RingBuffer::len)
    }

    /// Snapshot of one category, or of every category when `None`.
    #[must_use]
    pub fn query(&self, category: Option<LogCategory>) -> BTreeMap<LogCategory, Vec<LogEntry>> {
        let buffers = self.buffers.lock();
        let snapshot = |category: LogCategory| {
            buffers
                .get(&category)
                .map(RingBuffer::to_vec)
                .unwrap_or_default()
        };

        match category {
            Some(category) => BTreeMap::from([(category, snapshot(category))]),
            None => LogCategory::ALL
                .into_iter()
                .map(|category| (category, snapshot(category)))
                .collect(),
        }
    }

    pub fn clear(&self, category: Option<LogCategory>) {
        {
            let mut buffers = self.buffers.lock();
            match category {
                Some(category) => {
                    buffers.remove(&category);
                }
                None => buffers.clear(),
            }
        }

        if let Some(forwarder) = &self.forwarder {
            forwarder.clear_remote(category);
        }
    }

    pub fn export(&self, category: Option<LogCategory>) -> Result<Vec<u8>, LogStoreError> {
        self.export_at(category, Utc::now())
    }

    pub fn export_at(
        &self,
        category: Option<LogCategory>,
        generated_at: DateTime<Utc>,
    ) -> Result<Vec<u8>, LogStoreError> {
        let logs = self
            .query(category)
            .into_iter()
            .map(|(category, entries)| (category.as_str().to_string(), entries))
            .collect();
        let document = LogExport {
            timestamp: generated_at,
            logs,
        };
        serde_json::to_vec_pretty(&document).map_err(|source| LogStoreError::Serialize { source })
    }

    pub fn parse_export(bytes: &[u8]) -> Result<LogExport, LogStoreError> {
        serde_json::from_slice(bytes).map_err(|source| LogStoreError::Parse { source })
    }

    #[must_use]
    pub fn export_file_name(generated_at: DateTime<Utc>) -> String {
        format!(
            "dbconsole_logs_{}.json",
            generated_at.format("%Y-%m-%dT%H-%M-%S%.3fZ")
        )
    }
}

fn mirror_to_tracing(entry: &LogEntry) {
    let category = entry.category.as_str();
    let message = entry.message.as_str();
    match entry.level {
        LogLevel::Debug => tracing::debug!(category, details = ?entry.details, "{message}"),
        LogLevel::Info => tracing::info!(category, details = ?entry.details, "{message}"),
        LogLevel::Warn => tracing::warn!(category, details = ?entry.details, "{message}"),
        LogLevel::Error => tracing::error!(category, details = ?entry.details, "{message}"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use parking_lot::Mutex;
    use serde_json::json;

    use super::{
        details, LogCategory, LogDetails, LogEntry, LogForwarder, LogLevel, LogStore,
        LogStoreMode, MAX_LOGS,
    };
    use crate::config::LogSettings;

    #[derive(Default)]
    struct RecordingForwarder {
        forwarded: Mutex<Vec<LogEntry>>,
        cleared: Mutex<Vec<Option<LogCategory>>>,
    }

    impl LogForwarder for RecordingForwarder {
        fn forward(&self, entry: &LogEntry) {
            self.forwarded.lock().push(entry.clone());
        }

        fn clear_remote(&self, category: Option<LogCategory>) {
            self.cleared.lock().push(category);
        }
    }

    fn messages(store: &LogStore, category: LogCategory) -> Vec<String> {
        store
            .entries(category)
            .into_iter()
            .map(|entry| entry.message)
            .collect()
    }

    #[test]
    fn evicts_oldest_entry_once_category_is_full() {
        let store = LogStore::in_memory(MAX_LOGS);
        for index in 0..MAX_LOGS + 5 {
            store.record(LogCategory::Query, format!("entry {index}"), LogDetails::new());
        }

        let entries = messages(&store, LogCategory::Query);
        assert_eq!(entries.len(), MAX_LOGS);
        assert_eq!(entries.first().map(String::as_str), Some("entry 5"));
        assert_eq!(
            entries.last().map(String::as_str),
            Some(format!("entry {}", MAX_LOGS + 4).as_str())
        );
    }

    #[test]
    fn categories_are_bounded_independently() {
        let store = LogStore::in_memory(2);
        store.record(LogCategory::Access, "a1", LogDetails::new());
        store.record(LogCategory::Access, "a2", LogDetails::new());
        store.record(LogCategory::Access, "a3", LogDetails::new());
        store.record(LogCategory::Audit, "b1", LogDetails::new());

        assert_eq!(messages(&store, LogCategory::Access), vec!["a2", "a3"]);
        assert_eq!(messages(&store, LogCategory::Audit), vec!["b1"]);
    }

    #[test]
    fn unknown_category_routes_to_common() {
        let store = LogStore::in_memory(10);
        store.record_named("telemetry", "hello", details([("source", json!("test"))]));

        let entries = store.entries(LogCategory::Common);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].details["requestedCategory"], json!("telemetry"));
        assert_eq!(entries[0].details["source"], json!("test"));
    }

    #[test]
    fn known_category_names_are_case_insensitive() {
        let store = LogStore::in_memory(10);
        store.record_named("Connection", "opened", LogDetails::new());

        assert_eq!(store.len(LogCategory::Connection), 1);
        assert_eq!(store.len(LogCategory::Common), 0);
    }

    #[test]
    fn query_returns_detached_snapshot() {
        let store = LogStore::in_memory(10);
        store.record(LogCategory::Table, "first", LogDetails::new());

        let snapshot = store.query(Some(LogCategory::Table));
        store.record(LogCategory::Table, "second", LogDetails::new());

        assert_eq!(snapshot[&LogCategory::Table].len(), 1);
        assert_eq!(store.len(LogCategory::Table), 2);
    }

    #[test]
    fn query_all_lists_every_category() {
        let store = LogStore::in_memory(10);
        store.record(LogCategory::Stdin, "typed", LogDetails::new());

        let all = store.query(None);
        assert_eq!(all.len(), LogCategory::ALL.len());
        assert!(all[&LogCategory::Access].is_empty());
        assert_eq!(all[&LogCategory::Stdin].len(), 1);
    }

    #[test]
    fn error_category_records_at_error_level() {
        let store = LogStore::in_memory(10);
        store.record(LogCategory::Error, "boom", LogDetails::new());
        store.record(LogCategory::Common, "fine", LogDetails::new());

        assert_eq!(store.entries(LogCategory::Error)[0].level, LogLevel::Error);
        assert_eq!(store.entries(LogCategory::Common)[0].level, LogLevel::Info);
    }

    #[test]
    fn entries_below_min_level_are_dropped() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let store = LogStore::forwarding(10, forwarder.clone());
        store.set_min_level(LogLevel::Info);

        store.record_at(LogCategory::Common, LogLevel::Debug, "noise", LogDetails::new());
        store.record_at(LogCategory::Common, LogLevel::Warn, "signal", LogDetails::new());

        assert_eq!(messages(&store, LogCategory::Common), vec!["signal"]);
        assert_eq!(forwarder.forwarded.lock().len(), 1);
    }

    #[test]
    fn clear_single_category_keeps_others() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let store = LogStore::forwarding(10, forwarder.clone());
        store.record(LogCategory::Query, "q", LogDetails::new());
        store.record(LogCategory::Audit, "a", LogDetails::new());

        store.clear(Some(LogCategory::Query));
        assert_eq!(store.len(LogCategory::Query), 0);
        assert_eq!(store.len(LogCategory::Audit), 1);

        store.clear(None);
        assert_eq!(store.len(LogCategory::Audit), 0);
        assert_eq!(
            *forwarder.cleared.lock(),
            vec![Some(LogCategory::Query), None]
        );
    }

    #[test]
    fn forwarding_store_also_keeps_local_copy() {
        let forwarder = Arc::new(RecordingForwarder::default());
        let store = LogStore::forwarding(10, forwarder.clone());
        store.record(LogCategory::Connection, "connected", LogDetails::new());

        assert_eq!(store.mode(), LogStoreMode::Forwarding);
        assert_eq!(forwarder.forwarded.lock()[0].message, "connected");
        assert_eq!(store.len(LogCategory::Connection), 1);
    }

    #[test]
    fn forwarding_without_forwarder_falls_back_to_memory() {
        let settings = LogSettings::default();
        let store = LogStore::from_settings(&settings, None);

        assert_eq!(store.mode(), LogStoreMode::InMemory);
        assert_eq!(store.capacity(), settings.max_entries_per_category);
    }

    #[test]
    fn export_parses_back_to_current_contents() {
        let store = LogStore::in_memory(10);
        store.record(LogCategory::Audit, "saved", details([("name", json!("prod"))]));
        let generated_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let bytes = store
            .export_at(None, generated_at)
            .expect("export should serialize");
        let parsed = LogStore::parse_export(&bytes).expect("export should parse");

        assert_eq!(parsed.timestamp, generated_at);
        assert_eq!(parsed.logs.len(), LogCategory::ALL.len());
        assert_eq!(parsed.logs["audit"], store.entries(LogCategory::Audit));
    }

    #[test]
    fn single_category_export_only_contains_that_category() {
        let store = LogStore::in_memory(10);
        store.record(LogCategory::Audit, "saved", LogDetails::new());
        store.record(LogCategory::Query, "ran", LogDetails::new());

        let bytes = store
            .export(Some(LogCategory::Query))
            .expect("export should serialize");
        let parsed = LogStore::parse_export(&bytes).expect("export should parse");

        assert_eq!(parsed.logs.keys().collect::<Vec<_>>(), vec!["query"]);
    }

    #[test]
    fn export_file_name_is_timestamped() {
        let generated_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap();
        assert_eq!(
            LogStore::export_file_name(generated_at),
            "dbconsole_logs_2024-05-01T12-30-05.000Z.json"
        );
    }
}
