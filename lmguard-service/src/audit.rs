use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lmguard_core_models::AuditRecord;
use parking_lot::Mutex;
use tracing::warn;

const ANONYMOUS: &str = "anonymous";

/// Pseudonymizes student ids as `blake3(salt || id)`.
#[derive(Clone)]
pub struct StudentHasher {
    salt: String,
}

impl StudentHasher {
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }

    pub fn hash(&self, student_id: Option<&str>) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.salt.as_bytes());
        hasher.update(student_id.unwrap_or(ANONYMOUS).as_bytes());
        hasher.finalize().to_hex().to_string()
    }
}

/// Receives one record per completed request. Implementations absorb
/// their own failures.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord);
}

/// Appends one JSON object per line.
pub struct JsonlAuditLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAuditLog {
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditLog {
    fn record(&self, record: &AuditRecord) {
        let mut line = match serde_json::to_vec(record) {
            Ok(line) => line,
            Err(err) => {
                warn!(error = %err, "audit record not serializable");
                return;
            }
        };
        line.push(b'\n');
        let mut file = self.file.lock();
        if let Err(err) = file.write_all(&line).and_then(|_| file.flush()) {
            warn!(path = %self.path.display(), error = %err, "audit write failed");
        }
    }
}

pub const DEFAULT_LOG_LIMIT: usize = 20;
pub const MAX_LOG_LIMIT: usize = 500;

/// Keeps the most recent records in memory for the admin endpoint.
pub struct InMemoryAuditLog {
    capacity: usize,
    records: Mutex<VecDeque<AuditRecord>>,
}

impl InMemoryAuditLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            records: Mutex::new(VecDeque::new()),
        }
    }

    /// Up to `limit` most recent records, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<AuditRecord> {
        let records = self.records.lock();
        let skip = records.len().saturating_sub(limit);
        records.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryAuditLog {
    fn default() -> Self {
        Self::new(MAX_LOG_LIMIT)
    }
}

impl AuditSink for InMemoryAuditLog {
    fn record(&self, record: &AuditRecord) {
        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record.clone());
    }
}

/// Forwards each record to every inner sink.
#[derive(Clone, Default)]
pub struct AuditFanout {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl AuditFanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl AuditSink for AuditFanout {
    fn record(&self, record: &AuditRecord) {
        for sink in &self.sinks {
            sink.record(record);
        }
    }
}
