use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::errors::PolicyConfigError;
use crate::rules::{PolicyDocument, PolicyRules};

/// Immutable view of the policy handed to a single request.
#[derive(Clone, Debug, Serialize)]
pub struct PolicySnapshot {
    pub version: u32,
    /// blake3 of the canonical rule set; changes whenever the rules do.
    pub digest: String,
    pub rules: PolicyRules,
    #[serde(with = "time::serde::rfc3339")]
    pub loaded_at: OffsetDateTime,
}

impl PolicySnapshot {
    pub fn new(version: u32, rules: PolicyRules) -> Result<Self, PolicyConfigError> {
        let canonical = serde_json::to_vec(&rules)?;
        Ok(Self {
            version,
            digest: blake3::hash(&canonical).to_hex().to_string(),
            rules,
            loaded_at: OffsetDateTime::now_utc(),
        })
    }

    pub fn from_document(document: PolicyDocument) -> Result<Self, PolicyConfigError> {
        let version = document.version;
        Self::new(version, document.into_rules()?)
    }
}

/// Holds the current snapshot. Readers clone the `Arc` and keep using it for
/// the whole request; reload swaps in a new snapshot or leaves the old one.
pub struct PolicyStore {
    source: Option<PathBuf>,
    current: RwLock<Arc<PolicySnapshot>>,
}

impl PolicyStore {
    pub fn new(snapshot: PolicySnapshot) -> Self {
        Self {
            source: None,
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Loads and validates the file. Startup refuses to continue on error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PolicyConfigError> {
        let path = path.as_ref().to_path_buf();
        let snapshot = PolicySnapshot::from_document(PolicyDocument::load(&path)?)?;
        info!(
            path = %path.display(),
            version = snapshot.version,
            digest = %snapshot.digest,
            rules = snapshot.rules.len(),
            "policy loaded"
        );
        Ok(Self {
            source: Some(path),
            current: RwLock::new(Arc::new(snapshot)),
        })
    }

    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.current.read().clone()
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Re-reads the backing file. On any error the previous snapshot stays
    /// in place and the error is returned to the caller.
    pub fn reload(&self) -> Result<Arc<PolicySnapshot>, PolicyConfigError> {
        let path = self.source.as_deref().ok_or(PolicyConfigError::NoSource)?;
        let loaded = PolicyDocument::load(path).and_then(PolicySnapshot::from_document);
        match loaded {
            Ok(snapshot) => Ok(self.replace(snapshot)),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "policy reload rejected, keeping previous snapshot");
                Err(err)
            }
        }
    }

    pub fn replace(&self, snapshot: PolicySnapshot) -> Arc<PolicySnapshot> {
        let snapshot = Arc::new(snapshot);
        let previous = std::mem::replace(&mut *self.current.write(), snapshot.clone());
        info!(
            from_version = previous.version,
            to_version = snapshot.version,
            digest = %snapshot.digest,
            "policy snapshot replaced"
        );
        snapshot
    }
}
