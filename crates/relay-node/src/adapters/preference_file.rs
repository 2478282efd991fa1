//! File-backed preference store.
//!
//! The document is re-read on every poll, so edits take effect on the next
//! reconciliation tick:
//!
//! ```json
//! {
//!   "k8s_config": { "in_cluster": false, "config_path": "kubeconfig.yaml", "context_name": "kind" },
//!   "mesh_adapters": [{ "location": "localhost:10000" }]
//! }
//! ```
//!
//! `config_path` is resolved relative to the document's directory.

use event_streamer::{AdapterConfig, ClusterAccess, Preference, PreferenceSource};
use serde::Deserialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PreferenceDocument {
    k8s_config: Option<K8sConfigDocument>,
    mesh_adapters: Vec<AdapterDocument>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct K8sConfigDocument {
    in_cluster: bool,
    config_path: Option<PathBuf>,
    context_name: String,
}

#[derive(Debug, Deserialize)]
struct AdapterDocument {
    location: String,
}

/// Errors reading the preference document.
#[derive(Debug, thiserror::Error)]
pub enum PreferenceFileError {
    #[error("preference file {0} not found")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid preference document {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Preference source reading a JSON document from disk.
#[derive(Debug, Clone)]
pub struct FilePreferenceStore {
    path: PathBuf,
}

impl FilePreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and resolve the document.
    pub fn load(&self) -> Result<Preference, PreferenceFileError> {
        let raw = std::fs::read(&self.path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => PreferenceFileError::NotFound(self.path.clone()),
            _ => PreferenceFileError::Read {
                path: self.path.clone(),
                source,
            },
        })?;
        let document: PreferenceDocument =
            serde_json::from_slice(&raw).map_err(|source| PreferenceFileError::Parse {
                path: self.path.clone(),
                source,
            })?;

        let adapters = document
            .mesh_adapters
            .into_iter()
            .map(|adapter| AdapterConfig::new(adapter.location))
            .collect();
        let cluster_access = document.k8s_config.map(|k8s| self.cluster_access(k8s));

        Ok(Preference::new(cluster_access, adapters))
    }

    fn cluster_access(&self, k8s: K8sConfigDocument) -> ClusterAccess {
        if k8s.in_cluster {
            return ClusterAccess::in_cluster();
        }

        // An unreadable kubeconfig leaves the access unusable, not absent.
        let config = k8s
            .config_path
            .map(|path| self.resolve(&path))
            .and_then(|path| match std::fs::read(&path) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to read kubeconfig");
                    None
                }
            })
            .unwrap_or_default();

        ClusterAccess::from_kubeconfig(config, k8s.context_name)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match self.path.parent() {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl PreferenceSource for FilePreferenceStore {
    fn current(&self) -> Preference {
        match self.load() {
            Ok(preference) => preference,
            Err(e @ PreferenceFileError::NotFound(_)) => {
                debug!(error = %e, "No preferences, treating as no adapters configured");
                Preference::default()
            }
            Err(e) => {
                warn!(error = %e, "Failed to load preferences, treating as no adapters configured");
                Preference::default()
            }
        }
    }
}
