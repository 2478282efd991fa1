//! Preference and event types shared between the streamer and its collaborators.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Cluster access parameters handed to the adapter factory on connect.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterAccess {
    /// Raw kubeconfig bytes (empty when running in-cluster)
    pub config: Vec<u8>,
    /// Kube context to select from `config`
    pub context_name: String,
    /// Use the in-cluster service account instead of `config`
    pub in_cluster: bool,
}

impl ClusterAccess {
    /// In-cluster access, no explicit credentials.
    pub fn in_cluster() -> Self {
        Self {
            in_cluster: true,
            ..Self::default()
        }
    }

    /// Explicit kubeconfig access.
    pub fn from_kubeconfig(config: impl Into<Vec<u8>>, context_name: impl Into<String>) -> Self {
        Self {
            config: config.into(),
            context_name: context_name.into(),
            in_cluster: false,
        }
    }

    /// Access is usable when it is in-cluster or carries credential bytes.
    pub fn is_usable(&self) -> bool {
        self.in_cluster || !self.config.is_empty()
    }
}

/// One configured backend adapter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Network location, also the registry key
    pub location: String,
}

impl AdapterConfig {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
        }
    }
}

/// Per-user preference snapshot as seen on one reconciliation tick.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preference {
    /// Cluster access, absent when the user has not configured any
    pub cluster_access: Option<ClusterAccess>,
    /// Configured adapters
    pub adapters: Vec<AdapterConfig>,
}

impl Preference {
    pub fn new(cluster_access: Option<ClusterAccess>, adapters: Vec<AdapterConfig>) -> Self {
        Self {
            cluster_access,
            adapters,
        }
    }

    /// Cluster access, only if it is usable.
    pub fn usable_cluster_access(&self) -> Option<&ClusterAccess> {
        self.cluster_access.as_ref().filter(|access| access.is_usable())
    }

    /// Configured locations in configuration order, without blanks or duplicates.
    pub fn adapter_locations(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.adapters
            .iter()
            .map(|adapter| adapter.location.trim())
            .filter(|location| !location.is_empty() && seen.insert(*location))
            .collect()
    }
}

/// Severity reported by the adapter for an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    #[default]
    Info,
    Warn,
    Error,
}

/// One event emitted by an adapter. The streamer relays it without
/// interpreting any field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterEvent {
    #[serde(default)]
    pub event_type: EventType,
    pub summary: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub operation_id: String,
    /// Location of the adapter that emitted the event, stamped on relay
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl AdapterEvent {
    pub fn new(event_type: EventType, summary: impl Into<String>) -> Self {
        Self {
            event_type,
            summary: summary.into(),
            details: String::new(),
            operation_id: String::new(),
            location: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn with_operation_id(mut self, operation_id: impl Into<String>) -> Self {
        self.operation_id = operation_id.into();
        self
    }
}
