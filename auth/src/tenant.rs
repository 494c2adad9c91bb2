//! Tenant records and the directory that stores them.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::DirectoryError;

/// One installed `(client_key, addon_key)` pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub client_key: String,
    pub addon_key: String,
    pub shared_secret: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    /// e.g. `atlassian:jira`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    pub installed_at: DateTime<Utc>,
}

impl TenantRecord {
    pub fn new(
        client_key: impl Into<String>,
        addon_key: impl Into<String>,
        shared_secret: impl Into<String>,
    ) -> Self {
        Self {
            client_key: client_key.into(),
            addon_key: addon_key.into(),
            shared_secret: shared_secret.into(),
            base_url: None,
            api_base_url: None,
            product_type: None,
            oauth_client_id: None,
            public_key: None,
            installed_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Base URL for outgoing API calls, defaulting to `base_url`.
    pub fn api_base_url(&self) -> Option<&str> {
        self.api_base_url.as_deref().or(self.base_url.as_deref())
    }
}

impl std::fmt::Debug for TenantRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantRecord")
            .field("client_key", &self.client_key)
            .field("addon_key", &self.addon_key)
            .field("shared_secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("api_base_url", &self.api_base_url)
            .field("product_type", &self.product_type)
            .field("oauth_client_id", &self.oauth_client_id)
            .field("installed_at", &self.installed_at)
            .finish()
    }
}

/// Read side of tenant storage, the only access verification needs.
#[async_trait]
pub trait TenantDirectory: Send + Sync + 'static {
    async fn find(
        &self,
        client_key: &str,
        addon_key: &str,
    ) -> Result<Option<TenantRecord>, DirectoryError>;
}

/// Write side, used by the install/uninstall handshake.
#[async_trait]
pub trait TenantStore: TenantDirectory {
    /// Inserts or replaces the record for its `(client_key, addon_key)`.
    async fn upsert(&self, record: TenantRecord) -> Result<(), DirectoryError>;

    /// Returns whether a record was removed.
    async fn remove(&self, client_key: &str, addon_key: &str) -> Result<bool, DirectoryError>;
}

type TenantKey = (String, String);

/// In-process directory, keyed by `(client_key, addon_key)`.
#[derive(Debug, Clone, Default)]
pub struct MemoryTenantDirectory {
    records: Arc<RwLock<HashMap<TenantKey, TenantRecord>>>,
}

impl MemoryTenantDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = TenantRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|r| ((r.client_key.clone(), r.addon_key.clone()), r))
            .collect();
        Self {
            records: Arc::new(RwLock::new(map)),
        }
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl TenantDirectory for MemoryTenantDirectory {
    async fn find(
        &self,
        client_key: &str,
        addon_key: &str,
    ) -> Result<Option<TenantRecord>, DirectoryError> {
        let key = (client_key.to_string(), addon_key.to_string());
        Ok(self.records.read().get(&key).cloned())
    }
}

#[async_trait]
impl TenantStore for MemoryTenantDirectory {
    async fn upsert(&self, record: TenantRecord) -> Result<(), DirectoryError> {
        let key = (record.client_key.clone(), record.addon_key.clone());
        self.records.write().insert(key, record);
        Ok(())
    }

    async fn remove(&self, client_key: &str, addon_key: &str) -> Result<bool, DirectoryError> {
        let key = (client_key.to_string(), addon_key.to_string());
        Ok(self.records.write().remove(&key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_is_keyed_by_both_keys() {
        let dir = MemoryTenantDirectory::with_records([TenantRecord::new("T1", "A", "s1")]);

        assert!(dir.find("T1", "A").await.unwrap().is_some());
        assert!(dir.find("T1", "B").await.unwrap().is_none());
        assert!(dir.find("T2", "A").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_single_record() {
        let dir = MemoryTenantDirectory::new();
        dir.upsert(TenantRecord::new("T1", "A", "s1")).await.unwrap();
        dir.upsert(TenantRecord::new("T1", "A", "s2")).await.unwrap();

        assert_eq!(dir.len(), 1);
        let found = dir.find("T1", "A").await.unwrap().unwrap();
        assert_eq!(found.shared_secret, "s2");

        assert!(dir.remove("T1", "A").await.unwrap());
        assert!(!dir.remove("T1", "A").await.unwrap());
        assert!(dir.is_empty());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let rendered = format!("{:?}", TenantRecord::new("T1", "A", "hunter2"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_api_base_url_fallback() {
        let mut record = TenantRecord::new("T1", "A", "s").with_base_url("https://t.example");
        assert_eq!(record.api_base_url(), Some("https://t.example"));
        record.api_base_url = Some("https://api.t.example".into());
        assert_eq!(record.api_base_url(), Some("https://api.t.example"));
    }
}
