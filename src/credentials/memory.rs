// In-memory credential storage. State resets on restart.

use super::{CredentialRecord, CredentialStorage};
use dashmap::DashMap;

/// Default backend: one record per user key in a concurrent map.
#[derive(Default)]
pub struct InMemoryStorage {
    records: DashMap<String, CredentialRecord>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Number of users with a stored record.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl CredentialStorage for InMemoryStorage {
    fn get(&self, user_key: &str) -> anyhow::Result<Option<CredentialRecord>> {
        Ok(self.records.get(user_key).map(|r| r.value().clone()))
    }

    fn put(&self, record: &CredentialRecord) -> anyhow::Result<()> {
        self.records.insert(record.user_key.clone(), record.clone());
        Ok(())
    }
}
