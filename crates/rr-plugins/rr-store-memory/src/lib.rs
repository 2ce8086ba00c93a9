//! # rr-store-memory
//! rusty-reviewer/crates/rr-plugins/rr-store-memory/src/lib.rs
//! In-process implementation of `PermissionStore` and `DedupStore`.
//! Nothing survives a restart; used for dry runs and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use rr_core::error::StoreError;
use rr_core::records::{DedupRecord, PermissionRecord};
use rr_core::traits::{DedupStore, PermissionStore};

#[derive(Debug, Default)]
pub struct MemoryStore {
    permissions: DashMap<u64, PermissionRecord>,
    dedup: DashMap<u64, DedupRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dedup_len(&self) -> usize {
        self.dedup.len()
    }

    pub fn permission_len(&self) -> usize {
        self.permissions.len()
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn get(&self, user_id: u64) -> Result<PermissionRecord, StoreError> {
        Ok(self
            .permissions
            .get(&user_id)
            .map(|record| record.value().clone())
            .unwrap_or_else(|| PermissionRecord::neutral(user_id)))
    }

    async fn set(&self, record: PermissionRecord) -> Result<(), StoreError> {
        self.permissions.insert(record.user_id, record);
        Ok(())
    }

    async fn remove(&self, user_id: u64) -> Result<(), StoreError> {
        self.permissions.remove(&user_id);
        Ok(())
    }
}

#[async_trait]
impl DedupStore for MemoryStore {
    async fn get(&self, node_id: u64) -> Result<Option<i64>, StoreError> {
        Ok(self.dedup.get(&node_id).map(|record| record.tag))
    }

    async fn put(&self, node_id: u64, tag: i64) -> Result<(), StoreError> {
        self.dedup.insert(node_id, DedupRecord::new(node_id, tag));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_user_is_neutral() {
        let store = MemoryStore::new();
        let record = PermissionStore::get(&store, 7).await.unwrap();
        assert_eq!(record.level, 0);
        assert_eq!(store.permission_len(), 0);
    }

    #[tokio::test]
    async fn test_permission_set_and_remove() {
        let store = MemoryStore::new();
        store.set(PermissionRecord::new(7, -5, "spam")).await.unwrap();
        assert_eq!(PermissionStore::get(&store, 7).await.unwrap().level, -5);

        store.remove(7).await.unwrap();
        assert_eq!(PermissionStore::get(&store, 7).await.unwrap().level, 0);
    }

    #[tokio::test]
    async fn test_dedup_overwrites_tag() {
        let store = MemoryStore::new();
        assert_eq!(DedupStore::get(&store, 1).await.unwrap(), None);
        store.put(1, 0).await.unwrap();
        assert_eq!(DedupStore::get(&store, 1).await.unwrap(), Some(0));
        store.put(1, 9).await.unwrap();
        assert_eq!(DedupStore::get(&store, 1).await.unwrap(), Some(9));
        assert_eq!(store.dedup_len(), 1);
    }
}
