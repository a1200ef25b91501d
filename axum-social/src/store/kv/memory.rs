use std::{collections::HashMap, convert::Infallible, sync::Arc};

use tokio::sync::RwLock;

use crate::{store::KeyValue, utils::utc_now_secs};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    stored_at: u64,
}

/// In-process key-value store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemKv {
    inner: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

impl KeyValue for MemKv {
    type Error = Infallible;

    fn spawn_maintenance_task(&self) -> bool {
        true
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), Self::Error> {
        let entry = Entry {
            value,
            stored_at: utc_now_secs(),
        };
        let mut lock = self.inner.write().await;
        lock.insert(key.to_owned(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        let lock = self.inner.read().await;
        Ok(lock.get(key).map(|entry| entry.value.clone()))
    }

    async fn delete(&self, key: &str) -> Result<(), Self::Error> {
        let mut lock = self.inner.write().await;
        lock.remove(key);
        Ok(())
    }

    async fn remove_before(&self, deadline: u64) -> Result<(), Self::Error> {
        let mut lock = self.inner.write().await;
        let before = lock.len();
        lock.retain(|_, entry| entry.stored_at >= deadline);
        tracing::debug!("removed {} expired session records", before - lock.len());
        Ok(())
    }
}

#[cfg(test)]
mod memory {
    use crate::store::{KeyValue, MemKv};

    #[tokio::test]
    async fn put_get_delete() {
        let kv = MemKv::new();
        assert_eq!(kv.get("a").await.unwrap(), None);

        kv.put("a", b"one".to_vec()).await.unwrap();
        kv.put("a", b"two".to_vec()).await.unwrap();
        assert_eq!(kv.get("a").await.unwrap().as_deref(), Some(&b"two"[..]));

        let shared = kv.clone();
        shared.delete("a").await.unwrap();
        assert_eq!(kv.get("a").await.unwrap(), None);
        assert!(kv.is_empty().await);
    }

    #[tokio::test]
    async fn remove_before() {
        let kv = MemKv::new();
        kv.put("a", b"one".to_vec()).await.unwrap();

        kv.remove_before(0).await.unwrap();
        assert_eq!(kv.len().await, 1);

        kv.remove_before(u64::MAX).await.unwrap();
        assert!(kv.is_empty().await);
    }
}
