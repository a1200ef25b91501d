use std::{sync::Arc, time::Duration};

use crate::{store::KeyValue, utils::utc_now_secs};

pub(crate) enum SessionExpiry {
    CookieMaxAge,
    Duration(Duration),
}

/// Whether a record last written at `updated_at` outlived `ttl`.
pub(crate) fn is_expired(updated_at: u64, ttl: Option<Duration>) -> bool {
    let Some(ttl) = ttl else {
        return false;
    };
    utc_now_secs().saturating_sub(updated_at) > ttl.as_secs()
}

pub(crate) async fn maintenance_task<K: KeyValue>(kv: Arc<K>, expires_after: Duration) {
    let mut interval = tokio::time::interval(expires_after.max(Duration::from_secs(1)));
    loop {
        interval.tick().await;
        let deadline = utc_now_secs().saturating_sub(expires_after.as_secs());
        if let Err(e) = kv.remove_before(deadline).await {
            tracing::warn!("could not remove expired session records: {e}");
        }
    }
}

#[cfg(test)]
mod expiry {
    use std::time::Duration;

    use crate::{
        OAuthError,
        store::{MemKv, SessionStore},
    };

    #[tokio::test]
    async fn duration() {
        let store = SessionStore::builder()
            .expires_after(Duration::from_secs(1))
            .store(MemKv::new())
            .build();

        let mut record = store.new_record();
        record.insert("faux", "{}");
        let cookie = store.save(&mut record).await.unwrap();

        let loaded = store.load_from_cookie(&cookie).await;
        assert!(loaded.is_ok());

        tokio::time::sleep(Duration::from_secs(2)).await;

        let loaded = store.load_from_cookie(&cookie).await;
        assert!(matches!(loaded, Err(OAuthError::RecordNotFound(_))));
    }

    #[tokio::test]
    async fn max_age() {
        let store = SessionStore::builder()
            .cookie(|c| c.max_age(1))
            .expires_max_age()
            .store(MemKv::new())
            .build();

        let mut record = store.new_record();
        record.insert("faux", "{}");
        let cookie = store.save(&mut record).await.unwrap();

        let loaded = store.load_from_cookie(&cookie).await;
        assert!(loaded.is_ok());

        tokio::time::sleep(Duration::from_secs(2)).await;

        let loaded = store.load_from_cookie(&cookie).await;
        assert!(matches!(loaded, Err(OAuthError::RecordNotFound(_))));
    }

    #[test]
    fn build_outside_runtime() {
        let store = SessionStore::builder()
            .expires_after(Duration::from_secs(1))
            .store(MemKv::new())
            .build();

        assert_eq!(store.ttl(), Some(Duration::from_secs(1)));
        assert!(store.0.sweep.get().is_none());
    }

    #[tokio::test]
    async fn sweep_removes_expired() {
        let kv = MemKv::new();
        let store = SessionStore::builder()
            .expires_after(Duration::from_secs(1))
            .store(kv.clone())
            .build();

        let mut record = store.new_record();
        record.insert("faux", "{}");
        store.save(&mut record).await.unwrap();
        assert!(store.0.sweep.get().is_some());
        assert_eq!(kv.len().await, 1);

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert!(kv.is_empty().await);
    }

    #[tokio::test]
    async fn no_sweep_without_ttl() {
        let store = SessionStore::builder().store(MemKv::new()).build();
        store.save(&mut store.new_record()).await.unwrap();
        assert!(store.0.sweep.get().is_none());
    }

    #[tokio::test]
    #[should_panic]
    async fn no_max_age() {
        SessionStore::builder()
            .expires_max_age()
            .store(MemKv::new())
            .build();
    }
}
