//! Cookie plus key-value persistence of session sets.
//!
//! The browser only ever sees a signed record id. The provider sessions
//! themselves live in a [`KeyValue`] store under that id, as one record per
//! browser.

mod builder;
mod cookie;
mod expiry;
mod kv;
mod record;
mod service;

use std::{
    collections::{BTreeMap, hash_map::DefaultHasher},
    hash::{Hash, Hasher},
    sync::{Arc, OnceLock},
    time::Duration,
};

use axum::http::HeaderMap;
pub use builder::SessionStoreBuilder;
pub use cookie::{CookieOptions, DEFAULT_COOKIE_NAME};
pub use cookie_monster::{Cookie, CookieJar, SameSite};
#[cfg(feature = "redis")]
pub use kv::RedisKv;
pub use kv::{KeyValue, MemKv};
pub use record::{RecordState, SessionId, SessionSetRecord};
pub use service::SessionService;
use tokio::{sync::Mutex, task::JoinHandle};

use crate::{
    OAuthError, Result,
    store::{
        cookie::CookieSigner,
        expiry::{is_expired, maintenance_task},
        record::StoredRecord,
    },
    utils::utc_now_secs,
};

const LOCK_STRIPES: usize = 64;

pub struct SessionStore<K>(Arc<SessionStoreInner<K>>);

struct SessionStoreInner<K> {
    kv: Arc<K>,
    cookie: CookieOptions,
    signer: CookieSigner,
    ttl: Option<Duration>,
    locks: Box<[Mutex<()>]>,
    sweep_every: Option<Duration>,
    sweep: OnceLock<JoinHandle<()>>,
}

impl<K> Drop for SessionStoreInner<K> {
    fn drop(&mut self) {
        if let Some(handle) = self.sweep.take() {
            handle.abort();
        }
    }
}

impl<K> Clone for SessionStore<K> {
    fn clone(&self) -> Self {
        SessionStore(self.0.clone())
    }
}

impl SessionStore<()> {
    pub fn builder() -> SessionStoreBuilder<()> {
        SessionStoreBuilder::new()
    }
}

impl<K: KeyValue> SessionStore<K> {
    pub fn cookie_options(&self) -> &CookieOptions {
        &self.0.cookie
    }

    pub fn cookie_name(&self) -> &str {
        &self.0.cookie.name
    }

    /// How long a record stays loadable after its last save.
    pub fn ttl(&self) -> Option<Duration> {
        self.0.ttl
    }

    pub fn kv(&self) -> &K {
        &self.0.kv
    }

    pub fn new_record(&self) -> SessionSetRecord {
        SessionSetRecord::new()
    }

    /// Loads the record referenced by the request's session cookie.
    ///
    /// A missing cookie, a cookie that fails verification and a record that is
    /// gone from the store (or expired) are reported as distinct errors.
    pub async fn load(&self, headers: &HeaderMap) -> Result<SessionSetRecord> {
        let jar = CookieJar::from_headers(headers);
        self.load_from_jar(&jar).await
    }

    pub async fn load_from_jar(&self, jar: &CookieJar) -> Result<SessionSetRecord> {
        let cookie = jar
            .get(self.cookie_name())
            .ok_or(OAuthError::MissingCookie)?;

        self.load_from_cookie(cookie).await
    }

    pub async fn load_from_cookie(&self, cookie: &Cookie) -> Result<SessionSetRecord> {
        let id = self
            .0
            .signer
            .verify(cookie.value())
            .ok_or(OAuthError::MalformedCookie)?;

        self.load_by_id(id).await
    }

    pub async fn load_by_id(&self, id: SessionId) -> Result<SessionSetRecord> {
        match self.read(&id).await? {
            Some(stored) => Ok(SessionSetRecord::loaded(id, stored.sessions)),
            None => Err(OAuthError::RecordNotFound(id)),
        }
    }

    /// Like [`SessionStore::load`] but mints a new record when there is nothing
    /// usable to load. Corrupted records are discarded.
    pub async fn get_or_create(&self, headers: &HeaderMap) -> Result<SessionSetRecord> {
        match self.load(headers).await {
            Ok(record) => Ok(record),
            Err(OAuthError::MissingCookie | OAuthError::RecordNotFound(_)) => Ok(self.new_record()),
            Err(OAuthError::MalformedCookie) => {
                tracing::debug!("session cookie failed verification, starting a new record");
                Ok(self.new_record())
            }
            Err(OAuthError::Decode(e)) => {
                tracing::warn!("discarding corrupted session record: {e}");
                Ok(self.new_record())
            }
            Err(e) => Err(e),
        }
    }

    /// Persists `record` and returns the cookie pointing at it.
    ///
    /// Saves of the same record are serialized. Each one re-reads the stored
    /// set and applies only its own changes, then writes the whole set back.
    /// The key-value write happens before the cookie is produced, so a failed
    /// write never hands out a cookie.
    pub async fn save(&self, record: &mut SessionSetRecord) -> Result<Cookie> {
        let _guard = self.lock_for(record.id()).lock().await;

        let base = match self.read(record.id()).await {
            Ok(Some(stored)) => stored.sessions,
            Ok(None) => BTreeMap::new(),
            Err(OAuthError::Decode(e)) => {
                tracing::warn!(id = %record.id(), "overwriting corrupted session record: {e}");
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };

        let stored = StoredRecord {
            updated_at: utc_now_secs(),
            sessions: record.merge_into(base),
        };

        self.0
            .kv
            .put(record.id().as_str(), stored.encode()?)
            .await
            .map_err(OAuthError::persist)?;

        tracing::debug!(id = %record.id(), providers = stored.sessions.len(), "saved session record");
        record.mark_saved(stored.sessions);

        Ok(self.cookie_for(record.id()))
    }

    /// Removes the record from the store and returns a cookie that expires
    /// the browser's copy.
    pub async fn delete(&self, record: &mut SessionSetRecord) -> Result<Cookie> {
        let _guard = self.lock_for(record.id()).lock().await;

        self.0
            .kv
            .delete(record.id().as_str())
            .await
            .map_err(OAuthError::persist)?;

        tracing::debug!(id = %record.id(), "deleted session record");
        record.mark_deleted();

        Ok(self.removal_cookie())
    }

    pub fn cookie_for(&self, id: &SessionId) -> Cookie {
        let opts = &self.0.cookie;
        opts.build(self.0.signer.sign(id), opts.max_age)
    }

    pub fn removal_cookie(&self) -> Cookie {
        self.0.cookie.build(String::new(), -1)
    }

    async fn read(&self, id: &SessionId) -> Result<Option<StoredRecord>> {
        self.start_sweep();

        let Some(bytes) = self
            .0
            .kv
            .get(id.as_str())
            .await
            .map_err(OAuthError::persist)?
        else {
            return Ok(None);
        };

        let stored = StoredRecord::decode(&bytes)?;

        if is_expired(stored.updated_at, self.0.ttl) {
            tracing::debug!(%id, "session record expired");
            return Ok(None);
        }

        Ok(Some(stored))
    }

    /// Spawns the expiry sweep on first use, from inside the caller's runtime.
    fn start_sweep(&self) {
        if let Some(ttl) = self.0.sweep_every {
            self.0
                .sweep
                .get_or_init(|| tokio::spawn(maintenance_task(self.0.kv.clone(), ttl)));
        }
    }

    fn lock_for(&self, id: &SessionId) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        let idx = hasher.finish() as usize % self.0.locks.len();
        &self.0.locks[idx]
    }
}

#[cfg(test)]
mod store {
    use axum::{
        http::{HeaderMap, HeaderValue, header},
        response::IntoResponse,
    };

    use crate::{
        OAuthError,
        store::{Cookie, MemKv, RecordState, SessionStore},
    };

    fn cookie_header(cookie: &Cookie) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let value = format!("{}={}", cookie.name(), cookie.value());
        headers.insert(header::COOKIE, HeaderValue::from_str(&value).unwrap());
        headers
    }

    fn set_cookie(cookie: Cookie) -> String {
        let res = (cookie, ()).into_response();
        res.headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_owned()
    }

    #[tokio::test]
    async fn create() {
        let store = SessionStore::builder().store(MemKv::new()).build();

        let mut record = store.new_record();
        record.insert("github", r#"{"AuthURL":"/a","AccessToken":""}"#);
        let cookie = store.save(&mut record).await.unwrap();
        assert_eq!(record.state(), RecordState::Loaded);

        let loaded = store.load(&cookie_header(&cookie)).await.unwrap();
        assert!(!loaded.is_new());
        assert_eq!(loaded.id(), record.id());
        assert_eq!(loaded.sessions(), record.sessions());
    }

    #[tokio::test]
    async fn delete() {
        let kv = MemKv::new();
        let store = SessionStore::builder().store(kv.clone()).build();

        let mut record = store.new_record();
        record.insert("github", "{}");
        let cookie = store.save(&mut record).await.unwrap();

        let removal = store.delete(&mut record).await.unwrap();
        assert_eq!(record.state(), RecordState::Deleted);
        assert!(kv.is_empty().await);
        assert!(set_cookie(removal).contains("Max-Age=0"));

        let err = store.load(&cookie_header(&cookie)).await.unwrap_err();
        assert!(matches!(err, OAuthError::RecordNotFound(_)));
    }

    #[tokio::test]
    async fn defaults() {
        let store = SessionStore::builder().store(MemKv::new()).build();
        let cookie = store.save(&mut store.new_record()).await.unwrap();
        assert_eq!(cookie.name(), "oauth2.session");

        let header = set_cookie(cookie);
        assert!(header.contains("Path=/"));
        assert!(header.contains("HttpOnly"));
        assert!(header.contains("Secure"));
        assert!(header.contains("SameSite=Lax"));
        assert!(!header.contains("Max-Age"));

        let store = SessionStore::builder()
            .store(MemKv::new())
            .use_dev_cookie(true)
            .build();
        let header = set_cookie(store.save(&mut store.new_record()).await.unwrap());
        assert!(!header.contains("Secure"));

        let store = SessionStore::builder()
            .store(MemKv::new())
            .cookie(|c| c.name("test").max_age(60))
            .dev_cookie(|c| c.name("not-test"))
            .build();
        let cookie = store.save(&mut store.new_record()).await.unwrap();
        assert_eq!(cookie.name(), "test");
        assert!(set_cookie(cookie).contains("Max-Age=60"));
    }

    #[tokio::test]
    async fn load_errors() {
        let store = SessionStore::builder().store(MemKv::new()).build();

        let err = store.load(&HeaderMap::new()).await.unwrap_err();
        assert!(matches!(err, OAuthError::MissingCookie));

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("oauth2.session=garbage"),
        );
        let err = store.load(&headers).await.unwrap_err();
        assert!(matches!(err, OAuthError::MalformedCookie));

        let record = store.get_or_create(&headers).await.unwrap();
        assert!(record.is_new());
    }
}
