use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};

use tokio::sync::Mutex;

use crate::{
    store::{
        CookieOptions, KeyValue, LOCK_STRIPES, SessionStore, SessionStoreInner,
        cookie::CookieSigner,
        expiry::SessionExpiry,
    },
    utils::get_env,
};

pub struct SessionStoreBuilder<K> {
    store: K,
    dev: bool,
    cookie: CookieOptions,
    dev_cookie: CookieOptions,
    secret: Option<Vec<u8>>,
    expiry: Option<SessionExpiry>,
}

impl SessionStoreBuilder<()> {
    pub fn new() -> SessionStoreBuilder<()> {
        Self {
            store: (),
            dev: false,
            cookie: CookieOptions::default(),
            dev_cookie: CookieOptions::dev(),
            secret: None,
            expiry: None,
        }
    }
}

impl Default for SessionStoreBuilder<()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> SessionStoreBuilder<K> {
    pub fn cookie(mut self, f: impl FnOnce(CookieOptions) -> CookieOptions) -> Self {
        self.cookie = f(CookieOptions::default());
        self
    }

    pub fn dev_cookie(mut self, f: impl FnOnce(CookieOptions) -> CookieOptions) -> Self {
        self.dev_cookie = f(CookieOptions::dev());
        self
    }

    pub fn use_dev_cookie(mut self, dev: bool) -> Self {
        self.dev = dev;
        self
    }

    pub fn use_normal_cookie(self, prod: bool) -> Self {
        self.use_dev_cookie(!prod)
    }

    /// Key used to sign the session cookie. A random key is generated when
    /// none is set, which invalidates every cookie on restart.
    pub fn cookie_secret(mut self, secret: impl Into<Vec<u8>>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn cookie_secret_env(mut self, name: &str) -> Self {
        self.secret = get_env(name).map(String::into_bytes);
        self
    }

    /// Records expire together with the cookie's `max_age`.
    pub fn expires_max_age(mut self) -> Self {
        self.expiry = Some(SessionExpiry::CookieMaxAge);
        self
    }

    pub fn expires_after(mut self, session_duration: Duration) -> Self {
        self.expiry = Some(SessionExpiry::Duration(session_duration));
        self
    }

    pub fn expires_none(mut self) -> Self {
        self.expiry = None;
        self
    }

    pub fn store<K1>(self, store: K1) -> SessionStoreBuilder<K1> {
        SessionStoreBuilder {
            store,
            dev: self.dev,
            cookie: self.cookie,
            dev_cookie: self.dev_cookie,
            secret: self.secret,
            expiry: self.expiry,
        }
    }
}

impl<K: KeyValue> SessionStoreBuilder<K> {
    /// # Panics
    ///
    /// When [`expires_max_age`](Self::expires_max_age) is used without a
    /// positive cookie `max_age`.
    ///
    /// The expiry sweep is not spawned here. It starts on the store's first
    /// read or save, so building outside a Tokio runtime is fine.
    pub fn build(self) -> SessionStore<K> {
        let cookie = if self.dev {
            self.dev_cookie
        } else {
            self.cookie
        };

        let ttl = self.expiry.map(|e| match e {
            SessionExpiry::CookieMaxAge if cookie.max_age > 0 => {
                Duration::from_secs(cookie.max_age.unsigned_abs())
            }
            SessionExpiry::CookieMaxAge => panic!("expires_max_age requires a positive max_age"),
            SessionExpiry::Duration(duration) => duration,
        });

        let kv = Arc::new(self.store);
        let sweep_every = ttl.filter(|_| kv.spawn_maintenance_task());

        let locks = (0..LOCK_STRIPES).map(|_| Mutex::new(())).collect();

        SessionStore(Arc::new(SessionStoreInner {
            kv,
            cookie,
            signer: CookieSigner::new(self.secret),
            ttl,
            locks,
            sweep_every,
            sweep: OnceLock::new(),
        }))
    }
}
