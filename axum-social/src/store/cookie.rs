use std::{borrow::Cow, cmp::Ordering};

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use cookie_monster::{Cookie, SameSite};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::store::SessionId;

pub const DEFAULT_COOKIE_NAME: &str = "oauth2.session";

const HMAC_HASH_LEN: usize = 32;

/// Attributes of the session cookie.
///
/// `max_age` follows the usual convention: `0` is a browser session cookie,
/// a negative value expires the cookie immediately and a positive value is
/// the lifetime in seconds.
#[derive(Debug, Clone)]
pub struct CookieOptions {
    pub name: Cow<'static, str>,
    pub path: Cow<'static, str>,
    pub domain: Option<Cow<'static, str>>,
    pub max_age: i64,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            name: Cow::Borrowed(DEFAULT_COOKIE_NAME),
            path: Cow::Borrowed("/"),
            domain: None,
            max_age: 0,
            secure: true,
            http_only: true,
            same_site: SameSite::Lax,
        }
    }
}

impl CookieOptions {
    /// Plain http friendly options for local development.
    pub fn dev() -> Self {
        Self {
            secure: false,
            ..Self::default()
        }
    }

    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    pub fn path(mut self, path: impl Into<Cow<'static, str>>) -> Self {
        self.path = path.into();
        self
    }

    pub fn domain(mut self, domain: impl Into<Cow<'static, str>>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn max_age(mut self, max_age: i64) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    pub(crate) fn build(&self, value: String, max_age: i64) -> Cookie {
        let mut builder = Cookie::named(self.name.clone())
            .value(value)
            .path(self.path.clone())
            .same_site(self.same_site);

        if let Some(domain) = &self.domain {
            builder = builder.domain(domain.clone());
        }
        if self.http_only {
            builder = builder.http_only();
        }
        if self.secure {
            builder = builder.secure();
        }

        match max_age.cmp(&0) {
            Ordering::Greater => builder = builder.max_age_secs(max_age.unsigned_abs()),
            Ordering::Less => builder = builder.max_age_secs(0),
            Ordering::Equal => {}
        }

        builder.build()
    }
}

/// Signs record ids so a cookie can't point at a record it wasn't issued for.
///
/// The cookie value is `base64url(id || hmac_sha256(id))`.
#[derive(Clone)]
pub(crate) struct CookieSigner {
    secret: Hmac<Sha256>,
}

impl CookieSigner {
    pub(crate) fn new(secret: Option<Vec<u8>>) -> Self {
        let secret = if let Some(secret) = secret {
            secret
        } else {
            let mut secret = [0u8; 32];
            rand::rng().fill_bytes(&mut secret);
            secret.to_vec()
        };

        let secret = Hmac::new_from_slice(&secret).expect("Hmac accepts any secret length");
        Self { secret }
    }

    pub(crate) fn sign(&self, id: &SessionId) -> String {
        let mut data = id.as_str().as_bytes().to_vec();

        let mut hmac = self.secret.clone();
        hmac.update(&data);
        let signature = hmac.finalize().into_bytes();

        data.extend_from_slice(&signature);
        BASE64_URL_SAFE_NO_PAD.encode(data)
    }

    /// `None` for anything this signer didn't produce.
    pub(crate) fn verify(&self, value: &str) -> Option<SessionId> {
        let decoded = BASE64_URL_SAFE_NO_PAD.decode(value).ok()?;
        if decoded.len() <= HMAC_HASH_LEN {
            return None;
        }

        let (data, received_signature) = decoded.split_at(decoded.len() - HMAC_HASH_LEN);

        let mut hmac = self.secret.clone();
        hmac.update(data);
        let signature = hmac.finalize().into_bytes();

        if !bool::from(received_signature.ct_eq(&signature[..])) {
            return None;
        }

        let id = std::str::from_utf8(data).ok()?;
        Some(SessionId::from(id.to_owned()))
    }
}
