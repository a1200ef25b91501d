use std::fmt::Debug;

use chrono::{DateTime, Utc};

use crate::{BoxFuture, OAuthError, Params, Provider, Result};

/// One in-flight or completed authorization with a single provider.
///
/// Every provider ships its own session type carrying the fields it needs
/// (refresh token, expiry, id token). Sessions are stored as the string
/// produced by [`Session::marshal`] and turned back into a typed value by the
/// owning provider's [`Provider::unmarshal_session`].
///
/// The auth url must keep the state token as its `state` query parameter, the
/// [`StateGuard`](crate::StateGuard) validates callbacks against it.
pub trait Session: Debug + Send + Sync {
    /// Fails with [`OAuthError::MissingAuthUrl`] until `begin_auth` has run.
    fn auth_url(&self) -> Result<&str>;

    /// Empty until [`Session::authorize`] succeeded.
    fn access_token(&self) -> &str;

    fn refresh_token(&self) -> Option<&str> {
        None
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Exchanges the callback's authorization code and stores the returned
    /// tokens in the session.
    fn authorize<'a>(
        &'a mut self,
        provider: &'a dyn Provider,
        params: &'a Params,
    ) -> BoxFuture<'a, Result<String>>;

    /// Deterministic, lossless encoding that the provider can unmarshal.
    fn marshal(&self) -> Result<String>;
}

pub(crate) fn require_auth_url(auth_url: &str) -> Result<&str> {
    if auth_url.is_empty() {
        Err(OAuthError::MissingAuthUrl)
    } else {
        Ok(auth_url)
    }
}
