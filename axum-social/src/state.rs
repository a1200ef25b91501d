//! CSRF protection for the authorization code flow.
//!
//! The state token issued when a flow starts is embedded in the session's auth
//! url. On callback the state echoed back by the provider has to match the one
//! recorded in that specific session, so concurrent flows (other tabs, other
//! providers) never validate against each other.

use std::sync::Arc;

use base64::{Engine, prelude::BASE64_URL_SAFE};
use oauth2::url::Url;
use rand::{TryRngCore, rngs::OsRng};

use crate::{OAuthError, Params, Result, Session};

/// Number of random bytes in a generated state token.
pub const STATE_BYTES: usize = 64;

/// Produces fresh state tokens.
pub trait StateGenerator: Send + Sync + 'static {
    fn generate(&self) -> String;
}

impl<F> StateGenerator for F
where
    F: Fn() -> String + Send + Sync + 'static,
{
    fn generate(&self) -> String {
        self()
    }
}

/// 64 bytes from the operating system's CSPRNG, url-safe base64 encoded.
///
/// # Panics
///
/// When the OS random source fails. There is no weaker fallback.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomState;

impl StateGenerator for RandomState {
    fn generate(&self) -> String {
        let mut nonce = [0u8; STATE_BYTES];
        if let Err(e) = OsRng.try_fill_bytes(&mut nonce) {
            tracing::error!("source of randomness unavailable: {e}");
            panic!("source of randomness unavailable: {e}");
        }
        BASE64_URL_SAFE.encode(nonce)
    }
}

#[derive(Clone)]
pub struct StateGuard {
    generator: Arc<dyn StateGenerator>,
}

impl Default for StateGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StateGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateGuard").finish_non_exhaustive()
    }
}

impl StateGuard {
    pub fn new() -> Self {
        Self::with_generator(RandomState)
    }

    pub fn with_generator(generator: impl StateGenerator) -> Self {
        Self {
            generator: Arc::new(generator),
        }
    }

    /// A caller supplied `state` query parameter is used verbatim, otherwise a
    /// new token is generated.
    pub fn issue_state(&self, query: &Params) -> String {
        match query.get("state") {
            Some(state) if !state.is_empty() => state.to_owned(),
            _ => self.generator.generate(),
        }
    }

    /// The state echoed back on callback, empty when absent.
    pub fn extract_state<'a>(&self, params: &'a Params) -> &'a str {
        params.value("state")
    }

    /// Checks the callback state against the one embedded in the session's
    /// auth url.
    ///
    /// An auth url without a `state` parameter passes regardless of what the
    /// callback carries. Providers that can't echo state depend on this.
    pub fn validate_state(&self, params: &Params, session: &dyn Session) -> Result<()> {
        let auth_url = parse_auth_url(session.auth_url()?)?;

        let original_state = auth_url
            .query_pairs()
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value.into_owned())
            .unwrap_or_default();

        if original_state.is_empty() {
            tracing::warn!("auth url carries no state, skipping state validation");
            return Ok(());
        }

        if original_state != self.extract_state(params) {
            tracing::debug!("state does not match");
            return Err(OAuthError::StateMismatch);
        }

        Ok(())
    }
}

fn parse_auth_url(raw: &str) -> Result<Url> {
    match Url::parse(raw) {
        Err(oauth2::url::ParseError::RelativeUrlWithoutBase) => {
            let base = Url::parse("http://localhost")?;
            Ok(base.join(raw)?)
        }
        res => Ok(res?),
    }
}
