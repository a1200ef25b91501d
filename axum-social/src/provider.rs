//! The provider capability set.
//!
//! A [`Provider`] is a thin client for one identity provider. It starts the
//! authorization flow by producing a [`Session`], exchanges authorization codes
//! for tokens and fetches the authenticated user's profile. Providers are
//! shared between requests behind an `Arc` and hold only configuration.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::{BoxFuture, OAuthError, Params, Result, Session};

/// Tokens expiring sooner than this are treated as already expired.
const EXPIRY_DELTA: TimeDelta = TimeDelta::seconds(10);

pub trait Provider: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Renames the provider, needed when several instances of one vendor are registered.
    fn set_name(&mut self, name: String);

    /// Creates a session whose auth url carries `state`.
    fn begin_auth(&self, state: &str) -> Result<Box<dyn Session>>;

    fn unmarshal_session(&self, data: &str) -> Result<Box<dyn Session>>;

    fn fetch_user<'a>(&'a self, session: &'a dyn Session) -> BoxFuture<'a, Result<User>>;

    fn set_debug(&mut self, debug: bool);

    fn refresh_token_available(&self) -> bool;

    fn refresh_token<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, Result<Token>>;

    /// Trades an authorization code at the provider's token endpoint.
    fn exchange_code<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<Token>>;
}

/// Token set returned by a provider's token endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub token_type: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub id_token: Option<String>,
}

impl Token {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            ..Default::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.access_token.is_empty() && !self.is_expired()
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expiry| expiry - EXPIRY_DELTA < Utc::now())
    }
}

/// The normalized user record handed to application code, whatever the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub provider: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl User {
    pub(crate) fn from_session(provider: &dyn Provider, session: &dyn Session) -> Self {
        User {
            provider: provider.name().to_owned(),
            access_token: session.access_token().to_owned(),
            refresh_token: session.refresh_token().map(str::to_owned),
            expires_at: session.expires_at(),
            ..Default::default()
        }
    }
}

/// Exchanges the callback's `code` and rejects tokens that are empty or expired.
pub async fn exchange_callback(provider: &dyn Provider, params: &Params) -> Result<Token> {
    if let Some(error) = params.get("error") {
        return Err(OAuthError::Denied(error.to_owned()));
    }

    let code = params.code().ok_or(OAuthError::MissingParam("code"))?;
    let token = provider.exchange_code(code).await?;

    if !token.is_valid() {
        return Err(OAuthError::Exchange(
            "invalid token received from provider".into(),
        ));
    }

    Ok(token)
}
