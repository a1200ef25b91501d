use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    BoxFuture, BuilderError, OAuthError, Params, Result, Timestamp, User,
    provider::{Token, exchange_callback},
    providers::{Adapter, AdapterBuilder},
    session::require_auth_url,
};

pub const NAME: &str = "discord";
pub const AUTH_URL: &str = "https://discord.com/api/oauth2/authorize";
pub const TOKEN_URL: &str = "https://discord.com/api/oauth2/token";
pub const PROFILE_URL: &str = "https://discord.com/api/users/@me";

pub struct Discord {
    adapter: Adapter,
}

impl Discord {
    pub fn builder() -> AdapterBuilder {
        Adapter::builder(NAME)
    }

    pub fn new(builder: AdapterBuilder) -> Result<Self, BuilderError> {
        let adapter = builder
            .defaults(AUTH_URL, TOKEN_URL, PROFILE_URL)
            .default_scopes(&["identify", "email"])
            .try_build()?;
        Ok(Self { adapter })
    }
}

#[derive(Debug, Deserialize)]
struct Profile {
    id: String,
    username: String,
    global_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

impl crate::Provider for Discord {
    fn name(&self) -> &str {
        self.adapter.name()
    }

    fn set_name(&mut self, name: String) {
        self.adapter.set_name(name);
    }

    fn begin_auth(&self, state: &str) -> Result<Box<dyn crate::Session>> {
        Ok(Box::new(Session {
            auth_url: self.adapter.auth_code_url(state),
            ..Default::default()
        }))
    }

    fn unmarshal_session(&self, data: &str) -> Result<Box<dyn crate::Session>> {
        let session: Session = serde_json::from_str(data)?;
        Ok(Box::new(session))
    }

    fn fetch_user<'a>(&'a self, session: &'a dyn crate::Session) -> BoxFuture<'a, Result<User>> {
        Box::pin(async move {
            let mut user = User::from_session(self, session);
            let profile: Profile = self.adapter.fetch_json(None, &user.access_token).await?;

            user.user_id = profile.id;
            user.name = profile.global_name.unwrap_or(profile.username);
            user.email = profile.email.unwrap_or_default();
            Ok(user)
        })
    }

    fn set_debug(&mut self, debug: bool) {
        self.adapter.set_debug(debug);
    }

    fn refresh_token_available(&self) -> bool {
        true
    }

    fn refresh_token<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, Result<Token>> {
        Box::pin(self.adapter.refresh_token(refresh_token))
    }

    fn exchange_code<'a>(&'a self, code: &'a str) -> BoxFuture<'a, Result<Token>> {
        Box::pin(self.adapter.exchange_code(code))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "AuthURL", default)]
    pub auth_url: String,
    #[serde(rename = "AccessToken", default)]
    pub access_token: String,
    #[serde(rename = "RefreshToken", default)]
    pub refresh_token: String,
    #[serde(rename = "ExpiresAt", default)]
    pub expires_at: Timestamp,
}

impl crate::Session for Session {
    fn auth_url(&self) -> Result<&str> {
        require_auth_url(&self.auth_url)
    }

    fn access_token(&self) -> &str {
        &self.access_token
    }

    fn refresh_token(&self) -> Option<&str> {
        Some(self.refresh_token.as_str()).filter(|t| !t.is_empty())
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at.to_option()
    }

    fn authorize<'a>(
        &'a mut self,
        provider: &'a dyn crate::Provider,
        params: &'a Params,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let token = exchange_callback(provider, params).await?;
            self.access_token = token.access_token;
            self.refresh_token = token.refresh_token.unwrap_or_default();
            self.expires_at = token.expires_at.into();
            Ok(self.access_token.clone())
        })
    }

    fn marshal(&self) -> Result<String> {
        serde_json::to_string(self).map_err(OAuthError::Encode)
    }
}
