use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    BoxFuture, BuilderError, OAuthError, Params, Result, Timestamp, User,
    provider::{Token, exchange_callback},
    providers::{Adapter, AdapterBuilder},
    session::require_auth_url,
};

pub const NAME: &str = "facebook";
pub const AUTH_URL: &str = "https://www.facebook.com/dialog/oauth";
pub const TOKEN_URL: &str = "https://graph.facebook.com/oauth/access_token";
pub const PROFILE_URL: &str = "https://graph.facebook.com/me?fields=id,name,email";

/// Facebook login. Long lived tokens are not refreshed through the token endpoint.
pub struct Facebook {
    adapter: Adapter,
}

impl Facebook {
    pub fn builder() -> AdapterBuilder {
        Adapter::builder(NAME)
    }

    pub fn new(builder: AdapterBuilder) -> Result<Self, BuilderError> {
        let adapter = builder
            .defaults(AUTH_URL, TOKEN_URL, PROFILE_URL)
            .default_scopes(&["email"])
            .try_build()?;
        Ok(Self { adapter })
    }
}

#[derive(Debug, Deserialize)]
struct Profile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    email: String,
}

impl crate::Provider for Facebook {
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
            user.name = profile.name;
            user.email = profile.email;
            Ok(user)
        })
    }

    fn set_debug(&mut self, debug: bool) {
        self.adapter.set_debug(debug);
    }

    fn refresh_token_available(&self) -> bool {
        false
    }

    fn refresh_token<'a>(&'a self, _: &'a str) -> BoxFuture<'a, Result<Token>> {
        Box::pin(async move { Err(OAuthError::RefreshUnsupported(self.name().to_owned())) })
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
            self.expires_at = token.expires_at.into();
            Ok(self.access_token.clone())
        })
    }

    fn marshal(&self) -> Result<String> {
        serde_json::to_string(self).map_err(OAuthError::Encode)
    }
}
