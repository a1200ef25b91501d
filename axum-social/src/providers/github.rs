use serde::{Deserialize, Serialize};

use crate::{
    BoxFuture, BuilderError, OAuthError, Params, Result, User,
    provider::{Token, exchange_callback},
    providers::{Adapter, AdapterBuilder},
    session::require_auth_url,
};

pub const NAME: &str = "github";
pub const AUTH_URL: &str = "https://github.com/login/oauth/authorize";
pub const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
pub const PROFILE_URL: &str = "https://api.github.com/user";

/// GitHub OAuth app. Access tokens don't expire and there is no refresh.
pub struct GitHub {
    adapter: Adapter,
}

impl GitHub {
    pub fn builder() -> AdapterBuilder {
        Adapter::builder(NAME)
    }

    pub fn new(builder: AdapterBuilder) -> Result<Self, BuilderError> {
        let adapter = builder
            .defaults(AUTH_URL, TOKEN_URL, PROFILE_URL)
            .default_scopes(&["user:email"])
            .try_build()?;
        Ok(Self { adapter })
    }

    fn emails_url(&self) -> Option<String> {
        self.adapter.profile_url().map(|url| format!("{url}/emails"))
    }

    async fn primary_email(&self, access_token: &str) -> Result<String> {
        let url = self.emails_url();
        let emails: Vec<Email> = self.adapter.fetch_json(url.as_deref(), access_token).await?;

        emails
            .into_iter()
            .find(|e| e.primary && e.verified)
            .map(|e| e.email)
            .ok_or_else(|| OAuthError::FetchUser("no verified primary email".into()))
    }
}

#[derive(Debug, Deserialize)]
struct Profile {
    id: u64,
    login: String,
    name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Email {
    email: String,
    primary: bool,
    verified: bool,
}

impl crate::Provider for GitHub {
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

            user.user_id = profile.id.to_string();
            user.name = profile.name.unwrap_or(profile.login);
            user.email = match profile.email.filter(|e| !e.is_empty()) {
                Some(email) => email,
                None => self.primary_email(&user.access_token).await?,
            };

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
}

impl crate::Session for Session {
    fn auth_url(&self) -> Result<&str> {
        require_auth_url(&self.auth_url)
    }

    fn access_token(&self) -> &str {
        &self.access_token
    }

    fn authorize<'a>(
        &'a mut self,
        provider: &'a dyn crate::Provider,
        params: &'a Params,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let token = exchange_callback(provider, params).await?;
            self.access_token = token.access_token;
            Ok(self.access_token.clone())
        })
    }

    fn marshal(&self) -> Result<String> {
        serde_json::to_string(self).map_err(OAuthError::Encode)
    }
}
