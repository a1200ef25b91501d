//! In-process provider for tests. Never talks to the network.

use oauth2::url::Url;
use serde::{Deserialize, Serialize};

use crate::{BoxFuture, OAuthError, Params, Result, Token, User, session::require_auth_url};

pub const NAME: &str = "faux";
pub const AUTH_URL: &str = "http://example.com/auth";

/// Authorizes every callback with the access token `"access"`.
#[derive(Debug, Clone)]
pub struct Faux {
    name: String,
}

impl Default for Faux {
    fn default() -> Self {
        Self {
            name: NAME.to_owned(),
        }
    }
}

impl Faux {
    pub fn new() -> Self {
        Self::default()
    }
}

impl crate::Provider for Faux {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn begin_auth(&self, state: &str) -> Result<Box<dyn crate::Session>> {
        let url = Url::parse_with_params(
            AUTH_URL,
            &[("client_id", ""), ("response_type", "code"), ("state", state)],
        )?;

        Ok(Box::new(Session {
            id: "id".into(),
            auth_url: url.into(),
            ..Default::default()
        }))
    }

    fn unmarshal_session(&self, data: &str) -> Result<Box<dyn crate::Session>> {
        let session: Session = serde_json::from_str(data)?;
        Ok(Box::new(session))
    }

    fn fetch_user<'a>(&'a self, session: &'a dyn crate::Session) -> BoxFuture<'a, Result<User>> {
        Box::pin(async move {
            let session: Session = serde_json::from_str(&session.marshal()?)?;

            if session.access_token.is_empty() {
                return Err(OAuthError::FetchUser(format!(
                    "{} cannot get user information without accessToken",
                    self.name
                )));
            }

            Ok(User {
                user_id: session.id,
                name: session.name,
                email: session.email,
                provider: self.name.clone(),
                access_token: session.access_token,
                ..Default::default()
            })
        })
    }

    fn set_debug(&mut self, _: bool) {}

    fn refresh_token_available(&self) -> bool {
        false
    }

    fn refresh_token<'a>(&'a self, _: &'a str) -> BoxFuture<'a, Result<Token>> {
        Box::pin(async move { Err(OAuthError::RefreshUnsupported(self.name.clone())) })
    }

    fn exchange_code<'a>(&'a self, _: &'a str) -> BoxFuture<'a, Result<Token>> {
        Box::pin(async { Ok(Token::new("access")) })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "ID", default)]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Email", default)]
    pub email: String,
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
        _: &'a dyn crate::Provider,
        _: &'a Params,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.access_token = "access".into();
            Ok(self.access_token.clone())
        })
    }

    fn marshal(&self) -> Result<String> {
        serde_json::to_string(self).map_err(OAuthError::Encode)
    }
}
