use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    BoxFuture, BuilderError, OAuthError, Params, Result, Timestamp, User,
    provider::{Token, exchange_callback},
    providers::{Adapter, AdapterBuilder},
    session::require_auth_url,
};

pub const NAME: &str = "google";
pub const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const PROFILE_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Google sign-in. Request offline access with
/// `.auth_param("access_type", "offline")` to receive a refresh token.
pub struct Google {
    adapter: Adapter,
}

impl Google {
    pub fn builder() -> AdapterBuilder {
        Adapter::builder(NAME)
    }

    pub fn new(builder: AdapterBuilder) -> Result<Self, BuilderError> {
        let adapter = builder
            .defaults(AUTH_URL, TOKEN_URL, PROFILE_URL)
            .default_scopes(&["openid", "email", "profile"])
            .try_build()?;
        Ok(Self { adapter })
    }
}

#[derive(Debug, Deserialize)]
struct Profile {
    id: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    name: String,
}

impl crate::Provider for Google {
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
    #[serde(rename = "IDToken", default)]
    pub id_token: String,
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
            self.id_token = token.id_token.unwrap_or_default();
            Ok(self.access_token.clone())
        })
    }

    fn marshal(&self) -> Result<String> {
        serde_json::to_string(self).map_err(OAuthError::Encode)
    }
}

#[cfg(test)]
mod session {
    use chrono::{TimeZone, Utc};

    use crate::{
        OAuthError, Provider, Session as _,
        providers::{Google, google::Session},
    };

    #[test]
    fn auth_url() {
        let mut session = Session::default();
        assert!(matches!(session.auth_url(), Err(OAuthError::MissingAuthUrl)));

        session.auth_url = "/foo".into();
        assert_eq!(session.auth_url().unwrap(), "/foo");
    }

    #[test]
    fn to_json() {
        let data = Session::default().marshal().unwrap();
        assert_eq!(
            data,
            r#"{"AuthURL":"","AccessToken":"","RefreshToken":"","ExpiresAt":"0001-01-01T00:00:00Z","IDToken":""}"#
        );
    }

    #[test]
    fn unmarshal_keeps_every_field() {
        let provider = Google::new(
            Google::builder()
                .client_id("client")
                .redirect_url("http://localhost:3000/auth/google/callback"),
        )
        .unwrap();

        let session = Session {
            auth_url: "https://accounts.google.com/o/oauth2/auth?state=abc".into(),
            access_token: "at".into(),
            refresh_token: "rt".into(),
            expires_at: Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap().into(),
            id_token: "id".into(),
        };

        let restored = provider.unmarshal_session(&session.marshal().unwrap()).unwrap();
        assert_eq!(restored.marshal().unwrap(), session.marshal().unwrap());
        assert_eq!(restored.refresh_token(), Some("rt"));
        assert_eq!(
            restored.expires_at(),
            Some(Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).unwrap())
        );
        assert!(provider.refresh_token_available());
    }
}
