//! OAuth2 plumbing shared by the bundled providers.

use std::{borrow::Cow, time::Duration};

use chrono::{TimeDelta, Utc};
use oauth2::{
    AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret, CsrfToken, EndpointNotSet,
    EndpointSet, ExtraTokenFields, RedirectUrl, RefreshToken, Scope, StandardRevocableToken,
    StandardTokenResponse, TokenResponse as _, TokenUrl,
    basic::{
        BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
        BasicTokenType,
    },
    reqwest::Client as HttpClient,
    url::Url,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    BuilderError, OAuthError, Result, Token, http::default_reqwest_client, utils::get_env,
};

const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Extra fields some providers add to the token response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdTokenFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl ExtraTokenFields for IdTokenFields {}

pub(crate) type TokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;

pub(crate) type OAuth2Client = Client<
    BasicErrorResponse,
    TokenResponse,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

/// A configured OAuth2 client for one provider instance.
pub struct Adapter {
    pub(crate) name: String,
    client: OAuth2Client,
    scopes: Vec<Scope>,
    auth_params: Vec<(String, String)>,
    profile_url: Option<Url>,
    http_client: HttpClient,
    exchange_timeout: Duration,
    debug: bool,
}

impl Adapter {
    pub fn builder(name: impl Into<Cow<'static, str>>) -> AdapterBuilder {
        AdapterBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn set_debug(&mut self, debug: bool) {
        self.debug = debug;
    }

    pub fn http_client(&self) -> &HttpClient {
        &self.http_client
    }

    pub fn redirect_url(&self) -> &str {
        self.client
            .redirect_uri()
            .map(|url| url.as_str())
            .unwrap_or_default()
    }

    /// Authorization url with `state` as its `state` query parameter.
    pub fn auth_code_url(&self, state: &str) -> String {
        let mut req = self
            .client
            .authorize_url(|| CsrfToken::new(state.to_owned()))
            .add_scopes(self.scopes.iter().cloned());

        for (key, value) in &self.auth_params {
            req = req.add_extra_param(key.as_str(), value.as_str());
        }

        let (url, _) = req.url();
        if self.debug {
            tracing::debug!(provider = %self.name, "auth url: {url}");
        }
        url.to_string()
    }

    pub async fn exchange_code(&self, code: &str) -> Result<Token> {
        tracing::debug!(provider = %self.name, "exchanging code for an access token");
        let request = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_owned()))
            .request_async(&self.http_client);

        let response = tokio::time::timeout(self.exchange_timeout, request)
            .await
            .map_err(|_| OAuthError::Exchange("token exchange timed out".into()))?
            .map_err(|e| OAuthError::Exchange(e.to_string()))?;

        Ok(self.token_from_response(&response))
    }

    pub async fn refresh_token(&self, refresh_token: &str) -> Result<Token> {
        tracing::debug!(provider = %self.name, "refreshing access token");
        let refresh_token = RefreshToken::new(refresh_token.to_owned());
        let request = self
            .client
            .exchange_refresh_token(&refresh_token)
            .request_async(&self.http_client);

        let response = tokio::time::timeout(self.exchange_timeout, request)
            .await
            .map_err(|_| OAuthError::Exchange("token refresh timed out".into()))?
            .map_err(|e| OAuthError::Exchange(e.to_string()))?;

        Ok(self.token_from_response(&response))
    }

    fn token_from_response(&self, response: &TokenResponse) -> Token {
        let expires_at = response
            .expires_in()
            .and_then(|d| TimeDelta::from_std(d).ok())
            .map(|d| Utc::now() + d);

        if self.debug {
            tracing::debug!(
                provider = %self.name,
                refresh_token = response.refresh_token().is_some(),
                ?expires_at,
                "received token"
            );
        }

        Token {
            access_token: response.access_token().secret().clone(),
            token_type: Some(response.token_type().as_ref().to_owned()),
            refresh_token: response.refresh_token().map(|t| t.secret().clone()),
            expires_at,
            id_token: response.extra_fields().id_token.clone(),
        }
    }

    /// GETs `url` (or the configured profile url) with the access token as bearer.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        url: Option<&str>,
        access_token: &str,
    ) -> Result<T> {
        if access_token.is_empty() {
            return Err(OAuthError::FetchUser(format!(
                "{} cannot get user information without accessToken",
                self.name
            )));
        }

        let url = match (url, &self.profile_url) {
            (Some(url), _) => url,
            (None, Some(profile_url)) => profile_url.as_str(),
            (None, None) => {
                return Err(OAuthError::FetchUser(format!(
                    "{} has no profile url",
                    self.name
                )));
            }
        };

        // the deadline covers the body as well as the headers
        let request = async {
            let response = self
                .http_client
                .get(url)
                .bearer_auth(access_token)
                .header("Accept", "application/json")
                .header("User-Agent", "axum-social")
                .send()
                .await
                .map_err(|e| OAuthError::FetchUser(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(OAuthError::FetchUser(format!(
                    "{} responded with status {status} while fetching user",
                    self.name
                )));
            }

            response
                .text()
                .await
                .map_err(|e| OAuthError::FetchUser(e.to_string()))
        };

        let body = tokio::time::timeout(self.exchange_timeout, request)
            .await
            .map_err(|_| OAuthError::FetchUser("profile request timed out".into()))??;

        if self.debug {
            tracing::debug!(provider = %self.name, "profile response: {body}");
        }

        serde_json::from_str(&body).map_err(|e| OAuthError::FetchUser(e.to_string()))
    }

    pub fn profile_url(&self) -> Option<&str> {
        self.profile_url.as_ref().map(Url::as_str)
    }
}

pub struct AdapterBuilder {
    name: Cow<'static, str>,
    redirect_url: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    scopes: Vec<Scope>,
    auth_params: Vec<(String, String)>,
    auth_url: Option<String>,
    token_url: Option<String>,
    profile_url: Option<String>,
    http_client: Option<HttpClient>,
    exchange_timeout: Duration,
    debug: bool,
}

impl AdapterBuilder {
    pub fn new(name: impl Into<Cow<'static, str>>) -> AdapterBuilder {
        Self {
            name: name.into(),
            redirect_url: None,
            client_id: None,
            client_secret: None,
            scopes: Vec::new(),
            auth_params: Vec::new(),
            auth_url: None,
            token_url: None,
            profile_url: None,
            http_client: None,
            exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT,
            debug: false,
        }
    }

    pub fn redirect_url(mut self, url: impl Into<String>) -> Self {
        self.redirect_url = Some(url.into());
        self
    }

    pub fn redirect_url_env(mut self, name: &str) -> Self {
        self.redirect_url = get_env(name);
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn client_id_env(mut self, name: &str) -> Self {
        self.client_id = get_env(name);
        self
    }

    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn client_secret_env(mut self, name: &str) -> Self {
        self.client_secret = get_env(name);
        self
    }

    pub fn auth_url(mut self, auth_url: impl Into<String>) -> Self {
        self.auth_url = Some(auth_url.into());
        self
    }

    pub fn token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = Some(token_url.into());
        self
    }

    pub fn profile_url(mut self, profile_url: impl Into<String>) -> Self {
        self.profile_url = Some(profile_url.into());
        self
    }

    pub fn scopes(mut self, scopes: &[&str]) -> Self {
        self.scopes = scopes.iter().map(|s| Scope::new(s.to_string())).collect();
        self
    }

    /// Extra query parameter on the authorization url.
    pub fn auth_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth_params.push((key.into(), value.into()));
        self
    }

    pub fn http_client(mut self, http_client: HttpClient) -> Self {
        self.http_client = Some(http_client);
        self
    }

    /// Upper bound for token exchange, refresh and profile requests.
    pub fn exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = timeout;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub(crate) fn defaults(mut self, auth_url: &str, token_url: &str, profile_url: &str) -> Self {
        self.auth_url.get_or_insert_with(|| auth_url.to_owned());
        self.token_url.get_or_insert_with(|| token_url.to_owned());
        self.profile_url.get_or_insert_with(|| profile_url.to_owned());
        self
    }

    pub(crate) fn default_scopes(mut self, scopes: &[&str]) -> Self {
        if self.scopes.is_empty() {
            self = self.scopes(scopes);
        }
        self
    }

    pub fn build(self) -> Adapter {
        match self.try_build() {
            Ok(adapter) => adapter,
            Err(e) => panic!("invalid oauth2 provider configuration: {e}"),
        }
    }

    pub fn try_build(self) -> Result<Adapter, BuilderError> {
        if self.name.find(|c: char| c.is_whitespace()).is_some() {
            return Err(BuilderError::WhitespaceInProviderName);
        }

        let client_id = self
            .client_id
            .ok_or(BuilderError::MissingClientId)
            .map(ClientId::new)?;

        let redirect_url = self.redirect_url.ok_or(BuilderError::MissingRedirectUrl)?;

        let redirect_url =
            RedirectUrl::new(redirect_url).map_err(BuilderError::InvalidRedirectUrl)?;

        let auth_url = self.auth_url.ok_or(BuilderError::MissingAuthUrl)?;

        let auth_url = AuthUrl::new(auth_url).map_err(BuilderError::InvalidAuthUrl)?;

        let token_url = self.token_url.ok_or(BuilderError::MissingTokenUrl)?;

        let token_url = TokenUrl::new(token_url).map_err(BuilderError::InvalidTokenUrl)?;

        let profile_url = self
            .profile_url
            .map(|url| Url::parse(&url))
            .transpose()
            .map_err(BuilderError::InvalidProfileUrl)?;

        let mut client = Client::new(client_id)
            .set_redirect_uri(redirect_url)
            .set_auth_uri(auth_url)
            .set_token_uri(token_url);

        if let Some(client_secret) = self.client_secret {
            client = client.set_client_secret(ClientSecret::new(client_secret));
        }

        Ok(Adapter {
            name: self.name.into_owned(),
            client,
            scopes: self.scopes,
            auth_params: self.auth_params,
            profile_url,
            http_client: self.http_client.unwrap_or_else(default_reqwest_client),
            exchange_timeout: self.exchange_timeout,
            debug: self.debug,
        })
    }
}

#[cfg(test)]
mod builder {
    use crate::{
        BuilderError,
        providers::{Adapter, github},
    };

    const CLIENT_ID: &str = "test_client_id";
    const CLIENT_SECRET: &str = "test_client_secret";
    const REDIRECT_URL: &str = "http://rust-lang.org/redirect";
    const AUTH_URL: &str = github::AUTH_URL;
    const TOKEN_URL: &str = github::TOKEN_URL;

    #[test]
    fn builder_errors() {
        let res = Adapter::builder("github")
            .client_id(CLIENT_ID)
            .client_secret(CLIENT_SECRET)
            .auth_url(AUTH_URL)
            .token_url(TOKEN_URL)
            .redirect_url(REDIRECT_URL)
            .try_build();

        assert!(res.is_ok());

        let res = Adapter::builder("github")
            .client_id(CLIENT_ID)
            .auth_url(AUTH_URL)
            .token_url(TOKEN_URL)
            .redirect_url(REDIRECT_URL)
            .try_build();

        assert!(res.is_ok());
    }

    #[test]
    fn client_id() {
        let res = Adapter::builder("github")
            .client_secret(CLIENT_SECRET)
            .auth_url(AUTH_URL)
            .token_url(TOKEN_URL)
            .redirect_url(REDIRECT_URL)
            .try_build();

        assert!(matches!(res, Err(BuilderError::MissingClientId)));
    }

    #[test]
    fn auth_url() {
        let res = Adapter::builder("github")
            .client_id(CLIENT_ID)
            .token_url(TOKEN_URL)
            .redirect_url(REDIRECT_URL)
            .try_build();

        assert!(matches!(res, Err(BuilderError::MissingAuthUrl)));

        let res = Adapter::builder("github")
            .client_id(CLIENT_ID)
            .auth_url("not an url")
            .token_url(TOKEN_URL)
            .redirect_url(REDIRECT_URL)
            .try_build();

        assert!(matches!(res, Err(BuilderError::InvalidAuthUrl(_))));
    }

    #[test]
    fn token_url() {
        let res = Adapter::builder("github")
            .client_id(CLIENT_ID)
            .auth_url(AUTH_URL)
            .redirect_url(REDIRECT_URL)
            .try_build();

        assert!(matches!(res, Err(BuilderError::MissingTokenUrl)));

        let res = Adapter::builder("github")
            .client_id(CLIENT_ID)
            .auth_url(AUTH_URL)
            .token_url("not an url")
            .redirect_url(REDIRECT_URL)
            .try_build();

        assert!(matches!(res, Err(BuilderError::InvalidTokenUrl(_))));
    }

    #[test]
    fn redirect_url() {
        let res = Adapter::builder("github")
            .client_id(CLIENT_ID)
            .auth_url(AUTH_URL)
            .token_url(TOKEN_URL)
            .try_build();

        assert!(matches!(res, Err(BuilderError::MissingRedirectUrl)));

        let res = Adapter::builder("github")
            .client_id(CLIENT_ID)
            .auth_url(AUTH_URL)
            .token_url(TOKEN_URL)
            .redirect_url("not an url")
            .try_build();

        assert!(matches!(res, Err(BuilderError::InvalidRedirectUrl(_))));
    }

    #[test]
    fn provider_name() {
        let res = Adapter::builder("github ")
            .client_id(CLIENT_ID)
            .auth_url(AUTH_URL)
            .token_url(TOKEN_URL)
            .redirect_url(REDIRECT_URL)
            .try_build();

        assert!(matches!(res, Err(BuilderError::WhitespaceInProviderName)));
    }

    #[test]
    fn auth_code_url() {
        let adapter = Adapter::builder("github")
            .client_id(CLIENT_ID)
            .auth_url(AUTH_URL)
            .token_url(TOKEN_URL)
            .redirect_url(REDIRECT_URL)
            .scopes(&["user:email"])
            .auth_param("allow_signup", "false")
            .build();

        let url = oauth2::url::Url::parse(&adapter.auth_code_url("abc123")).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert!(pairs.contains(&("state".into(), "abc123".into())));
        assert!(pairs.contains(&("client_id".into(), CLIENT_ID.into())));
        assert!(pairs.contains(&("redirect_uri".into(), REDIRECT_URL.into())));
        assert!(pairs.contains(&("scope".into(), "user:email".into())));
        assert!(pairs.contains(&("allow_signup".into(), "false".into())));
        assert_eq!(adapter.redirect_url(), REDIRECT_URL);
    }
}
