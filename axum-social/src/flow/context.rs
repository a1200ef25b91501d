use std::{borrow::Cow, sync::Arc, time::Duration};

use axum::{
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use cookie_monster::{Cookie, CookieJar};

use crate::{
    OAuthError, Params, Provider, Providers, Result, StateGenerator, StateGuard, Token, User,
    flow::handler::{AfterLoginContext, ErasedOAuthHandler, OAuthHandler},
    store::{KeyValue, MemKv, SessionStore},
};

const DEFAULT_PREFIX: &str = "/auth";

/// Record lifetime used by [`OAuthContext::builder`]. Every anonymous login
/// attempt creates a record, so the in-memory default must not keep them forever.
pub const DEFAULT_RECORD_TTL: Duration = Duration::from_secs(60 * 60 * 24);

/// Everything the login routes need, shared between requests.
pub struct OAuthContext<K>(Arc<OAuthContextInner<K>>);

struct OAuthContextInner<K> {
    providers: Providers,
    guard: StateGuard,
    store: SessionStore<K>,
    handler: ErasedOAuthHandler,
    prefix: Cow<'static, str>,
    logout_path: Option<Cow<'static, str>>,
    error_redirect: Option<Cow<'static, str>>,
}

impl<K> Clone for OAuthContext<K> {
    fn clone(&self) -> Self {
        OAuthContext(self.0.clone())
    }
}

impl OAuthContext<MemKv> {
    /// Builder backed by an in-memory session store whose records expire
    /// after [`DEFAULT_RECORD_TTL`].
    pub fn builder() -> OAuthContextBuilder<MemKv> {
        let store = SessionStore::builder()
            .expires_after(DEFAULT_RECORD_TTL)
            .store(MemKv::new())
            .build();
        OAuthContextBuilder::new(store)
    }
}

impl<K: KeyValue> OAuthContext<K> {
    pub fn builder_with_store(store: SessionStore<K>) -> OAuthContextBuilder<K> {
        OAuthContextBuilder::new(store)
    }

    pub fn providers(&self) -> &Providers {
        &self.0.providers
    }

    pub fn store(&self) -> &SessionStore<K> {
        &self.0.store
    }

    pub fn guard(&self) -> &StateGuard {
        &self.0.guard
    }

    pub fn prefix(&self) -> &str {
        &self.0.prefix
    }

    pub fn logout_path(&self) -> Option<&str> {
        self.0.logout_path.as_deref()
    }

    /// Starts a login with `provider`.
    ///
    /// Returns the session cookie and the provider's authorization url. The
    /// session is persisted before the cookie is handed out.
    pub async fn begin_auth(
        &self,
        provider: &str,
        headers: &HeaderMap,
        params: &Params,
    ) -> Result<(Cookie, String)> {
        tracing::debug!(provider, "starting oauth2 login flow");
        let provider = self.0.providers.lookup(provider)?;

        let state = self.0.guard.issue_state(params);
        let session = provider.begin_auth(&state)?;
        let auth_url = session.auth_url()?.to_owned();

        let mut record = self.0.store.get_or_create(headers).await?;
        record.set(provider.name(), session.as_ref())?;
        let cookie = self.0.store.save(&mut record).await?;

        Ok((cookie, auth_url))
    }

    /// Finishes a login after the provider redirected back.
    ///
    /// The callback state must match the state recorded in this provider's
    /// session. A session that already holds an access token is reused when
    /// the provider still accepts it.
    pub async fn complete_auth(
        &self,
        provider: &str,
        headers: &HeaderMap,
        params: &Params,
    ) -> Result<(Cookie, User, crate::SessionSetRecord)> {
        let provider = self.0.providers.lookup(provider)?;
        let mut record = self.0.store.load(headers).await?;

        let mut session = match record.session(provider.as_ref()) {
            Ok(session) => session,
            Err(OAuthError::Decode(e)) => {
                tracing::warn!(provider = provider.name(), "discarding corrupted session: {e}");
                record.remove(provider.name());
                self.0.store.save(&mut record).await?;
                return Err(OAuthError::Decode(e));
            }
            Err(e) => return Err(e),
        };

        self.0.guard.validate_state(params, session.as_ref())?;

        if !session.access_token().is_empty() {
            match provider.fetch_user(session.as_ref()).await {
                Ok(user) => {
                    let cookie = self.0.store.cookie_for(record.id());
                    return Ok((cookie, user, record));
                }
                Err(e) => tracing::debug!("stored access token rejected, authorizing again: {e}"),
            }
        }

        session.authorize(provider.as_ref(), params).await?;

        record.set(provider.name(), session.as_ref())?;
        let cookie = self.0.store.save(&mut record).await?;

        let user = provider.fetch_user(session.as_ref()).await?;
        Ok((cookie, user, record))
    }

    /// Deletes the browser's session record. Returns the cookie that clears it.
    pub async fn logout(&self, headers: &HeaderMap) -> Result<Cookie> {
        match self.0.store.load(headers).await {
            Ok(mut record) => self.0.store.delete(&mut record).await,
            Err(
                OAuthError::MissingCookie
                | OAuthError::MalformedCookie
                | OAuthError::RecordNotFound(_)
                | OAuthError::Decode(_),
            ) => Ok(self.0.store.removal_cookie()),
            Err(e) => Err(e),
        }
    }

    pub async fn refresh_token(&self, provider: &str, refresh_token: &str) -> Result<Token> {
        let provider = self.0.providers.lookup(provider)?;
        if !provider.refresh_token_available() {
            return Err(OAuthError::RefreshUnsupported(provider.name().to_owned()));
        }
        provider.refresh_token(refresh_token).await
    }

    pub(crate) async fn on_begin(
        &self,
        provider: &str,
        headers: &HeaderMap,
        params: &Params,
    ) -> Response {
        match self.begin_auth(provider, headers, params).await {
            Ok((cookie, auth_url)) => {
                (StatusCode::FOUND, cookie, [(header::LOCATION, auth_url)]).into_response()
            }
            Err(e) => self.error_response(e),
        }
    }

    pub(crate) async fn on_callback(
        &self,
        provider: &str,
        mut jar: CookieJar,
        headers: &HeaderMap,
        params: &Params,
    ) -> Response {
        let (cookie, user, record) = match self.complete_auth(provider, headers, params).await {
            Ok(res) => res,
            Err(e) => return self.error_response(e),
        };

        jar.add(cookie);
        let context = AfterLoginContext {
            cookies: &mut jar,
            provider,
            record: &record,
        };

        tracing::debug!("login flow done");
        let res = self.0.handler.after_login(user, context).await;

        (jar, res).into_response()
    }

    pub(crate) async fn on_logout(&self, headers: &HeaderMap) -> Response {
        match self.logout(headers).await {
            Ok(cookie) => (StatusCode::NO_CONTENT, cookie, ()).into_response(),
            Err(e) => e.into_response(),
        }
    }

    fn error_response(&self, err: OAuthError) -> Response {
        match &self.0.error_redirect {
            Some(to) if err.status_code() == StatusCode::UNAUTHORIZED => {
                tracing::debug!("oauth flow failed, redirecting: {err}");
                (StatusCode::FOUND, [(header::LOCATION, to.to_string())]).into_response()
            }
            _ => err.into_response(),
        }
    }
}

pub struct OAuthContextBuilder<K> {
    providers: Providers,
    guard: StateGuard,
    store: SessionStore<K>,
    prefix: Cow<'static, str>,
    logout_path: Option<Cow<'static, str>>,
    error_redirect: Option<Cow<'static, str>>,
}

impl<K: KeyValue> OAuthContextBuilder<K> {
    pub fn new(store: SessionStore<K>) -> Self {
        Self {
            providers: Providers::new(),
            guard: StateGuard::new(),
            store,
            prefix: Cow::Borrowed(DEFAULT_PREFIX),
            logout_path: None,
            error_redirect: None,
        }
    }

    /// Uses an existing registry, later registrations stay visible.
    pub fn providers(mut self, providers: Providers) -> Self {
        self.providers = providers;
        self
    }

    pub fn provider(self, provider: impl Provider) -> Self {
        self.providers.register(provider);
        self
    }

    pub fn state_generator(mut self, generator: impl StateGenerator) -> Self {
        self.guard = StateGuard::with_generator(generator);
        self
    }

    pub fn session_store<K1: KeyValue>(self, store: SessionStore<K1>) -> OAuthContextBuilder<K1> {
        OAuthContextBuilder {
            providers: self.providers,
            guard: self.guard,
            store,
            prefix: self.prefix,
            logout_path: self.logout_path,
            error_redirect: self.error_redirect,
        }
    }

    /// Routes are mounted at `{prefix}/{provider}` and `{prefix}/{provider}/callback`.
    pub fn prefix(mut self, prefix: impl Into<Cow<'static, str>>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn logout_path(mut self, path: impl Into<Cow<'static, str>>) -> Self {
        self.logout_path = Some(path.into());
        self
    }

    /// Redirect failed logins here instead of answering with a status code.
    pub fn error_redirect(mut self, to: impl Into<Cow<'static, str>>) -> Self {
        self.error_redirect = Some(to.into());
        self
    }

    pub fn build<H: OAuthHandler>(self, handler: H) -> OAuthContext<K> {
        let prefix = match self.prefix.strip_suffix('/') {
            Some(prefix) => Cow::Owned(prefix.to_owned()),
            None => self.prefix,
        };

        OAuthContext(Arc::new(OAuthContextInner {
            providers: self.providers,
            guard: self.guard,
            store: self.store,
            handler: ErasedOAuthHandler::new(handler),
            prefix,
            logout_path: self.logout_path,
            error_redirect: self.error_redirect,
        }))
    }
}
