//! Error types shared by every part of the login flow.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use oauth2::url;

use crate::store::SessionId;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("no provider for {0} exists")]
    ProviderNotFound(String),

    #[error("an AuthURL has not been set")]
    MissingAuthUrl,

    #[error("could not parse auth url: {0}")]
    InvalidAuthUrl(#[from] url::ParseError),

    /// The callback state differs from the one embedded in the stored auth url.
    /// Never retried.
    #[error("state token mismatch")]
    StateMismatch,

    #[error("callback is missing the `{0}` parameter")]
    MissingParam(&'static str),

    #[error("provider denied authorization: {0}")]
    Denied(String),

    /// Transport failure, timeout or an invalid token from the token endpoint.
    #[error("token exchange failed: {0}")]
    Exchange(String),

    #[error("provider {0} does not support refresh tokens")]
    RefreshUnsupported(String),

    #[error("could not fetch user: {0}")]
    FetchUser(String),

    #[error("could not decode session: {0}")]
    Decode(String),

    #[error("could not encode session: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("session cookie not present")]
    MissingCookie,

    #[error("session cookie is malformed")]
    MalformedCookie,

    #[error("no session record {0}")]
    RecordNotFound(SessionId),

    #[error("could not find a matching session for provider {0}")]
    SessionNotFound(String),

    #[error("session store failure: {0}")]
    Persist(#[source] BoxError),
}

impl OAuthError {
    pub(crate) fn persist<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        OAuthError::Persist(Box::new(err))
    }

    /// Status code sent to the browser. Error details stay server side.
    pub fn status_code(&self) -> StatusCode {
        match self {
            OAuthError::ProviderNotFound(_) => StatusCode::NOT_FOUND,
            OAuthError::MissingParam(_) | OAuthError::InvalidAuthUrl(_) => StatusCode::BAD_REQUEST,
            OAuthError::MissingAuthUrl
            | OAuthError::StateMismatch
            | OAuthError::Denied(_)
            | OAuthError::Exchange(_)
            | OAuthError::RefreshUnsupported(_)
            | OAuthError::FetchUser(_)
            | OAuthError::Decode(_)
            | OAuthError::MissingCookie
            | OAuthError::MalformedCookie
            | OAuthError::RecordNotFound(_)
            | OAuthError::SessionNotFound(_) => StatusCode::UNAUTHORIZED,
            OAuthError::Encode(_) | OAuthError::Persist(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<serde_json::Error> for OAuthError {
    fn from(err: serde_json::Error) -> Self {
        OAuthError::Decode(err.to_string())
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match status {
            StatusCode::NOT_FOUND => "unknown provider",
            StatusCode::BAD_REQUEST => "bad request",
            StatusCode::UNAUTHORIZED => "authentication failed",
            _ => "internal server error",
        };
        tracing::debug!("oauth flow failed: {self}");
        (status, message).into_response()
    }
}

/// Configuration errors raised while building a provider adapter.
#[derive(Debug, thiserror::Error)]
pub enum BuilderError {
    #[error("client id is missing")]
    MissingClientId,
    #[error("redirect url is missing")]
    MissingRedirectUrl,
    #[error("authorization url is missing")]
    MissingAuthUrl,
    #[error("token url is missing")]
    MissingTokenUrl,
    #[error("could not parse redirect url: {0}")]
    InvalidRedirectUrl(url::ParseError),
    #[error("could not parse authorization url: {0}")]
    InvalidAuthUrl(url::ParseError),
    #[error("could not parse token url: {0}")]
    InvalidTokenUrl(url::ParseError),
    #[error("could not parse profile url: {0}")]
    InvalidProfileUrl(url::ParseError),
    #[error("provider name can't contain whitespaces")]
    WhitespaceInProviderName,
}
