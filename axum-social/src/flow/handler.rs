use std::pin::Pin;

use axum::{
    Json,
    response::{IntoResponse, Response},
};
use cookie_monster::CookieJar;

use crate::{SessionSetRecord, User};

/// Called once a callback authenticated a user. The returned response is
/// sent to the browser together with the session cookie.
pub trait OAuthHandler: Send + Sync + 'static {
    fn after_login(
        &self,
        user: User,
        context: AfterLoginContext<'_>,
    ) -> impl Future<Output = impl IntoResponse> + Send;
}

pub struct AfterLoginContext<'a> {
    /// Already holds the refreshed session cookie.
    pub cookies: &'a mut CookieJar,
    pub provider: &'a str,
    pub record: &'a SessionSetRecord,
}

/// Responds with the normalized user as json.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReturnUser;

impl OAuthHandler for ReturnUser {
    async fn after_login(&self, user: User, _context: AfterLoginContext<'_>) -> impl IntoResponse {
        Json(user)
    }
}

trait DynOAuthHandler: Send + Sync + 'static {
    fn after_login_boxed<'a>(
        &'a self,
        user: User,
        context: AfterLoginContext<'a>,
    ) -> Pin<Box<dyn Future<Output = Response> + Send + 'a>>;
}

impl<T> DynOAuthHandler for T
where
    T: OAuthHandler,
{
    fn after_login_boxed<'a>(
        &'a self,
        user: User,
        context: AfterLoginContext<'a>,
    ) -> Pin<Box<dyn Future<Output = Response> + Send + 'a>> {
        Box::pin(async move { self.after_login(user, context).await.into_response() })
    }
}

pub(crate) struct ErasedOAuthHandler(Box<dyn DynOAuthHandler>);

impl ErasedOAuthHandler {
    pub fn new<T: OAuthHandler>(handler: T) -> Self {
        Self(Box::new(handler))
    }

    pub async fn after_login<'a>(&'a self, user: User, context: AfterLoginContext<'a>) -> Response {
        self.0.after_login_boxed(user, context).await
    }
}
