use axum::{
    Extension, Router,
    extract::Path,
    http::HeaderMap,
    response::IntoResponse,
    routing::MethodRouter,
};
use cookie_monster::CookieJar;

use crate::{OAuthContext, Params, store::KeyValue};

pub trait OAuthExt {
    /// Mounts the begin, callback and (when configured) logout routes.
    fn with_oauth<K: KeyValue>(self, context: OAuthContext<K>) -> Self;
}

impl<S> OAuthExt for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_oauth<K: KeyValue>(mut self, context: OAuthContext<K>) -> Self {
        let prefix = context.prefix().to_owned();

        if let Some(logout_path) = context.logout_path() {
            let logout_route = MethodRouter::new()
                .get(logout::<K>)
                .post(logout::<K>)
                .layer(Extension(context.clone()));

            self = self.route(logout_path, logout_route);
        }

        let begin_route = MethodRouter::new()
            .get(begin::<K>)
            .layer(Extension(context.clone()));

        let callback_route = MethodRouter::new()
            .get(callback::<K>)
            .post(callback::<K>)
            .layer(Extension(context));

        self.route(&format!("{prefix}/{{provider}}"), begin_route)
            .route(&format!("{prefix}/{{provider}}/callback"), callback_route)
    }
}

async fn begin<K: KeyValue>(
    Extension(context): Extension<OAuthContext<K>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    params: Params,
) -> impl IntoResponse {
    context.on_begin(&provider, &headers, &params).await
}

async fn callback<K: KeyValue>(
    Extension(context): Extension<OAuthContext<K>>,
    Path(provider): Path<String>,
    jar: CookieJar,
    headers: HeaderMap,
    params: Params,
) -> impl IntoResponse {
    context.on_callback(&provider, jar, &headers, &params).await
}

async fn logout<K: KeyValue>(
    Extension(context): Extension<OAuthContext<K>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    context.on_logout(&headers).await
}
