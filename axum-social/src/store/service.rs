use std::{
    convert::Infallible,
    pin::Pin,
    task::{Context, Poll},
};

use axum::{extract::Request, response::IntoResponse};
use tower::{Layer, Service};

use crate::store::{KeyValue, SessionStore};

/// Loads (or mints) the request's [`SessionSetRecord`](crate::SessionSetRecord)
/// and puts it into the request extensions for the extractor.
pub struct SessionService<K, SERV> {
    inner: SessionStore<K>,
    rest: SERV,
}

impl<K, SERV> Service<Request> for SessionService<K, SERV>
where
    SERV: Service<Request, Error = Infallible> + Clone + Send + 'static,
    <SERV as Service<Request>>::Response: IntoResponse,
    <SERV as Service<Request>>::Future: Send,
    K: KeyValue,
{
    type Response = axum::response::Response;

    type Error = Infallible;

    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.rest.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let mut this = self.clone();
        Box::pin(async move {
            match this.inner.get_or_create(req.headers()).await {
                Ok(record) => {
                    req.extensions_mut().insert(record);
                }
                Err(e) => return Ok(e.into_response()),
            }

            this.rest.call(req).await.map(|e| e.into_response())
        })
    }
}

impl<SERV, K> Layer<SERV> for SessionStore<K> {
    type Service = SessionService<K, SERV>;

    fn layer(&self, inner: SERV) -> Self::Service {
        SessionService {
            inner: self.clone(),
            rest: inner,
        }
    }
}

impl<K, SERV> Clone for SessionService<K, SERV>
where
    SERV: Clone,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            rest: self.rest.clone(),
        }
    }
}
