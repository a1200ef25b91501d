use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    http::{Method, Uri},
    response::{IntoResponse, Response},
};
use oauth2::url::form_urlencoded;

/// Parameters of an authorization request or provider callback.
///
/// Callbacks arrive either as a GET with a query string or as a POST with a
/// form body. The body is only consulted for a POST without any query
/// parameters. For repeated keys the first value wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(HashMap<String, String>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_query(query: &str) -> Self {
        Self::parse(query.as_bytes())
    }

    pub fn from_uri(uri: &Uri) -> Self {
        Self::from_query(uri.query().unwrap_or_default())
    }

    pub fn from_parts(method: &Method, uri: &Uri, body: &[u8]) -> Self {
        let query = uri.query().unwrap_or_default();
        if query.is_empty() && method == Method::POST {
            return Self::parse(body);
        }
        Self::from_query(query)
    }

    fn parse(input: &[u8]) -> Self {
        let mut params = HashMap::new();
        for (key, value) in form_urlencoded::parse(input) {
            params
                .entry(key.into_owned())
                .or_insert_with(|| value.into_owned());
        }
        Params(params)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Empty string when the key is missing.
    pub fn value(&self, key: &str) -> &str {
        self.get(key).unwrap_or_default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn code(&self) -> Option<&str> {
        self.get("code").filter(|c| !c.is_empty())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut params = Params::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

impl<S> FromRequest<S> for Params
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let method = req.method().clone();
        let uri = req.uri().clone();

        let has_query = uri.query().is_some_and(|q| !q.is_empty());
        if has_query || method != Method::POST {
            return Ok(Params::from_uri(&uri));
        }

        let body = Bytes::from_request(req, state)
            .await
            .map_err(IntoResponse::into_response)?;

        Ok(Params::from_parts(&method, &uri, &body))
    }
}
