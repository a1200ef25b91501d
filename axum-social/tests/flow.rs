use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use axum_social::{
    MemKv, OAuthContext, OAuthExt, Provider, ReturnUser, User,
    flow::DEFAULT_RECORD_TTL,
    providers::{Faux, GitHub},
};
use serde_json::json;
use tower::ServiceExt;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, method, path},
};

const COOKIE_NAME: &str = "oauth2.session";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn github_server() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .and(body_string_contains("code=xyz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "gho_token",
            "token_type": "bearer"
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 1,
            "login": "octocat",
            "name": "The Octocat",
            "email": "octocat@github.com"
        })))
        .mount(&server)
        .await;

    server
}

fn github(server: &MockServer) -> GitHub {
    GitHub::new(
        GitHub::builder()
            .client_id("test_client_id")
            .client_secret("test_client_secret")
            .redirect_url("http://localhost:3000/auth/github/callback")
            .auth_url(format!("{}/login/oauth/authorize", server.uri()))
            .token_url(format!("{}/login/oauth/access_token", server.uri()))
            .profile_url(format!("{}/user", server.uri())),
    )
    .unwrap()
}

fn router(context: OAuthContext<MemKv>) -> Router {
    Router::new().with_oauth(context)
}

/// `name=value` of the session cookie set by `res`.
fn session_cookie(res: &Response<Body>) -> String {
    res.headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with(COOKIE_NAME))
        .and_then(|v| v.split(';').next())
        .unwrap()
        .to_owned()
}

fn location(res: &Response<Body>) -> &str {
    res.headers()[header::LOCATION].to_str().unwrap()
}

async fn body_json<T: serde::de::DeserializeOwned>(res: Response<Body>) -> T {
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn github_login() -> anyhow::Result<()> {
    init_tracing();
    let server = github_server().await;
    let context = OAuthContext::builder()
        .provider(github(&server))
        .state_generator(|| "abc123".to_owned())
        .build(ReturnUser);
    let router = router(context);

    let res = router
        .clone()
        .oneshot(Request::get("/auth/github").body(Body::empty())?)
        .await?;

    assert_eq!(res.status(), StatusCode::FOUND);
    assert!(location(&res).starts_with(&server.uri()));
    assert!(location(&res).contains("state=abc123"));
    let cookie = session_cookie(&res);

    let res = router
        .clone()
        .oneshot(
            Request::get("/auth/github/callback?state=abc123&code=xyz")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())?,
        )
        .await?;

    assert_eq!(res.status(), StatusCode::OK);
    let user: User = body_json(res).await;
    assert_eq!(user.user_id, "1");
    assert_eq!(user.email, "octocat@github.com");
    assert_eq!(user.provider, "github");
    assert_eq!(user.access_token, "gho_token");
    Ok(())
}

#[tokio::test]
async fn caller_supplied_state() -> anyhow::Result<()> {
    let context = OAuthContext::builder().provider(Faux::new()).build(ReturnUser);

    let res = router(context)
        .oneshot(Request::get("/auth/faux?state=chosen-by-app").body(Body::empty())?)
        .await?;

    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(
        location(&res),
        "http://example.com/auth?client_id=&response_type=code&state=chosen-by-app"
    );
    Ok(())
}

#[tokio::test]
async fn state_mismatch() -> anyhow::Result<()> {
    let server = github_server().await;
    let context = OAuthContext::builder()
        .provider(github(&server))
        .state_generator(|| "abc123".to_owned())
        .build(ReturnUser);
    let router = router(context);

    let res = router
        .clone()
        .oneshot(Request::get("/auth/github").body(Body::empty())?)
        .await?;
    let cookie = session_cookie(&res);

    let res = router
        .clone()
        .oneshot(
            Request::get("/auth/github/callback?state=wrong&code=xyz")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())?,
        )
        .await?;

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body = axum::body::to_bytes(res.into_body(), usize::MAX).await?;
    assert_eq!(&body[..], b"authentication failed");
    Ok(())
}

#[tokio::test]
async fn post_callback() -> anyhow::Result<()> {
    let server = github_server().await;
    let context = OAuthContext::builder()
        .provider(github(&server))
        .state_generator(|| "abc123".to_owned())
        .build(ReturnUser);
    let router = router(context);

    let res = router
        .clone()
        .oneshot(Request::get("/auth/github").body(Body::empty())?)
        .await?;
    let cookie = session_cookie(&res);

    let res = router
        .clone()
        .oneshot(
            Request::post("/auth/github/callback")
                .header(header::COOKIE, &cookie)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("state=abc123&code=xyz"))?,
        )
        .await?;

    assert_eq!(res.status(), StatusCode::OK);
    let user: User = body_json(res).await;
    assert_eq!(user.name, "The Octocat");
    Ok(())
}

#[tokio::test]
async fn two_providers_one_browser() -> anyhow::Result<()> {
    let mut second = Faux::new();
    second.set_name("faux2".into());

    let context = OAuthContext::builder()
        .provider(Faux::new())
        .provider(second)
        .build(ReturnUser);
    let store = context.store().clone();
    let router = router(context);

    let res = router
        .clone()
        .oneshot(Request::get("/auth/faux?state=one").body(Body::empty())?)
        .await?;
    let cookie = session_cookie(&res);

    let res = router
        .clone()
        .oneshot(
            Request::get("/auth/faux2?state=two")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(session_cookie(&res), cookie);

    let mut headers = axum::http::HeaderMap::new();
    headers.insert(header::COOKIE, cookie.parse()?);
    let record = store.load(&headers).await?;
    assert!(record.contains("faux"));
    assert!(record.contains("faux2"));

    let res = router
        .clone()
        .oneshot(
            Request::get("/auth/faux/callback?state=one&code=c")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(res.status(), StatusCode::OK);
    let user: User = body_json(res).await;
    assert_eq!(user.provider, "faux");
    assert_eq!(user.access_token, "access");
    Ok(())
}

#[tokio::test]
async fn unknown_provider() -> anyhow::Result<()> {
    let context = OAuthContext::builder().provider(Faux::new()).build(ReturnUser);

    let res = router(context)
        .oneshot(Request::get("/auth/gitlab").body(Body::empty())?)
        .await?;

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn error_redirect() -> anyhow::Result<()> {
    let context = OAuthContext::builder()
        .provider(Faux::new())
        .error_redirect("/login?failed")
        .build(ReturnUser);

    let res = router(context)
        .oneshot(Request::get("/auth/faux/callback?state=x&code=y").body(Body::empty())?)
        .await?;

    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(location(&res), "/login?failed");
    Ok(())
}

#[tokio::test]
async fn logout() -> anyhow::Result<()> {
    let context = OAuthContext::builder()
        .provider(Faux::new())
        .logout_path("/auth/logout")
        .build(ReturnUser);
    let router = router(context);

    let res = router
        .clone()
        .oneshot(Request::get("/auth/faux?state=one").body(Body::empty())?)
        .await?;
    let cookie = session_cookie(&res);

    let res = router
        .clone()
        .oneshot(
            Request::post("/auth/logout")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(res.status(), StatusCode::NO_CONTENT);
    let removal = res.headers()[header::SET_COOKIE].to_str()?;
    assert!(removal.starts_with(COOKIE_NAME));
    assert!(removal.contains("Max-Age=0"));

    let res = router
        .clone()
        .oneshot(
            Request::get("/auth/faux/callback?state=one&code=c")
                .header(header::COOKIE, &cookie)
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn default_store_expires_records() -> anyhow::Result<()> {
    let context = OAuthContext::builder().provider(Faux::new()).build(ReturnUser);
    assert_eq!(context.store().ttl(), Some(DEFAULT_RECORD_TTL));

    let router = router(context.clone());
    for _ in 0..3 {
        let res = router
            .clone()
            .oneshot(Request::get("/auth/faux").body(Body::empty())?)
            .await?;
        assert_eq!(res.status(), StatusCode::FOUND);
    }

    // every anonymous attempt is a record, bounded only by the ttl
    assert_eq!(context.store().kv().len().await, 3);
    Ok(())
}
