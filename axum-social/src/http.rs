use oauth2::reqwest::{Client, redirect::Policy};

/// HTTP client used for token exchange and profile fetches. Redirects are not followed.
pub fn default_reqwest_client() -> Client {
    Client::builder()
        .redirect(Policy::none())
        .build()
        .unwrap_or_else(|_| Client::new())
}
