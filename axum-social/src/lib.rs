use std::pin::Pin;

pub mod error;
pub mod flow;
pub mod params;
pub mod provider;
pub mod providers;
pub mod registry;
pub mod session;
pub mod state;
pub mod store;

mod http;
pub(crate) mod utils;

pub use error::{BuilderError, OAuthError};
pub use flow::{AfterLoginContext, OAuthContext, OAuthExt, OAuthHandler, ReturnUser};
pub use params::Params;
pub use provider::{Provider, Token, User};
pub use registry::Providers;
pub use session::Session;
pub use state::{RandomState, StateGenerator, StateGuard};
pub use store::{CookieOptions, KeyValue, MemKv, SessionId, SessionSetRecord, SessionStore};
pub use utils::Timestamp;

pub type Result<O, E = OAuthError> = ::std::result::Result<O, E>;

/// Boxed future returned by the object-safe provider and session traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
