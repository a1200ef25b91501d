//! The HTTP surface: begin, callback and logout routes.

mod context;
mod handler;
mod router;

pub use context::{DEFAULT_RECORD_TTL, OAuthContext, OAuthContextBuilder};
pub use handler::{AfterLoginContext, OAuthHandler, ReturnUser};
pub use router::OAuthExt;
