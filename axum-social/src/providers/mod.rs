//! Bundled identity providers.
//!
//! Every provider wraps an [`Adapter`] configured with the vendor's endpoints
//! and defines its own session type. Endpoints can be overridden on the
//! builder, which is how the tests point them at a mock server.

mod adapter;
pub mod discord;
pub mod facebook;
pub mod faux;
pub mod github;
pub mod google;
pub mod slack;

pub use adapter::{Adapter, AdapterBuilder, IdTokenFields};
pub use discord::Discord;
pub use facebook::Facebook;
pub use faux::Faux;
pub use github::GitHub;
pub use google::Google;
pub use slack::Slack;
