//! Authenticated request engine for the Smappee API.
//!
//! [`SmappeeClient`] runs arbitrary [`RequestDescriptor`]s against the API and
//! transparently handles the OAuth2 password and refresh-token lifecycle:
//! logging in through a [`auth::CredentialProvider`] when needed, refreshing an
//! expired access token, and retrying the original request, all bounded by
//! [`engine::MAX_ATTEMPTS`].

pub mod auth;
pub mod client;
pub mod config;
pub mod engine;
pub mod http;
pub mod logging;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ClientError, SmappeeClient};
pub use config::ClientConfig;
pub use engine::{EngineError, RequestEngine};
pub use http::RequestDescriptor;
