//! Control-plane client for the service a deployment is running as.
//!
//! [`ServiceClient::from_env`] picks up `ANZU_SERVICE_TOKEN` and
//! `ANZU_API_HOST`; both can be overridden with the `with_*` builders.

mod client;
mod types;

pub use client::{DEFAULT_API_HOST, ServiceClient, ServiceError};
pub use types::{ConnectionResource, CurrentService, ServiceConnection, ServiceEnvironment};
