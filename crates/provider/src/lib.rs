//! Provider SDK for Anzu.
//!
//! Provider authors register resource kinds and functions on a [`Provider`] and
//! hand it to [`start`]. The host talks to the running binary through
//! [`ProviderConnection`] and [`ProviderClient`].

pub mod protocol;

mod client;
mod data;
mod error;
mod function;
mod name;
mod provider;
mod resource;
mod server;
mod start;

pub use client::{ProviderClient, ProviderConnection};
pub use data::{DeploymentInfo, InputValues, ProviderConfiguration, ResourceInfo, State, StateData};
pub use error::{DispatchError, RpcError};
pub use function::{FnFunction, ProviderFunction, function_fn};
pub use name::{NameGenerator, determine_resource_name};
pub use provider::Provider;
pub use resource::{CreateRequest, CreateResponse, DeleteRequest, ProviderResource, ReadRequest, ReadResponse, UpdateRequest, UpdateResponse};
pub use server::{ProviderServer, router, serve, serve_listener};
pub use start::{ServeArgs, init_tracing, resolve_port, start};

pub use anzu_value as value;
