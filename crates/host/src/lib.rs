//! Host-side management of Anzu provider binaries.
//!
//! [`setup_providers`] downloads each provider version, verifies and unpacks
//! it, launches it on a loopback port, waits for it to answer `Ping` and sends
//! the resolved configuration of every environment provider it serves. The
//! resulting [`ConnectionRegistry`] hands out [`ProviderHandle`]s for typed
//! calls and closes everything in [`ConnectionRegistry::shutdown_all`].

mod binary;
mod descriptor;
mod error;
mod handle;
mod launcher;
mod registry;
mod setup;

pub use binary::{BinaryManager, Platform, default_cache_root};
pub use descriptor::{ProviderDescriptor, ProviderExecutionSettings, ProviderUsage, ProviderVersionBinary, load_descriptors_from_str};
pub use error::{BinaryError, CallError, ConfigureError, LaunchError, RegistryError, SetupError, SetupStep};
pub use handle::{ProviderHandle, ResourceOutcome};
pub use launcher::{LaunchSettings, LaunchedProvider, Launcher, free_port};
pub use registry::{ConnectionRecord, ConnectionRegistry};
pub use setup::{SetupOptions, setup_providers};
