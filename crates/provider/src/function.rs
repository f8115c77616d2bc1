use std::future::Future;

use anzu_value::{Input, Value};
use async_trait::async_trait;

use crate::ProviderConfiguration;

/// A callable function exposed by a provider.
#[async_trait]
pub trait ProviderFunction: Send + Sync {
    /// Invoke the function with resolved arguments. Returning `None` produces
    /// an empty reply.
    async fn invoke(&self, config: &ProviderConfiguration, arguments: Vec<Input>) -> anyhow::Result<Option<Value>>;
}

/// Adapter turning an async closure into a [`ProviderFunction`].
///
/// The closure receives the configuration values and the arguments.
pub struct FnFunction<F>(F);

pub fn function_fn<F, Fut>(function: F) -> FnFunction<F>
where
    F: Fn(Vec<Input>, Vec<Input>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
{
    FnFunction(function)
}

#[async_trait]
impl<F, Fut> ProviderFunction for FnFunction<F>
where
    F: Fn(Vec<Input>, Vec<Input>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
{
    async fn invoke(&self, config: &ProviderConfiguration, arguments: Vec<Input>) -> anyhow::Result<Option<Value>> {
        (self.0)(config.values().to_vec(), arguments).await
    }
}
