//! Resource handler contract implemented by provider authors.

use anzu_value::{Input, Output};
use async_trait::async_trait;

use crate::{DeploymentInfo, NameGenerator, ProviderConfiguration, ResourceInfo, State};

/// Request to create a resource from its resolved inputs.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub inputs: Vec<Input>,
    pub resource: ResourceInfo,
    pub deployment: DeploymentInfo,
    /// Naming generator seeded for this call only.
    pub names: NameGenerator,
}

#[derive(Debug, Clone, Default)]
pub struct CreateResponse {
    pub initial_state: State,
    pub outputs: Vec<Output>,
}

/// Request to refresh the current state of a resource.
#[derive(Debug, Clone)]
pub struct ReadRequest {
    pub state: State,
    pub resource: ResourceInfo,
    pub deployment: DeploymentInfo,
    pub names: NameGenerator,
}

#[derive(Debug, Clone, Default)]
pub struct ReadResponse {
    pub next_state: State,
    pub outputs: Vec<Output>,
}

/// Request to move an existing resource to the desired inputs.
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub inputs: Vec<Input>,
    pub state: State,
    pub resource: ResourceInfo,
    pub deployment: DeploymentInfo,
    pub names: NameGenerator,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateResponse {
    pub next_state: State,
    pub outputs: Vec<Output>,
}

#[derive(Debug, Clone)]
pub struct DeleteRequest {
    pub state: State,
    pub resource: ResourceInfo,
    pub deployment: DeploymentInfo,
    pub names: NameGenerator,
}

macro_rules! impl_resource_name {
    ($($request:ty),+) => {
        $(
            impl $request {
                /// Collision-free name of the targeted resource, stable within this call.
                pub fn resource_name(&self) -> String {
                    self.names.resource_name(&self.resource)
                }

                pub fn resource_name_with_separator(&self, separator: char) -> String {
                    self.names.resource_name_with_separator(&self.resource, separator)
                }
            }
        )+
    };
}

impl_resource_name!(CreateRequest, ReadRequest, UpdateRequest, DeleteRequest);

/// Lifecycle operations of one resource kind.
#[async_trait]
pub trait ProviderResource: Send + Sync {
    /// Create a new resource from the resolved inputs.
    async fn create(&self, request: CreateRequest, config: &ProviderConfiguration) -> anyhow::Result<CreateResponse>;

    /// Retrieve the current state of the resource during refresh.
    async fn read(&self, request: ReadRequest, config: &ProviderConfiguration) -> anyhow::Result<ReadResponse>;

    /// Update an existing resource to the desired state.
    async fn update(&self, request: UpdateRequest, config: &ProviderConfiguration) -> anyhow::Result<UpdateResponse>;

    /// Delete an existing resource.
    async fn delete(&self, request: DeleteRequest, config: &ProviderConfiguration) -> anyhow::Result<()>;
}
