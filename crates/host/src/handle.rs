use anzu_provider::protocol::{self, ConfigureRequest, InvokeFunctionRequest};
use anzu_provider::{DeploymentInfo, InputValues, ProviderClient, ProviderConfiguration, ResourceInfo, State, StateData};
use anzu_value::{Input, Output, Value, decode, encode};

use crate::error::CallError;

/// State and outputs returned by create, read and update.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceOutcome {
    pub state: State,
    pub outputs: Vec<Output>,
}

/// Lookup handle for a registered provider connection.
///
/// Handles share the registry's channel but cannot close it.
#[derive(Debug, Clone)]
pub struct ProviderHandle {
    pub provider_id: String,
    pub provider_version_id: String,
    /// Environment provider the handle was looked up for. Empty for lookups by version.
    pub environment_provider_id: String,
    client: ProviderClient,
}

impl ProviderHandle {
    pub(crate) fn new(provider_id: String, provider_version_id: String, environment_provider_id: String, client: ProviderClient) -> Self {
        Self { provider_id, provider_version_id, environment_provider_id, client }
    }

    /// Target a specific environment provider served by the same process.
    pub fn with_environment_provider(mut self, environment_provider_id: impl Into<String>) -> Self {
        self.environment_provider_id = environment_provider_id.into();
        self
    }

    /// Raw RPC stub.
    pub fn client(&self) -> &ProviderClient {
        &self.client
    }

    pub async fn ping(&self) -> Result<(), CallError> {
        Ok(self.client.ping().await?)
    }

    /// Send already resolved configuration for this handle's environment provider.
    pub async fn configure(&self, configuration: &ProviderConfiguration) -> Result<(), CallError> {
        let request = ConfigureRequest {
            environment_provider_id: self.environment_provider_id.clone(),
            config_values: encode("config values", configuration)?,
        };
        Ok(self.client.configure(&request).await?)
    }

    pub async fn create(&self, resource: &ResourceInfo, inputs: Vec<Input>, deployment: &DeploymentInfo) -> Result<ResourceOutcome, CallError> {
        let request = protocol::CreateRequest {
            resource_info: encode("resource info", resource)?,
            input_values: encode("input values", &InputValues::new(inputs))?,
            deployment_info: encode("deployment info", deployment)?,
            environment_provider_id: self.environment_provider_id.clone(),
        };
        outcome(self.client.create(&request).await?)
    }

    pub async fn read(&self, resource: &ResourceInfo, state: State, deployment: &DeploymentInfo) -> Result<ResourceOutcome, CallError> {
        let request = protocol::ReadRequest {
            resource_info: encode("resource info", resource)?,
            state: encode("state", &StateData::new(state))?,
            deployment_info: encode("deployment info", deployment)?,
            environment_provider_id: self.environment_provider_id.clone(),
        };
        outcome(self.client.read(&request).await?)
    }

    pub async fn update(
        &self,
        resource: &ResourceInfo,
        state: State,
        inputs: Vec<Input>,
        deployment: &DeploymentInfo,
    ) -> Result<ResourceOutcome, CallError> {
        let request = protocol::UpdateRequest {
            resource_info: encode("resource info", resource)?,
            state: encode("state", &StateData::new(state))?,
            input_values: encode("input values", &InputValues::new(inputs))?,
            deployment_info: encode("deployment info", deployment)?,
            environment_provider_id: self.environment_provider_id.clone(),
        };
        outcome(self.client.update(&request).await?)
    }

    pub async fn delete(&self, resource: &ResourceInfo, state: State, deployment: &DeploymentInfo) -> Result<(), CallError> {
        let request = protocol::DeleteRequest {
            resource_info: encode("resource info", resource)?,
            state: encode("state", &StateData::new(state))?,
            deployment_info: encode("deployment info", deployment)?,
            environment_provider_id: self.environment_provider_id.clone(),
        };
        Ok(self.client.delete(&request).await?)
    }

    /// Invoke a provider function. `None` when the function returned no value.
    pub async fn invoke_function(&self, function_name: &str, arguments: Vec<Input>) -> Result<Option<Value>, CallError> {
        let request = InvokeFunctionRequest {
            function_name: function_name.to_string(),
            argument_values: encode("argument values", &InputValues::new(arguments))?,
            environment_provider_id: self.environment_provider_id.clone(),
        };
        let reply = self.client.invoke_function(&request).await?;
        if reply.output_value.is_empty() {
            return Ok(None);
        }
        Ok(Some(decode("output value", &reply.output_value)?))
    }
}

fn outcome(reply: protocol::ResourceReply) -> Result<ResourceOutcome, CallError> {
    Ok(ResourceOutcome { state: decode("state", &reply.state)?, outputs: decode("output values", &reply.output_values)? })
}
