//! Provider-side dispatch of RPC calls to registered handlers.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;

use anyhow::Context;
use anzu_value::{Output, decode, encode};
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::DispatchError;
use crate::protocol::{
    self, ConfigureRequest, Empty, InvokeFunctionReply, InvokeFunctionRequest, Method, ResourceReply,
};
use crate::{
    CreateRequest, DeleteRequest, DeploymentInfo, InputValues, NameGenerator, Provider, ProviderConfiguration, ProviderResource,
    ReadRequest, ResourceInfo, StateData, UpdateRequest,
};

/// Routes decoded RPC calls to the provider's handlers.
///
/// Configuration is stored per environment provider behind a read-write lock,
/// so `Configure` may run concurrently with resource and function calls.
pub struct ProviderServer {
    provider: Provider,
    configuration: RwLock<HashMap<String, Arc<ProviderConfiguration>>>,
}

impl ProviderServer {
    /// Create a new dispatch server for `provider`.
    pub fn new(provider: Provider) -> Self {
        Self { provider, configuration: RwLock::new(HashMap::new()) }
    }

    /// Readiness check. Always succeeds.
    pub fn ping(&self) -> Empty {
        Empty {}
    }

    /// Store the configuration of one environment provider, replacing any previous one.
    pub async fn configure(&self, request: ConfigureRequest) -> Result<Empty, DispatchError> {
        let configuration: ProviderConfiguration = decode("config values", &request.config_values)?;
        debug!(
            environment_provider = %request.environment_provider_id,
            values = configuration.values.len(),
            "configured environment provider"
        );
        self.configuration
            .write()
            .await
            .insert(request.environment_provider_id, Arc::new(configuration));
        Ok(Empty {})
    }

    pub async fn create(&self, request: protocol::CreateRequest) -> Result<ResourceReply, DispatchError> {
        let resource_info: ResourceInfo = decode("resource info", &request.resource_info)?;
        let resource = self.resource_for(&resource_info)?;
        let inputs: InputValues = decode("input values", &request.input_values)?;
        let config = self.configuration_for(&request.environment_provider_id).await?;
        let deployment: DeploymentInfo = decode("deployment info", &request.deployment_info)?;

        let response = resource
            .create(
                CreateRequest { inputs: inputs.inputs, resource: resource_info, deployment, names: NameGenerator::from_entropy() },
                &config,
            )
            .await
            .map_err(|source| DispatchError::handler("create", source))?;
        resource_reply(&response.initial_state, &response.outputs)
    }

    pub async fn read(&self, request: protocol::ReadRequest) -> Result<ResourceReply, DispatchError> {
        let resource_info: ResourceInfo = decode("resource info", &request.resource_info)?;
        let resource = self.resource_for(&resource_info)?;
        let state: StateData = decode("state", &request.state)?;
        let config = self.configuration_for(&request.environment_provider_id).await?;
        let deployment: DeploymentInfo = decode("deployment info", &request.deployment_info)?;

        let response = resource
            .read(
                ReadRequest { state: state.state, resource: resource_info, deployment, names: NameGenerator::from_entropy() },
                &config,
            )
            .await
            .map_err(|source| DispatchError::handler("read", source))?;
        resource_reply(&response.next_state, &response.outputs)
    }

    pub async fn update(&self, request: protocol::UpdateRequest) -> Result<ResourceReply, DispatchError> {
        let resource_info: ResourceInfo = decode("resource info", &request.resource_info)?;
        let resource = self.resource_for(&resource_info)?;
        let state: StateData = decode("state", &request.state)?;
        let inputs: InputValues = decode("input values", &request.input_values)?;
        let config = self.configuration_for(&request.environment_provider_id).await?;
        let deployment: DeploymentInfo = decode("deployment info", &request.deployment_info)?;

        let response = resource
            .update(
                UpdateRequest {
                    inputs: inputs.inputs,
                    state: state.state,
                    resource: resource_info,
                    deployment,
                    names: NameGenerator::from_entropy(),
                },
                &config,
            )
            .await
            .map_err(|source| DispatchError::handler("update", source))?;
        resource_reply(&response.next_state, &response.outputs)
    }

    /// Delete a resource. Handler failures are reported to the caller.
    pub async fn delete(&self, request: protocol::DeleteRequest) -> Result<Empty, DispatchError> {
        let resource_info: ResourceInfo = decode("resource info", &request.resource_info)?;
        let resource = self.resource_for(&resource_info)?;
        let state: StateData = decode("state", &request.state)?;
        let config = self.configuration_for(&request.environment_provider_id).await?;
        let deployment: DeploymentInfo = decode("deployment info", &request.deployment_info)?;

        resource
            .delete(
                DeleteRequest { state: state.state, resource: resource_info, deployment, names: NameGenerator::from_entropy() },
                &config,
            )
            .await
            .map_err(|source| DispatchError::handler("delete", source))?;
        Ok(Empty {})
    }

    pub async fn invoke_function(&self, request: InvokeFunctionRequest) -> Result<InvokeFunctionReply, DispatchError> {
        let function = self
            .provider
            .function(&request.function_name)
            .ok_or_else(|| DispatchError::function_not_found(&request.function_name))?;
        let arguments: InputValues = decode("argument values", &request.argument_values)?;
        let config = self.configuration_for(&request.environment_provider_id).await?;

        let output = function
            .invoke(&config, arguments.inputs)
            .await
            .map_err(|source| DispatchError::Function { source })?;
        let output_value = match output {
            Some(value) => encode("output value", &value)?,
            None => String::new(),
        };
        Ok(InvokeFunctionReply { output_value })
    }

    fn resource_for(&self, resource_info: &ResourceInfo) -> Result<Arc<dyn ProviderResource>, DispatchError> {
        self.provider
            .resource(resource_info.resource_kind())
            .ok_or_else(|| DispatchError::resource_kind_not_found(resource_info.resource_kind()))
    }

    async fn configuration_for(&self, environment_provider_id: &str) -> Result<Arc<ProviderConfiguration>, DispatchError> {
        self.configuration
            .read()
            .await
            .get(environment_provider_id)
            .cloned()
            .ok_or_else(|| DispatchError::not_configured(environment_provider_id))
    }
}

fn resource_reply(state: &serde_json::Value, outputs: &[Output]) -> Result<ResourceReply, DispatchError> {
    Ok(ResourceReply { state: encode("state", state)?, output_values: encode("output values", outputs)? })
}

/// Build the HTTP router exposing every RPC method of `server`.
pub fn router(server: Arc<ProviderServer>) -> Router {
    Router::new()
        .route(&Method::Ping.path(), post(ping))
        .route(&Method::Configure.path(), post(configure))
        .route(&Method::Create.path(), post(create))
        .route(&Method::Read.path(), post(read))
        .route(&Method::Update.path(), post(update))
        .route(&Method::Delete.path(), post(delete))
        .route(&Method::InvokeFunction.path(), post(invoke_function))
        .with_state(server)
}

async fn ping(State(server): State<Arc<ProviderServer>>) -> Json<Empty> {
    Json(server.ping())
}

async fn configure(State(server): State<Arc<ProviderServer>>, Json(request): Json<ConfigureRequest>) -> Result<Json<Empty>, DispatchError> {
    server.configure(request).await.map(Json)
}

async fn create(
    State(server): State<Arc<ProviderServer>>,
    Json(request): Json<protocol::CreateRequest>,
) -> Result<Json<ResourceReply>, DispatchError> {
    server.create(request).await.map(Json)
}

async fn read(
    State(server): State<Arc<ProviderServer>>,
    Json(request): Json<protocol::ReadRequest>,
) -> Result<Json<ResourceReply>, DispatchError> {
    server.read(request).await.map(Json)
}

async fn update(
    State(server): State<Arc<ProviderServer>>,
    Json(request): Json<protocol::UpdateRequest>,
) -> Result<Json<ResourceReply>, DispatchError> {
    server.update(request).await.map(Json)
}

async fn delete(State(server): State<Arc<ProviderServer>>, Json(request): Json<protocol::DeleteRequest>) -> Result<Json<Empty>, DispatchError> {
    server.delete(request).await.map(Json)
}

async fn invoke_function(
    State(server): State<Arc<ProviderServer>>,
    Json(request): Json<InvokeFunctionRequest>,
) -> Result<Json<InvokeFunctionReply>, DispatchError> {
    server.invoke_function(request).await.map(Json)
}

/// Serve `provider` on `127.0.0.1:<port>` until `shutdown` is cancelled.
pub async fn serve(provider: Provider, port: u16, shutdown: CancellationToken) -> anyhow::Result<()> {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))
        .await
        .with_context(|| format!("failed to listen on port {port}"))?;
    serve_listener(provider, listener, shutdown).await
}

/// Serve `provider` on an already bound listener until `shutdown` is cancelled.
///
/// In-flight calls finish before the listener closes.
pub async fn serve_listener(provider: Provider, listener: TcpListener, shutdown: CancellationToken) -> anyhow::Result<()> {
    let address = listener.local_addr().context("failed to read listener address")?;
    info!(%address, "starting provider server");

    let app = router(Arc::new(ProviderServer::new(provider)));
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            debug!("shutting down provider server");
        })
        .await
        .context("failed to serve")?;

    debug!("stopped serving");
    Ok(())
}
