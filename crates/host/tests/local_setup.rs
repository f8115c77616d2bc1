use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use anzu_host::{
    CallError, ConfigureError, ProviderDescriptor, RegistryError, SetupError, SetupOptions, SetupStep, setup_providers,
};
use anzu_provider::protocol::RpcCode;
use anzu_provider::value::{Input, Output, Value, configuration_resolver_fn};
use anzu_provider::{
    CreateRequest, CreateResponse, DeleteRequest, DeploymentInfo, Provider, ProviderConfiguration, ProviderResource, ReadRequest,
    ReadResponse, ResourceInfo, RpcError, UpdateRequest, UpdateResponse, function_fn, serve_listener,
};
use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

struct Queue;

#[async_trait]
impl ProviderResource for Queue {
    async fn create(&self, request: CreateRequest, config: &ProviderConfiguration) -> anyhow::Result<CreateResponse> {
        let token = config.get("token").ok_or_else(|| anyhow!("token not configured"))?.to_json()?;
        Ok(CreateResponse {
            initial_state: json!({"name": request.resource_name(), "token": token, "inputs": request.inputs.len()}),
            outputs: vec![Output::new("arn", Value::string("arn:queue"))],
        })
    }

    async fn read(&self, request: ReadRequest, _config: &ProviderConfiguration) -> anyhow::Result<ReadResponse> {
        Ok(ReadResponse { next_state: request.state, outputs: Vec::new() })
    }

    async fn update(&self, request: UpdateRequest, _config: &ProviderConfiguration) -> anyhow::Result<UpdateResponse> {
        let mut state = request.state;
        state["updated"] = json!(true);
        Ok(UpdateResponse { next_state: state, outputs: Vec::new() })
    }

    async fn delete(&self, _request: DeleteRequest, _config: &ProviderConfiguration) -> anyhow::Result<()> {
        Ok(())
    }
}

async fn local_provider() -> (u16, CancellationToken) {
    let provider = Provider::new().with_resource("queue", Queue).with_function(
        "upper",
        function_fn(|_config: Vec<Input>, arguments: Vec<Input>| async move {
            let Some(argument) = arguments.first() else {
                return Ok(None);
            };
            let text = argument.value.to_json()?;
            Ok::<_, anyhow::Error>(Some(Value::string(text.as_str().unwrap_or_default().to_uppercase())))
        }),
    );
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("address").port();
    let shutdown = CancellationToken::new();
    tokio::spawn(serve_listener(provider, listener, shutdown.clone()));
    (port, shutdown)
}

fn descriptor() -> ProviderDescriptor {
    ProviderDescriptor::new("queues", "pv-queues")
        .with_usage("env-a", vec![Input::new("token", Value::configuration("queueToken").secret())])
        .with_usage("env-b", vec![Input::new("token", Value::string("static"))])
}

fn options(cache: &TempDir, port: u16) -> SetupOptions {
    let resolver = configuration_resolver_fn(|name: &str| match name {
        "queueToken" => Ok(Value::string("s3cret")),
        other => Err(anyhow!("unknown configuration {other}")),
    });
    SetupOptions::new()
        .with_cache_root(cache.path())
        .with_local_providers(HashMap::from([("pv-queues".to_string(), port)]))
        .with_configuration_resolver(Arc::new(resolver))
        .with_call_deadline(Duration::from_secs(5))
}

#[tokio::test]
async fn local_provider_is_configured_and_callable() {
    let cache = TempDir::new().expect("tempdir");
    let (port, shutdown) = local_provider().await;

    let registry = setup_providers(&[descriptor()], options(&cache, port), &CancellationToken::new())
        .await
        .expect("setup");
    assert_eq!(registry.len(), 1);

    let resource = ResourceInfo::new("r-1", "Jobs", "queue");
    let deployment = DeploymentInfo::default();

    let handle = registry.lookup("env-a").expect("env-a");
    assert_eq!(handle.provider_version_id, "pv-queues");
    let created = handle
        .create(&resource, vec![Input::new("fifo", Value::boolean(true))], &deployment)
        .await
        .expect("create");
    assert_eq!(created.state["token"], json!("s3cret"));
    assert_eq!(created.state["inputs"], json!(1));
    assert_eq!(created.outputs, vec![Output::new("arn", Value::string("arn:queue"))]);

    let other = registry.lookup("env-b").expect("env-b");
    let created_b = other.create(&resource, Vec::new(), &deployment).await.expect("create");
    assert_eq!(created_b.state["token"], json!("static"));

    let read = handle.read(&resource, created.state.clone(), &deployment).await.expect("read");
    assert_eq!(read.state, created.state);

    let updated = handle.update(&resource, created.state.clone(), Vec::new(), &deployment).await.expect("update");
    assert_eq!(updated.state["updated"], json!(true));

    handle.delete(&resource, updated.state, &deployment).await.expect("delete");

    let upper = handle
        .invoke_function("upper", vec![Input::new("text", Value::string("abc"))])
        .await
        .expect("invoke");
    assert_eq!(upper, Some(Value::string("ABC")));
    assert_eq!(handle.invoke_function("upper", Vec::new()).await.expect("invoke"), None);

    assert!(registry.shutdown_all().await.is_empty());
    assert!(matches!(handle.ping().await, Err(CallError::Rpc(RpcError::Closed))));
    shutdown.cancel();
}

#[tokio::test]
async fn unconfigured_environment_provider_is_rejected() {
    let cache = TempDir::new().expect("tempdir");
    let (port, shutdown) = local_provider().await;
    let registry = setup_providers(&[descriptor()], options(&cache, port), &CancellationToken::new())
        .await
        .expect("setup");

    let handle = registry.lookup("env-a").expect("env-a").with_environment_provider("env-unknown");
    let error = handle
        .create(&ResourceInfo::new("r-1", "Jobs", "queue"), Vec::new(), &DeploymentInfo::default())
        .await
        .expect_err("not configured");
    match error {
        CallError::Rpc(RpcError::Status { code, message, .. }) => {
            assert_eq!(code, RpcCode::FailedPrecondition);
            assert!(message.contains("env-unknown"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(matches!(registry.lookup(""), Err(RegistryError::EmptyEnvironmentProviderId)));
    assert!(matches!(registry.lookup("env-z"), Err(RegistryError::EnvironmentProviderNotFound(_))));

    registry.shutdown_all().await;
    shutdown.cancel();
}

#[tokio::test]
async fn unresolvable_configuration_fails_setup() {
    let cache = TempDir::new().expect("tempdir");
    let (port, shutdown) = local_provider().await;
    let descriptor = ProviderDescriptor::new("queues", "pv-queues")
        .with_usage("env-a", vec![Input::new("token", Value::configuration("missing"))]);

    let error = setup_providers(&[descriptor], options(&cache, port), &CancellationToken::new())
        .await
        .expect_err("setup should fail");
    assert_eq!(error.provider_version_id(), Some("pv-queues"));
    assert_eq!(error.step(), Some(SetupStep::Configure));
    assert!(matches!(
        error,
        SetupError::Configure { source: ConfigureError::Resolve { ref name, .. }, .. } if name == "token"
    ));
    shutdown.cancel();
}

#[tokio::test]
async fn unreachable_local_provider_fails_configure() {
    let cache = TempDir::new().expect("tempdir");
    let port = anzu_host::free_port().expect("port");

    let error = setup_providers(&[descriptor()], options(&cache, port), &CancellationToken::new())
        .await
        .expect_err("setup should fail");
    assert!(matches!(
        error,
        SetupError::Configure { source: ConfigureError::Rpc { ref environment_provider_id, .. }, .. } if environment_provider_id == "env-a"
    ));
}

#[tokio::test]
async fn repeated_provider_version_is_rejected_before_bring_up() {
    let cache = TempDir::new().expect("tempdir");
    let (port, shutdown) = local_provider().await;

    let error = setup_providers(&[descriptor(), descriptor()], options(&cache, port), &CancellationToken::new())
        .await
        .expect_err("duplicate provider version");
    assert!(
        matches!(error, SetupError::DuplicateProviderVersion { ref provider_version_id } if provider_version_id == "pv-queues"),
        "{error}"
    );
    assert_eq!(error.step(), None);
    shutdown.cancel();
}
