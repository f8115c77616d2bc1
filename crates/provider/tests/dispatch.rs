use std::time::Duration;

use anyhow::{anyhow, bail};
use anzu_provider::protocol::{self, ConfigureRequest, InvokeFunctionRequest, RpcCode};
use anzu_provider::value::{Input, Output, Value, decode, encode};
use anzu_provider::{
    CreateRequest, CreateResponse, DeleteRequest, DeploymentInfo, InputValues, Provider, ProviderConfiguration, ProviderConnection,
    ProviderResource, ReadRequest, ReadResponse, ResourceInfo, RpcError, StateData, UpdateRequest, UpdateResponse, function_fn,
    serve_listener,
};
use async_trait::async_trait;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Bucket;

#[async_trait]
impl ProviderResource for Bucket {
    async fn create(&self, request: CreateRequest, config: &ProviderConfiguration) -> anyhow::Result<CreateResponse> {
        let region = config.get("region").ok_or_else(|| anyhow!("region not configured"))?.to_json()?;
        let name = request.resource_name();
        Ok(CreateResponse {
            initial_state: json!({"name": name, "region": region}),
            outputs: vec![Output::new("name", Value::string(&name))],
        })
    }

    async fn read(&self, request: ReadRequest, _config: &ProviderConfiguration) -> anyhow::Result<ReadResponse> {
        Ok(ReadResponse { next_state: request.state, outputs: Vec::new() })
    }

    async fn update(&self, request: UpdateRequest, _config: &ProviderConfiguration) -> anyhow::Result<UpdateResponse> {
        let mut state = request.state;
        state["inputs"] = json!(request.inputs.len());
        Ok(UpdateResponse { next_state: state, outputs: Vec::new() })
    }

    async fn delete(&self, request: DeleteRequest, _config: &ProviderConfiguration) -> anyhow::Result<()> {
        if request.state["locked"] == json!(true) {
            bail!("bucket is locked");
        }
        Ok(())
    }
}

struct TestServer {
    connection: ProviderConnection,
    shutdown: CancellationToken,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    async fn start() -> Self {
        let provider = Provider::new().with_resource("bucket", Bucket).with_function(
            "greet",
            function_fn(|_config: Vec<Input>, arguments: Vec<Input>| async move {
                let Some(argument) = arguments.first() else {
                    return Ok(None);
                };
                let who = argument.value.to_json()?;
                Ok::<_, anyhow::Error>(Some(Value::string(format!("hello {}", who.as_str().unwrap_or_default()))))
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("address").port();
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(serve_listener(provider, listener, shutdown.clone()));
        let connection = ProviderConnection::connect(port, Some(Duration::from_secs(5))).expect("connect");
        Self { connection, shutdown, handle }
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.handle.await.expect("join").expect("serve");
    }
}

fn configure_request(environment_provider_id: &str) -> ConfigureRequest {
    let configuration = ProviderConfiguration::new(vec![Input::new("region", Value::string("eu-west-1"))]);
    ConfigureRequest {
        environment_provider_id: environment_provider_id.to_string(),
        config_values: encode("config values", &configuration).expect("encode"),
    }
}

fn create_request(environment_provider_id: &str, kind: &str) -> protocol::CreateRequest {
    protocol::CreateRequest {
        resource_info: encode("resource info", &ResourceInfo::new("r-1", "Web Assets", kind)).expect("encode"),
        input_values: encode("input values", &InputValues::new(vec![Input::new("public", Value::boolean(true))])).expect("encode"),
        deployment_info: encode("deployment info", &DeploymentInfo::default()).expect("encode"),
        environment_provider_id: environment_provider_id.to_string(),
    }
}

#[tokio::test]
async fn configured_create_round_trips_state_and_outputs() {
    let server = TestServer::start().await;
    let client = server.connection.client();

    client.ping().await.expect("ping");
    client.configure(&configure_request("env-1")).await.expect("configure");

    let reply = client.create(&create_request("env-1", "bucket")).await.expect("create");
    let state: serde_json::Value = decode("state", &reply.state).expect("state");
    let outputs: Vec<Output> = decode("output values", &reply.output_values).expect("outputs");

    assert_eq!(state["region"], json!("eu-west-1"));
    let name = state["name"].as_str().expect("name");
    assert!(name.starts_with("web-assets-"), "{name}");
    assert_eq!(outputs, vec![Output::new("name", Value::string(name))]);

    let read = protocol::ReadRequest {
        resource_info: encode("resource info", &ResourceInfo::new("r-1", "Web Assets", "bucket")).expect("encode"),
        state: encode("state", &StateData::new(state.clone())).expect("encode"),
        deployment_info: "{}".to_string(),
        environment_provider_id: "env-1".to_string(),
    };
    let reply = client.read(&read).await.expect("read");
    assert_eq!(decode::<serde_json::Value>("state", &reply.state).expect("state"), state);

    server.stop().await;
}

#[tokio::test]
async fn calls_before_configure_fail_with_precondition() {
    let server = TestServer::start().await;
    let client = server.connection.client();

    let err = client.create(&create_request("env-unknown", "bucket")).await.unwrap_err();
    assert_eq!(err.code(), Some(RpcCode::FailedPrecondition));
    assert!(err.to_string().contains("environment provider \"env-unknown\" was not configured"), "{err}");

    server.stop().await;
}

#[tokio::test]
async fn unknown_resource_kind_is_not_found() {
    let server = TestServer::start().await;
    let client = server.connection.client();
    client.configure(&configure_request("env-1")).await.expect("configure");

    let err = client.create(&create_request("env-1", "queue")).await.unwrap_err();
    assert_eq!(err.code(), Some(RpcCode::NotFound));
    assert!(err.to_string().contains("resource kind \"queue\" not found"), "{err}");

    server.stop().await;
}

#[tokio::test]
async fn malformed_payload_is_invalid_argument() {
    let server = TestServer::start().await;
    let client = server.connection.client();

    let mut request = create_request("env-1", "bucket");
    request.resource_info = "{broken".to_string();
    let err = client.create(&request).await.unwrap_err();
    assert_eq!(err.code(), Some(RpcCode::InvalidArgument));
    assert!(err.to_string().contains("failed to unmarshal resource info"), "{err}");

    server.stop().await;
}

#[tokio::test]
async fn delete_handler_failure_reaches_the_caller() {
    let server = TestServer::start().await;
    let client = server.connection.client();
    client.configure(&configure_request("env-1")).await.expect("configure");

    let request = protocol::DeleteRequest {
        resource_info: encode("resource info", &ResourceInfo::new("r-1", "assets", "bucket")).expect("encode"),
        state: encode("state", &StateData::new(json!({"locked": true}))).expect("encode"),
        deployment_info: "{}".to_string(),
        environment_provider_id: "env-1".to_string(),
    };
    let err = client.delete(&request).await.unwrap_err();
    assert_eq!(err.code(), Some(RpcCode::Internal));
    assert!(err.to_string().contains("bucket is locked"), "{err}");

    server.stop().await;
}

#[tokio::test]
async fn functions_return_optional_values() {
    let server = TestServer::start().await;
    let client = server.connection.client();
    client.configure(&configure_request("env-1")).await.expect("configure");

    let with_argument = InvokeFunctionRequest {
        function_name: "greet".to_string(),
        argument_values: encode("argument values", &InputValues::new(vec![Input::new("who", Value::string("anzu"))])).expect("encode"),
        environment_provider_id: "env-1".to_string(),
    };
    let reply = client.invoke_function(&with_argument).await.expect("invoke");
    assert_eq!(decode::<Value>("output value", &reply.output_value).expect("value"), Value::string("hello anzu"));

    let without_argument = InvokeFunctionRequest { argument_values: "{\"inputs\":[]}".to_string(), ..with_argument.clone() };
    let reply = client.invoke_function(&without_argument).await.expect("invoke");
    assert!(reply.output_value.is_empty());

    let missing = InvokeFunctionRequest { function_name: "shout".to_string(), ..with_argument };
    let err = client.invoke_function(&missing).await.unwrap_err();
    assert_eq!(err.code(), Some(RpcCode::NotFound));

    server.stop().await;
}

#[tokio::test]
async fn closed_connection_rejects_calls() {
    let server = TestServer::start().await;
    let client = server.connection.client();
    client.ping().await.expect("ping");

    server.connection.close().await.expect("close");
    assert!(server.connection.is_closed().await);
    assert!(matches!(client.ping().await, Err(RpcError::Closed)));
    assert!(matches!(server.connection.close().await, Err(RpcError::Closed)));

    server.stop().await;
}

#[tokio::test]
async fn configure_runs_alongside_resource_calls() {
    let server = TestServer::start().await;
    let client = server.connection.client();
    client.configure(&configure_request("env-0")).await.expect("configure env-0");

    let mut calls = tokio::task::JoinSet::new();
    for round in 1..=8 {
        let configuring = client.clone();
        calls.spawn(async move { configuring.configure(&configure_request(&format!("env-{round}"))).await });
        let creating = client.clone();
        calls.spawn(async move { creating.create(&create_request("env-0", "bucket")).await.map(|_| ()) });
        let reconfiguring = client.clone();
        calls.spawn(async move { reconfiguring.configure(&configure_request("env-0")).await });
    }
    while let Some(result) = calls.join_next().await {
        result.expect("join").expect("call");
    }

    for round in 0..=8 {
        let reply = client.create(&create_request(&format!("env-{round}"), "bucket")).await.expect("create");
        let state: serde_json::Value = decode("state", &reply.state).expect("state");
        assert_eq!(state["region"], json!("eu-west-1"));
    }

    server.stop().await;
}
