use anzu_service::{ServiceClient, ServiceError};
use anzu_value::{Output, Value};
use serde_json::json;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> ServiceClient {
    ServiceClient::from_env().expect("client").with_host(server.uri()).with_token("svc-token")
}

#[tokio::test]
async fn current_service_is_decoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services/current"))
        .and(header("authorization", "Bearer svc-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "svc-1",
            "name": "api",
            "environment": {"id": "env-1", "name": "production", "variantId": "var-1"},
            "inputs": [{"name": "replicas", "value": {"kind": "scalar", "serializedValue": "3", "underlyingType": "integer"}}]
        })))
        .mount(&server)
        .await;

    let service = client(&server).get_current_service().await.expect("service");
    assert_eq!(service.id, "svc-1");
    assert_eq!(service.environment.variant_id, "var-1");
    assert_eq!(service.inputs.len(), 1);
    assert_eq!(service.inputs[0].value, Value::integer(3));
}

#[tokio::test]
async fn connection_details_include_resource_outputs() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/services/current/connections/conn-7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "conn-7",
            "name": "database",
            "resource": {
                "id": "r-1",
                "name": "db",
                "inputs": [],
                "outputs": [{"name": "host", "value": {"kind": "scalar", "serializedValue": "\"db.internal\""}}]
            },
            "inputs": []
        })))
        .mount(&server)
        .await;

    let connection = client(&server).get_connection_details("conn-7").await.expect("connection");
    let resource = connection.resource.expect("resource");
    assert_eq!(resource.outputs, vec![Output::new("host", Value::string("db.internal"))]);
}

#[tokio::test]
async fn rejected_request_reports_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let error = client(&server).get_current_service().await.expect_err("unauthorized");
    assert!(matches!(error, ServiceError::Status { .. }));
    assert_eq!(error.status().map(|status| status.as_u16()), Some(401));
    assert_eq!(error.to_string(), "request failed: 401 Unauthorized");
}

#[tokio::test]
async fn https_host_is_reached_over_tls() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().expect("addr").port();
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.expect("accept");
        let mut first = [0u8; 1];
        stream.read_exact(&mut first).await.expect("read");
        first[0]
    });

    let client = ServiceClient::from_env().expect("client").with_host(format!("https://127.0.0.1:{port}"));
    let error = client.get_current_service().await.expect_err("no certificate is served");
    assert!(matches!(error, ServiceError::Send { .. }), "{error}");
    // 0x16 opens a TLS handshake record.
    assert_eq!(server.await.expect("server task"), 0x16);
}
