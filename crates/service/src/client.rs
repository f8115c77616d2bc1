use std::env;

use reqwest::{Client, Method, RequestBuilder, header};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use crate::types::{CurrentService, ServiceConnection};

/// Control-plane API host used when `ANZU_API_HOST` is unset.
pub const DEFAULT_API_HOST: &str = "https://api.anzuhq.com";

const TOKEN_VAR: &str = "ANZU_SERVICE_TOKEN";
const HOST_VAR: &str = "ANZU_API_HOST";

/// Errors returned by [`ServiceClient`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("failed to send request to {url}: {source}")]
    Send {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request failed: {status}")]
    Status { status: reqwest::StatusCode },

    #[error("failed to decode response: {0}")]
    Decode(#[source] reqwest::Error),
}

impl ServiceError {
    /// HTTP status of a rejected request.
    pub fn status(&self) -> Option<reqwest::StatusCode> {
        match self {
            ServiceError::Status { status } => Some(*status),
            _ => None,
        }
    }
}

/// Bearer-authenticated client for the service metadata endpoints.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: Client,
    api_host: String,
    service_token: String,
}

impl ServiceClient {
    /// Build a client from `ANZU_SERVICE_TOKEN` and `ANZU_API_HOST`.
    ///
    /// Empty variables are treated as unset.
    pub fn from_env() -> Result<Self, ServiceError> {
        let http = Client::builder().build().map_err(ServiceError::Client)?;
        let non_empty = |name: &str| env::var(name).ok().filter(|value| !value.is_empty());
        Ok(Self {
            http,
            api_host: non_empty(HOST_VAR).unwrap_or_else(|| DEFAULT_API_HOST.to_string()),
            service_token: non_empty(TOKEN_VAR).unwrap_or_default(),
        })
    }

    pub fn with_token(mut self, service_token: impl Into<String>) -> Self {
        self.service_token = service_token.into();
        self
    }

    pub fn with_host(mut self, api_host: impl Into<String>) -> Self {
        self.api_host = api_host.into();
        self
    }

    /// Use a preconfigured HTTP client.
    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    pub fn api_host(&self) -> &str {
        &self.api_host
    }

    pub fn service_token(&self) -> &str {
        &self.service_token
    }

    /// Fetch the service this process runs as.
    pub async fn get_current_service(&self) -> Result<CurrentService, ServiceError> {
        self.get("/services/current").await
    }

    /// Fetch one connection of the current service.
    pub async fn get_connection_details(&self, connection_id: &str) -> Result<ServiceConnection, ServiceError> {
        self.get(&format!("/services/current/connections/{connection_id}")).await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.api_host, path);
        debug!(%url, "building request");

        self.http
            .request(method, url)
            .header(header::CONTENT_TYPE, "application/json")
            .bearer_auth(&self.service_token)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ServiceError> {
        let response = self
            .request(Method::GET, path)
            .send()
            .await
            .map_err(|source| ServiceError::Send { url: format!("{}{}", self.api_host, path), source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Status { status });
        }
        response.json::<T>().await.map_err(ServiceError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_supplies_host_and_token() {
        temp_env::with_vars([(HOST_VAR, Some("some-host")), (TOKEN_VAR, Some("some-token"))], || {
            let client = ServiceClient::from_env().expect("client");
            assert_eq!(client.api_host(), "some-host");
            assert_eq!(client.service_token(), "some-token");

            let client = client.with_host("another-host").with_token("another-token");
            assert_eq!(client.api_host(), "another-host");
            assert_eq!(client.service_token(), "another-token");
        });
    }

    #[test]
    fn unset_or_empty_environment_uses_defaults() {
        temp_env::with_vars([(HOST_VAR, Some("")), (TOKEN_VAR, None::<&str>)], || {
            let client = ServiceClient::from_env().expect("client");
            assert_eq!(client.api_host(), DEFAULT_API_HOST);
            assert_eq!(client.service_token(), "");
        });
    }
}
