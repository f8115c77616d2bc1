//! Wire messages of the provider RPC service.
//!
//! Every method is a `POST` to `/anzu.provider.v1.Provider/<Method>` carrying a
//! JSON object. Payload members are strings holding JSON encodings of the
//! structures in [`crate::data`], so the transport never interprets them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fully qualified service name used as the route prefix.
pub const SERVICE_NAME: &str = "anzu.provider.v1.Provider";

/// RPC methods exposed by a provider process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Ping,
    Configure,
    Create,
    Read,
    Update,
    Delete,
    InvokeFunction,
}

impl Method {
    pub const ALL: [Method; 7] = [
        Method::Ping,
        Method::Configure,
        Method::Create,
        Method::Read,
        Method::Update,
        Method::Delete,
        Method::InvokeFunction,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Method::Ping => "Ping",
            Method::Configure => "Configure",
            Method::Create => "Create",
            Method::Read => "Read",
            Method::Update => "Update",
            Method::Delete => "Delete",
            Method::InvokeFunction => "InvokeFunction",
        }
    }

    /// Route path of this method, e.g. `/anzu.provider.v1.Provider/Ping`.
    pub fn path(&self) -> String {
        format!("/{SERVICE_NAME}/{}", self.name())
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reply of methods without a payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigureRequest {
    pub environment_provider_id: String,
    /// Encoded [`crate::ProviderConfiguration`].
    pub config_values: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    /// Encoded [`crate::ResourceInfo`].
    pub resource_info: String,
    /// Encoded [`crate::InputValues`].
    pub input_values: String,
    /// Encoded [`crate::DeploymentInfo`].
    pub deployment_info: String,
    pub environment_provider_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadRequest {
    pub resource_info: String,
    /// Encoded [`crate::StateData`].
    pub state: String,
    pub deployment_info: String,
    pub environment_provider_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub resource_info: String,
    pub state: String,
    pub input_values: String,
    pub deployment_info: String,
    pub environment_provider_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRequest {
    pub resource_info: String,
    pub state: String,
    pub deployment_info: String,
    pub environment_provider_id: String,
}

/// Reply of `Create`, `Read` and `Update`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceReply {
    /// The handler's state, encoded as plain JSON.
    pub state: String,
    /// Encoded list of [`anzu_value::Output`].
    pub output_values: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeFunctionRequest {
    pub function_name: String,
    /// Encoded [`crate::InputValues`].
    pub argument_values: String,
    pub environment_provider_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeFunctionReply {
    /// Encoded [`anzu_value::Value`], empty when the function returned nothing.
    #[serde(default)]
    pub output_value: String,
}

/// Status codes carried by failed calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpcCode {
    InvalidArgument,
    NotFound,
    FailedPrecondition,
    Internal,
    Unavailable,
    Unknown,
}

impl RpcCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RpcCode::InvalidArgument => "invalid_argument",
            RpcCode::NotFound => "not_found",
            RpcCode::FailedPrecondition => "failed_precondition",
            RpcCode::Internal => "internal",
            RpcCode::Unavailable => "unavailable",
            RpcCode::Unknown => "unknown",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            RpcCode::InvalidArgument => 400,
            RpcCode::NotFound => 404,
            RpcCode::FailedPrecondition => 412,
            RpcCode::Internal | RpcCode::Unknown => 500,
            RpcCode::Unavailable => 503,
        }
    }

    /// Best-effort code for a reply that did not carry a status body.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 | 415 | 422 => RpcCode::InvalidArgument,
            404 => RpcCode::NotFound,
            412 => RpcCode::FailedPrecondition,
            503 => RpcCode::Unavailable,
            500 => RpcCode::Internal,
            _ => RpcCode::Unknown,
        }
    }
}

impl fmt::Display for RpcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a failed call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcStatus {
    pub code: RpcCode,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_paths_are_service_scoped() {
        assert_eq!(Method::InvokeFunction.path(), "/anzu.provider.v1.Provider/InvokeFunction");
        assert_eq!(Method::ALL.len(), 7);
    }

    #[test]
    fn request_fields_use_camel_case() {
        let request = ConfigureRequest { environment_provider_id: "env-1".into(), config_values: "{\"values\":[]}".into() };
        let encoded = serde_json::to_value(&request).expect("encode");
        assert_eq!(encoded, serde_json::json!({"environmentProviderId": "env-1", "configValues": "{\"values\":[]}"}));
    }
}
