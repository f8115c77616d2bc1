//! Error types for the provider RPC service.

use anzu_value::EncodingError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::protocol::{Method, RpcCode, RpcStatus};

/// Failures raised while dispatching a call to provider code.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error("resource kind {kind:?} not found")]
    ResourceKindNotFound { kind: String },

    #[error("function {name:?} not found")]
    FunctionNotFound { name: String },

    #[error("environment provider {environment_provider_id:?} was not configured")]
    NotConfigured { environment_provider_id: String },

    #[error("failed to {operation} resource: {source:#}")]
    Handler {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to invoke function: {source:#}")]
    Function {
        #[source]
        source: anyhow::Error,
    },
}

impl DispatchError {
    /// Create a resource kind not found error.
    pub fn resource_kind_not_found(kind: impl Into<String>) -> Self {
        Self::ResourceKindNotFound { kind: kind.into() }
    }

    /// Create a function not found error.
    pub fn function_not_found(name: impl Into<String>) -> Self {
        Self::FunctionNotFound { name: name.into() }
    }

    /// Create a not configured error.
    pub fn not_configured(environment_provider_id: impl Into<String>) -> Self {
        Self::NotConfigured { environment_provider_id: environment_provider_id.into() }
    }

    /// Create a resource handler error.
    pub fn handler(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Handler { operation, source }
    }

    /// Status code reported to the caller.
    pub fn code(&self) -> RpcCode {
        match self {
            DispatchError::Encoding(EncodingError::Decode { .. }) => RpcCode::InvalidArgument,
            DispatchError::Encoding(EncodingError::Encode { .. }) => RpcCode::Internal,
            DispatchError::ResourceKindNotFound { .. } | DispatchError::FunctionNotFound { .. } => RpcCode::NotFound,
            DispatchError::NotConfigured { .. } => RpcCode::FailedPrecondition,
            DispatchError::Handler { .. } | DispatchError::Function { .. } => RpcCode::Internal,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let code = self.code();
        tracing::debug!(%code, error = %self, "provider call failed");
        let status = StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(RpcStatus { code, message: self.to_string() })).into_response()
    }
}

/// Failures observed by a caller of the provider RPC service.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("connection to provider is closed")]
    Closed,

    #[error("invalid provider address: {0}")]
    InvalidAddress(#[from] url::ParseError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("{method} call failed: {source}")]
    Transport {
        method: Method,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} call exceeded its deadline")]
    DeadlineExceeded { method: Method },

    #[error("{method} call failed ({code}): {message}")]
    Status { method: Method, code: RpcCode, message: String },

    #[error("failed to decode {method} reply: {source}")]
    InvalidReply {
        method: Method,
        #[source]
        source: reqwest::Error,
    },
}

impl RpcError {
    /// Status code of a failed call, if the provider replied with one.
    pub fn code(&self) -> Option<RpcCode> {
        match self {
            RpcError::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}
