//! Caller side of the provider RPC service.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use url::Url;

use crate::error::RpcError;
use crate::protocol::{
    ConfigureRequest, CreateRequest, DeleteRequest, Empty, InvokeFunctionReply, InvokeFunctionRequest, Method, ReadRequest, ResourceReply,
    RpcCode, RpcStatus, UpdateRequest,
};

#[derive(Debug)]
struct Channel {
    base_url: Url,
    http: RwLock<Option<reqwest::Client>>,
    deadline: Option<Duration>,
}

/// Owned channel to one provider process.
///
/// Only the owner can close the channel. Stubs obtained through
/// [`ProviderConnection::client`] share it and fail with
/// [`RpcError::Closed`] once it is closed.
#[derive(Debug)]
pub struct ProviderConnection {
    channel: Arc<Channel>,
}

impl ProviderConnection {
    /// Open a channel to a provider serving on `127.0.0.1:<port>`.
    pub fn connect(port: u16, deadline: Option<Duration>) -> Result<Self, RpcError> {
        let base_url = Url::parse(&format!("http://127.0.0.1:{port}"))?;
        Self::with_base_url(base_url, deadline)
    }

    /// Open a channel to a provider at `base_url`. Every call is bounded by
    /// `deadline` when one is given.
    pub fn with_base_url(base_url: Url, deadline: Option<Duration>) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder().no_proxy().build().map_err(RpcError::Client)?;
        Ok(Self { channel: Arc::new(Channel { base_url, http: RwLock::new(Some(http)), deadline }) })
    }

    pub fn base_url(&self) -> &Url {
        &self.channel.base_url
    }

    /// Create a stub sharing this channel.
    pub fn client(&self) -> ProviderClient {
        ProviderClient { channel: Arc::clone(&self.channel) }
    }

    /// Close the channel. Closing an already closed channel is an error.
    pub async fn close(&self) -> Result<(), RpcError> {
        match self.channel.http.write().await.take() {
            Some(_) => Ok(()),
            None => Err(RpcError::Closed),
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.channel.http.read().await.is_none()
    }
}

/// RPC stub for one provider process.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    channel: Arc<Channel>,
}

impl ProviderClient {
    /// No-op call used for readiness polling.
    pub async fn ping(&self) -> Result<(), RpcError> {
        self.call::<_, Empty>(Method::Ping, &Empty {}).await.map(|_| ())
    }

    pub async fn configure(&self, request: &ConfigureRequest) -> Result<(), RpcError> {
        self.call::<_, Empty>(Method::Configure, request).await.map(|_| ())
    }

    pub async fn create(&self, request: &CreateRequest) -> Result<ResourceReply, RpcError> {
        self.call(Method::Create, request).await
    }

    pub async fn read(&self, request: &ReadRequest) -> Result<ResourceReply, RpcError> {
        self.call(Method::Read, request).await
    }

    pub async fn update(&self, request: &UpdateRequest) -> Result<ResourceReply, RpcError> {
        self.call(Method::Update, request).await
    }

    pub async fn delete(&self, request: &DeleteRequest) -> Result<(), RpcError> {
        self.call::<_, Empty>(Method::Delete, request).await.map(|_| ())
    }

    pub async fn invoke_function(&self, request: &InvokeFunctionRequest) -> Result<InvokeFunctionReply, RpcError> {
        self.call(Method::InvokeFunction, request).await
    }

    async fn call<Req, Rep>(&self, method: Method, request: &Req) -> Result<Rep, RpcError>
    where
        Req: Serialize + ?Sized,
        Rep: DeserializeOwned,
    {
        let http = self.channel.http.read().await.clone().ok_or(RpcError::Closed)?;
        let url = self.channel.base_url.join(&method.path())?;

        let mut builder = http.post(url).json(request);
        if let Some(deadline) = self.channel.deadline {
            builder = builder.timeout(deadline);
        }

        let response = builder.send().await.map_err(|source| {
            if source.is_timeout() {
                RpcError::DeadlineExceeded { method }
            } else {
                RpcError::Transport { method, source }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let (code, message) = match serde_json::from_str::<RpcStatus>(&body) {
                Ok(rpc_status) => (rpc_status.code, rpc_status.message),
                Err(_) => (RpcCode::from_http_status(status.as_u16()), body),
            };
            return Err(RpcError::Status { method, code, message });
        }

        response.json::<Rep>().await.map_err(|source| {
            if source.is_timeout() {
                RpcError::DeadlineExceeded { method }
            } else {
                RpcError::InvalidReply { method, source }
            }
        })
    }
}
