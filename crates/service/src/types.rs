use anzu_value::{Input, Output};
use serde::{Deserialize, Serialize};

/// Reply of `GET /services/current`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentService {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub environment: ServiceEnvironment,
    #[serde(default)]
    pub inputs: Vec<Input>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEnvironment {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub variant_id: String,
}

/// Reply of `GET /services/current/connections/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConnection {
    pub id: String,
    pub name: String,
    /// The connected resource, absent for connections without one.
    #[serde(default)]
    pub resource: Option<ConnectionResource>,
    #[serde(default)]
    pub inputs: Vec<Input>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionResource {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<Input>,
    #[serde(default)]
    pub outputs: Vec<Output>,
}
