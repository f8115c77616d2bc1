//! Structures carried inside the encoded payload strings of the RPC messages.

use anzu_value::{Input, Value};
use serde::{Deserialize, Serialize};

/// Resource state is an arbitrary JSON document owned by the provider.
pub type State = serde_json::Value;

/// Inputs of a resource operation or arguments of a function call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputValues {
    #[serde(default)]
    pub inputs: Vec<Input>,
}

impl InputValues {
    pub fn new(inputs: Vec<Input>) -> Self {
        Self { inputs }
    }
}

/// Prior state handed back to the provider on read, update and delete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateData {
    #[serde(default)]
    pub state: State,
}

impl StateData {
    pub fn new(state: State) -> Self {
        Self { state }
    }
}

/// Identity of the resource an operation targets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfo {
    #[serde(default)]
    pub resource_id: String,
    #[serde(default)]
    pub resource_name: String,
    #[serde(default)]
    pub resource_kind: String,
}

impl ResourceInfo {
    pub fn new(resource_id: impl Into<String>, resource_name: impl Into<String>, resource_kind: impl Into<String>) -> Self {
        Self { resource_id: resource_id.into(), resource_name: resource_name.into(), resource_kind: resource_kind.into() }
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    /// The user-supplied resource name.
    ///
    /// This is not unique across environments. Prefer
    /// [`crate::NameGenerator::resource_name`] when naming external objects.
    pub fn raw_resource_name(&self) -> &str {
        &self.resource_name
    }

    pub fn resource_kind(&self) -> &str {
        &self.resource_kind
    }
}

/// Identity of the deployment step an operation runs in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentInfo {
    #[serde(default)]
    pub deployment_id: String,
    #[serde(default)]
    pub idempotency_key: String,
    #[serde(default)]
    pub deployment_provider_token: String,
}

impl DeploymentInfo {
    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    /// Key unique to the current deployment step and stable across retries of
    /// that step. Use it to deduplicate side effects.
    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }

    /// Short-lived token proving requests originate from this deployment.
    /// Expires 3 hours after the deployment started.
    pub fn deployment_provider_token(&self) -> &str {
        &self.deployment_provider_token
    }
}

/// Resolved configuration of one environment provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfiguration {
    #[serde(default)]
    pub values: Vec<Input>,
}

impl ProviderConfiguration {
    pub fn new(values: Vec<Input>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[Input] {
        &self.values
    }

    /// Look up a configuration value by name. The last entry wins on duplicates.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.iter().rev().find(|input| input.name == name).map(|input| &input.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_info_uses_camel_case_members() {
        let info: ResourceInfo =
            serde_json::from_str(r#"{"resourceId":"r-1","resourceName":"web app","resourceKind":"bucket"}"#).expect("decode");
        assert_eq!(info.resource_id(), "r-1");
        assert_eq!(info.raw_resource_name(), "web app");
        assert_eq!(info.resource_kind(), "bucket");
    }

    #[test]
    fn configuration_lookup_prefers_latest_value() {
        let configuration = ProviderConfiguration::new(vec![
            Input::new("region", Value::string("eu-west-1")),
            Input::new("region", Value::string("us-east-1")),
        ]);
        assert_eq!(configuration.get("region"), Some(&Value::string("us-east-1")));
        assert_eq!(configuration.get("zone"), None);
    }
}
