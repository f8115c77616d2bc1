//! Provider descriptors handed to setup.

use anzu_value::Input;
use serde::{Deserialize, Serialize};

/// Location and integrity data of a provider version's binary archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderVersionBinary {
    /// HTTPS URL of the gzip-compressed tar archive.
    #[serde(default)]
    pub url: String,
    /// Standard base64 encoding of the archive's SHA-256 digest.
    #[serde(default)]
    pub check_sum: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderExecutionSettings {
    #[serde(default)]
    pub binary: ProviderVersionBinary,
}

/// Binding of a provider version to one environment provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderUsage {
    pub environment_provider_id: String,
    /// Unresolved configuration inputs. Configuration references are resolved
    /// during setup.
    #[serde(default)]
    pub configuration: Vec<Input>,
}

/// One provider version to bring up, with every environment provider using it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDescriptor {
    pub provider_id: String,
    pub provider_version_id: String,
    #[serde(default)]
    pub execution_settings: ProviderExecutionSettings,
    #[serde(default)]
    pub usages: Vec<ProviderUsage>,
}

impl ProviderDescriptor {
    /// Create a descriptor without binary settings or usages.
    pub fn new(provider_id: impl Into<String>, provider_version_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            provider_version_id: provider_version_id.into(),
            execution_settings: ProviderExecutionSettings::default(),
            usages: Vec::new(),
        }
    }

    /// Set the binary archive URL and checksum.
    pub fn with_binary(mut self, url: impl Into<String>, check_sum: impl Into<String>) -> Self {
        self.execution_settings.binary = ProviderVersionBinary { url: url.into(), check_sum: check_sum.into() };
        self
    }

    /// Add an environment provider using this version.
    pub fn with_usage(mut self, environment_provider_id: impl Into<String>, configuration: Vec<Input>) -> Self {
        self.usages.push(ProviderUsage { environment_provider_id: environment_provider_id.into(), configuration });
        self
    }

    pub fn binary(&self) -> &ProviderVersionBinary {
        &self.execution_settings.binary
    }

    pub fn environment_provider_ids(&self) -> Vec<String> {
        self.usages.iter().map(|usage| usage.environment_provider_id.clone()).collect()
    }
}

/// Parse a JSON array of provider descriptors.
pub fn load_descriptors_from_str(raw: &str) -> Result<Vec<ProviderDescriptor>, anzu_value::EncodingError> {
    anzu_value::decode("provider descriptors", raw)
}
