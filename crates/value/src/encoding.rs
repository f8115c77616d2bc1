use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Errors raised while converting values to and from their string form.
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("failed to marshal {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to unmarshal {what}: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Encode any wire structure into its JSON string form.
///
/// `what` names the payload in the resulting error, e.g. `"input values"`.
pub fn encode<T: Serialize + ?Sized>(what: &'static str, value: &T) -> Result<String, EncodingError> {
    serde_json::to_string(value).map_err(|source| EncodingError::Encode { what, source })
}

/// Decode a JSON string into the requested wire structure.
pub fn decode<T: DeserializeOwned>(what: &'static str, raw: &str) -> Result<T, EncodingError> {
    serde_json::from_str(raw).map_err(|source| EncodingError::Decode { what, source })
}
