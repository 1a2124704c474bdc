use thiserror::Error;

use tether_core::NativeTypeId;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("metadata file not found: {0}")]
    MetadataMissing(String),

    #[error("failed to read metadata {path}: {source}")]
    MetadataUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed metadata in {path}: {source}")]
    MetadataMalformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("inheritance cycle: {}", .0.join(" -> "))]
    InheritanceCycle(Vec<String>),

    #[error("native type {0} is not known to the framework")]
    UnknownNativeType(NativeTypeId),

    #[error("managed type {0} is still waiting on its base type")]
    NotBuilt(String),
}

impl RegistryError {
    /// Whether this error permanently prevents a module's types from existing.
    pub fn is_fatal_load(&self) -> bool {
        matches!(
            self,
            RegistryError::MetadataMissing(_)
                | RegistryError::MetadataUnreadable { .. }
                | RegistryError::MetadataMalformed { .. }
        )
    }
}
