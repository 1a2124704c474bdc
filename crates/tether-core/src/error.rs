use thiserror::Error;

use crate::graph::TableId;
use crate::types::NativeTypeId;

#[derive(Debug, Error)]
pub enum FrameworkError {
    #[error("unknown native type: {0}")]
    UnknownType(NativeTypeId),

    #[error("data table not found: {0:?}")]
    TableNotFound(TableId),

    #[error("data table {table:?} has no row type")]
    MissingRowType { table: TableId },

    #[error("table import failed: {0}")]
    TableImport(String),

    #[error("managed exception: {0}")]
    ManagedException(String),

    #[error("managed method not found: {0}")]
    MethodNotFound(String),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
