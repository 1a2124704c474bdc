use thiserror::Error;

use tether_core::{FrameworkError, graph::TableId};

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("failed to snapshot table {table:?}: {source}")]
    TableExport {
        table: TableId,
        #[source]
        source: FrameworkError,
    },

    #[error("failed to replay rows into table {table:?}: {source}")]
    TableImport {
        table: TableId,
        #[source]
        source: FrameworkError,
    },
}
