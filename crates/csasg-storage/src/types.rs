//! Storage-layer types: store configuration and graph summaries.

use serde::{Deserialize, Serialize};

/// Configuration shared by [`FileStore`](crate::file::FileStore) and
/// [`InMemoryStore`](crate::memory::InMemoryStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Run the integrity checker after every successful load.
    pub verify_on_load: bool,
    /// Extension of graph files, without the dot.
    pub extension: String,
    /// Extension of filter files, without the dot.
    pub filter_extension: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            verify_on_load: true,
            extension: "csi".to_string(),
            filter_extension: "flt".to_string(),
        }
    }
}

/// What a store reports about a saved graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSummary {
    pub name: String,
    /// Live nodes, root included.
    pub nodes: usize,
    /// Encoded size in bytes.
    pub bytes: u64,
    /// Hex blake3 digest of the graph content.
    pub digest: String,
}
