//! In-memory implementation of [`GraphStore`].
//!
//! [`InMemoryStore`] keeps encoded `csi` buffers in maps and honours
//! [`StoreConfig::verify_on_load`] the way [`FileStore`](crate::file::FileStore)
//! does. Graphs go through the real codec, so a save/load cycle here exercises
//! exactly what a file round-trip would. The extension fields of the config
//! have no meaning here.

use std::collections::BTreeMap;

use csasg_core::{Factory, Header};

use crate::error::StorageError;
use crate::hash::graph_digest;
use crate::integrity;
use crate::traits::{validate_name, GraphStore};
use crate::types::{GraphSummary, StoreConfig};

/// Store holding graphs and filters as byte buffers.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    graphs: BTreeMap<String, Vec<u8>>,
    filters: BTreeMap<String, Vec<u8>>,
    config: StoreConfig,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: StoreConfig) -> Self {
        InMemoryStore {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Raw encoded bytes of a stored graph.
    pub fn bytes(&self, name: &str) -> Option<&[u8]> {
        self.graphs.get(name).map(Vec::as_slice)
    }

    /// Stores raw bytes as a graph, bypassing the encoder.
    pub fn insert_bytes(&mut self, name: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        validate_name(name)?;
        self.filters.remove(name);
        self.graphs.insert(name.to_string(), bytes);
        Ok(())
    }
}

impl GraphStore for InMemoryStore {
    fn save_graph(
        &mut self,
        name: &str,
        factory: &Factory,
        header: &Header,
    ) -> Result<GraphSummary, StorageError> {
        validate_name(name)?;
        let mut bytes = Vec::new();
        factory.save(&mut bytes, header)?;
        let summary = GraphSummary {
            name: name.to_string(),
            nodes: factory.node_count(),
            bytes: bytes.len() as u64,
            digest: graph_digest(factory).to_hex().to_string(),
        };
        self.filters.remove(name);
        self.graphs.insert(name.to_string(), bytes);
        Ok(summary)
    }

    fn load_graph(&self, name: &str, factory: &mut Factory) -> Result<Header, StorageError> {
        validate_name(name)?;
        let bytes = self.graphs.get(name).ok_or_else(|| StorageError::NotFound {
            name: name.to_string(),
        })?;
        let header = factory
            .load(bytes.as_slice())?
            .ok_or_else(|| StorageError::Integrity {
                reason: format!("graph {name} is not in csi format"),
            })?;
        if self.config.verify_on_load {
            if let Err(err) = integrity::ensure(factory) {
                factory.reset();
                return Err(err);
            }
        }
        Ok(header)
    }

    fn save_filter(&mut self, name: &str, factory: &Factory) -> Result<(), StorageError> {
        validate_name(name)?;
        if !self.graphs.contains_key(name) {
            return Err(StorageError::NotFound {
                name: name.to_string(),
            });
        }
        let mut bytes = Vec::new();
        factory.save_filter(&mut bytes)?;
        self.filters.insert(name.to_string(), bytes);
        Ok(())
    }

    fn load_filter(&self, name: &str, factory: &mut Factory) -> Result<bool, StorageError> {
        validate_name(name)?;
        match self.filters.get(name) {
            Some(bytes) => {
                factory.load_filter(bytes.as_slice())?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn list(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.graphs.keys().cloned().collect())
    }

    fn delete(&mut self, name: &str) -> Result<(), StorageError> {
        validate_name(name)?;
        self.filters.remove(name);
        match self.graphs.remove(name) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound {
                name: name.to_string(),
            }),
        }
    }

    fn contains(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.graphs.contains_key(name))
    }
}
