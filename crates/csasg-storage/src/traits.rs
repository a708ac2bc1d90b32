//! The [`GraphStore`] trait defining the storage contract for ASGs.
//!
//! A store keeps named graphs in the `csi` format, each with an optional
//! filter file beside it. All backends (FileStore, InMemoryStore) implement
//! this trait and are interchangeable.

use csasg_core::{Factory, Header};

use crate::error::StorageError;
use crate::integrity;
use crate::types::GraphSummary;

/// The storage contract for named graphs.
///
/// The trait is synchronous, like the factory it persists.
pub trait GraphStore {
    /// Saves `factory` under `name`, replacing any previous graph.
    fn save_graph(
        &mut self,
        name: &str,
        factory: &Factory,
        header: &Header,
    ) -> Result<GraphSummary, StorageError>;

    /// Loads the graph stored under `name` into `factory`.
    ///
    /// On error `factory` is left as a fresh arena.
    fn load_graph(&self, name: &str, factory: &mut Factory) -> Result<Header, StorageError>;

    /// Saves the filter states of `factory` under `name`.
    fn save_filter(&mut self, name: &str, factory: &Factory) -> Result<(), StorageError>;

    /// Restores filter states saved under `name`.
    ///
    /// Returns `false`, leaving the filter untouched, if none were saved.
    fn load_filter(&self, name: &str, factory: &mut Factory) -> Result<bool, StorageError>;

    /// Names of all stored graphs, sorted.
    fn list(&self) -> Result<Vec<String>, StorageError>;

    /// Removes a graph and its filter.
    fn delete(&mut self, name: &str) -> Result<(), StorageError>;

    /// Returns `true` if a graph is stored under `name`.
    fn contains(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.list()?.iter().any(|n| n == name))
    }

    /// Loads a graph and runs the integrity checker on it.
    fn load_verified(&self, name: &str, factory: &mut Factory) -> Result<Header, StorageError> {
        let header = self.load_graph(name, factory)?;
        if let Err(err) = integrity::ensure(factory) {
            factory.reset();
            return Err(err);
        }
        Ok(header)
    }
}

/// Rejects names that are empty or could escape the store.
pub(crate) fn validate_name(name: &str) -> Result<(), StorageError> {
    let bad = name.is_empty()
        || name.starts_with('.')
        || name
            .chars()
            .any(|c| matches!(c, '/' | '\\' | '\0') || c.is_control());
    if bad {
        return Err(StorageError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_validated() {
        for good in ["app", "App.Core", "my-graph_2"] {
            assert!(validate_name(good).is_ok(), "{good}");
        }
        for bad in ["", ".hidden", "../up", "a/b", "a\\b", "nul\0"] {
            assert!(matches!(
                validate_name(bad),
                Err(StorageError::InvalidName { .. })
            ));
        }
    }
}
