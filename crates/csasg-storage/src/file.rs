//! Directory-backed implementation of [`GraphStore`].
//!
//! Each graph `name` lives in `<root>/<name>.csi`, its filter beside it in
//! `<root>/<name>.flt` (extensions come from [`StoreConfig`]). Writes go to a
//! temporary file in the same directory which is then renamed over the
//! target, so a crash never leaves a half-written graph behind.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use csasg_core::{CoreError, Factory, Header};

use crate::error::StorageError;
use crate::hash::graph_digest;
use crate::integrity;
use crate::traits::{validate_name, GraphStore};
use crate::types::{GraphSummary, StoreConfig};

/// Store keeping one file per graph under a root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    config: StoreConfig,
}

impl FileStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>, config: StoreConfig) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StorageError::io(&root, e))?;
        Ok(FileStore { root, config })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Path of the graph file for `name`.
    pub fn graph_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{}", self.config.extension))
    }

    /// Path of the filter file for `name`.
    pub fn filter_path(&self, name: &str) -> PathBuf {
        self.root
            .join(format!("{name}.{}", self.config.filter_extension))
    }

    /// Writes through `write` into a temp file, then renames it to `path`.
    fn write_atomic<F>(&self, path: &Path, write: F) -> Result<u64, StorageError>
    where
        F: FnOnce(&mut BufWriter<&mut NamedTempFile>) -> Result<(), CoreError>,
    {
        let mut tmp = NamedTempFile::new_in(&self.root).map_err(|e| StorageError::io(&self.root, e))?;
        {
            let mut writer = BufWriter::new(&mut tmp);
            write(&mut writer)?;
            writer.flush().map_err(|e| StorageError::io(path, e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| StorageError::io(tmp.path(), e))?;
        let file = tmp.persist(path).map_err(|e| StorageError::io(path, e.error))?;
        let len = file
            .metadata()
            .map_err(|e| StorageError::io(path, e))?
            .len();
        Ok(len)
    }

    fn open_existing(path: &Path) -> Result<Option<File>, StorageError> {
        match File::open(path) {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    fn remove_if_exists(path: &Path) -> Result<bool, StorageError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }
}

impl GraphStore for FileStore {
    #[tracing::instrument(skip(self, factory, header))]
    fn save_graph(
        &mut self,
        name: &str,
        factory: &Factory,
        header: &Header,
    ) -> Result<GraphSummary, StorageError> {
        validate_name(name)?;
        let path = self.graph_path(name);
        let bytes = self.write_atomic(&path, |w| factory.save(w, header))?;
        Self::remove_if_exists(&self.filter_path(name))?;

        let summary = GraphSummary {
            name: name.to_string(),
            nodes: factory.node_count(),
            bytes,
            digest: graph_digest(factory).to_hex().to_string(),
        };
        tracing::info!("Saved graph {} ({} nodes)", name, summary.nodes);
        tracing::debug!("Wrote {} bytes to {}", bytes, path.display());
        Ok(summary)
    }

    #[tracing::instrument(skip(self, factory))]
    fn load_graph(&self, name: &str, factory: &mut Factory) -> Result<Header, StorageError> {
        validate_name(name)?;
        let path = self.graph_path(name);
        let file = Self::open_existing(&path)?.ok_or_else(|| StorageError::NotFound {
            name: name.to_string(),
        })?;

        let header = factory
            .load(BufReader::new(file))?
            .ok_or_else(|| StorageError::Integrity {
                reason: format!("{} is not in csi format", path.display()),
            })?;
        if self.config.verify_on_load {
            if let Err(err) = integrity::ensure(factory) {
                factory.reset();
                return Err(err);
            }
        }
        tracing::info!("Loaded graph {} ({} nodes)", name, factory.node_count());
        Ok(header)
    }

    #[tracing::instrument(skip(self, factory))]
    fn save_filter(&mut self, name: &str, factory: &Factory) -> Result<(), StorageError> {
        validate_name(name)?;
        if !self.graph_path(name).is_file() {
            return Err(StorageError::NotFound {
                name: name.to_string(),
            });
        }
        let path = self.filter_path(name);
        let bytes = self.write_atomic(&path, |w| factory.save_filter(w))?;
        tracing::debug!(
            "Saved filter for {} ({} of {} slots filtered, {} bytes)",
            name,
            factory.filtered_count(),
            factory.size(),
            bytes
        );
        Ok(())
    }

    #[tracing::instrument(skip(self, factory))]
    fn load_filter(&self, name: &str, factory: &mut Factory) -> Result<bool, StorageError> {
        validate_name(name)?;
        let path = self.filter_path(name);
        match Self::open_existing(&path)? {
            Some(file) => {
                factory.load_filter(BufReader::new(file))?;
                tracing::debug!("Loaded filter for {}", name);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn list(&self) -> Result<Vec<String>, StorageError> {
        let entries = fs::read_dir(&self.root).map_err(|e| StorageError::io(&self.root, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StorageError::io(&self.root, e))?.path();
            if !path.is_file() {
                continue;
            }
            let matches = path
                .extension()
                .is_some_and(|ext| ext == self.config.extension.as_str());
            if let (true, Some(stem)) = (matches, path.file_stem().and_then(|s| s.to_str())) {
                if validate_name(stem).is_ok() {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    #[tracing::instrument(skip(self))]
    fn delete(&mut self, name: &str) -> Result<(), StorageError> {
        validate_name(name)?;
        Self::remove_if_exists(&self.filter_path(name))?;
        if !Self::remove_if_exists(&self.graph_path(name))? {
            return Err(StorageError::NotFound {
                name: name.to_string(),
            });
        }
        tracing::info!("Deleted graph {}", name);
        Ok(())
    }

    fn contains(&self, name: &str) -> Result<bool, StorageError> {
        validate_name(name)?;
        Ok(self.graph_path(name).is_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use csasg_core::{EdgeKind, NodeKind};

    fn store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path().join("graphs"), StoreConfig::default()).unwrap();
        (dir, store)
    }

    #[test]
    fn open_creates_root() {
        let (dir, store) = store();
        assert!(dir.path().join("graphs").is_dir());
        assert_eq!(store.root(), dir.path().join("graphs"));
    }

    #[test]
    fn paths_use_configured_extensions() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig {
            extension: "asg".to_string(),
            filter_extension: "vis".to_string(),
            ..StoreConfig::default()
        };
        let store = FileStore::open(dir.path(), config).unwrap();
        assert_eq!(store.graph_path("app"), dir.path().join("app.asg"));
        assert_eq!(store.filter_path("app"), dir.path().join("app.vis"));
    }

    #[test]
    fn save_leaves_no_temp_files() {
        let (_dir, mut store) = store();
        let mut f = Factory::new();
        let ns = f.create_node(NodeKind::NamespaceDeclaration).unwrap();
        f.add_edge(f.root(), EdgeKind::CompilationUnitMembers, ns)
            .unwrap();
        let summary = store.save_graph("app", &f, &Header::new()).unwrap();

        let files: Vec<_> = fs::read_dir(store.root())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(files, vec![std::ffi::OsString::from("app.csi")]);
        assert_eq!(
            fs::metadata(store.graph_path("app")).unwrap().len(),
            summary.bytes
        );
    }

    #[test]
    fn list_ignores_other_files() {
        let (_dir, mut store) = store();
        let f = Factory::new();
        store.save_graph("one", &f, &Header::new()).unwrap();
        store.save_filter("one", &f).unwrap();
        fs::write(store.root().join("notes.txt"), "x").unwrap();
        assert_eq!(store.list().unwrap(), vec!["one"]);
    }
}
