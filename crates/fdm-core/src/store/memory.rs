//! In-memory record store.

use super::{ArrayData, Container, ContainerHandle, MetaValue, Metadata, RecordStore, StoredArray, StoreError};
use crate::error::Result;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Containers held in process memory; closed containers stay available for
/// [`RecordStore::open_container`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    containers: BTreeMap<String, Container>,
    open: HashMap<u64, String>,
    next_handle: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of every container ever created
    pub fn container_names(&self) -> Vec<String> {
        self.containers.keys().cloned().collect()
    }

    pub(crate) fn container(
        &self,
        handle: ContainerHandle,
    ) -> std::result::Result<&Container, StoreError> {
        self.open
            .get(&handle.0)
            .and_then(|name| self.containers.get(name))
            .ok_or(StoreError::UnknownContainer(handle.0))
    }

    fn container_mut(
        &mut self,
        handle: ContainerHandle,
    ) -> std::result::Result<&mut Container, StoreError> {
        let name = self
            .open
            .get(&handle.0)
            .ok_or(StoreError::UnknownContainer(handle.0))?;
        self.containers
            .get_mut(name)
            .ok_or(StoreError::UnknownContainer(handle.0))
    }

    fn issue_handle(&mut self, name: &str) -> ContainerHandle {
        let handle = ContainerHandle(self.next_handle);
        self.next_handle += 1;
        self.open.insert(handle.0, name.to_string());
        handle
    }

    /// Insert a fully-formed container (used by [`super::JsonStore`])
    pub(crate) fn insert_container(&mut self, container: Container) -> ContainerHandle {
        let name = container.name.clone();
        self.containers.insert(name.clone(), container);
        self.issue_handle(&name)
    }

    /// Detach the container behind `handle`, releasing the handle
    pub(crate) fn take_container(
        &mut self,
        handle: ContainerHandle,
    ) -> std::result::Result<Container, StoreError> {
        let name = self
            .open
            .remove(&handle.0)
            .ok_or(StoreError::UnknownContainer(handle.0))?;
        self.containers
            .remove(&name)
            .ok_or(StoreError::UnknownContainer(handle.0))
    }
}

impl RecordStore for MemoryStore {
    fn create_container(&mut self, name: &str) -> Result<ContainerHandle> {
        debug!(container = name, "creating in-memory container");
        Ok(self.insert_container(Container::new(name)))
    }

    fn open_container(&mut self, name: &str) -> Result<ContainerHandle> {
        if !self.containers.contains_key(name) {
            return Err(StoreError::NotFound {
                container: name.to_string(),
                path: "/".to_string(),
            }
            .into());
        }
        Ok(self.issue_handle(name))
    }

    fn set_attribute(&mut self, handle: ContainerHandle, key: &str, value: MetaValue) -> Result<()> {
        self.container_mut(handle)?.attributes.insert(key, value);
        Ok(())
    }

    fn attributes(&self, handle: ContainerHandle) -> Result<Metadata> {
        Ok(self.container(handle)?.attributes.clone())
    }

    fn write_array(
        &mut self,
        handle: ContainerHandle,
        path: &str,
        data: ArrayData,
        metadata: Metadata,
    ) -> Result<()> {
        let container = self.container_mut(handle)?;
        container
            .arrays
            .insert(path.to_string(), StoredArray { data, metadata });
        Ok(())
    }

    fn read_array(&self, handle: ContainerHandle, path: &str) -> Result<(ArrayData, Metadata)> {
        let stored = self.container(handle)?.array(path)?;
        Ok((stored.data.clone(), stored.metadata.clone()))
    }

    fn list_contents(&self, handle: ContainerHandle) -> Result<Vec<String>> {
        Ok(self.container(handle)?.arrays.keys().cloned().collect())
    }

    fn close(&mut self, handle: ContainerHandle) -> Result<()> {
        self.open
            .remove(&handle.0)
            .ok_or(StoreError::UnknownContainer(handle.0))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_container_attributes() {
        let mut store = MemoryStore::new();
        let h = store.create_container("run").unwrap();
        let attrs = store.attributes(h).unwrap();
        assert_eq!(attrs.get_text("format_version"), Some(super::super::FORMAT_VERSION));
        assert!(attrs.get_text("date").is_some());
        assert!(attrs.get_text("help").is_some());
    }

    #[test]
    fn test_write_read_list() {
        let mut store = MemoryStore::new();
        let h = store.create_container("run").unwrap();
        store
            .write_array(h, "b", ArrayData::Real(vec![1.0]), Metadata::new().with("unit", "nm"))
            .unwrap();
        store
            .write_array(h, "a", ArrayData::Bool(vec![true]), Metadata::new())
            .unwrap();
        assert_eq!(store.list_contents(h).unwrap(), vec!["a", "b"]);
        let (data, meta) = store.read_array(h, "b").unwrap();
        assert_eq!(data.as_real(), Some(&[1.0][..]));
        assert_eq!(meta.get_text("unit"), Some("nm"));
    }

    #[test]
    fn test_closed_handle_is_rejected_but_reopenable() {
        let mut store = MemoryStore::new();
        let h = store.create_container("run").unwrap();
        store
            .write_array(h, "x", ArrayData::Real(vec![1.0, 2.0]), Metadata::new())
            .unwrap();
        store.close(h).unwrap();
        assert!(matches!(
            store.read_array(h, "x"),
            Err(Error::Store(StoreError::UnknownContainer(_)))
        ));
        let h2 = store.open_container("run").unwrap();
        assert_eq!(store.read_array(h2, "x").unwrap().0.len(), 2);
        assert!(store.open_container("missing").is_err());
    }

    #[test]
    fn test_missing_path() {
        let mut store = MemoryStore::new();
        let h = store.create_container("run").unwrap();
        assert!(matches!(
            store.read_array(h, "nope"),
            Err(Error::Store(StoreError::NotFound { .. }))
        ));
    }
}
