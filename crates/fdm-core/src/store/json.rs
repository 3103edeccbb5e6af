//! Directory of JSON containers.
//!
//! Each container lives in memory while open and is written to
//! `<root>/<name>.json` on [`RecordStore::close`]. JSON has no NaN or
//! infinity, so non-finite numbers are refused when written.

use super::{ArrayData, Container, ContainerHandle, MemoryStore, MetaValue, Metadata, RecordStore, StoreError};
use crate::error::Result;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// On-disk store rooted at a directory
#[derive(Debug)]
pub struct JsonStore {
    root: PathBuf,
    open: MemoryStore,
}

impl JsonStore {
    /// Use `root` as the store directory, creating it if needed
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| io_error(&root, e))?;
        Ok(Self {
            root,
            open: MemoryStore::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing the container `name`
    pub fn container_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.json", name.replace(['/', '\\'], "_")))
    }
}

fn io_error(path: &Path, e: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

fn non_finite(path: &Path, what: &str) -> StoreError {
    StoreError::Json {
        path: path.display().to_string(),
        message: format!("{what} holds a non-finite value, which JSON cannot represent"),
    }
}

fn json_error(path: &Path, e: serde_json::Error) -> StoreError {
    StoreError::Json {
        path: path.display().to_string(),
        message: e.to_string(),
    }
}

impl RecordStore for JsonStore {
    fn create_container(&mut self, name: &str) -> Result<ContainerHandle> {
        self.open.create_container(name)
    }

    fn open_container(&mut self, name: &str) -> Result<ContainerHandle> {
        let path = self.container_path(name);
        let file = File::open(&path).map_err(|e| io_error(&path, e))?;
        let container: Container =
            serde_json::from_reader(BufReader::new(file)).map_err(|e| json_error(&path, e))?;
        Ok(self.open.insert_container(container))
    }

    fn set_attribute(&mut self, handle: ContainerHandle, key: &str, value: MetaValue) -> Result<()> {
        if !value.is_finite() {
            let name = &self.open.container(handle)?.name;
            return Err(non_finite(&self.container_path(name), &format!("attribute '{key}'")).into());
        }
        self.open.set_attribute(handle, key, value)
    }

    fn attributes(&self, handle: ContainerHandle) -> Result<Metadata> {
        self.open.attributes(handle)
    }

    fn write_array(
        &mut self,
        handle: ContainerHandle,
        path: &str,
        data: ArrayData,
        metadata: Metadata,
    ) -> Result<()> {
        if !data.is_finite() || !metadata.is_finite() {
            let name = &self.open.container(handle)?.name;
            return Err(non_finite(&self.container_path(name), &format!("array '{path}'")).into());
        }
        self.open.write_array(handle, path, data, metadata)
    }

    fn read_array(&self, handle: ContainerHandle, path: &str) -> Result<(ArrayData, Metadata)> {
        self.open.read_array(handle, path)
    }

    fn list_contents(&self, handle: ContainerHandle) -> Result<Vec<String>> {
        self.open.list_contents(handle)
    }

    /// Write the container to disk, then release the handle. On failure the
    /// container stays open and the close can be retried.
    fn close(&mut self, handle: ContainerHandle) -> Result<()> {
        let container = self.open.container(handle)?;
        let path = self.container_path(&container.name);
        let file = File::create(&path).map_err(|e| io_error(&path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, container).map_err(|e| json_error(&path, e))?;
        writer.flush().map_err(|e| io_error(&path, e))?;
        let arrays = container.arrays.len();
        self.open.take_container(handle)?;
        info!(path = %path.display(), arrays, "container written");
        Ok(())
    }
}
