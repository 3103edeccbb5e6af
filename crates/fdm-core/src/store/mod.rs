//! Record Store
//!
//! Named numeric arrays with per-array metadata, grouped into containers
//! with container-level metadata. The pipeline only talks to the
//! [`RecordStore`] trait:
//!
//! ```text
//! create_container ─► write_array* ─► set_attribute ─► close
//! open_container   ─► list_contents / read_array     ─► close
//! ```
//!
//! Two implementations ship with the crate: [`MemoryStore`] (a fake for
//! tests and scratch work) and [`JsonStore`] (one JSON document per
//! container in a directory).
//!
//! A store keeps whatever it is given. Length agreement between an array and
//! its `abscissa` is the writer's job; [`write_with_abscissa`] checks it.

pub mod json;
pub mod memory;

pub use json::JsonStore;
pub use memory::MemoryStore;

use crate::error::{Error, Result};
use crate::types::Complex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Format version written into every container
pub const FORMAT_VERSION: &str = "fdm-record/1";

/// Record store failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("unknown container handle {0}")]
    UnknownContainer(u64),

    #[error("no entry `{path}` in container `{container}`")]
    NotFound { container: String, path: String },

    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    #[error("JSON error in {path}: {message}")]
    Json { path: String, message: String },
}

/// Opaque reference to an open container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerHandle(pub(crate) u64);

/// Array payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "dtype", content = "values", rename_all = "lowercase")]
pub enum ArrayData {
    Real(Vec<f64>),
    #[serde(with = "complex_pairs")]
    Complex(Vec<Complex>),
    Bool(Vec<bool>),
}

impl ArrayData {
    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            ArrayData::Real(v) => v.len(),
            ArrayData::Complex(v) => v.len(),
            ArrayData::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Real values, if this is a real array
    pub fn as_real(&self) -> Option<&[f64]> {
        match self {
            ArrayData::Real(v) => Some(v),
            _ => None,
        }
    }

    /// Complex values, if this is a complex array
    pub fn as_complex(&self) -> Option<&[Complex]> {
        match self {
            ArrayData::Complex(v) => Some(v),
            _ => None,
        }
    }

    /// Boolean values, if this is a mask
    pub fn as_bool(&self) -> Option<&[bool]> {
        match self {
            ArrayData::Bool(v) => Some(v),
            _ => None,
        }
    }

    /// No NaN or infinite element
    pub fn is_finite(&self) -> bool {
        match self {
            ArrayData::Real(v) => v.iter().all(|x| x.is_finite()),
            ArrayData::Complex(v) => v.iter().all(|c| c.re.is_finite() && c.im.is_finite()),
            ArrayData::Bool(_) => true,
        }
    }
}

mod complex_pairs {
    use crate::types::Complex;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(values: &[Complex], serializer: S) -> Result<S::Ok, S::Error> {
        let pairs: Vec<[f64; 2]> = values.iter().map(|c| [c.re, c.im]).collect();
        pairs.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Complex>, D::Error> {
        let pairs = Vec::<[f64; 2]>::deserialize(deserializer)?;
        Ok(pairs.into_iter().map(|[re, im]| Complex::new(re, im)).collect())
    }
}

/// Metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Integer(i64),
    Number(f64),
    Text(String),
    TextList(Vec<String>),
}

impl MetaValue {
    /// False only for a NaN or infinite number
    pub fn is_finite(&self) -> bool {
        match self {
            MetaValue::Number(x) => x.is_finite(),
            _ => true,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetaValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric value; integers widen to `f64`
    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetaValue::Number(x) => Some(*x),
            MetaValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            MetaValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_text_list(&self) -> Option<&[String]> {
        match self {
            MetaValue::TextList(v) => Some(v),
            _ => None,
        }
    }
}

impl From<&str> for MetaValue {
    fn from(s: &str) -> Self {
        MetaValue::Text(s.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(s: String) -> Self {
        MetaValue::Text(s)
    }
}

impl From<f64> for MetaValue {
    fn from(x: f64) -> Self {
        MetaValue::Number(x)
    }
}

impl From<i64> for MetaValue {
    fn from(i: i64) -> Self {
        MetaValue::Integer(i)
    }
}

impl From<usize> for MetaValue {
    fn from(i: usize) -> Self {
        MetaValue::Integer(i as i64)
    }
}

impl From<Vec<String>> for MetaValue {
    fn from(v: Vec<String>) -> Self {
        MetaValue::TextList(v)
    }
}

/// Insertion-ordered key/value metadata; setting an existing key overwrites it
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(Vec<(String, MetaValue)>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Metadata::insert`]
    pub fn with(mut self, key: &str, value: impl Into<MetaValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<MetaValue>) {
        let value = value.into();
        match self.0.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.0.push((key.to_string(), value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(MetaValue::as_text)
    }

    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(MetaValue::as_number)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// No NaN or infinite number among the values
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|(_, v)| v.is_finite())
    }
}

/// One stored array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArray {
    pub data: ArrayData,
    pub metadata: Metadata,
}

/// A named container of arrays; the unit both stores persist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub attributes: Metadata,
    pub arrays: BTreeMap<String, StoredArray>,
}

impl Container {
    /// Fresh container stamped with creation time and format version
    pub fn new(name: &str) -> Self {
        let now = chrono::Local::now();
        let attributes = Metadata::new()
            .with("date", now.format("%Y-%m-%d").to_string())
            .with("time", now.format("%H:%M:%S").to_string())
            .with("format_version", FORMAT_VERSION)
            .with("source", concat!("fdm-core ", env!("CARGO_PKG_VERSION")))
            .with("help", "Sinusoidally oscillating signal and workup");
        Self {
            name: name.to_string(),
            attributes,
            arrays: BTreeMap::new(),
        }
    }

    pub(crate) fn array(&self, path: &str) -> std::result::Result<&StoredArray, StoreError> {
        self.arrays.get(path).ok_or_else(|| StoreError::NotFound {
            container: self.name.clone(),
            path: path.to_string(),
        })
    }
}

/// Storage verbs the pipeline needs from a persistence layer
pub trait RecordStore {
    /// Open a new, empty container (an existing one of the same name is replaced)
    fn create_container(&mut self, name: &str) -> Result<ContainerHandle>;

    /// Re-open a previously closed container
    fn open_container(&mut self, name: &str) -> Result<ContainerHandle>;

    /// Set a container-level attribute
    fn set_attribute(&mut self, handle: ContainerHandle, key: &str, value: MetaValue) -> Result<()>;

    /// Container-level attributes
    fn attributes(&self, handle: ContainerHandle) -> Result<Metadata>;

    /// Store an array under `path`, replacing any previous entry
    fn write_array(
        &mut self,
        handle: ContainerHandle,
        path: &str,
        data: ArrayData,
        metadata: Metadata,
    ) -> Result<()>;

    fn read_array(&self, handle: ContainerHandle, path: &str) -> Result<(ArrayData, Metadata)>;

    /// Paths of every stored array, sorted
    fn list_contents(&self, handle: ContainerHandle) -> Result<Vec<String>>;

    /// Flush and release the handle
    fn close(&mut self, handle: ContainerHandle) -> Result<()>;
}

/// Write `data` after checking it matches the length of the array named by
/// its `abscissa` metadata entry (if any).
pub fn write_with_abscissa<S: RecordStore + ?Sized>(
    store: &mut S,
    handle: ContainerHandle,
    path: &str,
    data: ArrayData,
    metadata: Metadata,
) -> Result<()> {
    if let Some(abscissa) = metadata.get_text("abscissa") {
        let (axis, _) = store.read_array(handle, abscissa)?;
        if axis.len() != data.len() {
            return Err(Error::shape(
                format!("`{path}` against abscissa `{abscissa}`"),
                axis.len(),
                data.len(),
            ));
        }
    }
    store.write_array(handle, path, data, metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_overwrites_in_place() {
        let mut meta = Metadata::new().with("name", "t").with("unit", "s");
        meta.insert("name", "time");
        let keys: Vec<&str> = meta.keys().collect();
        assert_eq!(keys, vec!["name", "unit"]);
        assert_eq!(meta.get_text("name"), Some("time"));
    }

    #[test]
    fn test_meta_value_json_shapes() {
        let meta = Metadata::new()
            .with("n_avg", 4usize)
            .with("step", 0.5)
            .with("unit", "Hz");
        let json = serde_json::to_string(&meta).unwrap();
        let back: Metadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get("n_avg"), Some(&MetaValue::Integer(4)));
        assert_eq!(back.get_number("step"), Some(0.5));
        assert_eq!(back.get_text("unit"), Some("Hz"));
    }

    #[test]
    fn test_abscissa_mismatch_is_rejected() {
        let mut store = MemoryStore::new();
        let h = store.create_container("sig").unwrap();
        store
            .write_array(h, "x", ArrayData::Real(vec![0.0, 1.0, 2.0]), Metadata::new())
            .unwrap();
        let err = write_with_abscissa(
            &mut store,
            h,
            "y",
            ArrayData::Real(vec![1.0, 2.0]),
            Metadata::new().with("abscissa", "x"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { expected: 3, found: 2, .. }));
        assert!(store.read_array(h, "y").is_err());
    }

    #[test]
    fn test_abscissa_match_is_written() {
        let mut store = MemoryStore::new();
        let h = store.create_container("sig").unwrap();
        store
            .write_array(h, "x", ArrayData::Real(vec![0.0, 1.0]), Metadata::new())
            .unwrap();
        write_with_abscissa(
            &mut store,
            h,
            "y",
            ArrayData::Bool(vec![true, false]),
            Metadata::new().with("abscissa", "x"),
        )
        .unwrap();
        assert_eq!(store.list_contents(h).unwrap(), vec!["x", "y"]);
    }
}
