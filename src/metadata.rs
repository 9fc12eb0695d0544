//! Dataset metadata and its cache.
//!
//! Metadata describes the dataset's dimensions, variables and global attributes. It is
//! expensive to compute for large files and never changes while the server is running, so it is
//! computed once and kept for the lifetime of the process.

use crate::dataset::{AttributeValue, DataType, Dataset, SharedDataset};
use crate::error::ServerError;
use crate::resource_manager::ResourceManager;

use std::collections::BTreeMap;
use std::fmt::Display;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

/// Value reported for attributes whose type has no text representation.
pub const UNKNOWN_TYPE: &str = "Unknown type";

/// Size of the buffer text attributes are read into, including the terminating NUL.
const TEXT_BUFFER_SIZE: usize = 256;

/// Description of a variable.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VariableMetadata {
    #[serde(rename = "type")]
    pub data_type: DataType,
    pub dimensions: Vec<String>,
    /// Stringified attributes, serialised alongside `type` and `dimensions`
    #[serde(flatten)]
    pub attributes: BTreeMap<String, String>,
}

/// Description of a dataset, as returned by `/get-info`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DatasetMetadata {
    pub dimensions: BTreeMap<String, usize>,
    pub variables: BTreeMap<String, VariableMetadata>,
    pub global_attributes: BTreeMap<String, String>,
}

fn join<T: Display>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Truncate at the first NUL and to at most `TEXT_BUFFER_SIZE - 1` bytes.
fn truncate_text(text: &str) -> String {
    let text = text.split('\0').next().unwrap_or_default();
    let mut end = text.len().min(TEXT_BUFFER_SIZE - 1);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Convert an attribute value to the text reported in metadata.
pub fn stringify_attribute(value: &AttributeValue) -> String {
    match value {
        AttributeValue::Text(text) => truncate_text(text),
        AttributeValue::Ints(values) => join(values),
        AttributeValue::Floats(values) => join(values),
        AttributeValue::Doubles(values) => join(values),
        AttributeValue::Other(_) => UNKNOWN_TYPE.to_string(),
    }
}

/// Read the metadata of `dataset`.
pub fn compute_metadata(dataset: &dyn Dataset) -> Result<DatasetMetadata, ServerError> {
    let dimensions = dataset
        .dimensions()
        .into_iter()
        .map(|d| (d.name, d.size))
        .collect();
    let variables = dataset
        .variables()
        .map_err(ServerError::MetadataFailure)?
        .into_iter()
        .map(|var| {
            let attributes = var
                .attributes
                .iter()
                .filter(|attr| {
                    let reserved = attr.name == "type" || attr.name == "dimensions";
                    if reserved {
                        tracing::debug!(
                            "Skipping attribute {} of variable {}",
                            attr.name,
                            var.name
                        );
                    }
                    !reserved
                })
                .map(|attr| (attr.name.clone(), stringify_attribute(&attr.value)))
                .collect();
            let metadata = VariableMetadata {
                data_type: var.data_type,
                dimensions: var.dimensions,
                attributes,
            };
            (var.name, metadata)
        })
        .collect();
    let global_attributes = dataset
        .global_attributes()
        .map_err(ServerError::MetadataFailure)?
        .iter()
        .map(|attr| (attr.name.clone(), stringify_attribute(&attr.value)))
        .collect();
    Ok(DatasetMetadata {
        dimensions,
        variables,
        global_attributes,
    })
}

/// Lazily computed, never invalidated [DatasetMetadata].
///
/// Concurrent first callers share a single computation: the first to take the compute guard
/// computes and stores the value while the others wait on the guard, then find it stored.
/// A failed computation stores nothing, so the next caller tries again.
#[derive(Debug, Default)]
pub struct MetadataCache {
    value: RwLock<Option<Arc<DatasetMetadata>>>,
    compute_guard: Mutex<()>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn cached(&self) -> Option<Arc<DatasetMetadata>> {
        self.value.read().await.clone()
    }

    /// Returns the metadata of `dataset`, computing it on first use.
    ///
    /// # Arguments
    ///
    /// * `dataset`: Dataset to describe. Must be the same dataset on every call.
    /// * `resources`: Used to run the computation off the async runtime
    pub async fn get(
        &self,
        dataset: &SharedDataset,
        resources: &ResourceManager,
    ) -> Result<Arc<DatasetMetadata>, ServerError> {
        if let Some(metadata) = self.cached().await {
            return Ok(metadata);
        }
        let _guard = self.compute_guard.lock().await;
        if let Some(metadata) = self.cached().await {
            return Ok(metadata);
        }
        let dataset = dataset.clone();
        let metadata = resources
            .run_blocking(move || compute_metadata(dataset.as_ref()))
            .await??;
        let metadata = Arc::new(metadata);
        *self.value.write().await = Some(metadata.clone());
        tracing::info!(
            "Cached metadata for {} dimensions and {} variables",
            metadata.dimensions.len(),
            metadata.variables.len()
        );
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{Attribute, DatasetError, Dimension, VariableInfo};
    use crate::test_utils::{self, CountingDataset};

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[test]
    fn stringify_text() {
        let value = AttributeValue::Text("kg m-3".to_string());
        assert_eq!("kg m-3", stringify_attribute(&value));
    }

    #[test]
    fn stringify_text_nul() {
        let value = AttributeValue::Text("abc\0def".to_string());
        assert_eq!("abc", stringify_attribute(&value));
    }

    #[test]
    fn stringify_text_truncated() {
        let value = AttributeValue::Text("a".repeat(300));
        assert_eq!("a".repeat(255), stringify_attribute(&value));
    }

    #[test]
    fn stringify_text_truncated_at_char_boundary() {
        // 254 ASCII bytes followed by a 2-byte character crossing the 255 byte limit.
        let text = format!("{}é", "a".repeat(254));
        assert_eq!("a".repeat(254), stringify_attribute(&AttributeValue::Text(text)));
    }

    #[test]
    fn stringify_numbers() {
        assert_eq!("1", stringify_attribute(&AttributeValue::Ints(vec![1])));
        assert_eq!(
            "-1, 2",
            stringify_attribute(&AttributeValue::Ints(vec![-1, 2]))
        );
        assert_eq!("2.5", stringify_attribute(&AttributeValue::Floats(vec![2.5])));
        assert_eq!(
            "-999",
            stringify_attribute(&AttributeValue::Doubles(vec![-999.0]))
        );
    }

    #[test]
    fn stringify_other() {
        assert_eq!(
            UNKNOWN_TYPE,
            stringify_attribute(&AttributeValue::Other(DataType::String))
        );
    }

    #[test]
    fn compute() {
        let metadata = compute_metadata(&test_utils::get_test_dataset()).unwrap();
        assert_eq!(Some(&test_utils::TIME_SIZE), metadata.dimensions.get("time"));
        assert_eq!(Some(&test_utils::X_SIZE), metadata.dimensions.get("x"));
        let concentration = &metadata.variables["concentration"];
        assert_eq!(DataType::Double, concentration.data_type);
        assert_eq!(vec!["time", "z", "y", "x"], concentration.dimensions);
        assert_eq!("kg m-3", concentration.attributes["units"]);
        assert_eq!("-999", concentration.attributes["_FillValue"]);
        assert_eq!("1", metadata.global_attributes["agent"]);
        assert_eq!("ContinuousEvent", metadata.global_attributes["event_name"]);
    }

    #[test]
    fn compute_json() {
        let metadata = compute_metadata(&test_utils::get_test_dataset()).unwrap();
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(8, json["dimensions"]["time"]);
        assert_eq!("double", json["variables"]["x"]["type"]);
        assert_eq!("m", json["variables"]["x"]["units"]);
        assert_eq!(
            serde_json::json!(["time", "z", "y", "x"]),
            json["variables"]["concentration"]["dimensions"]
        );
        assert_eq!("1", json["global_attributes"]["id"]);
    }

    #[test]
    fn compute_skips_reserved_attributes() {
        let dataset = crate::dataset::MemoryDataset::new()
            .with_dimension("x", 1)
            .with_variable("x", &["x"], vec![0.0])
            .unwrap()
            .with_variable_attribute("x", "type", AttributeValue::Ints(vec![1]))
            .unwrap();
        let metadata = compute_metadata(&dataset).unwrap();
        assert_eq!(DataType::Double, metadata.variables["x"].data_type);
        assert!(metadata.variables["x"].attributes.is_empty());
    }

    #[tokio::test]
    async fn cache_computes_once() {
        let dataset = Arc::new(CountingDataset::new(test_utils::get_test_dataset()));
        let shared: SharedDataset = dataset.clone();
        let resources = ResourceManager::new(None, false);
        let cache = MetadataCache::new();
        let first = cache.get(&shared, &resources).await.unwrap();
        let second = cache.get(&shared, &resources).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(1, dataset.variables_calls());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn cache_concurrent_first_callers() {
        let dataset = Arc::new(
            CountingDataset::new(test_utils::get_test_dataset())
                .with_delay(Duration::from_millis(50)),
        );
        let shared: SharedDataset = dataset.clone();
        let resources = Arc::new(ResourceManager::new(None, false));
        let cache = Arc::new(MetadataCache::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let (shared, resources, cache) = (shared.clone(), resources.clone(), cache.clone());
                tokio::spawn(async move { cache.get(&shared, &resources).await.unwrap() })
            })
            .collect();
        let mut results = vec![];
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        let expected = compute_metadata(&test_utils::get_test_dataset()).unwrap();
        for result in &results {
            assert!(Arc::ptr_eq(&results[0], result));
            assert_eq!(&expected, result.as_ref());
        }
        assert_eq!(1, dataset.variables_calls());
        cache.get(&shared, &resources).await.unwrap();
        assert_eq!(1, dataset.variables_calls());
    }

    /// Fails the first `variables` call.
    struct FlakyDataset {
        failed: AtomicBool,
        inner: crate::dataset::MemoryDataset,
    }

    impl Dataset for FlakyDataset {
        fn dimensions(&self) -> Vec<Dimension> {
            self.inner.dimensions()
        }

        fn variables(&self) -> Result<Vec<VariableInfo>, DatasetError> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(DatasetError::VariableNotFound("x".to_string()));
            }
            self.inner.variables()
        }

        fn global_attributes(&self) -> Result<Vec<Attribute>, DatasetError> {
            self.inner.global_attributes()
        }

        fn shape(&self, variable: &str) -> Result<Vec<usize>, DatasetError> {
            self.inner.shape(variable)
        }

        fn read_bounded(
            &self,
            variable: &str,
            origin: &[usize],
            extent: &[usize],
        ) -> Result<Vec<f64>, DatasetError> {
            self.inner.read_bounded(variable, origin, extent)
        }
    }

    #[tokio::test]
    async fn cache_failure_not_stored() {
        let dataset: SharedDataset = Arc::new(FlakyDataset {
            failed: AtomicBool::new(false),
            inner: test_utils::get_test_dataset(),
        });
        let resources = ResourceManager::new(None, false);
        let cache = MetadataCache::new();
        match cache.get(&dataset, &resources).await.unwrap_err() {
            ServerError::MetadataFailure(DatasetError::VariableNotFound(_)) => (),
            err => panic!("unexpected error {err:?}"),
        }
        assert!(cache.cached().await.is_none());
        let metadata = cache.get(&dataset, &resources).await.unwrap();
        assert!(metadata.variables.contains_key("concentration"));
    }
}
