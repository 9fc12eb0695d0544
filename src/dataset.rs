//! Read-only access to the served dataset.
//!
//! The server never parses a dataset format itself. Everything it needs goes through the
//! [Dataset] trait: dimension sizes, variable and attribute listings, and bounded rectangular
//! reads. Implementations must be safe to share between request handlers, and no writes occur
//! after a dataset has been opened.

pub mod memory;
#[cfg(feature = "netcdf")]
pub mod netcdf;

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum_macros::Display;
use thiserror::Error;

pub use memory::MemoryDataset;

/// Errors raised by a [Dataset] implementation.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// A variable named in a read or listing does not exist
    #[error("variable {0} not found")]
    VariableNotFound(String),

    /// A variable refers to a dimension that does not exist
    #[error("dimension {dimension} of variable {variable} not found")]
    DimensionNotFound { variable: String, dimension: String },

    /// Origin or extent of a read does not match the rank of the variable
    #[error("read of {variable} has rank {actual} but variable has rank {expected}")]
    RankMismatch {
        variable: String,
        expected: usize,
        actual: usize,
    },

    /// A read addresses elements outside the variable
    #[error("read of {variable} exceeds its shape {shape:?}")]
    OutOfBounds { variable: String, shape: Vec<usize> },

    /// Number of stored values does not match the variable's shape
    #[error("variable {variable} holds {actual} values but its shape requires {expected}")]
    ValueCount {
        variable: String,
        expected: usize,
        actual: usize,
    },

    /// No backend is available for the requested file
    #[error("unsupported dataset format for {0}")]
    UnsupportedFormat(String),

    /// Error reading a dataset file
    #[error("failed to read dataset file")]
    Io(#[from] std::io::Error),

    /// Error parsing a JSON dataset description
    #[error("failed to parse dataset description")]
    Json(#[from] serde_json::Error),

    /// Error indexing stored values
    #[error("failed to index variable values")]
    Shape(#[from] ndarray::ShapeError),

    /// Error from libnetcdf
    #[cfg(feature = "netcdf")]
    #[error("netCDF error")]
    Netcdf(#[from] ::netcdf::error::Error),
}

/// Declared type of a variable or attribute.
#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DataType {
    Byte,
    Char,
    Short,
    Int,
    Int64,
    Float,
    Double,
    UByte,
    UShort,
    UInt,
    UInt64,
    String,
    /// User-defined types: compound, enum, opaque and variable length.
    Compound,
}

/// A named dimension and its size.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Dimension {
    pub name: String,
    pub size: usize,
}

impl Dimension {
    pub fn new(name: &str, size: usize) -> Self {
        Self {
            name: name.to_string(),
            size,
        }
    }
}

/// Value of an attribute, as declared in the dataset.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum AttributeValue {
    /// Character array
    Text(String),
    /// Integer values of any width
    Ints(Vec<i64>),
    /// Single precision floating point values
    Floats(Vec<f32>),
    /// Double precision floating point values
    Doubles(Vec<f64>),
    /// A value of a type the server does not interpret
    Other(DataType),
}

/// A named attribute of a variable or of the dataset.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Attribute {
    pub name: String,
    pub value: AttributeValue,
}

impl Attribute {
    pub fn new(name: &str, value: AttributeValue) -> Self {
        Self {
            name: name.to_string(),
            value,
        }
    }
}

/// Description of a variable: its type, dimensions and attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct VariableInfo {
    pub name: String,
    pub data_type: DataType,
    pub dimensions: Vec<String>,
    pub attributes: Vec<Attribute>,
}

/// Read-only dataset handle.
///
/// Shared between all request handlers for the lifetime of the process.
pub trait Dataset: Send + Sync {
    /// Returns all dimensions in declaration order.
    fn dimensions(&self) -> Vec<Dimension>;

    /// Returns the dimension called `name`, if it exists.
    fn dimension(&self, name: &str) -> Option<Dimension> {
        self.dimensions().into_iter().find(|d| d.name == name)
    }

    /// Returns all variables in declaration order.
    fn variables(&self) -> Result<Vec<VariableInfo>, DatasetError>;

    /// Returns the global attributes in declaration order.
    fn global_attributes(&self) -> Result<Vec<Attribute>, DatasetError>;

    /// Returns the size of each dimension of `variable`.
    fn shape(&self, variable: &str) -> Result<Vec<usize>, DatasetError>;

    /// Reads a hyperslab of `variable` as `f64`.
    ///
    /// Returns `extent.iter().product()` values in row-major order.
    ///
    /// # Arguments
    ///
    /// * `variable`: Name of the variable to read
    /// * `origin`: Index of the first element along each axis
    /// * `extent`: Number of elements along each axis
    fn read_bounded(
        &self,
        variable: &str,
        origin: &[usize],
        extent: &[usize],
    ) -> Result<Vec<f64>, DatasetError>;
}

/// Dataset shared between handlers.
pub type SharedDataset = Arc<dyn Dataset>;

/// Open the dataset at `path`.
///
/// Files with a `.json` extension are loaded as a [MemoryDataset]. Anything else is opened with
/// libnetcdf when the `netcdf` feature is enabled.
pub fn open(path: &Path) -> Result<SharedDataset, DatasetError> {
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if is_json {
        tracing::info!("Loading JSON dataset {}", path.display());
        return Ok(Arc::new(MemoryDataset::from_json_file(path)?));
    }
    open_native(path)
}

#[cfg(feature = "netcdf")]
fn open_native(path: &Path) -> Result<SharedDataset, DatasetError> {
    tracing::info!("Opening netCDF dataset {}", path.display());
    Ok(Arc::new(netcdf::NetcdfDataset::open(path)?))
}

#[cfg(not(feature = "netcdf"))]
fn open_native(path: &Path) -> Result<SharedDataset, DatasetError> {
    Err(DatasetError::UnsupportedFormat(path.display().to_string()))
}

/// Check that a read with `origin` and `extent` fits inside `shape`.
pub(crate) fn check_bounds(
    variable: &str,
    shape: &[usize],
    origin: &[usize],
    extent: &[usize],
) -> Result<(), DatasetError> {
    for actual in [origin.len(), extent.len()] {
        if actual != shape.len() {
            return Err(DatasetError::RankMismatch {
                variable: variable.to_string(),
                expected: shape.len(),
                actual,
            });
        }
    }
    let fits = shape
        .iter()
        .zip(origin.iter().zip(extent))
        .all(|(size, (start, count))| start.checked_add(*count).map_or(false, |end| end <= *size));
    if !fits {
        return Err(DatasetError::OutOfBounds {
            variable: variable.to_string(),
            shape: shape.to_vec(),
        });
    }
    Ok(())
}
