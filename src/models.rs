//! Data types and associated functions and methods

use bytes::Bytes;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Validated indices of a slice request.
///
/// Only constructed by the parameter validator, once both indices are known to be within the
/// dataset's `time` and `z` dimensions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SliceRequest {
    /// Index along the time dimension
    pub time_index: usize,
    /// Index along the height dimension
    pub z_index: usize,
}

impl SliceRequest {
    pub fn new(time_index: usize, z_index: usize) -> Self {
        Self {
            time_index,
            z_index,
        }
    }
}

/// A 2-D slice of the field variable with its coordinate axes.
///
/// `field` has shape `(y.len(), x.len())` in row-major order, with `y` as the outer axis.
#[derive(Clone, Debug, PartialEq)]
pub struct Slice {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub field: Array2<f64>,
}

/// JSON body returned for a slice.
#[derive(Debug, Deserialize, PartialEq, Serialize)]
pub struct SliceResponse {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    /// Field values, one list per `y` coordinate
    pub concentration: Vec<Vec<f64>>,
}

impl From<Slice> for SliceResponse {
    fn from(slice: Slice) -> Self {
        let concentration = slice
            .field
            .rows()
            .into_iter()
            .map(|row| row.to_vec())
            .collect();
        Self {
            x: slice.x,
            y: slice.y,
            concentration,
        }
    }
}

/// A rendered image ready to be returned to the client.
pub struct ImageResponse {
    pub body: Bytes,
}

impl ImageResponse {
    pub fn new(body: Bytes) -> Self {
        Self { body }
    }
}
