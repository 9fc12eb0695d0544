//! Extraction of 2-D slices from the field variable.

use crate::cli::CommandLineArgs;
use crate::dataset::{DatasetError, SharedDataset};
use crate::error::ServerError;
use crate::models::{Slice, SliceRequest};

use ndarray::Array2;

/// Reads `(y, x)` slices of a 4-D `(time, z, y, x)` field variable together with its coordinate
/// axes.
///
/// Each call reads only what it returns and shares no mutable state with other calls.
#[derive(Clone)]
pub struct SliceExtractor {
    dataset: SharedDataset,
    field_variable: String,
    x_variable: String,
    y_variable: String,
}

impl SliceExtractor {
    pub fn new(dataset: SharedDataset, args: &CommandLineArgs) -> Self {
        Self {
            dataset,
            field_variable: args.field_variable.clone(),
            x_variable: args.x_variable.clone(),
            y_variable: args.y_variable.clone(),
        }
    }

    /// Read the full extent of a 1-D coordinate variable.
    fn read_axis(&self, variable: &str) -> Result<Vec<f64>, DatasetError> {
        let shape = self.dataset.shape(variable)?;
        if shape.len() != 1 {
            return Err(DatasetError::RankMismatch {
                variable: variable.to_string(),
                expected: 1,
                actual: shape.len(),
            });
        }
        self.dataset.read_bounded(variable, &[0], &shape)
    }

    fn read_slice(&self, request: &SliceRequest) -> Result<Slice, DatasetError> {
        let x = self.read_axis(&self.x_variable)?;
        let y = self.read_axis(&self.y_variable)?;
        let values = self.dataset.read_bounded(
            &self.field_variable,
            &[request.time_index, request.z_index, 0, 0],
            &[1, 1, y.len(), x.len()],
        )?;
        let field = Array2::from_shape_vec((y.len(), x.len()), values)?;
        Ok(Slice { x, y, field })
    }

    /// Extract the slice at the requested time and height indices.
    ///
    /// Blocks on dataset I/O, so should not be called directly from an async task.
    pub fn extract(&self, request: &SliceRequest) -> Result<Slice, ServerError> {
        let slice = self
            .read_slice(request)
            .map_err(ServerError::ExtractionFailure)?;
        tracing::debug!(
            "Extracted {}x{} slice at time {} z {}",
            slice.y.len(),
            slice.x.len(),
            request.time_index,
            request.z_index
        );
        Ok(slice)
    }
}
