//! In-memory dataset.
//!
//! Holds every variable as a flat row-major `Vec<f64>`. It can be built programmatically or
//! loaded from a JSON description, which makes it useful for tests and for serving small
//! datasets without libnetcdf.

use super::{
    check_bounds, Attribute, AttributeValue, DataType, Dataset, DatasetError, Dimension,
    VariableInfo,
};

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use ndarray::{ArrayView, IxDyn, SliceInfo, SliceInfoElem};
use serde::{Deserialize, Serialize};

/// A variable stored in memory.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct MemoryVariable {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    /// Row-major values. Must hold the product of the dimension sizes.
    #[serde(default)]
    pub values: Vec<f64>,
}

/// Dataset held entirely in memory.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct MemoryDataset {
    dimensions: Vec<Dimension>,
    #[serde(default)]
    variables: Vec<MemoryVariable>,
    #[serde(default)]
    global_attributes: Vec<Attribute>,
}

impl MemoryDataset {
    /// Returns an empty dataset.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and check a dataset from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, DatasetError> {
        let reader = BufReader::new(File::open(path)?);
        let dataset: Self = serde_json::from_reader(reader)?;
        dataset.check()?;
        Ok(dataset)
    }

    /// Add a dimension.
    pub fn with_dimension(mut self, name: &str, size: usize) -> Self {
        self.dimensions.push(Dimension::new(name, size));
        self
    }

    /// Add a double precision variable.
    ///
    /// Fails if a dimension is unknown or `values` does not match the variable's shape.
    pub fn with_variable(
        mut self,
        name: &str,
        dimensions: &[&str],
        values: Vec<f64>,
    ) -> Result<Self, DatasetError> {
        let variable = MemoryVariable {
            name: name.to_string(),
            data_type: DataType::Double,
            dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
            attributes: vec![],
            values,
        };
        self.check_variable(&variable)?;
        self.variables.push(variable);
        Ok(self)
    }

    /// Add an attribute to an existing variable.
    pub fn with_variable_attribute(
        mut self,
        variable: &str,
        name: &str,
        value: AttributeValue,
    ) -> Result<Self, DatasetError> {
        self.variables
            .iter_mut()
            .find(|v| v.name == variable)
            .ok_or_else(|| DatasetError::VariableNotFound(variable.to_string()))?
            .attributes
            .push(Attribute::new(name, value));
        Ok(self)
    }

    /// Add a global attribute.
    pub fn with_global_attribute(mut self, name: &str, value: AttributeValue) -> Self {
        self.global_attributes.push(Attribute::new(name, value));
        self
    }

    fn check(&self) -> Result<(), DatasetError> {
        self.variables
            .iter()
            .try_for_each(|variable| self.check_variable(variable))
    }

    fn check_variable(&self, variable: &MemoryVariable) -> Result<(), DatasetError> {
        let expected = self.shape_of(variable)?.iter().product::<usize>();
        if variable.values.len() != expected {
            return Err(DatasetError::ValueCount {
                variable: variable.name.clone(),
                expected,
                actual: variable.values.len(),
            });
        }
        Ok(())
    }

    fn shape_of(&self, variable: &MemoryVariable) -> Result<Vec<usize>, DatasetError> {
        variable
            .dimensions
            .iter()
            .map(|name| {
                self.dimension(name)
                    .map(|d| d.size)
                    .ok_or_else(|| DatasetError::DimensionNotFound {
                        variable: variable.name.clone(),
                        dimension: name.clone(),
                    })
            })
            .collect()
    }

    fn variable(&self, name: &str) -> Result<&MemoryVariable, DatasetError> {
        self.variables
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| DatasetError::VariableNotFound(name.to_string()))
    }
}

impl Dataset for MemoryDataset {
    fn dimensions(&self) -> Vec<Dimension> {
        self.dimensions.clone()
    }

    fn variables(&self) -> Result<Vec<VariableInfo>, DatasetError> {
        Ok(self
            .variables
            .iter()
            .map(|v| VariableInfo {
                name: v.name.clone(),
                data_type: v.data_type,
                dimensions: v.dimensions.clone(),
                attributes: v.attributes.clone(),
            })
            .collect())
    }

    fn global_attributes(&self) -> Result<Vec<Attribute>, DatasetError> {
        Ok(self.global_attributes.clone())
    }

    fn shape(&self, variable: &str) -> Result<Vec<usize>, DatasetError> {
        self.shape_of(self.variable(variable)?)
    }

    fn read_bounded(
        &self,
        variable: &str,
        origin: &[usize],
        extent: &[usize],
    ) -> Result<Vec<f64>, DatasetError> {
        let var = self.variable(variable)?;
        let shape = self.shape_of(var)?;
        check_bounds(variable, &shape, origin, extent)?;
        let array = ArrayView::from_shape(IxDyn(&shape), &var.values)?;
        let elems: Vec<SliceInfoElem> = origin
            .iter()
            .zip(extent)
            .map(|(start, count)| SliceInfoElem::Slice {
                start: *start as isize,
                end: Some((start + count) as isize),
                step: 1,
            })
            .collect();
        let info = SliceInfo::<_, IxDyn, IxDyn>::try_from(elems)
            .expect("SliceInfo should not fail for IxDyn");
        Ok(array.slice(info).iter().copied().collect())
    }
}
