//! netCDF dataset backed by libnetcdf.

use super::{
    check_bounds, Attribute, AttributeValue, DataType, Dataset, DatasetError, Dimension,
    VariableInfo,
};

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use ::netcdf::types::{FloatType, IntType, NcVariableType};

/// A netCDF file opened read-only.
///
/// libnetcdf is not thread safe, so every access goes through a mutex.
pub struct NetcdfDataset {
    file: Mutex<::netcdf::File>,
}

impl NetcdfDataset {
    /// Open the file at `path` in read mode.
    pub fn open(path: &Path) -> Result<Self, DatasetError> {
        let file = ::netcdf::open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    fn file(&self) -> MutexGuard<'_, ::netcdf::File> {
        // A panic while reading cannot leave the read-only file in an inconsistent state.
        self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Convert a libnetcdf variable type.
fn data_type(vartype: &NcVariableType) -> DataType {
    match vartype {
        NcVariableType::Char => DataType::Char,
        NcVariableType::String => DataType::String,
        NcVariableType::Int(IntType::I8) => DataType::Byte,
        NcVariableType::Int(IntType::U8) => DataType::UByte,
        NcVariableType::Int(IntType::I16) => DataType::Short,
        NcVariableType::Int(IntType::U16) => DataType::UShort,
        NcVariableType::Int(IntType::I32) => DataType::Int,
        NcVariableType::Int(IntType::U32) => DataType::UInt,
        NcVariableType::Int(IntType::I64) => DataType::Int64,
        NcVariableType::Int(IntType::U64) => DataType::UInt64,
        NcVariableType::Float(FloatType::F32) => DataType::Float,
        NcVariableType::Float(FloatType::F64) => DataType::Double,
        _ => DataType::Compound,
    }
}

/// Convert a libnetcdf attribute value.
fn attribute_value(value: ::netcdf::AttributeValue) -> AttributeValue {
    use ::netcdf::AttributeValue as V;
    match value {
        V::Str(s) => AttributeValue::Text(s),
        V::Strs(_) => AttributeValue::Other(DataType::String),
        V::Schar(v) => AttributeValue::Ints(vec![v.into()]),
        V::Schars(v) => AttributeValue::Ints(v.into_iter().map(i64::from).collect()),
        V::Uchar(v) => AttributeValue::Ints(vec![v.into()]),
        V::Uchars(v) => AttributeValue::Ints(v.into_iter().map(i64::from).collect()),
        V::Short(v) => AttributeValue::Ints(vec![v.into()]),
        V::Shorts(v) => AttributeValue::Ints(v.into_iter().map(i64::from).collect()),
        V::Ushort(v) => AttributeValue::Ints(vec![v.into()]),
        V::Ushorts(v) => AttributeValue::Ints(v.into_iter().map(i64::from).collect()),
        V::Int(v) => AttributeValue::Ints(vec![v.into()]),
        V::Ints(v) => AttributeValue::Ints(v.into_iter().map(i64::from).collect()),
        V::Uint(v) => AttributeValue::Ints(vec![v.into()]),
        V::Uints(v) => AttributeValue::Ints(v.into_iter().map(i64::from).collect()),
        V::Longlong(v) => AttributeValue::Ints(vec![v]),
        V::Longlongs(v) => AttributeValue::Ints(v),
        // Values beyond i64::MAX are not representable.
        V::Ulonglong(v) => match i64::try_from(v) {
            Ok(v) => AttributeValue::Ints(vec![v]),
            Err(_) => AttributeValue::Other(DataType::UInt64),
        },
        V::Ulonglongs(v) => match v.into_iter().map(i64::try_from).collect() {
            Ok(v) => AttributeValue::Ints(v),
            Err(_) => AttributeValue::Other(DataType::UInt64),
        },
        V::Float(v) => AttributeValue::Floats(vec![v]),
        V::Floats(v) => AttributeValue::Floats(v),
        V::Double(v) => AttributeValue::Doubles(vec![v]),
        V::Doubles(v) => AttributeValue::Doubles(v),
    }
}

fn attributes<'a>(
    iter: impl Iterator<Item = ::netcdf::Attribute<'a>>,
) -> Result<Vec<Attribute>, DatasetError> {
    iter.map(|attr| Ok(Attribute::new(attr.name(), attribute_value(attr.value()?))))
        .collect()
}

impl Dataset for NetcdfDataset {
    fn dimensions(&self) -> Vec<Dimension> {
        self.file()
            .dimensions()
            .map(|d| Dimension::new(&d.name(), d.len()))
            .collect()
    }

    fn variables(&self) -> Result<Vec<VariableInfo>, DatasetError> {
        let file = self.file();
        file.variables()
            .map(|var| {
                Ok(VariableInfo {
                    name: var.name(),
                    data_type: data_type(&var.vartype()),
                    dimensions: var.dimensions().iter().map(|d| d.name()).collect(),
                    attributes: attributes(var.attributes())?,
                })
            })
            .collect()
    }

    fn global_attributes(&self) -> Result<Vec<Attribute>, DatasetError> {
        attributes(self.file().attributes())
    }

    fn shape(&self, variable: &str) -> Result<Vec<usize>, DatasetError> {
        let file = self.file();
        let var = file
            .variable(variable)
            .ok_or_else(|| DatasetError::VariableNotFound(variable.to_string()))?;
        Ok(var.dimensions().iter().map(|d| d.len()).collect())
    }

    fn read_bounded(
        &self,
        variable: &str,
        origin: &[usize],
        extent: &[usize],
    ) -> Result<Vec<f64>, DatasetError> {
        let file = self.file();
        let var = file
            .variable(variable)
            .ok_or_else(|| DatasetError::VariableNotFound(variable.to_string()))?;
        let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
        check_bounds(variable, &shape, origin, extent)?;
        Ok(var.get_values::<f64, _>((origin, extent))?)
    }
}
