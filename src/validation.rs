//! Validation of slice request parameters.
//!
//! The `time` and `z` query parameters are checked in a fixed order: presence, then parsing,
//! then unknown keys, then dimension bounds. The first failure wins, so requests with several
//! problems always get the same error.

use crate::app_state::SharedAppState;
use crate::dataset::Dataset;
use crate::error::ServerError;
use crate::models::SliceRequest;

use std::collections::HashMap;

use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};

/// Query parameter holding the time index.
pub const TIME_PARAM: &str = "time";
/// Query parameter holding the height index.
pub const Z_PARAM: &str = "z";

/// Parse a URL query string into a map of parameters.
///
/// If a key appears more than once the last value wins.
pub fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    query
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

fn parse_index(name: &'static str, value: &str) -> Result<usize, ServerError> {
    value
        .parse::<usize>()
        .map_err(|source| ServerError::MalformedParameter {
            name,
            value: value.to_string(),
            source,
        })
}

fn check_range(dataset: &dyn Dataset, dimension: &str, index: usize) -> Result<(), ServerError> {
    let size = dataset
        .dimension(dimension)
        .ok_or_else(|| ServerError::DimensionNotFound(dimension.to_string()))?
        .size;
    if size == 0 {
        return Err(ServerError::EmptyDimension(dimension.to_string()));
    }
    if index >= size {
        return Err(ServerError::IndexOutOfRange {
            dimension: dimension.to_string(),
            max: size - 1,
        });
    }
    Ok(())
}

/// Validate slice request parameters against the dataset's dimensions.
///
/// # Arguments
///
/// * `params`: Query parameters of the request
/// * `dataset`: Dataset providing the dimension sizes
/// * `time_dimension`: Name of the dimension indexed by `time`
/// * `z_dimension`: Name of the dimension indexed by `z`
pub fn validate_slice_params(
    params: &HashMap<String, String>,
    dataset: &dyn Dataset,
    time_dimension: &str,
    z_dimension: &str,
) -> Result<SliceRequest, ServerError> {
    let (Some(time), Some(z)) = (params.get(TIME_PARAM), params.get(Z_PARAM)) else {
        return Err(ServerError::MissingParameters);
    };
    let time_index = parse_index(TIME_PARAM, time)?;
    let z_index = parse_index(Z_PARAM, z)?;
    // Sort so that the reported key does not depend on hash order.
    let mut unknown: Vec<&String> = params
        .keys()
        .filter(|key| *key != TIME_PARAM && *key != Z_PARAM)
        .collect();
    unknown.sort();
    if let Some(key) = unknown.first() {
        return Err(ServerError::UnknownParameter(key.to_string()));
    }
    check_range(dataset, time_dimension, time_index)?;
    check_range(dataset, z_dimension, z_index)?;
    Ok(SliceRequest::new(time_index, z_index))
}

/// An axum extractor producing a validated [SliceRequest] from the request's query string.
#[derive(Debug, Clone, Copy)]
pub struct SliceParams(pub SliceRequest);

#[async_trait]
impl FromRequestParts<SharedAppState> for SliceParams {
    type Rejection = ServerError;

    /// Extract `SliceParams` from the request parts.
    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedAppState,
    ) -> Result<Self, Self::Rejection> {
        let params = parse_query(parts.uri.query());
        let request = validate_slice_params(
            &params,
            state.dataset.as_ref(),
            &state.args.time_dimension,
            &state.args.z_dimension,
        )?;
        Ok(SliceParams(request))
    }
}
