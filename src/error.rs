//! Error handling.

use axum::{
    http::header,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::AcquireError;
use tracing::{event, Level};

use crate::dataset::DatasetError;
use crate::render::RenderError;

/// Server error type
///
/// This type encapsulates the various errors that may occur.
/// Each variant may result in a different API error response.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A required query parameter is absent
    #[error("Missing required parameters: time and z.")]
    MissingParameters,

    /// A query parameter is not a non-negative integer
    #[error("Invalid value for parameter {name}: {value}.")]
    MalformedParameter {
        name: &'static str,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    /// A query parameter is not recognised
    #[error("Invalid parameter: {0}.")]
    UnknownParameter(String),

    /// An index is beyond the end of its dimension
    #[error("{dimension} index out of range - Cannot exceed {max}.")]
    IndexOutOfRange { dimension: String, max: usize },

    /// An index was requested along a dimension of size zero
    #[error("{0} index out of range - dimension is empty.")]
    EmptyDimension(String),

    /// A query string was passed to an endpoint that takes no parameters
    #[error("Query parameters are not accepted. Remove them and try again.")]
    QueryNotPermitted,

    /// A configured dimension does not exist in the dataset
    #[error("dimension {0} not found in dataset")]
    DimensionNotFound(String),

    /// Error reading a slice from the dataset
    #[error("failed to extract slice")]
    ExtractionFailure(#[source] DatasetError),

    /// Error reading dataset metadata
    #[error("failed to read dataset metadata")]
    MetadataFailure(#[source] DatasetError),

    /// The slice to render has no rows or no columns
    #[error("Grid data is empty.")]
    EmptyGrid,

    /// The renderer reported an error
    #[error("failed to render image")]
    RenderFailed(#[source] RenderError),

    /// The rendered image did not appear in time
    #[error("rendered image not ready after {0:?}")]
    RenderTimeout(Duration),

    /// The rendered image could not be read back
    #[error("failed to read rendered image")]
    ArtifactUnreadable(#[source] std::io::Error),

    /// A blocking task panicked or was cancelled
    #[error("background task failed")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// A task on the Rayon thread pool panicked
    #[error("background task panicked")]
    TaskPanicked,

    /// Error acquiring a semaphore
    #[error("error acquiring resources")]
    SemaphoreAcquireError(#[from] AcquireError),
}

impl IntoResponse for ServerError {
    /// Convert from a `ServerError` into an [axum::response::Response].
    fn into_response(self) -> Response {
        ErrorResponse::from(self).into_response()
    }
}

/// A response to send in error cases
///
/// Implements serde (de)serialise.
#[derive(Deserialize, Serialize)]
struct ErrorResponse {
    /// HTTP status of the response
    #[serde(skip)]
    status: StatusCode,

    /// Main error message
    error: String,

    /// Optional list of causes
    #[serde(skip_serializing_if = "Option::is_none")]
    caused_by: Option<Vec<String>>,
}

impl ErrorResponse {
    /// Return a new ErrorResponse
    ///
    /// # Arguments
    ///
    /// * `status`: HTTP status of the response
    /// * `error`: The error that occurred. Its sources become `caused_by`.
    fn new<E>(status: StatusCode, error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        let mut caused_by = None;
        let mut current = error.source();
        while let Some(source) = current {
            let mut causes: Vec<String> = caused_by.unwrap_or_default();
            causes.push(source.to_string());
            caused_by = Some(causes);
            current = source.source();
        }
        // Remove duplicate entries.
        if let Some(caused_by) = caused_by.as_mut() {
            caused_by.dedup()
        }
        ErrorResponse {
            status,
            error: error.to_string(),
            caused_by,
        }
    }

    /// Return a 400 bad request ErrorResponse
    fn bad_request<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        Self::new(StatusCode::BAD_REQUEST, error)
    }

    /// Return a 500 internal server error ErrorResponse
    fn internal_server_error<E>(error: &E) -> Self
    where
        E: std::error::Error + Send + Sync,
    {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error)
    }
}

impl From<ServerError> for ErrorResponse {
    /// Convert from a `ServerError` into an `ErrorResponse`.
    fn from(error: ServerError) -> Self {
        let response = match &error {
            // Bad request
            ServerError::MissingParameters
            | ServerError::MalformedParameter { .. }
            | ServerError::UnknownParameter(_)
            | ServerError::IndexOutOfRange { .. }
            | ServerError::EmptyDimension(_)
            | ServerError::QueryNotPermitted => Self::bad_request(&error),

            // Internal server error
            ServerError::DimensionNotFound(_)
            | ServerError::ExtractionFailure(_)
            | ServerError::MetadataFailure(_)
            | ServerError::EmptyGrid
            | ServerError::RenderFailed(_)
            | ServerError::RenderTimeout(_)
            | ServerError::ArtifactUnreadable(_)
            | ServerError::TaskJoin(_)
            | ServerError::TaskPanicked
            | ServerError::SemaphoreAcquireError(_) => Self::internal_server_error(&error),
        };

        // Log server errors.
        if response.status.is_server_error() {
            event!(Level::ERROR, "{}", error.to_string());
            let mut current = error.source();
            while let Some(source) = current {
                event!(Level::ERROR, "Caused by: {}", source.to_string());
                current = source.source();
            }
        }

        response
    }
}

impl IntoResponse for ErrorResponse {
    /// Convert from an `ErrorResponse` into an `axum::response::Response`.
    ///
    /// Renders the response as JSON.
    fn into_response(self) -> Response {
        let json_body = serde_json::to_string_pretty(&self);
        match json_body {
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to serialise error response: {}", err),
            )
                .into_response(),
            Ok(json_body) => (
                self.status,
                [(&header::CONTENT_TYPE, mime::APPLICATION_JSON.to_string())],
                json_body,
            )
                .into_response(),
        }
    }
}
