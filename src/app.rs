//! Routes and request handlers.

use crate::app_state::SharedAppState;
use crate::error::ServerError;
use crate::metadata::DatasetMetadata;
use crate::metrics::{metrics_handler, record_response_metrics, request_counter};
use crate::models::{ImageResponse, Slice, SliceRequest, SliceResponse};
use crate::validation::SliceParams;

use axum::{
    extract::{RawQuery, State},
    http::header,
    http::HeaderValue,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};

use tower::Layer;
use tower::ServiceBuilder;
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

impl IntoResponse for ImageResponse {
    fn into_response(self) -> Response {
        (
            [(&header::CONTENT_TYPE, mime::IMAGE_PNG.to_string())],
            self.body,
        )
            .into_response()
    }
}

/// Returns a [axum::Router] serving the dataset in `state`.
pub fn router(state: SharedAppState) -> Router {
    Router::new()
        .route("/get-info", get(get_info))
        .route("/get-data", get(get_data))
        .route("/get-image", get(get_image))
        .route("/metrics", get(metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .on_request(request_counter)
                        .on_response(record_response_metrics),
                )
                // Responses describe a single request and must not be cached.
                .layer(SetResponseHeaderLayer::overriding(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static("no-cache, no-store"),
                )),
        )
        .with_state(state)
}

/// The ncserve service type alias
///
/// This type implements [tower::Service].
pub type Service = NormalizePath<Router>;

/// Returns a [crate::app::Service] for the ncserve web application.
pub fn service(state: SharedAppState) -> Service {
    // Trailing slashes must be trimmed before routing so that `/get-info/` matches.
    NormalizePathLayer::trim_trailing_slash().layer(router(state))
}

/// Handler for `/get-info`
///
/// Rejects any query string before the dataset is accessed.
async fn get_info(
    State(state): State<SharedAppState>,
    RawQuery(query): RawQuery,
) -> Result<Json<DatasetMetadata>, ServerError> {
    if query.is_some() {
        return Err(ServerError::QueryNotPermitted);
    }
    let metadata = state
        .metadata_cache
        .get(&state.dataset, &state.resource_manager)
        .await?;
    Ok(Json(metadata.as_ref().clone()))
}

/// Extract a slice off the async runtime.
async fn extract(state: &SharedAppState, request: SliceRequest) -> Result<Slice, ServerError> {
    let extractor = state.extractor.clone();
    state
        .resource_manager
        .run_blocking(move || extractor.extract(&request))
        .await?
}

/// Handler for `/get-data`
async fn get_data(
    State(state): State<SharedAppState>,
    SliceParams(request): SliceParams,
) -> Result<Json<SliceResponse>, ServerError> {
    let slice = extract(&state, request).await?;
    Ok(Json(slice.into()))
}

/// Handler for `/get-image`
async fn get_image(
    State(state): State<SharedAppState>,
    SliceParams(request): SliceParams,
) -> Result<ImageResponse, ServerError> {
    let slice = extract(&state, request).await?;
    let body = state
        .pipeline
        .produce(slice, &state.resource_manager)
        .await?;
    Ok(ImageResponse::new(body))
}
