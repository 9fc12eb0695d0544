//! This crate provides ncserve, an HTTP server for a single read-only NetCDF dataset. It serves
//! the dataset's metadata, 2-D slices of a 4-D `(time, z, y, x)` field variable as JSON, and
//! heatmap images of those slices.
//!
//! Requests never read more than they return. A slice request reads the two coordinate axes and
//! one bounded hyperslab of the field. Metadata is computed once on first use and shared by all
//! later requests. Images are rendered off the async runtime to uniquely named files, which are
//! read back and deleted within a bounded wait.
//!
//! ncserve is built on top of a number of open source components.
//!
//! * [Tokio](tokio), the most popular asynchronous Rust runtime.
//! * [Axum](axum) web framework, built by the Tokio team, on top of the [hyper] HTTP library.
//! * [Serde](serde) performs serialisation of JSON response data.
//! * [ndarray] provides n-dimensional arrays for slices.
//! * [image] encodes rendered heatmaps as PNG.
//! * The [netcdf](https://crates.io/crates/netcdf) bindings to libnetcdf read NetCDF files when
//!   the `netcdf` feature is enabled.

pub mod app;
pub mod app_state;
pub mod artifact;
pub mod cli;
pub mod dataset;
pub mod error;
pub mod metadata;
pub mod metrics;
pub mod models;
pub mod render;
pub mod resource_manager;
pub mod server;
pub mod slice;
#[cfg(test)]
pub mod test_utils;
pub mod tracing;
pub mod validation;
