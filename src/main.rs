//! This file defines the ncserve binary entry point.

use ncserve::app;
use ncserve::app_state::AppState;
use ncserve::artifact;
use ncserve::cli;
use ncserve::dataset;
use ncserve::metrics;
use ncserve::server;
use ncserve::tracing;

use std::path::Path;
use std::process::exit;
use std::sync::Arc;

/// Application entry point
#[tokio::main]
async fn main() {
    let args = cli::parse();
    tracing::init_tracing();
    ::tracing::debug!("{:?}", args);
    metrics::register_metrics();

    if args.sweep_artifacts {
        let dir = Path::new(&args.artifact_dir);
        match artifact::sweep_orphaned_artifacts(dir, &args.artifact_prefix) {
            Ok(removed) => ::tracing::info!(
                "Removed {} orphaned artifacts from {}",
                removed,
                dir.display()
            ),
            Err(err) => ::tracing::warn!(
                "Failed to sweep artifacts in {}: {}",
                dir.display(),
                err
            ),
        }
    }

    let dataset = match dataset::open(Path::new(&args.dataset)) {
        Ok(dataset) => dataset,
        Err(err) => {
            ::tracing::error!("Failed to open dataset {}: {}", args.dataset, err);
            exit(1)
        }
    };
    let state = Arc::new(AppState::new(&args, dataset));
    let service = app::service(state);
    server::serve(&args, service).await;
}
