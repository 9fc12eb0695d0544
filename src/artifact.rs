//! Rendered image artifacts.
//!
//! Each image request renders its slice to a uniquely named file, waits for the file to be
//! complete, reads it into memory and deletes it. Rendering runs on a blocking thread and reports
//! completion through a one-shot channel. Some renderers return before their output is fully
//! written, so after completion the file is also polled until it exists with a non-zero size.
//! Both waits share a single deadline.

use crate::cli::CommandLineArgs;
use crate::error::ServerError;
use crate::metrics::{record_artifact, ArtifactOutcome};
use crate::models::Slice;
use crate::render::{RenderError, Renderer};
use crate::resource_manager::ResourceManager;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

/// Extension of rendered images.
const EXTENSION: &str = "png";

/// Remove an artifact file, ignoring files that do not exist.
fn remove_artifact(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!("Removed artifact {}", path.display()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => (),
        Err(err) => tracing::warn!("Failed to remove artifact {}: {}", path.display(), err),
    }
}

/// Deletes an artifact file when dropped.
///
/// Covers every way a request can finish, including the request future being dropped when the
/// client disconnects.
struct ArtifactGuard {
    path: PathBuf,
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        remove_artifact(&self.path);
    }
}

/// Returns whether `path` is a non-empty file.
async fn artifact_ready(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|metadata| metadata.is_file() && metadata.len() > 0)
        .unwrap_or(false)
}

/// Poll `path` every `interval` until it is a non-empty file or `deadline` passes.
///
/// Returns whether the file became ready. The file is always checked at least once.
pub async fn wait_for_artifact(path: &Path, interval: Duration, deadline: Instant) -> bool {
    loop {
        if artifact_ready(path).await {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        tokio::time::sleep_until((now + interval).min(deadline)).await;
    }
}

/// Produces rendered images of slices.
pub struct ArtifactPipeline {
    dir: PathBuf,
    prefix: String,
    poll_interval: Duration,
    timeout: Duration,
    renderer: Arc<dyn Renderer>,
}

impl ArtifactPipeline {
    /// Returns a new ArtifactPipeline.
    ///
    /// # Arguments
    ///
    /// * `dir`: Directory in which images are written
    /// * `prefix`: File name prefix of images
    /// * `poll_interval`: Interval between checks for a complete image
    /// * `timeout`: Maximum total time to wait for an image
    /// * `renderer`: Renderer producing the images
    pub fn new(
        dir: PathBuf,
        prefix: &str,
        poll_interval: Duration,
        timeout: Duration,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        Self {
            dir,
            prefix: prefix.to_string(),
            poll_interval,
            timeout,
            renderer,
        }
    }

    /// Returns a new ArtifactPipeline configured from command line arguments.
    pub fn from_args(args: &CommandLineArgs, renderer: Arc<dyn Renderer>) -> Self {
        Self::new(
            PathBuf::from(&args.artifact_dir),
            &args.artifact_prefix,
            Duration::from_millis(args.render_poll_interval_ms),
            Duration::from_millis(args.render_timeout_ms),
            renderer,
        )
    }

    /// Returns a path that no other request uses.
    fn artifact_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}{}.{}", self.prefix, Uuid::new_v4(), EXTENSION))
    }

    /// Render `slice` and return the encoded image.
    ///
    /// Waiting for a render permit, the render itself and the file check all share one deadline.
    /// The permit is held until the render finishes, even if the request has stopped waiting.
    ///
    /// The image file is deleted before this returns, whatever the outcome. If the returned
    /// future is dropped the file is deleted too, and a render still in progress deletes its
    /// output once it completes.
    pub async fn produce(
        &self,
        slice: Slice,
        resources: &ResourceManager,
    ) -> Result<Bytes, ServerError> {
        let (rows, cols) = slice.field.dim();
        if rows == 0 || cols == 0 {
            return Err(ServerError::EmptyGrid);
        }
        let deadline = Instant::now() + self.timeout;
        let outcome = self.render_before(slice, resources, deadline).await;
        record_artifact(match &outcome {
            Ok(_) => ArtifactOutcome::Ready,
            Err(ServerError::RenderTimeout(_)) => ArtifactOutcome::Timeout,
            Err(ServerError::ArtifactUnreadable(_)) => ArtifactOutcome::Unreadable,
            Err(_) => ArtifactOutcome::RenderFailed,
        });
        outcome
    }

    async fn render_before(
        &self,
        slice: Slice,
        resources: &ResourceManager,
        deadline: Instant,
    ) -> Result<Bytes, ServerError> {
        let permit = tokio::time::timeout_at(deadline, resources.render())
            .await
            .map_err(|_| ServerError::RenderTimeout(self.timeout))??;
        let path = self.artifact_path();
        let _guard = ArtifactGuard { path: path.clone() };

        let (tx, rx) = oneshot::channel();
        let renderer = self.renderer.clone();
        let render_path = path.clone();
        resources.spawn_detached(move || {
            let _permit = permit;
            let result = renderer.render_heatmap(slice.field.view(), &render_path);
            if tx.send(result).is_err() {
                // The request is gone, so nobody else will remove the file.
                remove_artifact(&render_path);
            }
        });

        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(Ok(()))) => {
                if wait_for_artifact(&path, self.poll_interval, deadline).await {
                    tokio::fs::read(&path)
                        .await
                        .map(Bytes::from)
                        .map_err(ServerError::ArtifactUnreadable)
                } else {
                    Err(ServerError::RenderTimeout(self.timeout))
                }
            }
            Ok(Ok(Err(err))) => Err(ServerError::RenderFailed(err)),
            Ok(Err(_)) => Err(ServerError::RenderFailed(RenderError::Interrupted)),
            Err(_) => Err(ServerError::RenderTimeout(self.timeout)),
        }
    }
}

/// Returns whether `name` is an artifact, or a partially written one, with `prefix`.
fn is_artifact(name: &str, prefix: &str) -> bool {
    let suffix = format!(".{}", EXTENSION);
    let partial = format!(".{}.partial", EXTENSION);
    name.starts_with(prefix) && (name.ends_with(&suffix) || name.ends_with(&partial))
}

/// Delete artifacts left behind in `dir` by a previous run, creating `dir` if missing.
///
/// Returns the number of files deleted.
pub fn sweep_orphaned_artifacts(dir: &Path, prefix: &str) -> io::Result<usize> {
    std::fs::create_dir_all(dir)?;
    let mut removed = 0;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if entry.file_type()?.is_file() && is_artifact(name, prefix) {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}
