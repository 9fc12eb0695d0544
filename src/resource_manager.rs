//! Resource management

use crate::error::ServerError;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// [crate::resource_manager::ResourceManager] provides a simple way to allocate resources to
/// tasks. Resource management is performed using a Tokio Semaphore for each type of resource.
#[derive(Debug)]
pub struct ResourceManager {
    /// Optional semaphore for concurrent renders.
    renders: Option<Arc<Semaphore>>,

    /// Whether CPU-bound work runs on Rayon rather than Tokio's blocking pool.
    use_rayon: bool,
}

impl ResourceManager {
    /// Returns a new ResourceManager object.
    pub fn new(render_limit: Option<usize>, use_rayon: bool) -> Self {
        Self {
            renders: render_limit.map(|limit| Arc::new(Semaphore::new(limit))),
            use_rayon,
        }
    }

    /// Acquire a render resource.
    ///
    /// The permit is owned so that it can move into the render task and be released when the
    /// render finishes, not when the request stops waiting for it.
    pub async fn render(&self) -> Result<Option<OwnedSemaphorePermit>, ServerError> {
        optional_acquire(&self.renders).await
    }

    /// Run blocking or CPU-bound work off the async runtime's worker threads.
    ///
    /// A panic in `f` is reported as [ServerError::TaskJoin] when using Tokio's blocking pool and
    /// as [ServerError::TaskPanicked] when using Rayon.
    pub async fn run_blocking<F, T>(&self, f: F) -> Result<T, ServerError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.use_rayon {
            tokio_rayon::spawn(move || catch_unwind(AssertUnwindSafe(f)))
                .await
                .map_err(|_| ServerError::TaskPanicked)
        } else {
            Ok(tokio::task::spawn_blocking(f).await?)
        }
    }

    /// Start blocking or CPU-bound work without waiting for it to complete.
    ///
    /// `f` must report its own result. A panic in `f` is contained to the task.
    pub fn spawn_detached<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.use_rayon {
            drop(tokio_rayon::spawn(f));
        } else {
            drop(tokio::task::spawn_blocking(f));
        }
    }
}

/// Acquire a permit on an optional Semaphore, if present.
async fn optional_acquire(
    sem: &Option<Arc<Semaphore>>,
) -> Result<Option<OwnedSemaphorePermit>, ServerError> {
    if let Some(sem) = sem {
        sem.clone()
            .acquire_owned()
            .await
            .map(Some)
            .map_err(|err| err.into())
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::TryAcquireError;

    #[tokio::test]
    async fn no_resource_management() {
        let rm = ResourceManager::new(None, false);
        assert!(rm.renders.is_none());
        let _r = rm.render().await.unwrap();
        assert!(_r.is_none());
    }

    #[tokio::test]
    async fn render_limit() {
        let rm = ResourceManager::new(Some(1), false);
        assert!(rm.renders.is_some());
        let _r = rm.render().await.unwrap();
        assert!(_r.is_some());
        // Check that there are no more resources (without blocking).
        assert_eq!(
            rm.renders.as_ref().unwrap().try_acquire().err(),
            Some(TryAcquireError::NoPermits)
        );
    }

    #[tokio::test]
    async fn closed_semaphore() {
        let rm = ResourceManager::new(Some(1), false);
        rm.renders.as_ref().unwrap().close();
        assert!(matches!(
            rm.render().await.unwrap_err(),
            ServerError::SemaphoreAcquireError(_)
        ));
    }

    #[tokio::test]
    async fn run_blocking_tokio() {
        let rm = ResourceManager::new(None, false);
        assert_eq!(42, rm.run_blocking(|| 6 * 7).await.unwrap());
    }

    #[tokio::test]
    async fn run_blocking_rayon() {
        let rm = ResourceManager::new(None, true);
        assert_eq!(42, rm.run_blocking(|| 6 * 7).await.unwrap());
    }

    #[tokio::test]
    async fn run_blocking_panic() {
        let rm = ResourceManager::new(None, false);
        assert!(matches!(
            rm.run_blocking(|| -> u32 { panic!("boom") }).await,
            Err(ServerError::TaskJoin(_))
        ));
    }

    #[tokio::test]
    async fn run_blocking_rayon_panic() {
        let rm = ResourceManager::new(None, true);
        assert!(matches!(
            rm.run_blocking(|| -> u32 { panic!("boom") }).await,
            Err(ServerError::TaskPanicked)
        ));
    }

    #[tokio::test]
    async fn render_permit_moves_into_task() {
        let rm = ResourceManager::new(Some(1), false);
        let permit = rm.render().await.unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        rm.spawn_detached(move || {
            let _permit = permit;
            std::thread::sleep(std::time::Duration::from_millis(50));
            tx.send(()).unwrap();
        });
        // Held by the detached task until it finishes.
        assert_eq!(
            rm.renders.as_ref().unwrap().try_acquire().err(),
            Some(TryAcquireError::NoPermits)
        );
        rx.await.unwrap();
        assert!(rm.render().await.unwrap().is_some());
    }
}
