//! Process-wide matting session
//!
//! The matting model is expensive to load, so it is loaded once and shared
//! by every request. Initialization is lazy: the first request or an explicit
//! warm-up pays for it, and concurrent callers wait for that single load
//! instead of starting their own. A failed load leaves the session empty so
//! the next caller retries.

use crate::{
    backends,
    config::ModelConfig,
    error::{CutoutError, Result},
    inference::MattingBackend,
    models::ModelResolver,
};
use futures_util::future::{BoxFuture, FutureExt};
use image::RgbaImage;
use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::OnceCell;
use tracing::{info, instrument};

// Use instant crate for cross-platform time compatibility
use instant::Instant;

type SharedBackend = Arc<dyn MattingBackend>;
type Loader = Arc<dyn Fn() -> BoxFuture<'static, Result<SharedBackend>> + Send + Sync>;

/// Outcome of [`MattingSession::initialize`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarmReport {
    /// Time spent in this call, including waiting on another caller's load
    pub took: Duration,
    /// Whether this call performed the load
    pub loaded_now: bool,
}

impl WarmReport {
    #[must_use]
    pub fn took_ms(&self) -> u64 {
        u64::try_from(self.took.as_millis()).unwrap_or(u64::MAX)
    }
}

/// Lazily initialized, shareable matting engine handle
pub struct MattingSession {
    cell: OnceCell<SharedBackend>,
    loader: Loader,
}

impl MattingSession {
    /// Session that resolves the model and loads it with the configured runtime
    ///
    /// # Errors
    /// - `InvalidConfig` if no model cache directory can be determined
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let resolver = Arc::new(ModelResolver::from_config(config)?);
        let config = config.clone();

        Ok(Self::with_loader(move || {
            let resolver = Arc::clone(&resolver);
            let config = config.clone();
            async move {
                let path = resolver.resolve().await?;
                tokio::task::spawn_blocking(move || backends::create_backend(&config, &path))
                    .await
                    .map_err(|e| CutoutError::internal(format!("model loading task failed: {e}")))?
            }
        }))
    }

    /// Session whose backend comes from a custom async loader
    pub fn with_loader<F, Fut>(loader: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<SharedBackend>> + Send + 'static,
    {
        Self {
            cell: OnceCell::new(),
            loader: Arc::new(move || loader().boxed()),
        }
    }

    /// Session that is already initialized with `backend`
    pub fn with_backend(backend: SharedBackend) -> Self {
        Self {
            cell: OnceCell::new_with(Some(backend)),
            loader: Arc::new(|| {
                async { Err(CutoutError::internal("pre-initialized session reloaded")) }.boxed()
            }),
        }
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    /// Load the engine if nobody has yet
    ///
    /// Idempotent and safe to call concurrently; exactly one caller runs the
    /// loader.
    ///
    /// # Errors
    /// - Whatever the loader returns (`Model`, `Download`, `Io`, ...)
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<WarmReport> {
        let start = Instant::now();
        let loaded_now = AtomicBool::new(false);

        let backend = self
            .cell
            .get_or_try_init(|| {
                loaded_now.store(true, Ordering::SeqCst);
                (self.loader)()
            })
            .await?;

        let report = WarmReport {
            took: start.elapsed(),
            loaded_now: loaded_now.load(Ordering::SeqCst),
        };
        if report.loaded_now {
            info!(backend = backend.name(), took_ms = report.took_ms(), "matting session loaded");
        }
        Ok(report)
    }

    /// Run the engine on `image`
    ///
    /// Synchronous and CPU-bound; call from a blocking context.
    ///
    /// # Errors
    /// - `Internal` if the session was never initialized
    /// - `Matting` if the engine fails
    pub fn invoke(&self, image: &RgbaImage) -> Result<RgbaImage> {
        let backend = self
            .cell
            .get()
            .ok_or_else(|| CutoutError::internal("matting session used before initialization"))?;
        backend.matte(image)
    }
}

impl std::fmt::Debug for MattingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MattingSession")
            .field("initialized", &self.is_initialized())
            .field("backend", &self.cell.get().map(|b| b.name()))
            .finish()
    }
}
