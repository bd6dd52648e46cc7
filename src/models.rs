//! Matting model resolution and caching
//!
//! The model is either an explicit file on disk or a download that lands in
//! a per-user cache directory. Downloads stream into a temporary file inside
//! the cache directory and are renamed into place only after the optional
//! SHA-256 check passes, so a crashed or corrupt download never shadows a
//! good model.

use crate::{
    config::ModelConfig,
    error::{CutoutError, Result},
};
use futures_util::stream::TryStreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tracing::{debug, info, instrument, warn};

/// File name used when the model URL has no usable last segment
const FALLBACK_FILE_NAME: &str = "model.onnx";

/// Locates the model file, downloading it into the cache when needed
#[derive(Debug)]
pub struct ModelResolver {
    client: Client,
    explicit_path: Option<PathBuf>,
    model_url: String,
    sha256: Option<String>,
    cache_dir: PathBuf,
}

impl ModelResolver {
    /// Build a resolver from model settings
    ///
    /// # Errors
    /// - `InvalidConfig` if no cache directory can be determined
    /// - `Download` if the HTTP client cannot be created
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let cache_dir = match &config.cache_dir {
            Some(dir) => dir.clone(),
            None => Self::default_cache_dir()?,
        };

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| CutoutError::download(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            explicit_path: config.model_path.clone(),
            model_url: config.model_url.clone(),
            sha256: config.sha256.as_ref().map(|s| s.trim().to_ascii_lowercase()),
            cache_dir,
        })
    }

    /// `<user cache dir>/cutout-service/models`
    ///
    /// # Errors
    /// - `InvalidConfig` when the platform has no cache directory
    pub fn default_cache_dir() -> Result<PathBuf> {
        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                CutoutError::invalid_config(
                    "Failed to determine cache directory. Set CUTOUT_CACHE_DIR.",
                )
            })?
            .join("cutout-service")
            .join("models"))
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Cache file name derived from the last URL path segment
    #[must_use]
    pub fn file_name_for(url: &str) -> String {
        reqwest::Url::parse(url)
            .ok()
            .and_then(|parsed| {
                parsed
                    .path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
    }

    /// Where the downloaded model lives in the cache
    #[must_use]
    pub fn cached_path(&self) -> PathBuf {
        self.cache_dir.join(Self::file_name_for(&self.model_url))
    }

    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.cached_path().is_file()
    }

    /// Return a path to a usable model file
    ///
    /// An explicit path wins; otherwise the cache is consulted and the model
    /// downloaded on a miss.
    ///
    /// # Errors
    /// - `Model` if an explicit path does not exist
    /// - `Download` for network failures or a digest mismatch
    /// - `Io` if the cache directory cannot be written
    #[instrument(skip(self), fields(url = %self.model_url))]
    pub async fn resolve(&self) -> Result<PathBuf> {
        if let Some(path) = &self.explicit_path {
            if !path.is_file() {
                return Err(CutoutError::model(format!(
                    "model file not found: {}",
                    path.display()
                )));
            }
            debug!(path = %path.display(), "using explicit model path");
            return Ok(path.clone());
        }

        let cached = self.cached_path();
        if cached.is_file() {
            debug!(path = %cached.display(), "model found in cache");
            return Ok(cached);
        }

        info!(dest = %cached.display(), "model not cached, downloading");
        self.download(&cached).await?;
        Ok(cached)
    }

    async fn download(&self, dest: &Path) -> Result<()> {
        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| CutoutError::file_io_error("create cache directory", &self.cache_dir, &e))?;

        let response = self
            .client
            .get(&self.model_url)
            .send()
            .await
            .map_err(|e| CutoutError::from_transport(&self.model_url, &e))?;

        if !response.status().is_success() {
            return Err(CutoutError::download(format!(
                "HTTP {} for model url: {}",
                response.status(),
                self.model_url
            )));
        }

        // Removed on drop unless persisted
        let temp = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(".part")
            .tempfile_in(&self.cache_dir)
            .map_err(|e| CutoutError::file_io_error("create temp file in", &self.cache_dir, &e))?;
        let (std_file, temp_path) = temp.into_parts();
        let mut file = tokio::fs::File::from_std(std_file);

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut buffer = vec![0; 64 * 1024];
        loop {
            let read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| CutoutError::download(format!("failed to read model stream: {e}")))?;
            if read == 0 {
                break;
            }
            let chunk = buffer.get(..read).unwrap_or(&[]);
            hasher.update(chunk);
            file.write_all(chunk)
                .await
                .map_err(|e| CutoutError::file_io_error("write to", &temp_path, &e))?;
            downloaded += read as u64;
        }
        file.flush()
            .await
            .map_err(|e| CutoutError::file_io_error("flush", &temp_path, &e))?;
        drop(file);

        let actual = format!("{:x}", hasher.finalize());
        if let Some(expected) = &self.sha256 {
            if &actual != expected {
                warn!(%expected, %actual, "model digest mismatch");
                return Err(CutoutError::download(format!(
                    "model digest mismatch: expected {expected}, got {actual}"
                )));
            }
        }

        temp_path
            .persist(dest)
            .map_err(|e| CutoutError::file_io_error("move model into", dest, &e.error))?;

        info!(bytes = downloaded, sha256 = %actual, "model downloaded");
        Ok(())
    }

    /// Check a file on disk against an expected SHA-256 digest
    ///
    /// Returns `true` when no digest is given.
    ///
    /// # Errors
    /// - `Io` if the file cannot be read
    pub fn verify_file_integrity(path: &Path, expected: Option<&str>) -> Result<bool> {
        let Some(expected) = expected else {
            return Ok(true);
        };

        let contents = std::fs::read(path)
            .map_err(|e| CutoutError::file_io_error("read file for verification", path, &e))?;
        let actual = format!("{:x}", Sha256::digest(&contents));
        Ok(actual.eq_ignore_ascii_case(expected.trim()))
    }
}
