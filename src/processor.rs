//! Cutout pipeline orchestration
//!
//! [`CutoutProcessor`] runs one request end to end:
//!
//! 1. auth guard (before any network I/O)
//! 2. fetch
//! 3. decode and downscale
//! 4. matting (lazily initializing the shared session)
//! 5. transparency analysis and optional fallback compositing
//! 6. PNG encoding
//!
//! Every stage returns `Result<_, CutoutError>`; the processor never maps
//! errors to transport concerns. CPU-bound stages run on tokio's blocking
//! pool so the async workers stay free for fetches.

use crate::{
    auth::AuthGuard,
    config::{CutoutConfig, PipelineConfig},
    error::{CutoutError, Result},
    services::{
        FallbackCompositor, FetchedImage, PngOutputEncoder, SourceDecoder, SourceFetcher,
        TransparencyAnalyzer,
    },
    session::{MattingSession, WarmReport},
    types::{CutoutRequest, CutoutResponse, ProcessingTimings},
};
use image::RgbaImage;
use instant::Instant;
use std::sync::Arc;
use tracing::{debug, info, instrument, span, Level, Span};

/// Credentials presented with a request
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// Raw `Authorization` header value
    pub authorization: Option<String>,
    /// Raw `X-Edge-HMAC` header value
    pub signature: Option<String>,
}

impl Credentials {
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn bearer<S: AsRef<str>>(token: S) -> Self {
        Self {
            authorization: Some(format!("Bearer {}", token.as_ref())),
            signature: None,
        }
    }

    #[must_use]
    pub fn with_signature<S: Into<String>>(mut self, signature: S) -> Self {
        self.signature = Some(signature.into());
        self
    }
}

/// Shared, request-independent pipeline state
#[derive(Debug)]
pub struct CutoutProcessor {
    pipeline: PipelineConfig,
    fetcher: SourceFetcher,
    auth: AuthGuard,
    session: Arc<MattingSession>,
}

impl CutoutProcessor {
    /// Processor with a model session built from `config`
    ///
    /// The model itself is not loaded until the first request or warm-up.
    ///
    /// # Errors
    /// - `InvalidConfig` for invalid settings
    /// - `Download` if the HTTP client cannot be built
    pub fn new(config: &CutoutConfig) -> Result<Self> {
        let session = Arc::new(MattingSession::from_config(&config.model)?);
        Self::with_session(config, session)
    }

    /// Processor using an existing matting session
    ///
    /// # Errors
    /// - `InvalidConfig` for invalid settings
    /// - `Download` if the HTTP client cannot be built
    pub fn with_session(config: &CutoutConfig, session: Arc<MattingSession>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            pipeline: config.pipeline.clone(),
            fetcher: SourceFetcher::new(&config.fetch)?,
            auth: AuthGuard::from_config(&config.auth),
            session,
        })
    }

    #[must_use]
    pub fn session(&self) -> &Arc<MattingSession> {
        &self.session
    }

    #[must_use]
    pub fn pipeline(&self) -> &PipelineConfig {
        &self.pipeline
    }

    /// Load the matting engine ahead of the first request
    ///
    /// # Errors
    /// - Any model resolution or loading failure
    pub async fn warm(&self) -> Result<WarmReport> {
        self.session.initialize().await
    }

    /// Produce a cutout for `request`
    ///
    /// # Errors
    /// - `Unauthorized` when an enabled credential check fails; nothing is fetched
    /// - `Download` / `InvalidContent` when the source cannot be retrieved
    /// - `Decode` when the bytes are not a usable image
    /// - `Model` / `Matting` when the engine cannot load or run
    /// - `Encode` / `Internal` for server-side defects
    #[instrument(
        skip(self, request, credentials),
        fields(src = %request.source_url, size = ?request.max_side)
    )]
    pub async fn process(
        &self,
        request: &CutoutRequest,
        credentials: &Credentials,
    ) -> Result<CutoutResponse> {
        let total_start = Instant::now();
        let mut timings = ProcessingTimings::default();

        self.auth.check(
            credentials.authorization.as_deref(),
            credentials.signature.as_deref(),
            &request.source_url,
        )?;

        let fetch_start = Instant::now();
        let fetched = self.fetcher.fetch(&request.source_url).await?;
        timings.fetch_ms = elapsed_ms(fetch_start);

        let target = self.pipeline.target_side(request.max_side);
        let (image, decode_ms) = run_blocking(move || Self::decode_stage(&fetched, target)).await?;
        timings.decode_ms = decode_ms;

        let warm = self.session.initialize().await?;
        if warm.loaded_now {
            timings.model_load_ms = warm.took_ms();
        }

        let session = Arc::clone(&self.session);
        let pipeline = self.pipeline.clone();
        let mut response = run_blocking(move || {
            Self::matting_stages(&session, &pipeline, &image, timings)
        })
        .await?;
        response.timings.total_ms = elapsed_ms(total_start);

        info!(
            width = response.dimensions.0,
            height = response.dimensions.1,
            ratio = %response.transparency_header(),
            fallback = response.fallback_applied,
            bytes = response.png_bytes.len(),
            total_ms = response.timings.total_ms,
            "cutout complete"
        );
        Ok(response)
    }

    fn decode_stage(fetched: &FetchedImage, target: u32) -> Result<(RgbaImage, u64)> {
        let _span = span!(
            Level::DEBUG,
            "decode",
            bytes = fetched.bytes.len(),
            content_type = %fetched.content_type,
            target_side = target
        )
        .entered();

        let start = Instant::now();
        let image =
            SourceDecoder::decode_and_normalize(&fetched.bytes, &fetched.content_type, target)?;
        Ok((image, elapsed_ms(start)))
    }

    fn matting_stages(
        session: &MattingSession,
        pipeline: &PipelineConfig,
        image: &RgbaImage,
        mut timings: ProcessingTimings,
    ) -> Result<CutoutResponse> {
        let matted = {
            let _span = span!(
                Level::INFO,
                "matting",
                width = image.width(),
                height = image.height()
            )
            .entered();
            let start = Instant::now();
            let matted = session.invoke(image)?;
            timings.matting_ms = elapsed_ms(start);
            matted
        };

        let (final_image, statistics, fallback_applied) = {
            let _span = span!(Level::DEBUG, "postprocessing").entered();
            let start = Instant::now();

            // The failure heuristic only exists to drive the fallback
            let outcome = if pipeline.fallback_enabled {
                let analyzer = TransparencyAnalyzer::from_config(pipeline);
                let stats = analyzer.analyze(&matted);
                if analyzer.is_likely_failure(&stats) {
                    debug!(ratio = stats.transparency_ratio, "matting looks degenerate, compositing");
                    let composited =
                        FallbackCompositor::new(pipeline.fallback_color).composite(&matted);
                    (composited, Some(stats), true)
                } else {
                    (matted, Some(stats), false)
                }
            } else {
                (matted, None, false)
            };

            timings.postprocessing_ms = elapsed_ms(start);
            outcome
        };

        // The engine decides the output raster size
        let dimensions = final_image.dimensions();
        let png_bytes = {
            let _span = span!(Level::DEBUG, "encode").entered();
            let start = Instant::now();
            let bytes = PngOutputEncoder::encode(&final_image)?;
            timings.encode_ms = elapsed_ms(start);
            bytes
        };

        Ok(CutoutResponse {
            png_bytes,
            statistics,
            fallback_applied,
            dimensions,
            timings,
        })
    }
}

/// Run a CPU-bound stage on the blocking pool inside the caller's span
async fn run_blocking<T, F>(stage: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let parent = Span::current();
    tokio::task::spawn_blocking(move || parent.in_scope(stage))
        .await
        .map_err(|e| CutoutError::internal(format!("pipeline task failed: {e}")))?
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::sign, backends::test_utils::MockMattingBackend, error::ErrorKind,
        inference::MattingBackend,
    };

    fn processor(config: &CutoutConfig, backend: MockMattingBackend) -> CutoutProcessor {
        let session = Arc::new(MattingSession::with_backend(Arc::new(backend)));
        CutoutProcessor::with_session(config, session).unwrap()
    }

    fn opaque_image() -> RgbaImage {
        RgbaImage::from_fn(64, 48, |x, y| image::Rgba([(x * 3) as u8, (y * 5) as u8, 90, 255]))
    }

    #[test]
    fn test_matting_stages_without_fallback() {
        let config = CutoutConfig::default();
        let backend = MockMattingBackend::subject();
        let session = MattingSession::with_backend(Arc::new(backend));
        let image = opaque_image();

        let response = CutoutProcessor::matting_stages(
            &session,
            &config.pipeline,
            &image,
            ProcessingTimings::default(),
        )
        .unwrap();

        assert!(!response.fallback_applied);
        let stats = response.statistics.unwrap();
        assert!(stats.transparency_ratio > 0.1 && stats.transparency_ratio < 0.9);

        // Alpha is passed through from the matting output unchanged
        let matted = MockMattingBackend::subject().matte(&image).unwrap();
        let decoded = image::load_from_memory(&response.png_bytes).unwrap().to_rgba8();
        assert_eq!(decoded, matted);
    }

    /// Engine that returns a raster half the input size
    struct HalfSizeMatting;

    impl MattingBackend for HalfSizeMatting {
        fn name(&self) -> &'static str {
            "half-size"
        }

        fn matte(&self, image: &RgbaImage) -> Result<RgbaImage> {
            let (width, height) = image.dimensions();
            Ok(RgbaImage::from_pixel(
                width / 2,
                height / 2,
                image::Rgba([10, 20, 30, 255]),
            ))
        }
    }

    #[test]
    fn test_reported_dimensions_follow_engine_output() {
        let config = CutoutConfig::default();
        let session = MattingSession::with_backend(Arc::new(HalfSizeMatting));

        let response = CutoutProcessor::matting_stages(
            &session,
            &config.pipeline,
            &opaque_image(),
            ProcessingTimings::default(),
        )
        .unwrap();

        assert_eq!(response.dimensions, (32, 24));
        let decoded = image::load_from_memory(&response.png_bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), response.dimensions);
    }

    #[test]
    fn test_matting_stages_with_fallback() {
        let config = CutoutConfig::default();
        let session = MattingSession::with_backend(Arc::new(MockMattingBackend::empty()));

        let response = CutoutProcessor::matting_stages(
            &session,
            &config.pipeline,
            &opaque_image(),
            ProcessingTimings::default(),
        )
        .unwrap();

        assert!(response.fallback_applied);
        assert_eq!(response.statistics.unwrap().non_transparent_pixel_count, 0);
        let decoded = image::load_from_memory(&response.png_bytes).unwrap().to_rgba8();
        assert!(decoded.pixels().all(|p| p.0[3] == 255));
        // Fully transparent input shows the white background everywhere
        assert!(decoded.pixels().all(|p| p.0 == [255, 255, 255, 255]));
    }

    #[test]
    fn test_fallback_disabled_skips_analysis() {
        let config = CutoutConfig::builder().fallback_enabled(false).build().unwrap();
        let session = MattingSession::with_backend(Arc::new(MockMattingBackend::empty()));

        let response = CutoutProcessor::matting_stages(
            &session,
            &config.pipeline,
            &opaque_image(),
            ProcessingTimings::default(),
        )
        .unwrap();

        assert!(!response.fallback_applied);
        assert_eq!(response.transparency_header(), "unknown");
    }

    #[tokio::test]
    async fn test_unauthorized_request_never_reaches_backend() {
        let config = CutoutConfig::builder()
            .bearer_token("tok")
            .hmac_secret("edge")
            .build()
            .unwrap();
        let backend = MockMattingBackend::subject();
        let processor = processor(&config, backend.clone());

        // Unroutable source: a fetch attempt would fail with Download, not Unauthorized
        let request = CutoutRequest::new("http://127.0.0.1:9/img.png");
        let err = processor
            .process(&request, &Credentials::bearer("wrong"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);

        let sig = sign("edge", &request.source_url).unwrap();
        let err = processor
            .process(&request, &Credentials::none().with_signature(sig))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_authorized_request_proceeds_to_fetch() {
        let config = CutoutConfig::builder()
            .bearer_token("tok")
            .hmac_secret("edge")
            .fetch_timeout_secs(2)
            .build()
            .unwrap();
        let processor = processor(&config, MockMattingBackend::subject());

        let request = CutoutRequest::new("http://127.0.0.1:9/img.png");
        let sig = sign("edge", &request.source_url).unwrap();
        let err = processor
            .process(&request, &Credentials::bearer("tok").with_signature(sig))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Download);
    }

    #[tokio::test]
    async fn test_invalid_scheme_is_download_error() {
        let processor = processor(&CutoutConfig::default(), MockMattingBackend::subject());
        let err = processor
            .process(&CutoutRequest::new("file:///etc/passwd"), &Credentials::none())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Download);
    }
}
