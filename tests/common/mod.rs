//! Shared fixtures for integration tests
//!
//! Provides a scripted matting backend and a local HTTP server that plays
//! the role of the remote image host.

#![allow(dead_code)]

use axum::{
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use cutout_service::{
    error::{CutoutError, Result},
    CutoutConfig, CutoutProcessor, MattingBackend, MattingSession,
};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::{
    io::Cursor,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

/// Alpha prediction scripted for a test
#[derive(Debug, Clone, Copy)]
pub enum Prediction {
    /// Disc in the middle of the frame, soft edge
    Subject,
    /// Everything background
    Nothing,
    /// Engine error
    Broken,
}

#[derive(Debug, Clone)]
pub struct ScriptedMatting {
    prediction: Prediction,
    calls: Arc<AtomicUsize>,
}

impl ScriptedMatting {
    pub fn new(prediction: Prediction) -> Self {
        Self {
            prediction,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MattingBackend for ScriptedMatting {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn matte(&self, image: &RgbaImage) -> Result<RgbaImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (width, height) = image.dimensions();
        let radius = width.min(height) as f32 / 2.5;

        let alpha = |x: u32, y: u32| -> u8 {
            match self.prediction {
                Prediction::Nothing | Prediction::Broken => 0,
                Prediction::Subject => {
                    let dx = x as f32 - width as f32 / 2.0;
                    let dy = y as f32 - height as f32 / 2.0;
                    let coverage = (radius - (dx * dx + dy * dy).sqrt()) / (radius * 0.2);
                    (coverage.clamp(0.0, 1.0) * 255.0) as u8
                },
            }
        };

        if let Prediction::Broken = self.prediction {
            return Err(CutoutError::matting("scripted failure"));
        }
        Ok(RgbaImage::from_fn(width, height, |x, y| {
            let [r, g, b, _] = image.get_pixel(x, y).0;
            Rgba([r, g, b, alpha(x, y)])
        }))
    }
}

/// Processor whose session is already loaded with `backend`
pub fn processor_with(config: &CutoutConfig, backend: ScriptedMatting) -> Arc<CutoutProcessor> {
    let session = Arc::new(MattingSession::with_backend(Arc::new(backend)));
    Arc::new(CutoutProcessor::with_session(config, session).unwrap())
}

/// Opaque gradient image encoded in `format`
pub fn encoded_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let rgba = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 96, 255])
    });
    let image = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(rgba).into_rgb8()),
        _ => DynamicImage::ImageRgba8(rgba),
    };

    let mut buffer = Vec::new();
    image.write_to(&mut Cursor::new(&mut buffer), format).unwrap();
    buffer
}

/// Local stand-in for the remote image host
pub struct SourceServer {
    pub base_url: String,
    hits: Arc<AtomicUsize>,
}

impl SourceServer {
    /// Serves:
    /// - `/photo.png`: 640x480 PNG
    /// - `/photo.jpg`: 640x480 JPEG
    /// - `/page.html`: an HTML page
    /// - `/broken.png`: bytes labelled `image/png` that are not an image
    /// - `/slow.png`: a PNG after three seconds
    /// - `/missing.png`: 404
    pub async fn start() -> Self {
        let hits = Arc::new(AtomicUsize::new(0));
        let png = encoded_image(640, 480, ImageFormat::Png);
        let jpeg = encoded_image(640, 480, ImageFormat::Jpeg);

        let counted = |hits: &Arc<AtomicUsize>| {
            hits.fetch_add(1, Ordering::SeqCst);
        };

        let app = Router::new()
            .route("/photo.png", {
                let (hits, png) = (Arc::clone(&hits), png.clone());
                get(move || async move {
                    counted(&hits);
                    ([(header::CONTENT_TYPE, "image/png")], png).into_response()
                })
            })
            .route("/photo.jpg", {
                let hits = Arc::clone(&hits);
                get(move || async move {
                    counted(&hits);
                    ([(header::CONTENT_TYPE, "image/jpeg")], jpeg).into_response()
                })
            })
            .route("/page.html", {
                let hits = Arc::clone(&hits);
                get(move || async move {
                    counted(&hits);
                    (
                        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                        "<html><body>not an image</body></html>",
                    )
                        .into_response()
                })
            })
            .route("/broken.png", {
                let hits = Arc::clone(&hits);
                get(move || async move {
                    counted(&hits);
                    ([(header::CONTENT_TYPE, "image/png")], "definitely not a png").into_response()
                })
            })
            .route("/slow.png", {
                let (hits, png) = (Arc::clone(&hits), png);
                get(move || async move {
                    counted(&hits);
                    tokio::time::sleep(Duration::from_secs(3)).await;
                    ([(header::CONTENT_TYPE, "image/png")], png).into_response()
                })
            })
            .route("/missing.png", {
                let hits = Arc::clone(&hits);
                get(move || async move {
                    counted(&hits);
                    StatusCode::NOT_FOUND.into_response()
                })
            });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            hits,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Requests received so far
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}
