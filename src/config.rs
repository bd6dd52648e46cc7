//! Configuration types for the cutout service
//!
//! Configuration is split by concern (pipeline policy, source fetching,
//! authentication, matting model, HTTP server) and assembled into a single
//! [`CutoutConfig`]. Values can come from defaults, a [`Preset`], the
//! process environment ([`CutoutConfig::from_env`]) or the builder.

use crate::error::{CutoutError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Default longest side applied before matting when a request omits `size`
pub const DEFAULT_MAX_SIDE: u32 = 512;

/// Default upper bound on any requested `size`
pub const DEFAULT_HARD_CAP: u32 = 512;

/// Pixels with alpha at or below this value count as transparent
pub const DEFAULT_ALPHA_NOISE_THRESHOLD: u8 = 10;

/// Transparency ratio below which matting is considered to have failed
pub const DEFAULT_FAILURE_RATIO: f64 = 0.10;

/// Default source fetch timeout in seconds
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// User-Agent sent with every source fetch
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (cutout-service)";

/// Where the U²-Net model is fetched from when no local path is configured
pub const DEFAULT_MODEL_URL: &str =
    "https://github.com/danielgatis/rembg/releases/download/v0.0.0/u2net.onnx";

/// Largest value accepted for `hard_cap`
const MAX_HARD_CAP: u32 = 8192;

/// Matting backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Tract backend (pure Rust, no external dependencies)
    Tract,
    /// ONNX Runtime backend (requires the `onnx` feature)
    Onnx,
}

impl Default for BackendType {
    fn default() -> Self {
        if cfg!(feature = "tract") || !cfg!(feature = "onnx") {
            Self::Tract
        } else {
            Self::Onnx
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tract => write!(f, "tract"),
            Self::Onnx => write!(f, "onnx"),
        }
    }
}

impl FromStr for BackendType {
    type Err = CutoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tract" => Ok(Self::Tract),
            "onnx" | "ort" => Ok(Self::Onnx),
            other => Err(CutoutError::invalid_config(format!(
                "unknown matting backend '{other}' (expected 'tract' or 'onnx')"
            ))),
        }
    }
}

/// Deployment presets covering the two known service shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// 512px default and cap, tuned for small instances
    Lean,
    /// 1024px default and cap
    Large,
}

impl FromStr for Preset {
    type Err = CutoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lean" | "512" => Ok(Self::Lean),
            "large" | "1024" => Ok(Self::Large),
            other => Err(CutoutError::invalid_config(format!(
                "unknown preset '{other}' (expected 'lean' or 'large')"
            ))),
        }
    }
}

/// Pipeline policy: resize bounds, failure heuristic and fallback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Longest side used when the request does not specify one
    pub default_max_side: u32,
    /// Requested sizes are clamped to this value
    pub hard_cap: u32,
    /// Composite onto an opaque background when matting looks degenerate
    pub fallback_enabled: bool,
    /// Background used by the fallback compositor (RGB)
    pub fallback_color: [u8; 3],
    /// Alpha values above this count as non-transparent
    pub alpha_noise_threshold: u8,
    /// Ratios strictly below this are treated as matting failures
    pub failure_ratio: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_max_side: DEFAULT_MAX_SIDE,
            hard_cap: DEFAULT_HARD_CAP,
            fallback_enabled: true,
            fallback_color: [255, 255, 255],
            alpha_noise_threshold: DEFAULT_ALPHA_NOISE_THRESHOLD,
            failure_ratio: DEFAULT_FAILURE_RATIO,
        }
    }
}

impl PipelineConfig {
    /// Resolve the effective target side for a request
    ///
    /// Absent or non-positive sizes fall back to the default; everything is
    /// clamped to `[1, hard_cap]`.
    #[must_use]
    pub fn target_side(&self, requested: Option<i64>) -> u32 {
        let cap = self.hard_cap.max(1);
        let requested = match requested {
            Some(size) if size > 0 => u32::try_from(size).unwrap_or(u32::MAX),
            _ => self.default_max_side,
        };
        requested.clamp(1, cap)
    }
}

/// Source fetch settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Total request timeout in seconds
    pub timeout_secs: u64,
    /// User-Agent header value
    pub user_agent: String,
    /// Maximum redirects followed
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_redirects: 10,
        }
    }
}

/// Request authentication secrets; an empty value disables that check
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub bearer_token: String,
    pub hmac_secret: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("bearer_token", &redact(&self.bearer_token))
            .field("hmac_secret", &redact(&self.hmac_secret))
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl AuthConfig {
    /// Whether any authentication check is active
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.bearer_token.is_empty() || !self.hmac_secret.is_empty()
    }
}

/// Matting model location and backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Backend used to run the model
    pub backend: BackendType,
    /// Use this ONNX file directly instead of the cache
    pub model_path: Option<PathBuf>,
    /// Download location when the model is not cached
    pub model_url: String,
    /// Optional SHA-256 digest (lowercase hex) the downloaded file must match
    pub sha256: Option<String>,
    /// Override for the model cache directory
    pub cache_dir: Option<PathBuf>,
    /// Number of intra-op threads for the ONNX Runtime backend (0 = auto)
    pub intra_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::default(),
            model_path: None,
            model_url: DEFAULT_MODEL_URL.to_string(),
            sha256: None,
            cache_dir: None,
            intra_threads: 0,
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to listen on
    pub bind: String,
    /// Initialize the matting session before accepting requests
    pub warm_on_start: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            warm_on_start: false,
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CutoutConfig {
    pub pipeline: PipelineConfig,
    pub fetch: FetchConfig,
    pub auth: AuthConfig,
    pub model: ModelConfig,
    pub server: ServerConfig,
}

impl CutoutConfig {
    /// Create a new configuration builder for fluent API construction
    ///
    /// # Examples
    ///
    /// ```rust
    /// use cutout_service::CutoutConfig;
    ///
    /// let config = CutoutConfig::builder()
    ///     .default_max_side(768)
    ///     .hard_cap(1024)
    ///     .fallback_enabled(true)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.pipeline.target_side(None), 768);
    /// ```
    #[must_use]
    pub fn builder() -> CutoutConfigBuilder {
        CutoutConfigBuilder::default()
    }

    /// Configuration for one of the known deployment shapes
    #[must_use]
    pub fn preset(preset: Preset) -> Self {
        let mut config = Self::default();
        let side = match preset {
            Preset::Lean => 512,
            Preset::Large => 1024,
        };
        config.pipeline.default_max_side = side;
        config.pipeline.hard_cap = side;
        config
    }

    /// Build a configuration from `CUTOUT_*` environment variables
    ///
    /// Unset variables keep their defaults. `BEARER_TOKEN` and
    /// `EDGE_HMAC_SECRET` are honoured when the prefixed names are absent.
    ///
    /// # Errors
    /// - A variable is set but cannot be parsed
    /// - The resulting configuration fails [`CutoutConfig::validate`]
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`CutoutConfig::from_env`] with an injectable variable source
    ///
    /// # Errors
    /// - A variable is set but cannot be parsed
    /// - The resulting configuration fails validation
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string());

        let mut config = match get("CUTOUT_PRESET") {
            Some(p) if !p.is_empty() => Self::preset(p.parse()?),
            _ => Self::default(),
        };

        if let Some(v) = parse_var::<u32>(&get, "CUTOUT_MAX_SIDE")? {
            config.pipeline.default_max_side = v;
        }
        if let Some(v) = parse_var::<u32>(&get, "CUTOUT_HARD_CAP")? {
            config.pipeline.hard_cap = v;
        }
        if let Some(v) = get("CUTOUT_FALLBACK").filter(|v| !v.is_empty()) {
            config.pipeline.fallback_enabled = parse_bool("CUTOUT_FALLBACK", &v)?;
        }
        if let Some(v) = parse_var::<f64>(&get, "CUTOUT_FAILURE_RATIO")? {
            config.pipeline.failure_ratio = v;
        }
        if let Some(v) = parse_var::<u64>(&get, "CUTOUT_FETCH_TIMEOUT_SECS")? {
            config.fetch.timeout_secs = v;
        }
        if let Some(v) = get("CUTOUT_USER_AGENT").filter(|v| !v.is_empty()) {
            config.fetch.user_agent = v;
        }

        config.auth.bearer_token = get("CUTOUT_BEARER_TOKEN")
            .or_else(|| get("BEARER_TOKEN"))
            .unwrap_or_default();
        config.auth.hmac_secret = get("CUTOUT_HMAC_SECRET")
            .or_else(|| get("EDGE_HMAC_SECRET"))
            .unwrap_or_default();

        if let Some(v) = get("CUTOUT_BACKEND").filter(|v| !v.is_empty()) {
            config.model.backend = v.parse()?;
        }
        if let Some(v) = get("CUTOUT_MODEL_PATH").filter(|v| !v.is_empty()) {
            config.model.model_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("CUTOUT_MODEL_URL").filter(|v| !v.is_empty()) {
            config.model.model_url = v;
        }
        if let Some(v) = get("CUTOUT_MODEL_SHA256").filter(|v| !v.is_empty()) {
            config.model.sha256 = Some(v.to_ascii_lowercase());
        }
        if let Some(v) = get("CUTOUT_CACHE_DIR").filter(|v| !v.is_empty()) {
            config.model.cache_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("CUTOUT_BIND").filter(|v| !v.is_empty()) {
            config.server.bind = v;
        }
        if let Some(v) = get("CUTOUT_WARM").filter(|v| !v.is_empty()) {
            config.server.warm_on_start = parse_bool("CUTOUT_WARM", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate all configuration parameters
    ///
    /// # Validation Rules
    ///
    /// - `hard_cap`: 1-8192
    /// - `default_max_side`: at least 1
    /// - `failure_ratio`: 0.0-1.0
    /// - fetch timeout: 1-300 seconds, non-empty User-Agent
    ///
    /// # Errors
    /// Returns `CutoutError::InvalidConfig` describing the first violated rule.
    pub fn validate(&self) -> Result<()> {
        let pipeline = &self.pipeline;
        if pipeline.hard_cap == 0 || pipeline.hard_cap > MAX_HARD_CAP {
            return Err(CutoutError::config_value_error(
                "hard cap",
                pipeline.hard_cap,
                "1-8192",
                Some(DEFAULT_HARD_CAP),
            ));
        }
        if pipeline.default_max_side == 0 {
            return Err(CutoutError::config_value_error(
                "default max side",
                pipeline.default_max_side,
                "1-hard cap",
                Some(DEFAULT_MAX_SIDE),
            ));
        }
        if !(0.0..=1.0).contains(&pipeline.failure_ratio) {
            return Err(CutoutError::config_value_error(
                "failure ratio",
                pipeline.failure_ratio,
                "0.0-1.0",
                Some(DEFAULT_FAILURE_RATIO),
            ));
        }
        if self.fetch.timeout_secs == 0 || self.fetch.timeout_secs > 300 {
            return Err(CutoutError::config_value_error(
                "fetch timeout (seconds)",
                self.fetch.timeout_secs,
                "1-300",
                Some(DEFAULT_FETCH_TIMEOUT_SECS),
            ));
        }
        if self.fetch.user_agent.trim().is_empty() {
            return Err(CutoutError::invalid_config("User-Agent must not be empty"));
        }
        if let Some(digest) = &self.model.sha256 {
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(CutoutError::invalid_config(
                    "model SHA-256 must be 64 hexadecimal characters",
                ));
            }
        }
        if cfg!(not(feature = "onnx")) && self.model.backend == BackendType::Onnx {
            return Err(CutoutError::invalid_config(
                "ONNX Runtime backend requested but the 'onnx' feature is not enabled",
            ));
        }
        if cfg!(not(feature = "tract")) && self.model.backend == BackendType::Tract {
            return Err(CutoutError::invalid_config(
                "Tract backend requested but the 'tract' feature is not enabled",
            ));
        }
        Ok(())
    }
}

fn parse_var<T>(get: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(name) {
        Some(raw) if !raw.is_empty() => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| CutoutError::invalid_config(format!("{name}={raw:?}: {e}"))),
        _ => Ok(None),
    }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CutoutError::invalid_config(format!(
            "{name}={raw:?}: expected a boolean"
        ))),
    }
}

/// Builder for `CutoutConfig`
#[derive(Debug, Default)]
pub struct CutoutConfigBuilder {
    config: CutoutConfig,
}

impl CutoutConfigBuilder {
    /// Start from a preset instead of the defaults
    #[must_use]
    pub fn preset(mut self, preset: Preset) -> Self {
        let auth = std::mem::take(&mut self.config.auth);
        self.config = CutoutConfig::preset(preset);
        self.config.auth = auth;
        self
    }

    #[must_use]
    pub fn default_max_side(mut self, side: u32) -> Self {
        self.config.pipeline.default_max_side = side;
        self
    }

    #[must_use]
    pub fn hard_cap(mut self, cap: u32) -> Self {
        self.config.pipeline.hard_cap = cap;
        self
    }

    #[must_use]
    pub fn fallback_enabled(mut self, enabled: bool) -> Self {
        self.config.pipeline.fallback_enabled = enabled;
        self
    }

    #[must_use]
    pub fn fallback_color(mut self, rgb: [u8; 3]) -> Self {
        self.config.pipeline.fallback_color = rgb;
        self
    }

    #[must_use]
    pub fn failure_ratio(mut self, ratio: f64) -> Self {
        self.config.pipeline.failure_ratio = ratio;
        self
    }

    #[must_use]
    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch.timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.config.fetch.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn bearer_token<S: Into<String>>(mut self, token: S) -> Self {
        self.config.auth.bearer_token = token.into();
        self
    }

    #[must_use]
    pub fn hmac_secret<S: Into<String>>(mut self, secret: S) -> Self {
        self.config.auth.hmac_secret = secret.into();
        self
    }

    #[must_use]
    pub fn backend(mut self, backend: BackendType) -> Self {
        self.config.model.backend = backend;
        self
    }

    #[must_use]
    pub fn model_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.model.model_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn model_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.model.model_url = url.into();
        self
    }

    #[must_use]
    pub fn cache_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.model.cache_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn bind<S: Into<String>>(mut self, bind: S) -> Self {
        self.config.server.bind = bind.into();
        self
    }

    #[must_use]
    pub fn warm_on_start(mut self, warm: bool) -> Self {
        self.config.server.warm_on_start = warm;
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// Returns `CutoutError::InvalidConfig` when validation fails.
    pub fn build(self) -> Result<CutoutConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
