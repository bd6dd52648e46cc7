//! Cutout service binary
//!
//! Every flag is optional; anything left unset comes from the `CUTOUT_*`
//! environment variables and then from built-in defaults.

use super::config::CliConfigBuilder;
use crate::{
    server,
    tracing_config::{TracingConfig, TracingFormat},
};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

/// HTTP service returning transparent PNG cutouts of remote images
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "cutout-service")]
pub struct Cli {
    /// Socket address to listen on (e.g. 0.0.0.0:8080)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Size preset: lean (512px) or large (1024px)
    #[arg(long)]
    pub preset: Option<String>,

    /// Longest side used when a request omits `size`
    #[arg(long)]
    pub max_side: Option<u32>,

    /// Upper bound applied to every requested size
    #[arg(long)]
    pub hard_cap: Option<u32>,

    /// Composite degenerate cutouts onto white (true/false)
    #[arg(long, value_name = "BOOL")]
    pub fallback: Option<bool>,

    /// Source fetch timeout in seconds
    #[arg(long)]
    pub fetch_timeout: Option<u64>,

    /// Require `Authorization: Bearer <TOKEN>` on /cutout
    #[arg(long, value_name = "TOKEN")]
    pub bearer_token: Option<String>,

    /// Require an HMAC-SHA256 signature of the source URL
    #[arg(long, value_name = "SECRET")]
    pub hmac_secret: Option<String>,

    /// Matting runtime: tract or onnx
    #[arg(long)]
    pub backend: Option<String>,

    /// Load the matting model from this file instead of the cache
    #[arg(short, long, value_name = "PATH")]
    pub model_path: Option<PathBuf>,

    /// Download location used when the model is not cached
    #[arg(long, value_name = "URL")]
    pub model_url: Option<String>,

    /// Expected SHA-256 of the downloaded model
    #[arg(long, value_name = "HEX")]
    pub model_sha256: Option<String>,

    /// Use custom model cache directory
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Load the matting model in the background at startup
    #[arg(long)]
    pub warm: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format: console, compact or json
    #[arg(long, env = "CUTOUT_LOG_FORMAT", default_value = "console")]
    pub log_format: TracingFormat,

    /// Explicit tracing filter directives (overrides -v and RUST_LOG)
    #[arg(long, value_name = "FILTER")]
    pub log_filter: Option<String>,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli).context("Failed to initialize tracing")?;

    let config = CliConfigBuilder::from_cli(&cli).context("Invalid configuration")?;

    server::serve(config).await.context("Server failed")?;
    Ok(())
}

fn init_tracing(cli: &Cli) -> Result<()> {
    let mut tracing = TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(cli.log_format)
        .with_instance_id(uuid::Uuid::new_v4().to_string());
    if let Some(filter) = &cli.log_filter {
        tracing = tracing.with_env_filter(filter.clone());
    }
    tracing.init()
}
