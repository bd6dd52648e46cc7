//! Conversion from command-line arguments to service configuration

use crate::cli::main_impl::Cli;
use crate::config::{CutoutConfig, Preset};
use anyhow::{Context, Result};

/// Layers CLI overrides on top of the environment configuration
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build the configuration from `CUTOUT_*` variables and CLI flags
    pub(crate) fn from_cli(cli: &Cli) -> Result<CutoutConfig> {
        let base = CutoutConfig::from_env().context("Invalid CUTOUT_* environment")?;
        Self::apply(base, cli)
    }

    /// Apply explicit flags over `base`; flags win
    pub(crate) fn apply(mut config: CutoutConfig, cli: &Cli) -> Result<CutoutConfig> {
        if let Some(preset) = &cli.preset {
            let preset: Preset = preset.parse()?;
            let sized = CutoutConfig::preset(preset);
            config.pipeline.default_max_side = sized.pipeline.default_max_side;
            config.pipeline.hard_cap = sized.pipeline.hard_cap;
        }
        if let Some(side) = cli.max_side {
            config.pipeline.default_max_side = side;
        }
        if let Some(cap) = cli.hard_cap {
            config.pipeline.hard_cap = cap;
        }
        if let Some(enabled) = cli.fallback {
            config.pipeline.fallback_enabled = enabled;
        }
        if let Some(secs) = cli.fetch_timeout {
            config.fetch.timeout_secs = secs;
        }
        if let Some(token) = &cli.bearer_token {
            config.auth.bearer_token.clone_from(token);
        }
        if let Some(secret) = &cli.hmac_secret {
            config.auth.hmac_secret.clone_from(secret);
        }
        if let Some(backend) = &cli.backend {
            config.model.backend = backend.parse()?;
        }
        if let Some(path) = &cli.model_path {
            config.model.model_path = Some(path.clone());
        }
        if let Some(url) = &cli.model_url {
            config.model.model_url.clone_from(url);
        }
        if let Some(digest) = &cli.model_sha256 {
            config.model.sha256 = Some(digest.trim().to_ascii_lowercase());
        }
        if let Some(dir) = &cli.cache_dir {
            config.model.cache_dir = Some(dir.clone());
        }
        if let Some(bind) = &cli.bind {
            config.server.bind.clone_from(bind);
        }
        if cli.warm {
            config.server.warm_on_start = true;
        }

        config.validate()?;
        Ok(config)
    }
}
