use std::path::PathBuf;

use clap::{Args, Parser, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the ogcard binary. Every flag is optional.
#[derive(Debug, Parser)]
#[command(
    name = "ogcard",
    version,
    about = "Generate social preview cards for blog articles"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "OGCARD_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: RunOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct RunOverrides {
    /// Override the site root directory.
    #[arg(long = "site-root", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub site_root: Option<PathBuf>,

    /// Override the asset directory (relative paths resolve against the site root).
    #[arg(long = "asset-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub asset_dir: Option<PathBuf>,

    /// Override the static renderer executable.
    #[arg(long = "renderer-program", value_name = "PATH", value_hint = ValueHint::ExecutablePath)]
    pub renderer_program: Option<PathBuf>,

    /// Override the headless browser executable.
    #[arg(long = "browser-program", value_name = "PATH", value_hint = ValueHint::ExecutablePath)]
    pub browser_program: Option<PathBuf>,

    /// Override the maximum number of concurrent captures.
    #[arg(long = "capture-concurrency", value_name = "COUNT")]
    pub capture_concurrency: Option<u32>,

    /// Override the render timeout.
    #[arg(long = "render-timeout-seconds", value_name = "SECONDS")]
    pub render_timeout_seconds: Option<u64>,

    /// Override the per-asset capture timeout.
    #[arg(long = "capture-timeout-seconds", value_name = "SECONDS")]
    pub capture_timeout_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}
