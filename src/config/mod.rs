//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{
    num::NonZeroU32,
    path::{Component, Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub use cli::{CliArgs, RunOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "ogcard";
const DEFAULT_SITE_ROOT: &str = ".";
const DEFAULT_ARTICLES_DIR: &str = "content/blog";
const DEFAULT_CONTENT_DIR: &str = "content";
const DEFAULT_PROJECTION_SECTION: &str = "og-cards";
const DEFAULT_CARD_TEMPLATE: &str = "og-card.html";
const DEFAULT_ASSET_DIR: &str = "static/og";
const DEFAULT_RENDERER_PROGRAM: &str = "zola";
const DEFAULT_RENDERER_ARGS: &[&str] = &["build", "--force", "--output-dir", "{output_dir}"];
const DEFAULT_RENDER_TIMEOUT_SECS: u64 = 120;
const DEFAULT_BROWSER_PROGRAM: &str = "chromium";
const DEFAULT_BROWSER_ARGS: &[&str] = &[
    "--headless",
    "--disable-gpu",
    "--hide-scrollbars",
    "--window-size={width},{height}",
    "--screenshot={output}",
    "{input_url}",
];
const DEFAULT_CAPTURE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CARD_WIDTH: u32 = 1200;
const DEFAULT_CARD_HEIGHT: u32 = 630;
const DEFAULT_CAPTURE_CONCURRENCY: u32 = 4;
const MAX_CAPTURE_CONCURRENCY: u32 = 32;

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub site: SiteSettings,
    pub projection: ProjectionSettings,
    pub assets: AssetSettings,
    pub renderer: RendererSettings,
    pub browser: BrowserSettings,
    pub capture: CaptureSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub root: PathBuf,
    /// Article store, relative to `root` unless absolute.
    pub articles_dir: PathBuf,
    /// Renderer content tree, relative to `root` unless absolute.
    pub content_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ProjectionSettings {
    /// Section name the projections live under; a single path segment.
    pub section: String,
    pub template: String,
}

#[derive(Debug, Clone)]
pub struct AssetSettings {
    pub directory: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RendererSettings {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub width: NonZeroU32,
    pub height: NonZeroU32,
    pub hide_scrollbars: bool,
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub concurrency: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

impl Settings {
    /// Absolute-or-root-relative path of the article store.
    pub fn articles_path(&self) -> PathBuf {
        self.site.root.join(&self.site.articles_dir)
    }

    /// Directory the projections are written to during a run.
    pub fn projection_root(&self) -> PathBuf {
        self.site
            .root
            .join(&self.site.content_dir)
            .join(&self.projection.section)
    }

    pub fn asset_dir(&self) -> PathBuf {
        self.site.root.join(&self.assets.directory)
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("OGCARD").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration from the process arguments, returning both.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    use clap::Parser;

    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    site: RawSiteSettings,
    projection: RawProjectionSettings,
    assets: RawAssetSettings,
    renderer: RawRendererSettings,
    browser: RawBrowserSettings,
    capture: RawCaptureSettings,
    logging: RawLoggingSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &RunOverrides) {
        if let Some(root) = overrides.site_root.as_ref() {
            self.site.root = Some(root.clone());
        }
        if let Some(dir) = overrides.asset_dir.as_ref() {
            self.assets.directory = Some(dir.clone());
        }
        if let Some(program) = overrides.renderer_program.as_ref() {
            self.renderer.program = Some(program.clone());
        }
        if let Some(program) = overrides.browser_program.as_ref() {
            self.browser.program = Some(program.clone());
        }
        if let Some(count) = overrides.capture_concurrency {
            self.capture.concurrency = Some(count);
        }
        if let Some(seconds) = overrides.render_timeout_seconds {
            self.renderer.timeout_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.capture_timeout_seconds {
            self.browser.timeout_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            site,
            projection,
            assets,
            renderer,
            browser,
            capture,
            logging,
        } = raw;

        let site = build_site_settings(site)?;
        let projection = build_projection_settings(projection)?;
        let assets = build_asset_settings(assets)?;
        let renderer = build_renderer_settings(renderer)?;
        let browser = build_browser_settings(browser)?;
        let capture = build_capture_settings(capture)?;
        let logging = build_logging_settings(logging)?;

        let settings = Self {
            site,
            projection,
            assets,
            renderer,
            browser,
            capture,
            logging,
        };

        let projection_root = settings.projection_root();
        if settings.articles_path().starts_with(&projection_root) {
            return Err(LoadError::invalid(
                "projection.section",
                format!(
                    "scratch section `{}` would overlap the article store",
                    projection_root.display()
                ),
            ));
        }

        Ok(settings)
    }
}

fn build_site_settings(site: RawSiteSettings) -> Result<SiteSettings, LoadError> {
    let root = non_empty_path(site.root, DEFAULT_SITE_ROOT, "site.root")?;
    let articles_dir = non_empty_path(site.articles_dir, DEFAULT_ARTICLES_DIR, "site.articles_dir")?;
    let content_dir = non_empty_path(site.content_dir, DEFAULT_CONTENT_DIR, "site.content_dir")?;

    Ok(SiteSettings {
        root,
        articles_dir,
        content_dir,
    })
}

fn build_projection_settings(
    projection: RawProjectionSettings,
) -> Result<ProjectionSettings, LoadError> {
    let section = projection
        .section
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_PROJECTION_SECTION.to_string());
    let mut components = Path::new(&section).components();
    let single_segment = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !single_segment {
        return Err(LoadError::invalid(
            "projection.section",
            "must be a single, non-empty path segment",
        ));
    }

    let template = projection
        .template
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_CARD_TEMPLATE.to_string());
    if template.is_empty() {
        return Err(LoadError::invalid(
            "projection.template",
            "template must not be empty",
        ));
    }

    Ok(ProjectionSettings { section, template })
}

fn build_asset_settings(assets: RawAssetSettings) -> Result<AssetSettings, LoadError> {
    let directory = non_empty_path(assets.directory, DEFAULT_ASSET_DIR, "assets.directory")?;
    Ok(AssetSettings { directory })
}

fn build_renderer_settings(renderer: RawRendererSettings) -> Result<RendererSettings, LoadError> {
    let program = non_empty_path(renderer.program, DEFAULT_RENDERER_PROGRAM, "renderer.program")?;
    let args = renderer.args.unwrap_or_else(|| owned(DEFAULT_RENDERER_ARGS));
    let timeout = timeout(
        renderer.timeout_seconds,
        DEFAULT_RENDER_TIMEOUT_SECS,
        "renderer.timeout_seconds",
    )?;

    Ok(RendererSettings {
        program,
        args,
        timeout,
    })
}

fn build_browser_settings(browser: RawBrowserSettings) -> Result<BrowserSettings, LoadError> {
    let program = non_empty_path(browser.program, DEFAULT_BROWSER_PROGRAM, "browser.program")?;
    let args = browser.args.unwrap_or_else(|| owned(DEFAULT_BROWSER_ARGS));
    let timeout = timeout(
        browser.timeout_seconds,
        DEFAULT_CAPTURE_TIMEOUT_SECS,
        "browser.timeout_seconds",
    )?;
    let width = non_zero_u32(
        browser.width.unwrap_or(DEFAULT_CARD_WIDTH).into(),
        "browser.width",
    )?;
    let height = non_zero_u32(
        browser.height.unwrap_or(DEFAULT_CARD_HEIGHT).into(),
        "browser.height",
    )?;

    Ok(BrowserSettings {
        program,
        args,
        timeout,
        width,
        height,
        hide_scrollbars: browser.hide_scrollbars.unwrap_or(true),
    })
}

fn build_capture_settings(capture: RawCaptureSettings) -> Result<CaptureSettings, LoadError> {
    let value = capture.concurrency.unwrap_or(DEFAULT_CAPTURE_CONCURRENCY);
    let concurrency = non_zero_u32(value.into(), "capture.concurrency")?;
    if concurrency.get() > MAX_CAPTURE_CONCURRENCY {
        return Err(LoadError::invalid(
            "capture.concurrency",
            format!("must not exceed {MAX_CAPTURE_CONCURRENCY}"),
        ));
    }
    Ok(CaptureSettings { concurrency })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    root: Option<PathBuf>,
    articles_dir: Option<PathBuf>,
    content_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawProjectionSettings {
    section: Option<String>,
    template: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAssetSettings {
    directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRendererSettings {
    program: Option<PathBuf>,
    args: Option<Vec<String>>,
    timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBrowserSettings {
    program: Option<PathBuf>,
    args: Option<Vec<String>>,
    timeout_seconds: Option<u64>,
    width: Option<u32>,
    height: Option<u32>,
    hide_scrollbars: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCaptureSettings {
    concurrency: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

fn non_empty_path(
    value: Option<PathBuf>,
    default: &str,
    key: &'static str,
) -> Result<PathBuf, LoadError> {
    let path = value.unwrap_or_else(|| PathBuf::from(default));
    if path.as_os_str().is_empty() {
        return Err(LoadError::invalid(key, "path must not be empty"));
    }
    Ok(path)
}

fn timeout(value: Option<u64>, default: u64, key: &'static str) -> Result<Duration, LoadError> {
    let seconds = value.unwrap_or(default);
    if seconds == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(seconds))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
