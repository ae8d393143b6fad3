//! Articles, their social-card projections, and the generated assets.

use std::path::{Path, PathBuf};

use time::Date;

/// Words per minute used for reading-time estimates.
const READING_WORDS_PER_MINUTE: f32 = 225.0;

/// An article as read from the content store. Read-only to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    /// Stable identifier derived from the storage location.
    pub slug: String,
    /// File the article was read from.
    pub source: PathBuf,
    pub title: String,
    pub tags: Vec<String>,
    pub publish_date: Option<Date>,
    /// Author-declared image path; its presence makes the article eligible.
    pub image_path: Option<String>,
    pub highlight_word: Option<String>,
    /// Whitespace-separated words in the body.
    pub word_count: usize,
}

impl Article {
    /// True when the metadata declares a non-empty image path.
    pub fn requires_image(&self) -> bool {
        self.image_path
            .as_deref()
            .is_some_and(|path| !path.trim().is_empty())
    }

    /// Estimated reading time in whole minutes; zero only for an empty body.
    pub fn reading_time_minutes(&self) -> u32 {
        if self.word_count == 0 {
            return 0;
        }
        let minutes = (self.word_count as f32 / READING_WORDS_PER_MINUTE).ceil() as u32;
        minutes.max(1)
    }
}

/// Ephemeral page definition rendering one article as a social card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub source_article_slug: String,
    pub layout_template_id: String,
    /// Location of the rendered page relative to the renderer's output root.
    pub output_relative_path: PathBuf,
    /// Descriptor file written into the scratch area.
    pub descriptor_path: PathBuf,
}

/// Raster dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Canonical social-card size.
    pub const SOCIAL_CARD: Viewport = Viewport {
        width: 1200,
        height: 630,
    };
}

impl Default for Viewport {
    fn default() -> Self {
        Self::SOCIAL_CARD
    }
}

/// Final raster image for one article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedAsset {
    pub slug: String,
    pub width_px: u32,
    pub height_px: u32,
    pub file_path: PathBuf,
}

impl GeneratedAsset {
    /// Builds the asset descriptor for `slug`. The path depends only on the
    /// asset directory and the slug.
    pub fn for_slug(asset_dir: &Path, slug: &str, viewport: Viewport) -> Self {
        Self {
            slug: slug.to_string(),
            width_px: viewport.width,
            height_px: viewport.height,
            file_path: asset_path(asset_dir, slug),
        }
    }
}

/// `<asset_dir>/<slug>.png`
pub fn asset_path(asset_dir: &Path, slug: &str) -> PathBuf {
    asset_dir.join(format!("{slug}.png"))
}
