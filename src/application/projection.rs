//! Projection builder: writes one card page descriptor per eligible article
//! plus a non-rendered section index into the scratch area.

use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

use serde::Serialize;
use tracing::debug;

use crate::{
    application::error::PipelineError,
    domain::articles::{Article, Projection},
};

const INDEX_FILE: &str = "_index.md";
const RENDERED_PAGE_FILE: &str = "index.html";
const INDEX_TITLE: &str = "Social cards";

#[derive(Debug, Serialize)]
struct IndexFrontMatter<'a> {
    title: &'a str,
    render: bool,
    in_search_index: bool,
    sort_by: &'a str,
    extra: IndexExtra<'a>,
}

#[derive(Debug, Serialize)]
struct IndexExtra<'a> {
    projections: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct DescriptorFrontMatter<'a> {
    title: &'a str,
    template: &'a str,
    path: String,
    in_search_index: bool,
    extra: DescriptorExtra<'a>,
}

#[derive(Debug, Serialize)]
struct DescriptorExtra<'a> {
    source_slug: &'a str,
    tags: &'a [String],
    reading_time: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    highlight_word: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_path: Option<&'a str>,
}

/// Builds projections for a fixed section name and card template.
#[derive(Debug, Clone)]
pub struct ProjectionBuilder {
    section: String,
    template: String,
}

impl ProjectionBuilder {
    pub fn new(section: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            template: template.into(),
        }
    }

    /// Path of the rendered card page for `slug`, relative to the renderer's
    /// output root.
    pub fn output_relative_path(&self, slug: &str) -> PathBuf {
        Path::new(&self.section).join(slug).join(RENDERED_PAGE_FILE)
    }

    /// Write the index and one descriptor per distinct slug into
    /// `scratch_root`. Projections come back ordered by slug whatever the
    /// input order.
    pub fn build(
        &self,
        eligible: &[Article],
        scratch_root: &Path,
    ) -> Result<Vec<Projection>, PipelineError> {
        fs::create_dir_all(scratch_root)
            .map_err(|err| PipelineError::scratch_write(scratch_root, err))?;

        let by_slug: BTreeMap<&str, &Article> = eligible
            .iter()
            .map(|article| (article.slug.as_str(), article))
            .collect();

        let index_path = scratch_root.join(INDEX_FILE);
        let index = IndexFrontMatter {
            title: INDEX_TITLE,
            render: false,
            in_search_index: false,
            sort_by: "none",
            extra: IndexExtra {
                projections: by_slug.keys().copied().collect(),
            },
        };
        write_front_matter(&index_path, &index, "")?;

        let mut projections = Vec::with_capacity(by_slug.len());
        for (slug, article) in by_slug {
            let descriptor_path = scratch_root.join(format!("{slug}.md"));
            let descriptor = DescriptorFrontMatter {
                title: &article.title,
                template: &self.template,
                path: format!("{}/{slug}", self.section),
                in_search_index: false,
                extra: DescriptorExtra {
                    source_slug: slug,
                    tags: &article.tags,
                    reading_time: article.reading_time_minutes(),
                    highlight_word: article.highlight_word.as_deref(),
                    date: article.publish_date.map(|date| date.to_string()),
                    image_path: article.image_path.as_deref(),
                },
            };
            write_front_matter(&descriptor_path, &descriptor, "")?;

            debug!(
                target = "ogcard::projection",
                op = "projection::build",
                slug,
                descriptor = %descriptor_path.display(),
                "Projection written"
            );

            projections.push(Projection {
                source_article_slug: slug.to_string(),
                layout_template_id: self.template.clone(),
                output_relative_path: self.output_relative_path(slug),
                descriptor_path,
            });
        }

        Ok(projections)
    }
}

fn write_front_matter<T: Serialize>(path: &Path, front: &T, body: &str) -> Result<(), PipelineError> {
    let encoded = toml::to_string(front).map_err(|err| {
        PipelineError::scratch_write(path, io::Error::new(io::ErrorKind::InvalidData, err))
    })?;
    let document = format!("+++\n{encoded}+++\n{body}");
    fs::write(path, document).map_err(|err| PipelineError::scratch_write(path, err))
}
