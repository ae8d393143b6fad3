use std::path::PathBuf;

use thiserror::Error;

/// Per-article failures. These never abort a run: the article is treated as
/// ineligible and the failure is surfaced as a warning.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("malformed metadata for `{slug}` in `{}`: {reason}", path.display())]
    MalformedMetadata {
        slug: String,
        path: PathBuf,
        reason: String,
    },
    #[error("slug `{slug}` from `{}` is already taken by another article", path.display())]
    DuplicateSlug { slug: String, path: PathBuf },
}

impl DomainError {
    pub fn malformed(slug: impl Into<String>, path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedMetadata {
            slug: slug.into(),
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn duplicate(slug: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::DuplicateSlug {
            slug: slug.into(),
            path: path.into(),
        }
    }

    /// Slug (or best-effort storage name) of the offending article.
    pub fn slug(&self) -> &str {
        match self {
            DomainError::MalformedMetadata { slug, .. } | DomainError::DuplicateSlug { slug, .. } => {
                slug.as_str()
            }
        }
    }
}
