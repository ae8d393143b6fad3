//! Article source abstraction.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::domain::{articles::Article, error::DomainError};

/// Lazy sequence of article units. Per-article failures are items of the
/// sequence, not errors of the enumeration.
pub type ArticleStream<'a> = Box<dyn Iterator<Item = Result<Article, DomainError>> + Send + 'a>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("article store `{}` could not be read: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Anything that can enumerate the article store. Each call to
/// [`ArticleSource::list_articles`] starts a fresh enumeration.
pub trait ArticleSource: Send + Sync {
    fn list_articles(&self) -> Result<ArticleStream<'_>, StoreError>;
}
