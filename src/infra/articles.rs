//! Filesystem-backed article store.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    vec,
};

use tracing::debug;

use crate::{
    application::store::{ArticleSource, ArticleStream, StoreError},
    domain::{articles::Article, error::DomainError, front_matter::parse_article, slug::derive_slug},
};

const SECTION_INDEX: &str = "_index.md";
const BUNDLE_INDEX: &str = "index.md";

/// Reads `<name>.md` files and `<name>/index.md` bundles from one directory.
#[derive(Debug, Clone)]
pub struct FsArticleStore {
    root: PathBuf,
}

impl FsArticleStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn units(&self) -> Result<Vec<ArticleUnit>, StoreError> {
        let unreadable = |source| StoreError::Unreadable {
            path: self.root.clone(),
            source,
        };

        let mut units = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(unreadable)? {
            let entry = entry.map_err(unreadable)?;
            let path = entry.path();
            let file_name = entry.file_name().to_string_lossy().into_owned();

            if path.is_dir() {
                let index = path.join(BUNDLE_INDEX);
                if index.is_file() {
                    units.push(ArticleUnit {
                        name: file_name.clone(),
                        stem: file_name,
                        path: index,
                    });
                }
                continue;
            }

            if file_name == SECTION_INDEX {
                continue;
            }
            if let Some(stem) = file_name.strip_suffix(".md") {
                units.push(ArticleUnit {
                    stem: stem.to_string(),
                    name: file_name.clone(),
                    path,
                });
            }
        }

        units.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(
            target = "ogcard::infra::articles",
            op = "articles::list",
            root = %self.root.display(),
            units = units.len(),
            "Article store enumerated"
        );
        Ok(units)
    }
}

impl ArticleSource for FsArticleStore {
    fn list_articles(&self) -> Result<ArticleStream<'_>, StoreError> {
        let units = self.units()?;
        Ok(Box::new(ArticleIter {
            units: units.into_iter(),
            seen: HashSet::new(),
        }))
    }
}

#[derive(Debug)]
struct ArticleUnit {
    /// Directory entry name, used for ordering.
    name: String,
    /// File stem or bundle directory name, used for the slug.
    stem: String,
    path: PathBuf,
}

/// Reads and parses units one at a time.
struct ArticleIter {
    units: vec::IntoIter<ArticleUnit>,
    seen: HashSet<String>,
}

impl Iterator for ArticleIter {
    type Item = Result<Article, DomainError>;

    fn next(&mut self) -> Option<Self::Item> {
        let unit = self.units.next()?;
        Some(self.load(unit))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.units.size_hint()
    }
}

impl ArticleIter {
    fn load(&mut self, unit: ArticleUnit) -> Result<Article, DomainError> {
        let slug = derive_slug(&unit.stem)
            .map_err(|err| DomainError::malformed(&unit.stem, &unit.path, err.to_string()))?;

        let contents = fs::read_to_string(&unit.path).map_err(|err| {
            DomainError::malformed(&slug, &unit.path, format!("unreadable: {err}"))
        })?;

        if self.seen.contains(&slug) {
            return Err(DomainError::duplicate(slug, unit.path));
        }

        // A unit claims its slug only once it parses.
        let article = parse_article(&slug, &unit.path, &contents)?;
        self.seen.insert(slug);
        Ok(article)
    }
}
