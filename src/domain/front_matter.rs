//! TOML front matter (`+++` fenced) parsing for article units.

use std::path::Path;

use serde::Deserialize;
use time::{Date, Month, format_description::BorrowedFormatItem, macros::format_description};

use super::{articles::Article, error::DomainError};

const FENCE: &str = "+++";
const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFrontMatter {
    title: Option<String>,
    date: Option<toml::Value>,
    tags: Option<Vec<String>>,
    taxonomies: RawTaxonomies,
    extra: RawExtra,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTaxonomies {
    tags: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawExtra {
    og_image: Option<String>,
    og_highlight: Option<String>,
}

/// Split a document into its front matter and body.
///
/// Returns `None` when the document does not open with a `+++` line or the
/// closing fence is missing.
pub fn split_front_matter(contents: &str) -> Option<(&str, &str)> {
    let contents = contents.strip_prefix('\u{feff}').unwrap_or(contents);
    let rest = contents.strip_prefix(FENCE)?;
    let rest = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == FENCE {
            let front = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((front, body));
        }
        offset += line.len();
    }

    None
}

/// Parse an article unit. `slug` has already been derived from the storage
/// location; `source` is only kept for diagnostics.
pub fn parse_article(slug: &str, source: &Path, contents: &str) -> Result<Article, DomainError> {
    let malformed = |reason: String| DomainError::malformed(slug, source, reason);

    let (front, body) = split_front_matter(contents)
        .ok_or_else(|| malformed("missing `+++` front matter block".to_string()))?;

    let raw: RawFrontMatter =
        toml::from_str(front).map_err(|err| malformed(format!("invalid TOML: {err}")))?;

    let title = raw
        .title
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
        .ok_or_else(|| malformed("`title` is missing or empty".to_string()))?;

    let publish_date = raw
        .date
        .as_ref()
        .map(parse_date)
        .transpose()
        .map_err(|reason| malformed(format!("invalid `date`: {reason}")))?;

    let tags = raw.taxonomies.tags.or(raw.tags).unwrap_or_default();

    let highlight_word = raw
        .extra
        .og_highlight
        .map(|word| word.trim().to_string())
        .filter(|word| !word.is_empty());

    Ok(Article {
        slug: slug.to_string(),
        source: source.to_path_buf(),
        title,
        tags,
        publish_date,
        image_path: raw.extra.og_image,
        highlight_word,
        word_count: body.split_whitespace().count(),
    })
}

fn parse_date(value: &toml::Value) -> Result<Date, String> {
    match value {
        toml::Value::Datetime(datetime) => {
            let date = datetime
                .date
                .ok_or_else(|| "value has no calendar date".to_string())?;
            let month = Month::try_from(date.month).map_err(|err| err.to_string())?;
            Date::from_calendar_date(i32::from(date.year), month, date.day)
                .map_err(|err| err.to_string())
        }
        toml::Value::String(text) => {
            let head = text.trim();
            let head = head.get(..10).unwrap_or(head);
            Date::parse(head, DATE_FORMAT).map_err(|err| err.to_string())
        }
        other => Err(format!("expected a date, found {}", other.type_str())),
    }
}
