use crate::domain::articles::Article;

/// An article needs a social card iff it declares a non-empty image path.
pub fn is_eligible(article: &Article) -> bool {
    article.requires_image()
}

/// Keep eligible articles, ordered by slug.
pub fn select_eligible(articles: impl IntoIterator<Item = Article>) -> Vec<Article> {
    let mut eligible: Vec<Article> = articles.into_iter().filter(is_eligible).collect();
    eligible.sort_by(|left, right| left.slug.cmp(&right.slug));
    eligible
}
