//! Token search shared by the gallery and the directory.

use chrono::{DateTime, Utc};

/// Lowercased alphanumeric tokens of `text`.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Rank `items` by how many query tokens appear in their searchable text,
/// then by recency. Items matching no token are dropped; an empty query
/// matches everything.
pub fn rank<T, F, G>(items: Vec<T>, query: &str, limit: usize, text: F, when: G) -> Vec<T>
where
    F: Fn(&T) -> String,
    G: Fn(&T) -> DateTime<Utc>,
{
    let tokens = tokenize(query);
    let mut scored: Vec<(usize, T)> = items
        .into_iter()
        .filter_map(|item| {
            let haystack = text(&item).to_lowercase();
            let score = tokens.iter().filter(|t| haystack.contains(t.as_str())).count();
            (tokens.is_empty() || score > 0).then_some((score, item))
        })
        .collect();

    scored.sort_by(|(sa, a), (sb, b)| sb.cmp(sa).then_with(|| when(b).cmp(&when(a))));
    scored.into_iter().take(limit).map(|(_, item)| item).collect()
}
