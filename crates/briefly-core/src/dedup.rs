use crate::models::Article;
use url::Url;
use uuid::Uuid;

/// Namespace UUID for deriving article URIs from URLs when the upstream
/// API returns no `uri` of its own.
const URL_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6b, 0xa7, 0xb8, 0x10, 0x9d, 0xad, 0x11, 0xd1, 0x80, 0xb4, 0x00, 0xc0, 0x4f, 0xd4, 0x30,
    0xc8,
]);

/// Tracking query parameters to strip before normalization.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "ref",
    "fbclid",
    "gclid",
];

/// Resolve the stable identifier for an article: the API's URI when present,
/// otherwise a deterministic UUID v5 of the normalized URL so re-fetches of
/// the same page dedupe against each other.
pub fn uri_for(raw_uri: Option<&str>, url: &str) -> String {
    match raw_uri {
        Some(uri) if !uri.is_empty() => uri.to_string(),
        _ => Uuid::new_v5(&URL_NAMESPACE, normalize_url(url).as_bytes()).to_string(),
    }
}

/// Strip tracking params and fragments; scheme/host lowercase via the parser.
fn normalize_url(raw: &str) -> String {
    let Ok(mut parsed) = Url::parse(raw) else {
        return raw.to_string();
    };

    parsed.set_fragment(None);

    let filtered: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if filtered.is_empty() {
        parsed.set_query(None);
    } else {
        let qs: Vec<String> = filtered.iter().map(|(k, v)| format!("{k}={v}")).collect();
        parsed.set_query(Some(&qs.join("&")));
    }

    parsed.to_string()
}

/// Sort by URI and keep the first occurrence of each, so a batch never
/// carries the same article twice. Ties between duplicates are broken by
/// sort order, matching the original sort-then-drop behavior.
pub fn dedup_by_uri(mut articles: Vec<Article>) -> Vec<Article> {
    articles.sort_by(|a, b| a.uri.cmp(&b.uri));
    articles.dedup_by(|next, first| next.uri == first.uri);
    articles
}
