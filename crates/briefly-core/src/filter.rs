use crate::models::Article;

/// Threshold predicates applied after dedup. Articles failing either
/// predicate are dropped from the batch and deleted from the store.
#[derive(Debug, Clone, Copy)]
pub struct FilterPolicy {
    pub min_sentiment: f64,
    pub min_body_len: usize,
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            min_sentiment: -0.5,
            min_body_len: 500,
        }
    }
}

#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub kept: Vec<Article>,
    pub dropped: Vec<Article>,
}

impl FilterPolicy {
    /// Sentiment must be present and strictly above the floor; a missing
    /// sentiment fails, matching the NaN-drop behavior of the original
    /// comparison. Body length is counted in characters, not bytes.
    pub fn passes(&self, article: &Article) -> bool {
        let sentiment_ok = article
            .sentiment
            .map(|s| s > self.min_sentiment)
            .unwrap_or(false);
        sentiment_ok && article.body.chars().count() > self.min_body_len
    }

    pub fn apply(&self, articles: Vec<Article>) -> FilterOutcome {
        let mut outcome = FilterOutcome::default();
        for article in articles {
            if self.passes(&article) {
                outcome.kept.push(article);
            } else {
                outcome.dropped.push(article);
            }
        }
        outcome
    }
}

/// The combined curation step: threshold-filter first, then dedup by URI.
/// Filtering first means a passing copy of an article survives even when a
/// failing copy of the same URI sorts ahead of it. `dropped` only carries
/// URIs absent from `kept`, so DB-backed callers can delete every dropped
/// URI without touching a surviving row.
pub fn curate(articles: Vec<Article>, policy: &FilterPolicy) -> FilterOutcome {
    let outcome = policy.apply(articles);
    let kept = crate::dedup::dedup_by_uri(outcome.kept);
    let kept_uris: std::collections::HashSet<&str> =
        kept.iter().map(|a| a.uri.as_str()).collect();
    let dropped = outcome
        .dropped
        .into_iter()
        .filter(|a| !kept_uris.contains(a.uri.as_str()))
        .collect();
    FilterOutcome { kept, dropped }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use chrono::Utc;

    fn article(uri: &str, sentiment: Option<f64>, body_len: usize) -> Article {
        Article {
            uri: uri.into(),
            title: "title".into(),
            body: "x".repeat(body_len),
            url: format!("https://example.com/{uri}"),
            image_url: None,
            category: Category::Geopolitics,
            sub_category: None,
            sentiment,
            source: None,
            published_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn kept_rows_satisfy_both_predicates() {
        let policy = FilterPolicy::default();
        let input = vec![
            article("a", Some(0.4), 600),
            article("b", Some(-0.6), 600),
            article("c", Some(0.4), 400),
            article("d", None, 600),
        ];
        let outcome = policy.apply(input);
        assert_eq!(outcome.kept.len(), 1);
        assert_eq!(outcome.kept[0].uri, "a");
        assert_eq!(outcome.dropped.len(), 3);
        for a in &outcome.kept {
            assert!(a.sentiment.unwrap() > -0.5);
            assert!(a.body.chars().count() > 500);
        }
    }

    #[test]
    fn boundary_values_fail() {
        let policy = FilterPolicy::default();
        assert!(!policy.passes(&article("a", Some(-0.5), 600)));
        assert!(!policy.passes(&article("b", Some(0.0), 500)));
        assert!(policy.passes(&article("c", Some(-0.49), 501)));
    }

    #[test]
    fn filter_is_idempotent() {
        let policy = FilterPolicy::default();
        let input = vec![
            article("a", Some(0.2), 700),
            article("b", Some(-0.9), 700),
            article("c", Some(0.9), 100),
        ];
        let once = policy.apply(input).kept;
        let twice = policy.apply(once.clone()).kept;
        assert_eq!(once.len(), twice.len());
        let uris_once: Vec<_> = once.iter().map(|a| a.uri.clone()).collect();
        let uris_twice: Vec<_> = twice.iter().map(|a| a.uri.clone()).collect();
        assert_eq!(uris_once, uris_twice);
    }

    #[test]
    fn multibyte_bodies_counted_by_chars() {
        let policy = FilterPolicy { min_sentiment: -0.5, min_body_len: 3 };
        let mut a = article("a", Some(0.0), 0);
        a.body = "新聞記事です".into();
        assert!(policy.passes(&a));
    }

    // The worked example from the curation contract: a failing-sentiment
    // row and a passing row share a URI; output is exactly the passing row.
    #[test]
    fn curate_worked_example() {
        let input = vec![
            article("a", Some(-0.6), 10),
            article("a", Some(0.2), 600),
        ];
        let outcome = curate(input, &FilterPolicy::default());
        assert_eq!(outcome.kept.len(), 1);
        assert_eq!(outcome.kept[0].uri, "a");
        assert!((outcome.kept[0].sentiment.unwrap() - 0.2).abs() < f64::EPSILON);
        // The failing copy shares the surviving URI, so it must not be
        // offered up for deletion.
        assert!(outcome.dropped.is_empty());
    }

    #[test]
    fn curate_output_has_unique_uris() {
        let input = vec![
            article("b", Some(0.3), 600),
            article("a", Some(0.3), 600),
            article("b", Some(0.4), 700),
            article("c", Some(-0.9), 700),
        ];
        let outcome = curate(input, &FilterPolicy::default());
        let uris: Vec<_> = outcome.kept.iter().map(|a| a.uri.as_str()).collect();
        assert_eq!(uris, vec!["a", "b"]);
        // Only the failing "c"; the extra copy of "b" is gone, not dropped.
        assert_eq!(outcome.dropped.len(), 1);
        assert_eq!(outcome.dropped[0].uri, "c");
    }

    #[test]
    fn curate_dropped_never_overlaps_kept() {
        let input = vec![
            article("a", Some(-0.9), 600),
            article("a", Some(0.3), 600),
            article("a", Some(0.4), 700),
            article("b", Some(-0.9), 600),
        ];
        let outcome = curate(input, &FilterPolicy::default());
        let kept: std::collections::HashSet<_> =
            outcome.kept.iter().map(|a| a.uri.as_str()).collect();
        for a in &outcome.dropped {
            assert!(!kept.contains(a.uri.as_str()), "{}", a.uri);
        }
        assert_eq!(outcome.dropped.len(), 1);
        assert_eq!(outcome.dropped[0].uri, "b");
    }

    #[test]
    fn curate_is_idempotent() {
        let input = vec![
            article("a", Some(0.2), 700),
            article("a", Some(0.3), 700),
            article("b", Some(-0.9), 700),
        ];
        let policy = FilterPolicy::default();
        let once = curate(input, &policy).kept;
        let twice = curate(once.clone(), &policy).kept;
        assert_eq!(
            once.iter().map(|a| a.uri.as_str()).collect::<Vec<_>>(),
            twice.iter().map(|a| a.uri.as_str()).collect::<Vec<_>>()
        );
    }
}
