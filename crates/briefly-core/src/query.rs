use crate::topics::TopicConfig;
use serde_json::{json, Value};

/// The constant filter envelope sent with every query: news only, upstream
/// duplicates skipped, event-linked articles only, source rank capped at the
/// 90th percentile, full sentiment range.
fn filter_envelope() -> Value {
    json!({
        "dataType": "news",
        "isDuplicate": "skipDuplicates",
        "hasDuplicate": "skipHasDuplicates",
        "hasEvent": "skipArticlesWithoutEvent",
        "startSourceRankPercentile": 0,
        "endSourceRankPercentile": 90,
        "minSentiment": -1,
        "maxSentiment": 1,
    })
}

fn or_clause(values: &[String]) -> Value {
    if values.len() == 1 {
        json!(values[0])
    } else {
        json!({ "$or": values })
    }
}

/// Build the EventRegistry complex query for one topic over a date window.
/// Dates are "YYYY-MM-DD HH:MM:SS" strings as the API expects.
pub fn build_query(topic: &TopicConfig, date_start: &str, date_end: &str) -> Value {
    let mut base = serde_json::Map::new();

    if !topic.category_uris.is_empty() {
        base.insert("categoryUri".into(), or_clause(&topic.category_uris));
    }
    if !topic.concept_uris.is_empty() {
        base.insert("conceptUri".into(), json!({ "$and": topic.concept_uris }));
    }
    if !topic.keywords.is_empty() {
        base.insert("keyword".into(), json!({ "$or": topic.keywords }));
        if let Some(loc) = &topic.keyword_loc {
            base.insert("keywordLoc".into(), json!(loc));
        }
    }
    base.insert("lang".into(), json!("eng"));
    if !topic.source_uris.is_empty() {
        base.insert("sourceUri".into(), or_clause(&topic.source_uris));
    }
    base.insert("dateStart".into(), json!(date_start));
    base.insert("dateEnd".into(), json!(date_end));

    json!({
        "$query": Value::Object(base),
        "$filter": filter_envelope(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topics::TopicsConfig;

    fn sample_topic() -> TopicConfig {
        TopicsConfig::from_toml(
            r#"
[[topics]]
name = "geopolitics"
category = "geopolitics"
sub_category = "International"
category_uris = [
    "dmoz/Society/Politics/International_Relations",
    "dmoz/Society/Issues/Warfare_and_Conflict",
]
source_uris = ["channelnewsasia.com", "straitstimes.com"]
"#,
        )
        .unwrap()
        .topics
        .remove(0)
    }

    #[test]
    fn query_shape_matches_api_contract() {
        let q = build_query(&sample_topic(), "2025-05-01 00:00:00", "2025-05-02 00:00:00");

        assert_eq!(q["$filter"]["dataType"], "news");
        assert_eq!(q["$filter"]["isDuplicate"], "skipDuplicates");
        assert_eq!(q["$filter"]["endSourceRankPercentile"], 90);

        let base = &q["$query"];
        assert_eq!(base["lang"], "eng");
        assert_eq!(base["dateStart"], "2025-05-01 00:00:00");
        assert_eq!(base["categoryUri"]["$or"].as_array().unwrap().len(), 2);
        assert_eq!(base["sourceUri"]["$or"][0], "channelnewsasia.com");
    }

    #[test]
    fn single_selector_collapses_or() {
        let mut topic = sample_topic();
        topic.category_uris = vec!["dmoz/Business".into()];
        topic.source_uris = vec!["straitstimes.com".into()];
        let q = build_query(&topic, "2025-05-01 00:00:00", "2025-05-01 23:59:59");
        assert_eq!(q["$query"]["categoryUri"], "dmoz/Business");
        assert_eq!(q["$query"]["sourceUri"], "straitstimes.com");
    }

    #[test]
    fn keywords_and_concepts_included() {
        let mut topic = sample_topic();
        topic.concept_uris = vec!["https://en.wikipedia.org/wiki/Tariff".into()];
        topic.keywords = vec!["tariff".into(), "tariffs".into()];
        topic.keyword_loc = Some("title".into());
        let q = build_query(&topic, "2025-05-01 00:00:00", "2025-05-01 23:59:59");
        assert_eq!(q["$query"]["conceptUri"]["$and"][0], "https://en.wikipedia.org/wiki/Tariff");
        assert_eq!(q["$query"]["keyword"]["$or"].as_array().unwrap().len(), 2);
        assert_eq!(q["$query"]["keywordLoc"], "title");
    }
}
