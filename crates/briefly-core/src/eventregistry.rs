use crate::dedup::uri_for;
use crate::error::{AppError, Result};
use crate::models::Article;
use crate::query::build_query;
use crate::topics::{TopicConfig, TopicsConfig};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

const API_URL: &str = "https://eventregistry.org/api/v1/article/getArticles";
const PAGE_SIZE: u32 = 100;

/// EventRegistry getArticles client. One instance is shared across topics;
/// the underlying reqwest client handles pooling.
#[derive(Clone)]
pub struct EventRegistryClient {
    http: reqwest::Client,
    api_key: String,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct GetArticlesResponse {
    articles: Option<ArticlePage>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArticlePage {
    results: Vec<RawArticle>,
    #[serde(default)]
    pages: u32,
    #[serde(default)]
    page: u32,
}

/// The subset of the upstream article payload we keep.
#[derive(Debug, Deserialize)]
pub struct RawArticle {
    pub uri: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub url: Option<String>,
    pub image: Option<String>,
    pub sentiment: Option<f64>,
    #[serde(rename = "dateTime")]
    pub date_time: Option<DateTime<Utc>>,
    pub source: Option<RawSource>,
}

#[derive(Debug, Deserialize)]
pub struct RawSource {
    pub title: Option<String>,
}

impl EventRegistryClient {
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self {
            http,
            api_key,
            api_url: API_URL.into(),
        }
    }

    /// Override the endpoint, for pointing at a local stub.
    pub fn with_api_url(mut self, api_url: String) -> Self {
        self.api_url = api_url;
        self
    }

    /// Fetch one topic over a date window, paging until `max_items` or the
    /// last page. Articles are tagged with the topic's category/sub_category.
    pub async fn fetch_topic(
        &self,
        topic: &TopicConfig,
        date_start: &str,
        date_end: &str,
        max_items: usize,
    ) -> Result<Vec<Article>> {
        info!(topic = %topic.name, date_start, date_end, "Fetching topic");

        let query = build_query(topic, date_start, date_end);
        let mut articles = Vec::new();
        let mut page = 1u32;

        loop {
            let body = json!({
                "query": query,
                "resultType": "articles",
                "articlesSortBy": "date",
                "articlesSortByAsc": false,
                "articlesPage": page,
                "articlesCount": PAGE_SIZE,
                "articleBodyLen": -1,
                "includeArticleImage": true,
                "includeArticleSentiment": true,
                "apiKey": self.api_key,
            });

            let response = self.http.post(&self.api_url).json(&body).send().await?;
            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                return Err(AppError::Api(format!("{status}: {text}")));
            }

            let parsed: GetArticlesResponse = response.json().await?;
            if let Some(error) = parsed.error {
                return Err(AppError::Api(error));
            }
            let Some(page_data) = parsed.articles else {
                return Err(AppError::Parse("Response missing articles".into()));
            };

            let now = Utc::now();
            for raw in page_data.results {
                if let Some(article) = raw_to_article(raw, topic, now) {
                    articles.push(article);
                }
                if articles.len() >= max_items {
                    break;
                }
            }

            if articles.len() >= max_items || page_data.page >= page_data.pages {
                break;
            }
            page += 1;
        }

        info!(topic = %topic.name, count = articles.len(), "Topic fetched");
        Ok(articles)
    }

    /// Fetch every configured topic concurrently; a failing topic is logged
    /// and skipped so one bad query never sinks the cycle.
    pub async fn fetch_all_topics(
        &self,
        config: &TopicsConfig,
        date_start: &str,
        date_end: &str,
        max_items_per_topic: usize,
    ) -> Vec<Article> {
        let futures: Vec<_> = config
            .topics
            .iter()
            .map(|topic| self.fetch_topic(topic, date_start, date_end, max_items_per_topic))
            .collect();

        let results = futures::future::join_all(futures).await;
        let mut all_articles = Vec::new();

        for (topic, result) in config.topics.iter().zip(results) {
            match result {
                Ok(articles) => all_articles.extend(articles),
                Err(e) => warn!(topic = %topic.name, error = %e, "Topic fetch failed, skipping"),
            }
        }

        all_articles
    }
}

/// Format a collection window ending at `end` and reaching back 24 hours,
/// in the "YYYY-MM-DD HH:MM:SS" form the API expects.
pub fn collection_window(end: DateTime<Utc>) -> (String, String) {
    let start = end - Duration::hours(24);
    let fmt = "%Y-%m-%d %H:%M:%S";
    (start.format(fmt).to_string(), end.format(fmt).to_string())
}

fn raw_to_article(raw: RawArticle, topic: &TopicConfig, now: DateTime<Utc>) -> Option<Article> {
    let url = raw.url?;
    let uri = uri_for(raw.uri.as_deref(), &url);
    Some(Article {
        uri,
        title: raw.title.unwrap_or_else(|| "(no title)".into()),
        body: raw.body.unwrap_or_default(),
        url,
        image_url: raw.image,
        category: topic.category(),
        sub_category: Some(topic.sub_category.clone()),
        sentiment: raw.sentiment,
        source: raw.source.and_then(|s| s.title),
        published_at: raw.date_time.unwrap_or(now),
        created_at: now,
    })
}
