use crate::db::Db;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use briefly_core::models::{ArticlesResponse, Category};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::error;

pub struct AppState {
    pub db: Arc<Db>,
    pub collect_trigger: Arc<Notify>,
}

#[derive(Deserialize)]
pub struct ArticlesQuery {
    pub category: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct StatsQuery {
    pub user_id: i64,
}

fn db_error(e: impl std::fmt::Display) -> Response {
    error!(error = %e, "Database query failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "database error"})),
    )
        .into_response()
}

/// Deployment-platform health probe.
pub async fn root() -> &'static str {
    "Briefly news service is running"
}

pub async fn health(State(state): State<Arc<AppState>>) -> Response {
    match state.db.article_count() {
        Ok(count) => Json(json!({"status": "ok", "articles": count})).into_response(),
        Err(e) => db_error(e),
    }
}

/// Fire a collection cycle; the pipeline task coalesces pending triggers.
pub async fn trigger_collection(State(state): State<Arc<AppState>>) -> Response {
    state.collect_trigger.notify_one();
    (
        StatusCode::ACCEPTED,
        Json(json!({"status": "collection triggered"})),
    )
        .into_response()
}

pub async fn get_articles(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ArticlesQuery>,
) -> Response {
    let category = params.category.as_deref().and_then(Category::from_str);
    if params.category.is_some() && category.is_none() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "unknown category"})),
        )
            .into_response();
    }
    let limit = params.limit.unwrap_or(30).clamp(1, 100);

    match state.db.recent_articles(category, limit) {
        Ok(articles) => {
            let count = articles.len();
            Json(ArticlesResponse { articles, count }).into_response()
        }
        Err(e) => db_error(e),
    }
}

pub async fn get_article(
    State(state): State<Arc<AppState>>,
    Path(uri): Path<String>,
) -> Response {
    match state.db.article_by_uri(&uri) {
        Ok(Some(article)) => {
            if let Err(e) = state.db.increment_views(&uri) {
                error!(error = %e, uri, "View count bump failed");
            }
            Json(article).into_response()
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "article not found"})),
        )
            .into_response(),
        Err(e) => db_error(e),
    }
}

pub async fn get_label_stats(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StatsQuery>,
) -> Response {
    match state.db.label_stats(params.user_id) {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => db_error(e),
    }
}

/// Telegram webhook endpoint. The bot runs in long-poll mode; this exists so
/// a configured webhook never gets an error back.
pub async fn webhook_ack() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use briefly_core::models::{Article, Label};
    use chrono::Utc;

    fn state() -> Arc<AppState> {
        Arc::new(AppState {
            db: Arc::new(Db::open(":memory:").unwrap()),
            collect_trigger: Arc::new(Notify::new()),
        })
    }

    fn article(uri: &str, category: Category) -> Article {
        Article {
            uri: uri.into(),
            title: "t".into(),
            body: "b".into(),
            url: format!("https://example.com/{uri}"),
            image_url: None,
            category,
            sub_category: None,
            sentiment: Some(0.2),
            source: None,
            published_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn articles_endpoint_filters_by_category() {
        let state = state();
        state.db.upsert_article(&article("geo", Category::Geopolitics)).unwrap();
        state.db.upsert_article(&article("sg", Category::Singapore)).unwrap();

        let response = get_articles(
            State(Arc::clone(&state)),
            Query(ArticlesQuery { category: Some("singapore".into()), limit: None }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = get_articles(
            State(state),
            Query(ArticlesQuery { category: Some("sports".into()), limit: None }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_article_is_404() {
        let response = get_article(State(state()), Path("nope".into())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn fetching_article_bumps_views() {
        let state = state();
        state.db.upsert_article(&article("a", Category::Geopolitics)).unwrap();
        let response = get_article(State(Arc::clone(&state)), Path("a".into())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.db.metrics_for("a").unwrap().unwrap().0, 1);
    }

    #[tokio::test]
    async fn stats_endpoint_returns_totals() {
        let state = state();
        state.db.upsert_article(&article("a", Category::Geopolitics)).unwrap();
        state.db.save_label(5, "a", Label::Positive).unwrap();
        let response =
            get_label_stats(State(state), Query(StatsQuery { user_id: 5 })).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn trigger_returns_accepted() {
        let response = trigger_collection(State(state())).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn repeated_triggers_coalesce_to_one_wake() {
        let state = state();
        trigger_collection(State(Arc::clone(&state))).await;
        trigger_collection(State(Arc::clone(&state))).await;

        // Notify stores a single permit, so back-to-back triggers before the
        // pipeline picks one up cause exactly one extra cycle.
        state.collect_trigger.notified().await;
        let second = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            state.collect_trigger.notified(),
        )
        .await;
        assert!(second.is_err());
    }
}
