mod bot;
mod db;
mod pipeline;
mod routes;
mod telegram;

use axum::routing::{get, post};
use axum::Router;
use bot::LabelBot;
use briefly_core::eventregistry::EventRegistryClient;
use briefly_core::filter::FilterPolicy;
use briefly_core::topics::TopicsConfig;
use db::Db;
use pipeline::Pipeline;
use routes::AppState;
use std::sync::Arc;
use std::time::Duration;
use telegram::TelegramClient;
use tokio::sync::Notify;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

const TOPICS_TOML: &str = include_str!("../../../topics.toml");

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let db_path = std::env::var("DATABASE_PATH").unwrap_or_else(|_| "briefly.db".into());
    let er_api_key = std::env::var("EVENT_REGISTRY_API_KEY").unwrap_or_default();
    let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default();
    let notify_chat_id = std::env::var("TELEGRAM_CHAT_ID")
        .ok()
        .and_then(|v| v.parse::<i64>().ok());
    let output_dir = std::env::var("OUTPUT_DIR").unwrap_or_else(|_| "output".into());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    if er_api_key.is_empty() {
        warn!("EVENT_REGISTRY_API_KEY not set; collection cycles will fail");
    }

    let topics = TopicsConfig::from_toml(TOPICS_TOML).expect("Invalid topics.toml");
    info!(topics = topics.topics.len(), "Topics loaded");

    let db = Arc::new(
        Db::open_with_retry(&db_path, 5, Duration::from_secs(5))
            .expect("Failed to open SQLite database"),
    );

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .user_agent("Briefly/1.0")
        .build()
        .expect("Failed to build HTTP client");

    // Separate client for the bot: its long-poll holds connections open
    // longer than the general request timeout.
    let poll_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(50))
        .build()
        .expect("Failed to build polling HTTP client");

    let collect_trigger = Arc::new(Notify::new());

    let notifier = if !bot_token.is_empty() {
        notify_chat_id.map(|chat_id| (TelegramClient::new(http_client.clone(), &bot_token), chat_id))
    } else {
        None
    };

    let pipeline = Arc::new(Pipeline {
        db: Arc::clone(&db),
        er: EventRegistryClient::new(http_client.clone(), er_api_key),
        topics,
        policy: FilterPolicy::default(),
        output_dir: output_dir.into(),
        notifier,
    });
    tokio::spawn(Arc::clone(&pipeline).run(Arc::clone(&collect_trigger)));

    if bot_token.is_empty() {
        warn!("TELEGRAM_BOT_TOKEN not set; label bot disabled");
    } else {
        let label_bot = Arc::new(LabelBot::new(
            Arc::clone(&db),
            TelegramClient::new(poll_client, &bot_token),
        ));
        tokio::spawn(label_bot.run());
    }

    let state = Arc::new(AppState {
        db,
        collect_trigger,
    });

    let app = Router::new()
        .route("/", get(routes::root).post(routes::trigger_collection))
        .route("/health", get(routes::health))
        .route("/trigger", post(routes::trigger_collection))
        .route("/api/articles", get(routes::get_articles))
        .route("/api/articles/:uri", get(routes::get_article))
        .route("/api/labels/stats", get(routes::get_label_stats))
        .route("/webhook", post(routes::webhook_ack))
        .with_state(state)
        .layer(ConcurrencyLimitLayer::new(64))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("Failed to bind");

    info!(port, "Server starting");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Shutdown signal received");
}
