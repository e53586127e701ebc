use crate::db::Db;
use crate::telegram::TelegramClient;
use briefly_core::dedup::dedup_by_uri;
use briefly_core::eventregistry::{collection_window, EventRegistryClient};
use briefly_core::export::{run_dir, write_articles_csv};
use briefly_core::filter::{curate, FilterPolicy};
use briefly_core::topics::TopicsConfig;
use briefly_core::Result;
use chrono::{Duration as ChronoDuration, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, warn};

const FETCH_INTERVAL: std::time::Duration = std::time::Duration::from_secs(6 * 60 * 60);
const CLEANUP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(24 * 60 * 60);
const RETENTION_DAYS: i64 = 30;
const MAX_ITEMS_PER_TOPIC: usize = 100;

const READY_MESSAGE: &str =
    "📰 New articles for labeling are now ready!\nUse /start to begin reviewing.";

pub struct Pipeline {
    pub db: Arc<Db>,
    pub er: EventRegistryClient,
    pub topics: TopicsConfig,
    pub policy: FilterPolicy,
    pub output_dir: PathBuf,
    /// Chat to notify when a cycle lands new articles; None disables it.
    pub notifier: Option<(TelegramClient, i64)>,
}

#[derive(Debug, Default)]
pub struct CycleSummary {
    pub fetched: usize,
    pub unique: usize,
    pub stored_new: usize,
    pub kept: usize,
    pub deleted: usize,
}

impl Pipeline {
    /// Background loop: a cycle immediately on startup, then on a fixed
    /// interval or whenever the HTTP trigger fires. A daily sweep drops
    /// articles past the retention horizon.
    pub async fn run(self: Arc<Self>, trigger: Arc<Notify>) {
        let mut fetch_interval = tokio::time::interval(FETCH_INTERVAL);
        let mut cleanup_interval = tokio::time::interval(CLEANUP_INTERVAL);
        // First cleanup tick is instant; consume it so the sweep waits a day.
        cleanup_interval.tick().await;

        loop {
            tokio::select! {
                _ = fetch_interval.tick() => {
                    self.run_cycle_logged().await;
                }
                _ = trigger.notified() => {
                    info!("Collection cycle triggered via HTTP");
                    self.run_cycle_logged().await;
                }
                _ = cleanup_interval.tick() => {
                    let cutoff = Utc::now() - ChronoDuration::days(RETENTION_DAYS);
                    match self.db.delete_old_articles(&cutoff) {
                        Ok(n) => info!(deleted = n, "Old articles cleaned up"),
                        Err(e) => warn!(error = %e, "Retention sweep failed"),
                    }
                }
            }
        }
    }

    async fn run_cycle_logged(&self) {
        match self.collect_cycle().await {
            Ok(summary) => info!(
                fetched = summary.fetched,
                unique = summary.unique,
                stored_new = summary.stored_new,
                kept = summary.kept,
                deleted = summary.deleted,
                "Collection cycle complete"
            ),
            Err(e) => warn!(error = %e, "Collection cycle failed"),
        }
    }

    /// One full pipeline run: fetch → dedup → store → filter-and-prune →
    /// CSV stage files → notify.
    pub async fn collect_cycle(&self) -> Result<CycleSummary> {
        let now = Utc::now();
        let (date_start, date_end) = collection_window(now);
        info!(date_start, date_end, "Starting collection cycle");

        let fetched = self
            .er
            .fetch_all_topics(&self.topics, &date_start, &date_end, MAX_ITEMS_PER_TOPIC)
            .await;

        let dir = run_dir(&self.output_dir, now.date_naive());
        if let Err(e) = write_articles_csv(&dir, "articles_raw.csv", &fetched) {
            warn!(error = %e, "Raw CSV export failed");
        }

        let mut summary = CycleSummary {
            fetched: fetched.len(),
            ..Default::default()
        };

        let deduped = dedup_by_uri(fetched);
        summary.unique = deduped.len();
        if let Err(e) = write_articles_csv(&dir, "articles_clean.csv", &deduped) {
            warn!(error = %e, "Clean CSV export failed");
        }

        summary.stored_new = self.db.upsert_articles(&deduped)?;

        let (kept, deleted) = filter_and_prune(&self.db, &self.policy)?;
        summary.kept = kept.len();
        summary.deleted = deleted;
        if let Err(e) = write_articles_csv(&dir, "articles_final.csv", &kept) {
            warn!(error = %e, "Final CSV export failed");
        }

        if summary.stored_new > 0 {
            self.notify_ready().await;
        }

        Ok(summary)
    }

    async fn notify_ready(&self) {
        let Some((telegram, chat_id)) = &self.notifier else {
            return;
        };
        match telegram.send_message(*chat_id, READY_MESSAGE, None).await {
            Ok(_) => info!(chat_id, "Labeling notification sent"),
            Err(e) => warn!(error = %e, "Labeling notification failed"),
        }
    }
}

/// Apply the threshold policy to today's stored articles and delete the
/// failures. Returns the surviving rows and how many were removed.
pub fn filter_and_prune(db: &Db, policy: &FilterPolicy) -> Result<(Vec<briefly_core::Article>, usize)> {
    let todays = db.articles_created_on(Utc::now().date_naive())?;
    if todays.is_empty() {
        info!("No articles to filter for today");
        return Ok((Vec::new(), 0));
    }
    let before = todays.len();
    let outcome = curate(todays, policy);
    let dropped_uris: Vec<String> = outcome.dropped.iter().map(|a| a.uri.clone()).collect();
    let deleted = db.delete_articles(&dropped_uris)?;
    info!(kept = outcome.kept.len(), before, deleted, "Filtered today's articles");
    Ok((outcome.kept, deleted))
}
