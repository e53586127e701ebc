use briefly_core::error::{AppError, Result};
use briefly_core::models::{Article, Category, Label, LabelStats};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

pub struct Db {
    conn: Mutex<Connection>,
}

const ARTICLE_COLUMNS: &str = "uri, title, body, url, image_url, category, sub_category, \
     sentiment, source, published_at, created_at";

impl Db {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| AppError::Db(format!("open: {e}")))?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA busy_timeout=5000;
             PRAGMA synchronous=NORMAL;
             PRAGMA foreign_keys=ON;",
        )
        .map_err(|e| AppError::Db(format!("pragma: {e}")))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS articles (
                uri TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                url TEXT NOT NULL,
                image_url TEXT,
                category TEXT NOT NULL,
                sub_category TEXT,
                sentiment REAL,
                source TEXT,
                published_at TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_articles_cat_created
                ON articles(category, created_at DESC);
            CREATE INDEX IF NOT EXISTS idx_articles_pub
                ON articles(published_at DESC);

            CREATE TABLE IF NOT EXISTS article_metrics (
                uri TEXT PRIMARY KEY REFERENCES articles(uri) ON DELETE CASCADE,
                views INTEGER NOT NULL DEFAULT 0,
                likes INTEGER NOT NULL DEFAULT 0,
                dislikes INTEGER NOT NULL DEFAULT 0,
                read_more_clicks INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS labels (
                user_id INTEGER NOT NULL,
                uri TEXT NOT NULL REFERENCES articles(uri) ON DELETE CASCADE,
                label TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, uri)
            );
            CREATE INDEX IF NOT EXISTS idx_labels_user ON labels(user_id);",
        )
        .map_err(|e| AppError::Db(format!("schema: {e}")))?;

        // Migration: earlier revisions stored articles without a sentiment
        // column; add it so old databases keep working.
        let column_check: std::result::Result<i64, _> = conn.query_row(
            "SELECT COUNT(*) FROM pragma_table_info('articles') WHERE name='sentiment'",
            [],
            |row| row.get(0),
        );
        if let Ok(0) = column_check {
            info!("Running migration: adding sentiment column to articles");
            conn.execute_batch("ALTER TABLE articles ADD COLUMN sentiment REAL;")
                .map_err(|e| AppError::Db(format!("migration: {e}")))?;
        }

        info!(path, "SQLite database opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open with a fixed retry loop: `attempts` tries, `delay` between them.
    pub fn open_with_retry(path: &str, attempts: u32, delay: Duration) -> Result<Self> {
        let mut last_err = None;
        for attempt in 1..=attempts {
            match Self::open(path) {
                Ok(db) => return Ok(db),
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "Database open failed, retrying");
                    last_err = Some(e);
                    if attempt < attempts {
                        std::thread::sleep(delay);
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| AppError::Db("open failed".into())))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| AppError::Db(format!("lock poisoned: {e}")))
    }

    // --- Articles ---

    /// Upsert one article by URI and make sure its metrics row exists.
    /// Both writes land in one transaction so an article is never visible
    /// without its metrics row. Returns true when the article was new.
    pub fn upsert_article(&self, article: &Article) -> Result<bool> {
        let conn = self.lock()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| AppError::Db(format!("begin: {e}")))?;
        let existed: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM articles WHERE uri = ?1)",
                params![article.uri],
                |row| row.get(0),
            )
            .map_err(|e| AppError::Db(format!("exists check: {e}")))?;

        tx.execute(
            "INSERT INTO articles
                (uri, title, body, url, image_url, category, sub_category,
                 sentiment, source, published_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(uri) DO UPDATE SET
                title = excluded.title,
                body = excluded.body,
                url = excluded.url,
                image_url = excluded.image_url,
                category = excluded.category,
                sub_category = excluded.sub_category,
                sentiment = excluded.sentiment,
                source = excluded.source,
                published_at = excluded.published_at",
            params![
                article.uri,
                article.title,
                article.body,
                article.url,
                article.image_url,
                article.category.as_str(),
                article.sub_category,
                article.sentiment,
                article.source,
                article.published_at.to_rfc3339(),
                article.created_at.to_rfc3339(),
            ],
        )
        .map_err(|e| AppError::Db(format!("upsert article: {e}")))?;

        tx.execute(
            "INSERT INTO article_metrics (uri, views, likes, dislikes, read_more_clicks)
             VALUES (?1, 0, 0, 0, 0)
             ON CONFLICT(uri) DO NOTHING",
            params![article.uri],
        )
        .map_err(|e| AppError::Db(format!("init metrics: {e}")))?;
        tx.commit()
            .map_err(|e| AppError::Db(format!("commit: {e}")))?;

        Ok(!existed)
    }

    /// Upsert a batch; returns how many were new.
    pub fn upsert_articles(&self, articles: &[Article]) -> Result<usize> {
        let mut inserted = 0;
        for article in articles {
            if self.upsert_article(article)? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// All articles whose created_at falls on the given UTC date.
    pub fn articles_created_on(&self, date: NaiveDate) -> Result<Vec<Article>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ARTICLE_COLUMNS} FROM articles
                 WHERE substr(created_at, 1, 10) = ?1
                 ORDER BY published_at DESC"
            ))
            .map_err(|e| AppError::Db(e.to_string()))?;
        let articles = stmt
            .query_map(params![date.format("%Y-%m-%d").to_string()], row_to_article)
            .map_err(|e| AppError::Db(e.to_string()))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(articles)
    }

    pub fn delete_articles(&self, uris: &[String]) -> Result<usize> {
        if uris.is_empty() {
            return Ok(0);
        }
        let conn = self.lock()?;
        let mut deleted = 0;
        for uri in uris {
            deleted += conn
                .execute("DELETE FROM articles WHERE uri = ?1", params![uri])
                .map_err(|e| AppError::Db(format!("delete article: {e}")))?;
        }
        Ok(deleted)
    }

    pub fn delete_old_articles(&self, before: &DateTime<Utc>) -> Result<usize> {
        let conn = self.lock()?;
        conn.execute(
            "DELETE FROM articles WHERE published_at < ?1",
            params![before.to_rfc3339()],
        )
        .map_err(|e| AppError::Db(format!("delete old: {e}")))
    }

    pub fn recent_articles(&self, category: Option<Category>, limit: i64) -> Result<Vec<Article>> {
        let conn = self.lock()?;
        let articles = match category {
            Some(cat) => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {ARTICLE_COLUMNS} FROM articles
                         WHERE category = ?1
                         ORDER BY created_at DESC LIMIT ?2"
                    ))
                    .map_err(|e| AppError::Db(e.to_string()))?;
                let rows: Vec<Article> = stmt
                    .query_map(params![cat.as_str(), limit], row_to_article)
                    .map_err(|e| AppError::Db(e.to_string()))?
                    .filter_map(|r| r.ok())
                    .collect();
                rows
            }
            None => {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {ARTICLE_COLUMNS} FROM articles
                         ORDER BY created_at DESC LIMIT ?1"
                    ))
                    .map_err(|e| AppError::Db(e.to_string()))?;
                let rows: Vec<Article> = stmt
                    .query_map(params![limit], row_to_article)
                    .map_err(|e| AppError::Db(e.to_string()))?
                    .filter_map(|r| r.ok())
                    .collect();
                rows
            }
        };
        Ok(articles)
    }

    pub fn article_by_uri(&self, uri: &str) -> Result<Option<Article>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ARTICLE_COLUMNS} FROM articles WHERE uri = ?1"
            ))
            .map_err(|e| AppError::Db(e.to_string()))?;
        let mut rows = stmt
            .query_map(params![uri], row_to_article)
            .map_err(|e| AppError::Db(e.to_string()))?;
        match rows.next() {
            Some(Ok(article)) => Ok(Some(article)),
            Some(Err(e)) => Err(AppError::Db(e.to_string())),
            None => Ok(None),
        }
    }

    pub fn article_count(&self) -> Result<i64> {
        let conn = self.lock()?;
        conn.query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))
            .map_err(|e| AppError::Db(e.to_string()))
    }

    // --- Labeling ---

    /// Articles the user has not labeled yet: today's first, then any recent
    /// ones if nothing from today is left.
    pub fn unlabeled_articles_for_user(
        &self,
        user_id: i64,
        category: Option<Category>,
        limit: i64,
    ) -> Result<Vec<Article>> {
        let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
        let todays = self.unlabeled_query(user_id, category, limit, Some(&today))?;
        if !todays.is_empty() {
            return Ok(todays);
        }
        self.unlabeled_query(user_id, category, limit, None)
    }

    fn unlabeled_query(
        &self,
        user_id: i64,
        category: Option<Category>,
        limit: i64,
        published_on_or_after: Option<&str>,
    ) -> Result<Vec<Article>> {
        let conn = self.lock()?;
        let mut conditions = vec!["l.uri IS NULL"];
        if category.is_some() {
            conditions.push("a.category = :cat");
        }
        if published_on_or_after.is_some() {
            conditions.push("substr(a.published_at, 1, 10) >= :pub");
        }
        let sql = format!(
            "SELECT a.uri, a.title, a.body, a.url, a.image_url, a.category,
                    a.sub_category, a.sentiment, a.source, a.published_at, a.created_at
             FROM articles a
             LEFT JOIN labels l ON a.uri = l.uri AND l.user_id = :uid
             WHERE {}
             ORDER BY a.published_at DESC
             LIMIT :lim",
            conditions.join(" AND ")
        );

        let mut stmt = conn.prepare(&sql).map_err(|e| AppError::Db(e.to_string()))?;

        let cat_str = category.map(|c| c.as_str().to_string());
        let pub_str = published_on_or_after.map(|s| s.to_string());
        let mut named: Vec<(&str, &dyn rusqlite::types::ToSql)> =
            vec![(":uid", &user_id), (":lim", &limit)];
        if let Some(ref cat) = cat_str {
            named.push((":cat", cat));
        }
        if let Some(ref pub_date) = pub_str {
            named.push((":pub", pub_date));
        }

        let articles = stmt
            .query_map(named.as_slice(), row_to_article)
            .map_err(|e| AppError::Db(e.to_string()))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(articles)
    }

    /// Record one judgment per (user, article); relabeling updates in place.
    /// A fresh positive/negative bumps the article's like/dislike counter.
    /// Relabeling never rewinds an earlier bump: counters only move forward,
    /// so a positive-then-negative user leaves likes=1, dislikes=0.
    pub fn save_label(&self, user_id: i64, uri: &str, label: Label) -> Result<()> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();
        let existed: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM labels WHERE user_id = ?1 AND uri = ?2)",
                params![user_id, uri],
                |row| row.get(0),
            )
            .map_err(|e| AppError::Db(e.to_string()))?;

        conn.execute(
            "INSERT INTO labels (user_id, uri, label, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(user_id, uri) DO UPDATE SET
                label = excluded.label,
                updated_at = excluded.updated_at",
            params![user_id, uri, label.as_str(), now],
        )
        .map_err(|e| AppError::Db(format!("save label: {e}")))?;

        if !existed {
            let counter = match label {
                Label::Positive => Some("likes"),
                Label::Negative => Some("dislikes"),
                Label::Neutral => None,
            };
            if let Some(col) = counter {
                conn.execute(
                    &format!("UPDATE article_metrics SET {col} = {col} + 1 WHERE uri = ?1"),
                    params![uri],
                )
                .map_err(|e| AppError::Db(format!("bump {col}: {e}")))?;
            }
        }

        info!(user_id, uri, label = label.as_str(), "Label saved");
        Ok(())
    }

    pub fn label_stats(&self, user_id: i64) -> Result<LabelStats> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT COUNT(*),
                    COUNT(CASE WHEN label = 'positive' THEN 1 END),
                    COUNT(CASE WHEN label = 'negative' THEN 1 END),
                    COUNT(CASE WHEN label = 'neutral' THEN 1 END)
             FROM labels WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(LabelStats {
                    total: row.get(0)?,
                    positive: row.get(1)?,
                    negative: row.get(2)?,
                    neutral: row.get(3)?,
                })
            },
        )
        .map_err(|e| AppError::Db(e.to_string()))
    }

    // --- Metrics ---

    pub fn increment_read_more(&self, uri: &str) -> Result<()> {
        self.increment_metric(uri, "read_more_clicks")
    }

    pub fn increment_views(&self, uri: &str) -> Result<()> {
        self.increment_metric(uri, "views")
    }

    fn increment_metric(&self, uri: &str, column: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!("UPDATE article_metrics SET {column} = {column} + 1 WHERE uri = ?1"),
            params![uri],
        )
        .map_err(|e| AppError::Db(format!("bump {column}: {e}")))?;
        Ok(())
    }

    pub fn metrics_for(&self, uri: &str) -> Result<Option<(i64, i64, i64, i64)>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT views, likes, dislikes, read_more_clicks
                 FROM article_metrics WHERE uri = ?1",
            )
            .map_err(|e| AppError::Db(e.to_string()))?;
        let mut rows = stmt
            .query_map(params![uri], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .map_err(|e| AppError::Db(e.to_string()))?;
        match rows.next() {
            Some(Ok(m)) => Ok(Some(m)),
            Some(Err(e)) => Err(AppError::Db(e.to_string())),
            None => Ok(None),
        }
    }
}

fn row_to_article(row: &Row<'_>) -> rusqlite::Result<Article> {
    let category_str: String = row.get(5)?;
    let category = Category::from_str(&category_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("unknown category: {category_str}").into(),
        )
    })?;
    Ok(Article {
        uri: row.get(0)?,
        title: row.get(1)?,
        body: row.get(2)?,
        url: row.get(3)?,
        image_url: row.get(4)?,
        category,
        sub_category: row.get(6)?,
        sentiment: row.get(7)?,
        source: row.get(8)?,
        published_at: parse_ts(row, 9)?,
        created_at: parse_ts(row, 10)?,
    })
}

fn parse_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                e.to_string().into(),
            )
        })
}
