use crate::error::Result;
use crate::models::Article;
use chrono::NaiveDate;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Flattened row shape for the CSV files; nested options become empty cells.
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    uri: &'a str,
    title: &'a str,
    body: &'a str,
    url: &'a str,
    image_url: &'a str,
    category: &'a str,
    sub_category: &'a str,
    sentiment: Option<f64>,
    source: &'a str,
    published_at: String,
    created_at: String,
}

impl<'a> From<&'a Article> for CsvRow<'a> {
    fn from(a: &'a Article) -> Self {
        Self {
            uri: &a.uri,
            title: &a.title,
            body: &a.body,
            url: &a.url,
            image_url: a.image_url.as_deref().unwrap_or(""),
            category: a.category.as_str(),
            sub_category: a.sub_category.as_deref().unwrap_or(""),
            sentiment: a.sentiment,
            source: a.source.as_deref().unwrap_or(""),
            published_at: a.published_at.to_rfc3339(),
            created_at: a.created_at.to_rfc3339(),
        }
    }
}

/// The dated directory a pipeline run writes its stage files into,
/// `<base>/<YYYY-MM-DD>/`.
pub fn run_dir(base: &Path, date: NaiveDate) -> PathBuf {
    base.join(date.format("%Y-%m-%d").to_string())
}

/// Write one stage file (e.g. `articles_raw.csv`) for a pipeline run.
/// Creates the dated directory if needed and overwrites any previous file.
pub fn write_articles_csv(dir: &Path, name: &str, articles: &[Article]) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(name);
    let mut writer = csv::Writer::from_path(&path)?;
    for article in articles {
        writer.serialize(CsvRow::from(article))?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = articles.len(), "CSV written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use chrono::Utc;

    fn article(uri: &str) -> Article {
        Article {
            uri: uri.into(),
            title: "Title, with comma".into(),
            body: "body".into(),
            url: format!("https://example.com/{uri}"),
            image_url: None,
            category: Category::Singapore,
            sub_category: Some("Local".into()),
            sentiment: Some(0.25),
            source: Some("ST".into()),
            published_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn run_dir_is_dated() {
        let date = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        let dir = run_dir(Path::new("output"), date);
        assert_eq!(dir, PathBuf::from("output/2025-05-01"));
    }

    #[test]
    fn writes_header_and_rows() {
        let dir = std::env::temp_dir().join("briefly-export-test");
        let path =
            write_articles_csv(&dir, "articles_raw.csv", &[article("a"), article("b")]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines = content.lines();
        assert!(lines.next().unwrap().starts_with("uri,title,body,url"));
        assert_eq!(content.lines().count(), 3);
        assert!(content.contains("\"Title, with comma\""));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn empty_batch_writes_header_only() {
        let dir = std::env::temp_dir().join("briefly-export-empty");
        let path = write_articles_csv(&dir, "articles_final.csv", &[]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.lines().count() <= 1);
        std::fs::remove_dir_all(&dir).ok();
    }
}
