use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Article categories the collector tags results with.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Geopolitics,
    Singapore,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Geopolitics => "geopolitics",
            Self::Singapore => "singapore",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "geopolitics" => Some(Self::Geopolitics),
            "singapore" => Some(Self::Singapore),
            _ => None,
        }
    }

    pub fn all() -> &'static [Category] {
        &[Self::Geopolitics, Self::Singapore]
    }

    /// Human-facing label used by the bot keyboards.
    pub fn display(&self) -> &'static str {
        match self {
            Self::Geopolitics => "🌍 Geopolitics News",
            Self::Singapore => "🇸🇬 Singapore News",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single collected news article. `uri` is the upstream API's unique
/// identifier and the primary key everywhere.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub uri: String,
    pub title: String,
    pub body: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub category: Category,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Response body for article listing.
#[derive(Debug, Serialize, Deserialize)]
pub struct ArticlesResponse {
    pub articles: Vec<Article>,
    pub count: usize,
}

/// One labeler judgment per (user, article).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Positive,
    Negative,
    Neutral,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "positive" => Some(Self::Positive),
            "negative" => Some(Self::Negative),
            "neutral" => Some(Self::Neutral),
            _ => None,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Positive => "📈",
            Self::Negative => "📉",
            Self::Neutral => "😐",
        }
    }
}

/// A labeler's running totals, as shown by /stats.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LabelStats {
    pub total: i64,
    pub positive: i64,
    pub negative: i64,
    pub neutral: i64,
}

impl LabelStats {
    pub fn percentage(&self, count: i64) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            count as f64 / self.total as f64 * 100.0
        }
    }
}
