use crate::error::{AppError, Result};
use crate::models::Category;
use serde::Deserialize;

/// One topic query loaded from topics.toml.
#[derive(Debug, Deserialize, Clone)]
pub struct TopicConfig {
    pub name: String,
    pub category: String,
    pub sub_category: String,
    #[serde(default)]
    pub category_uris: Vec<String>,
    #[serde(default)]
    pub source_uris: Vec<String>,
    #[serde(default)]
    pub concept_uris: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub keyword_loc: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TopicsConfig {
    pub topics: Vec<TopicConfig>,
}

impl TopicsConfig {
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: TopicsConfig =
            toml::from_str(toml_str).map_err(|e| AppError::Config(e.to_string()))?;
        for topic in &config.topics {
            if Category::from_str(&topic.category).is_none() {
                return Err(AppError::Config(format!(
                    "Unknown category '{}' for topic '{}'",
                    topic.category, topic.name
                )));
            }
            if topic.category_uris.is_empty() && topic.concept_uris.is_empty() {
                return Err(AppError::Config(format!(
                    "Topic '{}' has neither category_uris nor concept_uris",
                    topic.name
                )));
            }
        }
        Ok(config)
    }
}

impl TopicConfig {
    pub fn category(&self) -> Category {
        // Validated at load time.
        Category::from_str(&self.category).unwrap_or(Category::Geopolitics)
    }
}
