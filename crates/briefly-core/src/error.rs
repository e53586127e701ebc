use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Request failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("EventRegistry error: {0}")]
    Api(String),

    #[error("Parse failed: {0}")]
    Parse(String),

    #[error("Database error: {0}")]
    Db(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
