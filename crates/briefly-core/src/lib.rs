pub mod dedup;
pub mod error;
pub mod eventregistry;
pub mod export;
pub mod filter;
pub mod models;
pub mod query;
pub mod topics;

pub use error::{AppError, Result};
pub use filter::{FilterOutcome, FilterPolicy};
pub use models::{Article, ArticlesResponse, Category, Label, LabelStats};
