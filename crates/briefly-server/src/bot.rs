use crate::db::Db;
use crate::telegram::{
    CallbackQuery, InlineKeyboardButton, InlineKeyboardMarkup, Message, TelegramClient, Update,
};
use briefly_core::models::{Article, Category, Label, LabelStats};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

const POLL_TIMEOUT_SECS: u64 = 30;
const ERROR_BACKOFF: Duration = Duration::from_secs(5);
const SESSION_ARTICLES: i64 = 10;
const PREVIEW_CHARS: usize = 400;

/// One labeler's position in a labeling run.
struct Session {
    category: Category,
    articles: Vec<Article>,
    current: usize,
}

/// What a callback button press asks for.
#[derive(Debug, PartialEq, Eq)]
enum BotAction {
    ChooseCategory(Category),
    Apply(Label),
    Skip,
    ReadMore,
}

fn parse_callback(data: &str) -> Option<BotAction> {
    if let Some(cat) = data.strip_prefix("category:") {
        return Category::from_str(cat).map(BotAction::ChooseCategory);
    }
    if let Some(label) = data.strip_prefix("label:") {
        return Label::from_str(label).map(BotAction::Apply);
    }
    match data {
        "skip" => Some(BotAction::Skip),
        "read_more" => Some(BotAction::ReadMore),
        _ => None,
    }
}

fn category_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup {
        inline_keyboard: Category::all()
            .iter()
            .map(|cat| {
                vec![InlineKeyboardButton::new(
                    cat.display(),
                    format!("category:{}", cat.as_str()),
                )]
            })
            .collect(),
    }
}

fn label_keyboard(full_view: bool) -> InlineKeyboardMarkup {
    let mut rows = vec![
        vec![InlineKeyboardButton::new("📈 Positive", "label:positive")],
        vec![InlineKeyboardButton::new("📉 Negative", "label:negative")],
        vec![InlineKeyboardButton::new("😐 Neutral", "label:neutral")],
        vec![InlineKeyboardButton::new("⏭️ Skip", "skip")],
    ];
    if !full_view {
        rows.push(vec![InlineKeyboardButton::new("📖 Read More", "read_more")]);
    }
    InlineKeyboardMarkup { inline_keyboard: rows }
}

/// Truncate on a char boundary, appending an ellipsis when text was cut.
fn preview(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        return body.to_string();
    }
    let cut: String = body.chars().take(max_chars).collect();
    format!("{cut}...")
}

fn article_card(article: &Article, index: usize, total: usize, full_view: bool) -> String {
    let content = if full_view {
        article.body.clone()
    } else {
        preview(&article.body, PREVIEW_CHARS)
    };
    format!(
        "*Article {}/{}*\n\n*Title:* {}\n\n*Category:* {}\n\n*Published:* {}\n\n\
         *Content:* {}\n\n*URL:* {}\n\nPlease select a label for this article:",
        index + 1,
        total,
        article.title,
        article.category,
        article.published_at.format("%Y-%m-%d %H:%M"),
        content,
        article.url,
    )
}

fn stats_summary(stats: &LabelStats) -> String {
    format!(
        "📊 *Your Labeling Stats*\n\n🏆 Total articles labeled: {}\n\n\
         📈 Positive: {} ({:.1}%)\n📉 Negative: {} ({:.1}%)\n😐 Neutral: {} ({:.1}%)",
        stats.total,
        stats.positive,
        stats.percentage(stats.positive),
        stats.negative,
        stats.percentage(stats.negative),
        stats.neutral,
        stats.percentage(stats.neutral),
    )
}

pub struct LabelBot {
    db: Arc<Db>,
    telegram: TelegramClient,
    sessions: Mutex<HashMap<i64, Session>>,
}

impl LabelBot {
    pub fn new(db: Arc<Db>, telegram: TelegramClient) -> Self {
        Self {
            db,
            telegram,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Long-poll loop. Runs until the process shuts down; transport errors
    /// back off for a fixed delay and retry.
    pub async fn run(self: Arc<Self>) {
        info!("Label bot: starting long-poll loop");
        let mut offset = 0i64;
        loop {
            match self.telegram.get_updates(offset, POLL_TIMEOUT_SECS).await {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        if let Err(e) = self.handle_update(update).await {
                            error!(error = %e, "Update handling failed");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "getUpdates failed, backing off");
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }
    }

    async fn handle_update(&self, update: Update) -> briefly_core::Result<()> {
        if let Some(message) = update.message {
            if let Some(text) = message.text.clone() {
                return self.handle_command(&message, text.trim()).await;
            }
        }
        if let Some(callback) = update.callback_query {
            return self.handle_callback(callback).await;
        }
        Ok(())
    }

    async fn handle_command(&self, message: &Message, text: &str) -> briefly_core::Result<()> {
        let chat_id = message.chat.id;
        let user_id = message.from.as_ref().map(|u| u.id).unwrap_or(chat_id);

        match text {
            "/start" => {
                let name = message
                    .from
                    .as_ref()
                    .map(|u| u.first_name.as_str())
                    .unwrap_or("unknown");
                info!(user_id, name, "Labeling session requested");
                self.sessions.lock().await.remove(&chat_id);

                let stats_line = match self.db.label_stats(user_id) {
                    Ok(stats) if stats.total > 0 => format!(
                        "\n📊 Your stats: {} articles labeled ({} positive, {} negative, {} neutral)",
                        stats.total, stats.positive, stats.negative, stats.neutral
                    ),
                    Ok(_) => String::new(),
                    Err(e) => {
                        warn!(error = %e, "Stats lookup failed");
                        String::new()
                    }
                };
                let welcome = format!(
                    "Welcome to Briefly News Labeling Bot! 📰{stats_line}\n\nPlease choose a news category:"
                );
                self.telegram
                    .send_message(chat_id, &welcome, Some(&category_keyboard()))
                    .await?;
            }
            "/stats" => {
                let text = match self.db.label_stats(user_id) {
                    Ok(stats) if stats.total > 0 => stats_summary(&stats),
                    Ok(_) => "📊 You haven't labeled any articles yet!\nUse /start to begin labeling."
                        .to_string(),
                    Err(e) => {
                        error!(error = %e, "Stats lookup failed");
                        "❌ Database error. Please try again later.".to_string()
                    }
                };
                self.telegram.send_message(chat_id, &text, None).await?;
            }
            "/cancel" => {
                self.sessions.lock().await.remove(&chat_id);
                self.telegram
                    .send_message(chat_id, "Labeling session cancelled. Use /start to begin again.", None)
                    .await?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn handle_callback(&self, callback: CallbackQuery) -> briefly_core::Result<()> {
        // Ack first so the client stops its spinner even if we fail later.
        if let Err(e) = self.telegram.answer_callback_query(&callback.id).await {
            warn!(error = %e, "Callback ack failed");
        }

        let Some(message) = callback.message else {
            return Ok(());
        };
        let chat_id = message.chat.id;
        let user_id = callback.from.id;
        let Some(action) = callback.data.as_deref().and_then(parse_callback) else {
            return Ok(());
        };

        match action {
            BotAction::ChooseCategory(category) => {
                self.start_session(chat_id, user_id, category, message.message_id)
                    .await
            }
            BotAction::Apply(label) => {
                self.apply_label(chat_id, user_id, Some(label), message.message_id)
                    .await
            }
            BotAction::Skip => {
                self.apply_label(chat_id, user_id, None, message.message_id)
                    .await
            }
            BotAction::ReadMore => self.show_full_article(chat_id, message.message_id).await,
        }
    }

    async fn start_session(
        &self,
        chat_id: i64,
        user_id: i64,
        category: Category,
        message_id: i64,
    ) -> briefly_core::Result<()> {
        let articles = match self
            .db
            .unlabeled_articles_for_user(user_id, Some(category), SESSION_ARTICLES)
        {
            Ok(articles) => articles,
            Err(e) => {
                error!(error = %e, "Loading unlabeled articles failed");
                self.telegram
                    .send_message(chat_id, "❌ Database error. Please try again later.", None)
                    .await?;
                return Ok(());
            }
        };

        if articles.is_empty() {
            self.telegram
                .edit_or_send(
                    chat_id,
                    message_id,
                    &format!(
                        "🎉 Great job! You've labeled all available {} articles!\n\n\
                         Try another category or check back later for new articles.",
                        category.display()
                    ),
                    None,
                )
                .await?;
            return Ok(());
        }

        self.telegram
            .edit_or_send(
                chat_id,
                message_id,
                &format!(
                    "✅ Selected: {}\n\nFound {} articles to label. Let's start!",
                    category.display(),
                    articles.len()
                ),
                None,
            )
            .await?;

        let card = article_card(&articles[0], 0, articles.len(), false);
        self.telegram
            .send_message(chat_id, &card, Some(&label_keyboard(false)))
            .await?;

        self.sessions.lock().await.insert(
            chat_id,
            Session {
                category,
                articles,
                current: 0,
            },
        );
        Ok(())
    }

    async fn apply_label(
        &self,
        chat_id: i64,
        user_id: i64,
        label: Option<Label>,
        message_id: i64,
    ) -> briefly_core::Result<()> {
        let mut sessions = self.sessions.lock().await;
        let Some(session) = sessions.get_mut(&chat_id) else {
            drop(sessions);
            self.telegram
                .send_message(chat_id, "Session expired. Use /start to begin again.", None)
                .await?;
            return Ok(());
        };
        let Some(article) = session.articles.get(session.current) else {
            sessions.remove(&chat_id);
            return Ok(());
        };
        let uri = article.uri.clone();

        let ack = match label {
            Some(label) => match self.db.save_label(user_id, &uri, label) {
                Ok(()) => format!("{} Article labeled as: *{}*", label.emoji(), label.as_str()),
                Err(e) => {
                    error!(error = %e, uri, "Label save failed");
                    "❌ Error saving label".to_string()
                }
            },
            None => "⏭️ Article skipped".to_string(),
        };

        session.current += 1;
        let finished = session.current >= session.articles.len();
        let next = if finished {
            None
        } else {
            let idx = session.current;
            let total = session.articles.len();
            Some(article_card(&session.articles[idx], idx, total, false))
        };
        if finished {
            info!(user_id, category = %session.category, "Labeling session complete");
            sessions.remove(&chat_id);
        }
        drop(sessions);

        self.telegram
            .edit_or_send(chat_id, message_id, &ack, None)
            .await?;

        match next {
            Some(card) => {
                self.telegram
                    .send_message(chat_id, &card, Some(&label_keyboard(false)))
                    .await?;
            }
            None => {
                let closing = match self.db.label_stats(user_id) {
                    Ok(stats) => format!(
                        "🎉 *Labeling session complete!*\n\n{}\n\n\
                         Thank you for helping improve our news analysis! 🙏\n\
                         Use /start again to label more articles.",
                        stats_summary(&stats)
                    ),
                    Err(_) => "🎉 Labeling session complete! Use /start to label more.".to_string(),
                };
                self.telegram.send_message(chat_id, &closing, None).await?;
            }
        }
        Ok(())
    }

    async fn show_full_article(&self, chat_id: i64, message_id: i64) -> briefly_core::Result<()> {
        let sessions = self.sessions.lock().await;
        let Some(session) = sessions.get(&chat_id) else {
            drop(sessions);
            self.telegram
                .send_message(chat_id, "Session expired. Use /start to begin again.", None)
                .await?;
            return Ok(());
        };
        let Some(article) = session.articles.get(session.current) else {
            return Ok(());
        };
        let card = article_card(article, session.current, session.articles.len(), true);
        let uri = article.uri.clone();
        drop(sessions);

        if let Err(e) = self.db.increment_read_more(&uri) {
            warn!(error = %e, uri, "read_more metric bump failed");
        }
        self.telegram
            .edit_or_send(chat_id, message_id, &card, Some(&label_keyboard(true)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn article(uri: &str, body: &str) -> Article {
        Article {
            uri: uri.into(),
            title: "Headline".into(),
            body: body.into(),
            url: format!("https://example.com/{uri}"),
            image_url: None,
            category: Category::Geopolitics,
            sub_category: Some("International".into()),
            sentiment: Some(0.1),
            source: Some("CNA".into()),
            published_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn callback_data_parses_to_actions() {
        assert_eq!(
            parse_callback("category:singapore"),
            Some(BotAction::ChooseCategory(Category::Singapore))
        );
        assert_eq!(parse_callback("label:neutral"), Some(BotAction::Apply(Label::Neutral)));
        assert_eq!(parse_callback("skip"), Some(BotAction::Skip));
        assert_eq!(parse_callback("read_more"), Some(BotAction::ReadMore));
        assert_eq!(parse_callback("label:like"), None);
        assert_eq!(parse_callback("category:sports"), None);
        assert_eq!(parse_callback("garbage"), None);
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let short = preview("short body", 400);
        assert_eq!(short, "short body");

        let long = "x".repeat(500);
        let cut = preview(&long, 400);
        assert_eq!(cut.chars().count(), 403);
        assert!(cut.ends_with("..."));

        let multibyte = "新".repeat(500);
        let cut = preview(&multibyte, 400);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), 403);
    }

    #[test]
    fn card_shows_position_and_preview() {
        let a = article("a-1", &"y".repeat(450));
        let card = article_card(&a, 2, 10, false);
        assert!(card.contains("*Article 3/10*"));
        assert!(card.contains("Headline"));
        assert!(card.contains("geopolitics"));
        assert!(card.contains("..."));
        assert!(!card.contains(&"y".repeat(450)));
    }

    #[test]
    fn full_view_card_contains_whole_body() {
        let body = "z".repeat(450);
        let a = article("a-1", &body);
        let card = article_card(&a, 0, 1, true);
        assert!(card.contains(&body));
    }

    #[test]
    fn category_keyboard_covers_all_categories() {
        let markup = category_keyboard();
        assert_eq!(markup.inline_keyboard.len(), Category::all().len());
        assert_eq!(markup.inline_keyboard[0][0].callback_data, "category:geopolitics");
    }

    #[test]
    fn preview_keyboard_has_read_more_full_does_not() {
        let preview_kb = label_keyboard(false);
        let full_kb = label_keyboard(true);
        let flat = |kb: &InlineKeyboardMarkup| {
            kb.inline_keyboard
                .iter()
                .flatten()
                .map(|b| b.callback_data.clone())
                .collect::<Vec<_>>()
        };
        assert!(flat(&preview_kb).contains(&"read_more".to_string()));
        assert!(!flat(&full_kb).contains(&"read_more".to_string()));
        assert!(flat(&full_kb).contains(&"label:positive".to_string()));
    }

    #[test]
    fn stats_summary_formats_percentages() {
        let stats = LabelStats { total: 4, positive: 2, negative: 1, neutral: 1 };
        let text = stats_summary(&stats);
        assert!(text.contains("Total articles labeled: 4"));
        assert!(text.contains("Positive: 2 (50.0%)"));
        assert!(text.contains("Neutral: 1 (25.0%)"));
    }
}
