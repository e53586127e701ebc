use briefly_core::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

/// Minimal Telegram Bot API client: long-poll updates, messages with inline
/// keyboards, callback-query acks. Nothing more than the labeling flow needs.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    pub text: Option<String>,
    pub from: Option<User>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineKeyboardButton {
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

impl TelegramClient {
    pub fn new(http: reqwest::Client, token: &str) -> Self {
        Self {
            http,
            base_url: format!("https://api.telegram.org/bot{token}"),
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, method);
        let response = self.http.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Api(format!("Telegram {method}: {status} {text}")));
        }
        let parsed: ApiResponse<T> = response.json().await?;
        if !parsed.ok {
            return Err(AppError::Api(format!(
                "Telegram {method}: {}",
                parsed.description.unwrap_or_else(|| "unknown error".into())
            )));
        }
        parsed
            .result
            .ok_or_else(|| AppError::Parse(format!("Telegram {method}: empty result")))
    }

    /// Long-poll for updates past `offset`. `timeout` is the server-side
    /// hold in seconds; the HTTP client must allow at least that long.
    pub async fn get_updates(&self, offset: i64, timeout: u64) -> Result<Vec<Update>> {
        self.call(
            "getUpdates",
            json!({
                "offset": offset,
                "timeout": timeout,
                "allowed_updates": ["message", "callback_query"],
            }),
        )
        .await
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<Message> {
        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
            "disable_web_page_preview": true,
        });
        if let Some(markup) = reply_markup {
            body["reply_markup"] = serde_json::to_value(markup)?;
        }
        self.call("sendMessage", body).await
    }

    /// Edit a previously sent message in place; falls back to sending a new
    /// message when the edit is rejected (deleted or too-old message).
    pub async fn edit_or_send(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<()> {
        let mut body = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "parse_mode": "Markdown",
            "disable_web_page_preview": true,
        });
        if let Some(markup) = reply_markup {
            body["reply_markup"] = serde_json::to_value(markup)?;
        }
        match self.call::<serde_json::Value>("editMessageText", body).await {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(error = %e, "Edit failed, sending new message");
                self.send_message(chat_id, text, reply_markup).await?;
                Ok(())
            }
        }
    }

    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<()> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                json!({ "callback_query_id": callback_query_id }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_with_callback_query_parses() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 42,
            "callback_query": {
                "id": "cb-1",
                "from": { "id": 7, "first_name": "Ada" },
                "message": { "message_id": 10, "chat": { "id": 7 }, "text": "hi" },
                "data": "label:positive"
            }
        }))
        .unwrap();
        let cb = update.callback_query.unwrap();
        assert_eq!(cb.from.id, 7);
        assert_eq!(cb.data.as_deref(), Some("label:positive"));
        assert_eq!(cb.message.unwrap().chat.id, 7);
    }

    #[test]
    fn update_with_command_parses() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 43,
            "message": {
                "message_id": 11,
                "chat": { "id": 9 },
                "from": { "id": 9, "first_name": "Lin" },
                "text": "/start"
            }
        }))
        .unwrap();
        assert_eq!(update.message.unwrap().text.as_deref(), Some("/start"));
    }

    #[test]
    fn keyboard_serializes_to_api_shape() {
        let markup = InlineKeyboardMarkup {
            inline_keyboard: vec![vec![
                InlineKeyboardButton::new("📈 Positive", "label:positive"),
                InlineKeyboardButton::new("📉 Negative", "label:negative"),
            ]],
        };
        let v = serde_json::to_value(&markup).unwrap();
        assert_eq!(v["inline_keyboard"][0][1]["callback_data"], "label:negative");
    }
}
