//! Chat delivery through the Telegram Bot API.
use async_trait::async_trait;
use std::fmt;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{ParseMode, Recipient};
use teloxide::{ApiError, RequestError};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::github::http_client;
use crate::model::FormatMode;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("telegram could not parse message entities: {0}")]
    MarkupRejected(String),
    #[error("telegram rejected the request: {0}")]
    BadRequest(String),
    #[error("telegram refused the message: {0}")]
    Refused(String),
    #[error("telegram request failed: {0}")]
    Transport(String),
}

impl DeliveryError {
    /// Errors worth one more attempt without a parse mode.
    pub fn is_markup_related(&self) -> bool {
        matches!(self, DeliveryError::MarkupRejected(_) | DeliveryError::BadRequest(_))
    }
}

impl From<RequestError> for DeliveryError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Api(ApiError::CantParseEntities) => {
                DeliveryError::MarkupRejected(ApiError::CantParseEntities.to_string())
            }
            RequestError::Api(api) => {
                let desc = match api {
                    ApiError::Unknown(desc) => desc,
                    known => known.to_string(),
                };
                // Telegram appends the offending tag and offset, so these
                // arrive as `Unknown` rather than `CantParseEntities`.
                if desc.contains("can't parse entities") {
                    DeliveryError::MarkupRejected(desc)
                } else if desc.contains("Bad Request") {
                    DeliveryError::BadRequest(desc)
                } else {
                    DeliveryError::Refused(desc)
                }
            }
            other => DeliveryError::Transport(other.to_string()),
        }
    }
}

/// One attempt at posting a message to the configured chat.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, text: &str, mode: FormatMode) -> Result<(), DeliveryError>;
}

/// `-100123` style ids address chats directly; anything else is a `@channel`.
pub fn parse_recipient(chat_id: &str) -> Recipient {
    let chat_id = chat_id.trim();
    match chat_id.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) if chat_id.starts_with('@') => Recipient::ChannelUsername(chat_id.to_string()),
        Err(_) => Recipient::ChannelUsername(format!("@{}", chat_id)),
    }
}

#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
    recipient: Recipient,
    disable_link_preview: bool,
}

impl fmt::Debug for TelegramTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramTransport")
            .field("recipient", &self.recipient)
            .field("disable_link_preview", &self.disable_link_preview)
            .finish_non_exhaustive()
    }
}

impl TelegramTransport {
    pub fn new(bot: Bot, recipient: Recipient, disable_link_preview: bool) -> Self {
        Self {
            bot,
            recipient,
            disable_link_preview,
        }
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_text(&self, text: &str, mode: FormatMode) -> Result<(), DeliveryError> {
        let mut request = self
            .bot
            .send_message(self.recipient.clone(), text)
            .disable_web_page_preview(self.disable_link_preview);
        if mode == FormatMode::Html {
            request = request.parse_mode(ParseMode::Html);
        }
        request.await?;
        Ok(())
    }
}

/// Delivers notifications; rich formatting is best effort, delivery is not.
pub struct NotificationSender {
    transport: Option<Box<dyn ChatTransport>>,
}

impl NotificationSender {
    pub fn new(transport: Box<dyn ChatTransport>) -> Self {
        Self {
            transport: Some(transport),
        }
    }

    /// A sender that reports every message as undelivered.
    pub fn disabled() -> Self {
        Self { transport: None }
    }

    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let (Some(token), Some(chat_id)) = (&cfg.telegram.bot_token, &cfg.telegram.chat_id) else {
            return Ok(Self::disabled());
        };
        let bot = Bot::with_client(token.clone(), http_client(cfg.request_timeout())?);
        let transport =
            TelegramTransport::new(bot, parse_recipient(chat_id), cfg.app.disable_link_preview);
        Ok(Self::new(Box::new(transport)))
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Send `text` in `mode`. When Telegram rejects the markup, the same text
    /// is sent once more as plain text. Returns whether a message went out.
    #[instrument(skip_all, fields(mode = mode.as_str()))]
    pub async fn send(&self, text: &str, mode: FormatMode) -> bool {
        let Some(transport) = self.transport.as_deref() else {
            warn!("telegram bot token or chat id not configured; message not sent");
            return false;
        };

        match transport.send_text(text, mode).await {
            Ok(()) => true,
            Err(err) if mode != FormatMode::Plain && err.is_markup_related() => {
                warn!(%err, "formatted send failed; retrying as plain text");
                match transport.send_text(text, FormatMode::Plain).await {
                    Ok(()) => {
                        info!("message sent as plain text");
                        true
                    }
                    Err(err) => {
                        error!(%err, "failed to send even as plain text");
                        false
                    }
                }
            }
            Err(err) => {
                error!(%err, "failed to send telegram message");
                false
            }
        }
    }
}
