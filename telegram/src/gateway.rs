//! [`MessagingGateway`] on top of the Bot API.

use crate::client::TelegramClient;
use crate::error::TelegramError;
use crate::types::InlineKeyboardMarkup;
use async_trait::async_trait;
use std::future::Future;
use storefront_sync_core::environment::{MessagingGateway, SentMessage};
use storefront_sync_core::surface::ActionSurface;
use storefront_sync_core::{Context, GatewayError};

/// Messaging gateway posting into Telegram chats.
///
/// Every call is abandoned with [`GatewayError::Cancelled`] as soon as its
/// context is cancelled.
#[derive(Clone, Debug)]
pub struct TelegramGateway {
    client: TelegramClient,
}

impl TelegramGateway {
    /// Wrap a configured client.
    #[must_use]
    pub const fn new(client: TelegramClient) -> Self {
        Self { client }
    }

    /// The underlying client.
    #[must_use]
    pub const fn client(&self) -> &TelegramClient {
        &self.client
    }
}

fn keyboard(surface: &ActionSurface) -> Option<InlineKeyboardMarkup> {
    (!surface.rows.is_empty()).then(|| InlineKeyboardMarkup::from(surface))
}

async fn cancellable<T, F>(ctx: &Context, call: F) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, TelegramError>>,
{
    tokio::select! {
        () = ctx.cancelled() => Err(GatewayError::Cancelled),
        result = call => result.map_err(GatewayError::from),
    }
}

#[async_trait]
impl MessagingGateway for TelegramGateway {
    async fn send_message(
        &self,
        ctx: &Context,
        chat_id: i64,
        text: &str,
        surface: &ActionSurface,
    ) -> Result<SentMessage, GatewayError> {
        let message = cancellable(
            ctx,
            self.client.send_message(chat_id, text, keyboard(surface)),
        )
        .await?;

        Ok(SentMessage {
            chat_id: message.chat.id,
            message_id: message.message_id,
        })
    }

    async fn edit_message(
        &self,
        ctx: &Context,
        chat_id: i64,
        message_id: i64,
        text: &str,
        surface: &ActionSurface,
    ) -> Result<(), GatewayError> {
        let edit = async {
            match self
                .client
                .edit_message_text(chat_id, message_id, text, keyboard(surface))
                .await
            {
                Err(e) if e.is_not_modified() => {
                    tracing::debug!(chat_id, message_id, "Message already up to date");
                    Ok(())
                }
                other => other,
            }
        };
        cancellable(ctx, edit).await
    }

    async fn answer_action(
        &self,
        ctx: &Context,
        action_id: &str,
        text: &str,
    ) -> Result<(), GatewayError> {
        cancellable(ctx, self.client.answer_callback_query(action_id, text)).await
    }
}
