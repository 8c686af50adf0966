use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use storefront_sync_core::environment::{ActionSink, MessagingGateway, SentMessage};
use storefront_sync_core::surface::ActionSurface;
use storefront_sync_core::user::InboundAction;
use storefront_sync_core::{Context, GatewayError};

/// A message accepted by [`RecordingGateway::send_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRecord {
    /// Target chat
    pub chat_id: i64,
    /// Message id handed back to the caller
    pub message_id: i64,
    /// Rendered text
    pub text: String,
    /// Rendered buttons
    pub surface: ActionSurface,
}

/// An edit accepted by [`RecordingGateway::edit_message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditRecord {
    /// Target chat
    pub chat_id: i64,
    /// Edited message
    pub message_id: i64,
    /// Rendered text
    pub text: String,
    /// Rendered buttons
    pub surface: ActionSurface,
}

/// An acknowledgment delivered by [`RecordingGateway::answer_action`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRecord {
    /// Acknowledged action
    pub action_id: String,
    /// Text shown to the principal
    pub text: String,
}

#[derive(Debug, Default)]
struct Calls {
    sent: Vec<SendRecord>,
    edits: Vec<EditRecord>,
    answers: Vec<AnswerRecord>,
    attempted_edits: usize,
    next_message_id: i64,
    fail_sends: bool,
    fail_edits: bool,
    fail_answers: bool,
    edit_delay: Option<Duration>,
}

/// Mock messaging gateway.
///
/// Records every accepted call. Sends hand out increasing message ids
/// starting at 1000. Each call kind can be switched into failure mode, and
/// edits can be slowed down to make them observably concurrent. A slowed
/// edit gives up with [`GatewayError::Cancelled`] if its context is
/// cancelled first.
#[derive(Debug, Clone, Default)]
pub struct RecordingGateway {
    calls: Arc<Mutex<Calls>>,
}

impl RecordingGateway {
    /// Create a gateway that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_calls<R>(&self, f: impl FnOnce(&mut Calls) -> R) -> R {
        let mut guard = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Accepted sends, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<SendRecord> {
        self.with_calls(|calls| calls.sent.clone())
    }

    /// Accepted edits, in completion order.
    #[must_use]
    pub fn edits(&self) -> Vec<EditRecord> {
        self.with_calls(|calls| calls.edits.clone())
    }

    /// Delivered acknowledgments, in order.
    #[must_use]
    pub fn answers(&self) -> Vec<AnswerRecord> {
        self.with_calls(|calls| calls.answers.clone())
    }

    /// Every edit attempt, including rejected and cancelled ones.
    #[must_use]
    pub fn attempted_edits(&self) -> usize {
        self.with_calls(|calls| calls.attempted_edits)
    }

    /// Total number of outbound message calls attempted or accepted.
    #[must_use]
    pub fn message_calls(&self) -> usize {
        self.with_calls(|calls| calls.sent.len() + calls.attempted_edits)
    }

    /// Make sends fail.
    pub fn fail_sends(&self, fail: bool) {
        self.with_calls(|calls| calls.fail_sends = fail);
    }

    /// Make edits fail.
    pub fn fail_edits(&self, fail: bool) {
        self.with_calls(|calls| calls.fail_edits = fail);
    }

    /// Make acknowledgments fail.
    pub fn fail_answers(&self, fail: bool) {
        self.with_calls(|calls| calls.fail_answers = fail);
    }

    /// Hold every edit for `delay` before accepting it.
    pub fn delay_edits(&self, delay: Duration) {
        self.with_calls(|calls| calls.edit_delay = Some(delay));
    }
}

fn rejected(method: &str) -> GatewayError {
    GatewayError::Api {
        code: 400,
        description: format!("{method} failure injected"),
    }
}

#[async_trait]
impl MessagingGateway for RecordingGateway {
    async fn send_message(
        &self,
        _ctx: &Context,
        chat_id: i64,
        text: &str,
        surface: &ActionSurface,
    ) -> Result<SentMessage, GatewayError> {
        self.with_calls(|calls| {
            if calls.fail_sends {
                return Err(rejected("sendMessage"));
            }
            calls.next_message_id += 1;
            let message_id = 999 + calls.next_message_id;
            calls.sent.push(SendRecord {
                chat_id,
                message_id,
                text: text.to_string(),
                surface: surface.clone(),
            });
            Ok(SentMessage {
                chat_id,
                message_id,
            })
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
        let delay = self.with_calls(|calls| {
            calls.attempted_edits += 1;
            calls.edit_delay
        });

        if let Some(delay) = delay {
            tokio::select! {
                () = ctx.cancelled() => return Err(GatewayError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.with_calls(|calls| {
            if calls.fail_edits {
                return Err(rejected("editMessageText"));
            }
            calls.edits.push(EditRecord {
                chat_id,
                message_id,
                text: text.to_string(),
                surface: surface.clone(),
            });
            Ok(())
        })
    }

    async fn answer_action(
        &self,
        _ctx: &Context,
        action_id: &str,
        text: &str,
    ) -> Result<(), GatewayError> {
        self.with_calls(|calls| {
            if calls.fail_answers {
                return Err(rejected("answerCallbackQuery"));
            }
            calls.answers.push(AnswerRecord {
                action_id: action_id.to_string(),
                text: text.to_string(),
            });
            Ok(())
        })
    }
}

/// Mock action sink recording every inbound action it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    actions: Arc<Mutex<Vec<InboundAction>>>,
}

impl RecordingSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Received actions, in order.
    #[must_use]
    pub fn actions(&self) -> Vec<InboundAction> {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ActionSink for RecordingSink {
    async fn on_action(&self, _ctx: Context, action: InboundAction) {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(action);
    }
}
