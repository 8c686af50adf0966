use serde::{Deserialize, Serialize};

/// What pressing a button does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ButtonTarget {
    /// Send the payload back to the bot as an inbound action
    Callback(String),
    /// Open a URL
    Url(String),
}

/// A single button under a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionButton {
    /// Visible label
    pub text: String,
    /// Behaviour when pressed
    pub target: ButtonTarget,
}

impl ActionButton {
    /// A button that sends `payload` back as an inbound action.
    #[must_use]
    pub fn callback(text: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            target: ButtonTarget::Callback(payload.into()),
        }
    }

    /// A button that opens `url`.
    #[must_use]
    pub fn url(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            target: ButtonTarget::Url(url.into()),
        }
    }

    /// Callback payload, if this is a callback button.
    #[must_use]
    pub fn callback_payload(&self) -> Option<&str> {
        match &self.target {
            ButtonTarget::Callback(payload) => Some(payload),
            ButtonTarget::Url(_) => None,
        }
    }
}

/// Rows of buttons attached to a chat message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSurface {
    /// Button rows, top to bottom
    pub rows: Vec<Vec<ActionButton>>,
}

impl ActionSurface {
    /// Append a row of buttons.
    #[must_use]
    pub fn with_row(mut self, row: Vec<ActionButton>) -> Self {
        self.rows.push(row);
        self
    }

    /// All callback payloads, row by row.
    pub fn callback_payloads(&self) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .flatten()
            .filter_map(ActionButton::callback_payload)
    }
}
