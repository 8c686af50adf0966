//! Chat rendering of a service request: `MarkdownV2` text and buttons.
//!
//! Rendering is deterministic: the same snapshot and author always produce
//! the same text and the same action surface.

use std::fmt::Write as _;
use storefront_sync_core::callback::{DeepLink, StatusCallback};
use storefront_sync_core::markup::{escape_link_url, escape_markdown};
use storefront_sync_core::request::ServiceRequest;
use storefront_sync_core::surface::{ActionButton, ActionSurface};
use storefront_sync_core::user::AuthorProfile;

/// Renders requests into chat messages.
#[derive(Debug, Clone)]
pub struct Renderer {
    deep_link_base: String,
}

impl Renderer {
    /// Create a renderer whose "open full record" buttons point at
    /// `deep_link_base` followed by the encoded deep link.
    #[must_use]
    pub fn new(deep_link_base: impl Into<String>) -> Self {
        Self {
            deep_link_base: deep_link_base.into(),
        }
    }

    /// Message text for `request`. Every interpolated value is escaped.
    #[must_use]
    pub fn text(&self, request: &ServiceRequest, author: Option<&AuthorProfile>) -> String {
        let mut text = format!(
            "{} {} \\#{}\n",
            request.status.emoji(),
            request.kind.title(),
            escape_markdown(&request.id.to_string()),
        );

        let mut field = |name: &str, value: &str| {
            let _ = write!(text, "\n*• {name}\\:* {value}");
        };
        field("UUID", &escape_markdown(&request.uuid.to_string()));
        field("Status", &escape_markdown(request.status.label()));
        if let Some(feedback_type) = request.feedback_type {
            field("Type", &escape_markdown(feedback_type.label()));
        }
        if let Some(author) = author {
            field("Author", &author_markup(author));
        }
        field("Name", &escape_markdown(&request.name));
        field("Phone", &escape_markdown(&request.phone));
        field("Comment", &escape_markdown(&request.content));

        text
    }

    /// Buttons for `request`: one per status other than the current one,
    /// then a deep link to the full record.
    #[must_use]
    pub fn surface(&self, request: &ServiceRequest) -> ActionSurface {
        let transitions = request
            .status
            .others()
            .map(|status| {
                ActionButton::callback(
                    status.transition_label(),
                    StatusCallback::new(request.kind, request.id, status).to_string(),
                )
            })
            .collect();

        let link = DeepLink::new(request.kind, request.uuid).url(&self.deep_link_base);

        ActionSurface::default()
            .with_row(transitions)
            .with_row(vec![ActionButton::url(request.kind.view_label(), link)])
    }
}

fn author_markup(author: &AuthorProfile) -> String {
    let name = escape_markdown(&author.display_name());
    match author.public_link() {
        Some(link) => format!("[{name}]({})", escape_link_url(&link)),
        None => name,
    }
}
