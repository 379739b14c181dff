//! Acknowledgements sent back to the subscriber through the webhook response.

use serde::Serialize;

/// Outcome of a subscriber command, rendered as a short Portuguese text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reply {
    Subscribed,
    AlreadySubscribed,
    Unsubscribed,
    NotSubscribed,
    InvalidCommand,
}

impl Reply {
    pub fn text(self) -> &'static str {
        match self {
            Self::Subscribed => {
                "Obrigado pela subscrição.\n\nEm breve passará a receber \
                 mensagens sobre curiosidades diversas."
            }
            Self::AlreadySubscribed => "Contacto já subscrito.\n\nObrigado.",
            Self::Unsubscribed => "A sua subscrição foi cancelada com sucesso.\n\nObrigado.",
            Self::NotSubscribed => "Contacto não subscrito.\n\nObrigado.",
            Self::InvalidCommand => {
                "Formato inválido.\n\nEnvie JOIN para subscrever ou STOP para \
                 cancelar a subscrição."
            }
        }
    }

    /// Stable snake_case name, used as a metrics label.
    pub fn kind(self) -> &'static str {
        match self {
            Self::Subscribed => "subscribed",
            Self::AlreadySubscribed => "already_subscribed",
            Self::Unsubscribed => "unsubscribed",
            Self::NotSubscribed => "not_subscribed",
            Self::InvalidCommand => "invalid_command",
        }
    }

    /// Whether the command changed the subscriber directory.
    pub fn mutated(self) -> bool {
        matches!(self, Self::Subscribed | Self::Unsubscribed)
    }
}

/// One text the provider relays back to the sender.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReplyMessage {
    pub content: String,
}

/// Webhook response body: `{"messages": [{"content": "..."}]}`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ReplyPayload {
    pub messages: Vec<ReplyMessage>,
}

impl ReplyPayload {
    /// A payload with nothing to relay.
    pub fn empty() -> Self {
        Self::default()
    }
}

impl From<Reply> for ReplyPayload {
    fn from(reply: Reply) -> Self {
        Self {
            messages: vec![ReplyMessage {
                content: reply.text().to_string(),
            }],
        }
    }
}
