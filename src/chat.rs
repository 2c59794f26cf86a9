use serde::Serialize;

use crate::models::{ChatMessage, Sender};

pub const GREETING: &str = "Hello there! How can I inspire your creative process today?";
pub const CLEARED: &str = "Chat cleared. Ask me anything about your creatives again! 🎨";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Palette,
    Composition,
    Copy,
    Fallback,
}

impl Reply {
    pub fn text(self) -> &'static str {
        match self {
            Reply::Palette => "For your product, try using a primary brand color for the background gradient and a contrasting accent color for the CTA button.",
            Reply::Composition => "Place the product in the focal center or using a diagonal composition, keep text near the edges, and always leave breathing room around the logo.",
            Reply::Copy => "Use short, strong headlines like: 'New Arrivals', 'Unleash Your Speed', or 'Limited Edition Drop'. Keep it under 5–6 words.",
            Reply::Fallback => "I’m here to help! Try asking about layout ideas, color palettes, or ad copy suggestions.",
        }
    }
}

// Checked in order; first hit wins.
const RULES: &[(&[&str], Reply)] = &[
    (&["color", "palette"], Reply::Palette),
    (&["layout", "composition", "design"], Reply::Composition),
    (&["copy", "text", "headline"], Reply::Copy),
];

pub fn match_reply(input: &str) -> Reply {
    let lowered = input.to_lowercase();
    RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lowered.contains(k)))
        .map(|(_, reply)| *reply)
        .unwrap_or(Reply::Fallback)
}

/// Identifies the reply owed for one accepted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyTicket {
    id: u64,
    reply: Reply,
}

#[derive(Debug)]
pub struct ChatAssistant {
    transcript: Vec<ChatMessage>,
    pending: Option<ReplyTicket>,
    issued: u64,
}

impl Default for ChatAssistant {
    fn default() -> Self { Self::new() }
}

#[derive(Debug, Serialize)]
pub struct ChatView {
    pub messages: Vec<ChatMessage>,
    pub pending: bool,
}

impl ChatAssistant {
    pub fn new() -> Self {
        Self { transcript: vec![ChatMessage::new(Sender::Bot, GREETING)], pending: None, issued: 0 }
    }

    pub fn transcript(&self) -> &[ChatMessage] { &self.transcript }

    pub fn is_pending(&self) -> bool { self.pending.is_some() }

    /// Appends the visitor's message. Returns `None` (and changes nothing)
    /// for blank input or while a reply is still owed.
    pub fn send(&mut self, text: &str) -> Option<ReplyTicket> {
        let trimmed = text.trim();
        if trimmed.is_empty() || self.pending.is_some() {
            return None;
        }
        self.transcript.push(ChatMessage::new(Sender::User, trimmed));
        self.issued += 1;
        let ticket = ReplyTicket { id: self.issued, reply: match_reply(trimmed) };
        self.pending = Some(ticket);
        Some(ticket)
    }

    /// Posts the bot reply for `ticket` if it is still the one owed.
    pub fn deliver(&mut self, ticket: ReplyTicket) -> bool {
        if self.pending != Some(ticket) {
            return false;
        }
        self.transcript.push(ChatMessage::new(Sender::Bot, ticket.reply.text()));
        self.pending = None;
        true
    }

    pub fn clear(&mut self) {
        self.transcript = vec![ChatMessage::new(Sender::Bot, CLEARED)];
        self.pending = None;
    }

    pub fn view(&self) -> ChatView { ChatView { messages: self.transcript().to_vec(), pending: self.is_pending() } }
}
