use std::{fmt, str::FromStr};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The closed set of creative themes offered by the theme picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Theme {
    #[default]
    Minimal,
    Luxury,
    Sporty,
    Festival,
    Nature,
}

impl Theme {
    pub const ALL: [Theme; 5] = [Theme::Minimal, Theme::Luxury, Theme::Sporty, Theme::Festival, Theme::Nature];

    /// Wire name, sent verbatim as the `theme` form field.
    pub fn name(self) -> &'static str {
        match self {
            Theme::Minimal => "Minimal",
            Theme::Luxury => "Luxury",
            Theme::Sporty => "Sporty",
            Theme::Festival => "Festival",
            Theme::Nature => "Nature",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Theme::Minimal => "🧊",
            Theme::Luxury => "💎",
            Theme::Sporty => "⚡",
            Theme::Festival => "🎉",
            Theme::Nature => "🌿",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Theme::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| format!("unknown theme '{s}'"))
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct ThemeOption {
    pub name: &'static str,
    pub icon: &'static str,
}

/// An uploaded image as picked by the visitor.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

/// Everything the external generator needs for one cycle.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub product: UploadedFile,
    pub logo: UploadedFile,
    pub theme: Theme,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LayoutResult {
    /// Base64 encoded PNG.
    pub image: String,
    pub score: f64,
    #[serde(default)]
    pub palette: Vec<String>,
    pub cta_text: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GenerateLayoutsResponse {
    pub layouts: Vec<LayoutResult>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
    pub sent_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self { sender, text: text.into(), sent_at: Utc::now() }
    }
}
