use std::time::Duration;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_ABSORB_DELAY_MS: u64 = 600;
const DEFAULT_CHAT_REPLY_DELAY_MS: u64 = 700;
const DEFAULT_MAX_UPLOAD_MB: usize = 20;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// External layout generation endpoint. `None` selects the demo generator.
    pub generation_endpoint: Option<String>,
    pub absorb_delay: Duration,
    pub chat_reply_delay: Duration,
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            generation_endpoint: None,
            absorb_delay: Duration::from_millis(DEFAULT_ABSORB_DELAY_MS),
            chat_reply_delay: Duration::from_millis(DEFAULT_CHAT_REPLY_DELAY_MS),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_MB * 1024 * 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> Self { Self::from_lookup(|key| std::env::var(key).ok()) }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let generation_endpoint = lookup("GENERATION_ENDPOINT")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        Self {
            port: parse_or(&lookup, "PORT", defaults.port),
            generation_endpoint,
            absorb_delay: Duration::from_millis(parse_or(&lookup, "ABSORB_DELAY_MS", DEFAULT_ABSORB_DELAY_MS)),
            chat_reply_delay: Duration::from_millis(parse_or(&lookup, "CHAT_REPLY_DELAY_MS", DEFAULT_CHAT_REPLY_DELAY_MS)),
            max_upload_bytes: parse_or(&lookup, "MAX_UPLOAD_MB", DEFAULT_MAX_UPLOAD_MB) * 1024 * 1024,
        }
    }
}

fn parse_or<T: std::str::FromStr + Copy + std::fmt::Display>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}={:?}, using {}", key, raw, default);
            default
        }),
    }
}
