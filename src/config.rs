use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use once_cell::sync::Lazy;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortraitEmbed {
    /// `<img src>` points at the served image path.
    Path,
    /// Image bytes are inlined as a base64 data URI.
    DataUri,
}

#[derive(Debug, Clone)]
pub struct ObjectStorageConfig {
    pub bucket: String,
    pub endpoint: String,
    pub public_host: String,
    pub key_prefix: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub bind_addr: String,
    pub database_url: String,
    pub storage_root: PathBuf,
    pub examples_path: Option<PathBuf>,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub completion_model: String,
    pub completion_max_tokens: u32,
    pub completion_temperature: f32,
    pub image_model: String,
    pub image_size: String,
    pub request_timeout_seconds: u64,
    pub default_portrait_count: usize,
    pub rate_limit_seconds: u64,
    pub session_idle_minutes: u64,
    pub max_sessions: usize,
    pub portrait_embed: PortraitEmbed,
    pub object_storage: Option<ObjectStorageConfig>,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_f32(name: &str, default: f32) -> f32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_optional_path(name: &str) -> Option<PathBuf> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn normalize_database_url(value: String) -> String {
    if value.starts_with("sqlite+aiosqlite://") {
        return value.replacen("sqlite+aiosqlite://", "sqlite://", 1);
    }
    value
}

pub(crate) fn normalize_image_size(value: String) -> String {
    let trimmed = value.trim().to_lowercase();
    match trimmed.as_str() {
        "256x256" | "512x512" | "1024x1024" => trimmed,
        _ => {
            warn!(
                "Unsupported IMAGE_SIZE value '{}'; defaulting to 256x256.",
                value
            );
            "256x256".to_string()
        }
    }
}

pub(crate) fn parse_portrait_embed(value: &str) -> PortraitEmbed {
    match value.trim().to_lowercase().as_str() {
        "data" | "data_uri" | "base64" => PortraitEmbed::DataUri,
        "path" | "" => PortraitEmbed::Path,
        other => {
            warn!("Unknown PORTRAIT_EMBED value '{}'; defaulting to path.", other);
            PortraitEmbed::Path
        }
    }
}

fn load_object_storage() -> Option<ObjectStorageConfig> {
    let bucket = env_string("OBJECT_STORAGE_BUCKET", "");
    if bucket.trim().is_empty() {
        return None;
    }
    Some(ObjectStorageConfig {
        bucket: bucket.trim().to_string(),
        endpoint: env_string("OBJECT_STORAGE_ENDPOINT", "https://s3.amazonaws.com")
            .trim_end_matches('/')
            .to_string(),
        public_host: env_string("OBJECT_STORAGE_PUBLIC_HOST", "s3.amazonaws.com"),
        key_prefix: env_string("OBJECT_STORAGE_KEY_PREFIX", "portraits"),
        token: env_string("OBJECT_STORAGE_TOKEN", ""),
    })
}

impl Config {
    pub fn load() -> Result<Self> {
        Ok(Config {
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            bind_addr: env_string("BIND_ADDR", "127.0.0.1:8501"),
            database_url: normalize_database_url(env_string(
                "DATABASE_URL",
                "sqlite://data/characters.db?mode=rwc",
            )),
            storage_root: PathBuf::from(env_string("STORAGE_ROOT", ".")),
            examples_path: env_optional_path("EXAMPLES_PATH"),
            openai_api_key: env_string("OPENAI_API_KEY", ""),
            openai_base_url: env_string("OPENAI_BASE_URL", "https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            completion_model: env_string("COMPLETION_MODEL", "gpt-3.5-turbo"),
            completion_max_tokens: env_u32("COMPLETION_MAX_TOKENS", 1500),
            completion_temperature: env_f32("COMPLETION_TEMPERATURE", 0.7),
            image_model: env_string("IMAGE_MODEL", "dall-e-2"),
            image_size: normalize_image_size(env_string("IMAGE_SIZE", "256x256")),
            request_timeout_seconds: env_u64("REQUEST_TIMEOUT_SECONDS", 90).max(1),
            default_portrait_count: env_usize("DEFAULT_PORTRAIT_COUNT", 1).clamp(1, 5),
            rate_limit_seconds: env_u64("RATE_LIMIT_SECONDS", 5),
            session_idle_minutes: env_u64("SESSION_IDLE_MINUTES", 120).max(1),
            max_sessions: env_usize("MAX_SESSIONS", 1000).max(1),
            portrait_embed: parse_portrait_embed(&env_string("PORTRAIT_EMBED", "path")),
            object_storage: load_object_storage(),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn session_idle_ttl(&self) -> Duration {
        Duration::from_secs(self.session_idle_minutes * 60)
    }
}

pub const ASSISTANT_PERSONA_PROMPT: &str = "You are a helpful dungeon master's assistant. You are helping a user fill in their D&D character sheet.";

pub const FILL_INSTRUCTIONS_PROMPT: &str = "The user will provide an incomplete JSON character sheet. Your job will be to fill it out completely. Feel free to take artistic licence with all character details, but make sure the character sheet is logically consistent and the character is playable. Keep every value the user already filled in exactly as given. Also include a portrait_prompt value we can pass to an image model to create a character portrait.";

pub const FINAL_REQUEST_PROMPT: &str = "Please completely fill in the JSON data for the character sheet based on the provided character sheet. Use proper JSON formatting for your response: a single JSON object with the same keys, `languages` and `skills` as arrays of strings. Don't leave any values blank.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_size_falls_back_to_small_square() {
        assert_eq!(normalize_image_size("512X512".to_string()), "512x512");
        assert_eq!(normalize_image_size("800x600".to_string()), "256x256");
    }

    #[test]
    fn portrait_embed_accepts_aliases() {
        assert_eq!(parse_portrait_embed("base64"), PortraitEmbed::DataUri);
        assert_eq!(parse_portrait_embed(""), PortraitEmbed::Path);
        assert_eq!(parse_portrait_embed("weird"), PortraitEmbed::Path);
    }

    #[test]
    fn aiosqlite_urls_are_rewritten() {
        assert_eq!(
            normalize_database_url("sqlite+aiosqlite:///x.db".to_string()),
            "sqlite:///x.db"
        );
    }
}
