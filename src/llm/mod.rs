pub mod media;
pub mod openai;
pub mod prompt;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::ForgeResult;
use prompt::ChatTurn;

pub use openai::{OpenAiCompletionClient, OpenAiPortraitClient};
pub use prompt::build_completion_turns;

/// Text-generation service that answers a turn sequence with raw text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, turns: &[ChatTurn]) -> ForgeResult<String>;
}

/// Image service that turns a prompt into a portrait saved on local disk.
#[async_trait]
pub trait PortraitClient: Send + Sync {
    async fn generate_portrait(&self, prompt: &str, character_name: &str)
        -> ForgeResult<PathBuf>;
}
