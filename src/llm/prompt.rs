use serde::Serialize;

use crate::character::{CharacterRecord, ExampleLibrary};
use crate::config::{ASSISTANT_PERSONA_PROMPT, FILL_INSTRUCTIONS_PROMPT, FINAL_REQUEST_PROMPT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        ChatTurn {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatTurn {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Builds the instruction sequence asking the completion service to finish a sheet.
pub fn build_completion_turns(library: &ExampleLibrary, record: &CharacterRecord) -> Vec<ChatTurn> {
    let mut turns = vec![ChatTurn::system(ASSISTANT_PERSONA_PROMPT)];
    if !library.is_empty() {
        turns.push(ChatTurn::system(format!(
            "Here are some example character sheets:\n\n{}",
            library.to_prompt_json()
        )));
    }
    turns.push(ChatTurn::system(FILL_INSTRUCTIONS_PROMPT));
    turns.push(ChatTurn::user(record.to_prompt_json().to_string()));
    turns.push(ChatTurn::system(FINAL_REQUEST_PROMPT));
    turns
}
