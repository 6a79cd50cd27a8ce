use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::character::record::CharacterRecord;

/// Few-shot character sheets shown to the completion service.
#[derive(Debug, Clone)]
pub struct ExampleLibrary {
    entries: Vec<CharacterRecord>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExamplesFile {
    Many(Vec<CharacterRecord>),
    One(Box<CharacterRecord>),
}

pub fn liora_moonshadow() -> CharacterRecord {
    let strings =
        |items: &[&str]| -> Vec<String> { items.iter().map(|item| item.to_string()).collect() };
    CharacterRecord {
        name: "Liora Moonshadow".to_string(),
        description: "A graceful elf with silver hair and piercing blue eyes, adept in the arcane arts and carrying the wisdom of the ages.".to_string(),
        age: "124".to_string(),
        race: "High Elf".to_string(),
        class: "Wizard".to_string(),
        alignment: "Neutral".to_string(),
        background: "Sage".to_string(),
        personality_traits: "I am lost in thought, often oblivious to my surroundings. I'm fascinated by ancient artifacts and the secrets they hold.".to_string(),
        ideals: "Knowledge. The pursuit of knowledge is the greatest endeavor.".to_string(),
        bonds: "I am on a quest to find an ancient spellbook said to contain the secrets of the universe.".to_string(),
        flaws: "I often overlook immediate dangers, being too engrossed in my studies or thoughts.".to_string(),
        character_backstory: "Liora hails from the ancient city of Ellyndor. Trained in the Grand Library, she became obsessed with a lost spellbook of immense power. Now she travels the land in search of this artifact, using her magic to uncover hidden truths.".to_string(),
        allies_enemies: "Allied with the Keepers of the Grand Library. Beware of the Dark Enchantress, who also seeks the spellbook.".to_string(),
        languages: strings(&["Common", "Elvish", "Draconic", "Sylvan"]),
        skills: strings(&["Arcana", "History"]),
        custom_language: "Ancient High Elvish".to_string(),
        custom_skill: "Magical artifact identification".to_string(),
        equipment: "Staff of the Arcane, robes of the enlightened, spellbook, and a pouch of spell components".to_string(),
        treasure: "A crystal orb said to have been touched by the first wizards".to_string(),
        custom_equipment: "Silver circlet that enhances focus".to_string(),
        custom_treasure: "A shard from the Mirror of Fates".to_string(),
        spellcasting_class: "Wizard".to_string(),
        spellcasting_ability: "Intelligence".to_string(),
        spell_save_dc: "16".to_string(),
        spell_attack_bonus: "+8".to_string(),
        portrait_prompt: "High Elf Wizard with silver hair and blue eyes. Wears enlightened robes and a silver circlet. Holds a Staff of the Arcane and a spellbook. Crystal orb necklace. Background shard from the Mirror of Fates.".to_string(),
        portrait_filenames: Vec::new(),
        pdf_path: None,
    }
}

impl ExampleLibrary {
    pub fn new(entries: Vec<CharacterRecord>) -> Self {
        let mut seen = HashSet::new();
        let entries = entries
            .into_iter()
            .map(|mut entry| {
                entry.portrait_filenames.clear();
                entry.pdf_path = None;
                entry
            })
            .filter(|entry| seen.insert(entry.to_prompt_json().to_string()))
            .collect();
        ExampleLibrary { entries }
    }

    pub fn built_in() -> Self {
        ExampleLibrary::new(vec![liora_moonshadow()])
    }

    /// Loads examples from a JSON file holding one record or an array of records.
    /// A missing file falls back to the built-in set; an unreadable one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(ExampleLibrary::built_in());
        };
        if !path.exists() {
            warn!(
                "Example library {} not found; using built-in examples",
                path.display()
            );
            return Ok(ExampleLibrary::built_in());
        }

        let raw = fs::read_to_string(path)
            .map_err(|err| anyhow!("Failed to read example library '{}': {}", path.display(), err))?;
        let parsed: ExamplesFile = serde_json::from_str(&raw)
            .map_err(|err| anyhow!("Failed to parse example library '{}': {}", path.display(), err))?;
        let entries = match parsed {
            ExamplesFile::Many(entries) => entries,
            ExamplesFile::One(entry) => vec![*entry],
        };
        if entries.is_empty() {
            warn!(
                "Example library {} is empty; using built-in examples",
                path.display()
            );
            return Ok(ExampleLibrary::built_in());
        }

        let library = ExampleLibrary::new(entries);
        info!(
            "Loaded {} example character(s) from {}",
            library.len(),
            path.display()
        );
        Ok(library)
    }

    pub fn entries(&self) -> &[CharacterRecord] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_prompt_json(&self) -> String {
        let values: Vec<_> = self.entries.iter().map(CharacterRecord::to_prompt_json).collect();
        serde_json::Value::Array(values).to_string()
    }
}
