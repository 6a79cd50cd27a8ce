use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{ForgeError, ForgeResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    LongText,
    List,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
}

const fn field(name: &'static str, label: &'static str, kind: FieldKind) -> FieldSpec {
    FieldSpec { name, label, kind }
}

/// Every schema field, in sheet order. Derived fields are not listed.
pub const FIELDS: &[FieldSpec] = &[
    field("name", "Character Name", FieldKind::Text),
    field("description", "Description", FieldKind::LongText),
    field("age", "Age", FieldKind::Text),
    field("race", "Race", FieldKind::Text),
    field("class", "Class", FieldKind::Text),
    field("alignment", "Alignment", FieldKind::Text),
    field("background", "Background", FieldKind::Text),
    field("personality_traits", "Personality Traits", FieldKind::LongText),
    field("ideals", "Ideals", FieldKind::LongText),
    field("bonds", "Bonds", FieldKind::LongText),
    field("flaws", "Flaws", FieldKind::LongText),
    field("character_backstory", "Character Backstory", FieldKind::LongText),
    field("allies_enemies", "Allies & Enemies", FieldKind::LongText),
    field("languages", "Languages", FieldKind::List),
    field("skills", "Skills", FieldKind::List),
    field("custom_language", "Custom Language", FieldKind::Text),
    field("custom_skill", "Custom Skill", FieldKind::Text),
    field("equipment", "Starting Equipment", FieldKind::LongText),
    field("treasure", "Treasure", FieldKind::LongText),
    field("custom_equipment", "Custom Equipment", FieldKind::Text),
    field("custom_treasure", "Custom Treasure", FieldKind::Text),
    field("spellcasting_class", "Spellcasting Class", FieldKind::Text),
    field("spellcasting_ability", "Spellcasting Ability", FieldKind::Text),
    field("spell_save_dc", "Spell Save DC", FieldKind::Text),
    field("spell_attack_bonus", "Spell Attack Bonus", FieldKind::Text),
    field("portrait_prompt", "Portrait Prompt", FieldKind::LongText),
];

pub fn field_spec(name: &str) -> Option<&'static FieldSpec> {
    FIELDS.iter().find(|spec| spec.name == name)
}

/// One character sheet. Absent keys decode as empty values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterRecord {
    #[serde(default, deserialize_with = "lenient_text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub age: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub race: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub class: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub alignment: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub background: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub personality_traits: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub ideals: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub bonds: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub flaws: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub character_backstory: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub allies_enemies: String,
    #[serde(default, deserialize_with = "lenient_list")]
    pub languages: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub skills: Vec<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub custom_language: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub custom_skill: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub equipment: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub treasure: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub custom_equipment: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub custom_treasure: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub spellcasting_class: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub spellcasting_ability: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub spell_save_dc: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub spell_attack_bonus: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub portrait_prompt: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub portrait_filenames: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_path: Option<String>,
}

/// A value submitted for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldInput {
    Text(String),
    List(Vec<String>),
}

fn scalar_to_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.trim().to_string(),
        Value::Array(items) => items
            .into_iter()
            .map(scalar_to_text)
            .filter(|item| !item.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(map) => map
            .into_iter()
            .map(|(key, value)| format!("{}: {}", key, scalar_to_text(value)))
            .collect::<Vec<_>>()
            .join("; "),
        other => other.to_string(),
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_to_text(Value::deserialize(deserializer)?))
}

pub fn split_list(text: &str) -> Vec<String> {
    text.split([',', ';', '\n'])
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .map(scalar_to_text)
            .filter(|item| !item.is_empty())
            .collect(),
        Value::String(text) => split_list(&text),
        Value::Null => Vec::new(),
        other => split_list(&scalar_to_text(other)),
    };
    Ok(items)
}

static CODE_FENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("code fence regex is valid")
});

fn extract_json_object(text: &str) -> Option<&str> {
    let candidate = CODE_FENCE_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text);
    let start = candidate.find('{')?;
    let end = candidate.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&candidate[start..=end])
}

impl CharacterRecord {
    fn text_slot(&self, name: &str) -> Option<&String> {
        let slot = match name {
            "name" => &self.name,
            "description" => &self.description,
            "age" => &self.age,
            "race" => &self.race,
            "class" => &self.class,
            "alignment" => &self.alignment,
            "background" => &self.background,
            "personality_traits" => &self.personality_traits,
            "ideals" => &self.ideals,
            "bonds" => &self.bonds,
            "flaws" => &self.flaws,
            "character_backstory" => &self.character_backstory,
            "allies_enemies" => &self.allies_enemies,
            "custom_language" => &self.custom_language,
            "custom_skill" => &self.custom_skill,
            "equipment" => &self.equipment,
            "treasure" => &self.treasure,
            "custom_equipment" => &self.custom_equipment,
            "custom_treasure" => &self.custom_treasure,
            "spellcasting_class" => &self.spellcasting_class,
            "spellcasting_ability" => &self.spellcasting_ability,
            "spell_save_dc" => &self.spell_save_dc,
            "spell_attack_bonus" => &self.spell_attack_bonus,
            "portrait_prompt" => &self.portrait_prompt,
            _ => return None,
        };
        Some(slot)
    }

    fn text_slot_mut(&mut self, name: &str) -> Option<&mut String> {
        let slot = match name {
            "name" => &mut self.name,
            "description" => &mut self.description,
            "age" => &mut self.age,
            "race" => &mut self.race,
            "class" => &mut self.class,
            "alignment" => &mut self.alignment,
            "background" => &mut self.background,
            "personality_traits" => &mut self.personality_traits,
            "ideals" => &mut self.ideals,
            "bonds" => &mut self.bonds,
            "flaws" => &mut self.flaws,
            "character_backstory" => &mut self.character_backstory,
            "allies_enemies" => &mut self.allies_enemies,
            "custom_language" => &mut self.custom_language,
            "custom_skill" => &mut self.custom_skill,
            "equipment" => &mut self.equipment,
            "treasure" => &mut self.treasure,
            "custom_equipment" => &mut self.custom_equipment,
            "custom_treasure" => &mut self.custom_treasure,
            "spellcasting_class" => &mut self.spellcasting_class,
            "spellcasting_ability" => &mut self.spellcasting_ability,
            "spell_save_dc" => &mut self.spell_save_dc,
            "spell_attack_bonus" => &mut self.spell_attack_bonus,
            "portrait_prompt" => &mut self.portrait_prompt,
            _ => return None,
        };
        Some(slot)
    }

    pub fn list(&self, name: &str) -> Option<&[String]> {
        match name {
            "languages" => Some(&self.languages),
            "skills" => Some(&self.skills),
            _ => None,
        }
    }

    fn list_slot_mut(&mut self, name: &str) -> Option<&mut Vec<String>> {
        match name {
            "languages" => Some(&mut self.languages),
            "skills" => Some(&mut self.skills),
            _ => None,
        }
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.text_slot(name).map(String::as_str)
    }

    /// Value as shown on a sheet; lists are comma-joined, unknown names are empty.
    pub fn display_value(&self, name: &str) -> String {
        if let Some(items) = self.list(name) {
            return items.join(", ");
        }
        self.text(name).unwrap_or_default().to_string()
    }

    pub fn is_field_empty(&self, name: &str) -> bool {
        if let Some(items) = self.list(name) {
            return items.iter().all(|item| item.trim().is_empty());
        }
        self.text(name).map_or(true, |value| value.trim().is_empty())
    }

    pub fn set_field(&mut self, name: &str, input: FieldInput) -> ForgeResult<()> {
        if let Some(slot) = self.list_slot_mut(name) {
            *slot = match input {
                FieldInput::List(items) => items
                    .into_iter()
                    .map(|item| item.trim().to_string())
                    .filter(|item| !item.is_empty())
                    .collect(),
                FieldInput::Text(text) => split_list(&text),
            };
            return Ok(());
        }
        if let Some(slot) = self.text_slot_mut(name) {
            *slot = match input {
                FieldInput::Text(text) => text.trim().to_string(),
                FieldInput::List(items) => items.join(", "),
            };
            return Ok(());
        }
        Err(ForgeError::Validation(format!("Unknown field '{name}'")))
    }

    /// Copies generated values into fields that are still empty; filled fields are kept.
    pub fn merge_completion(&mut self, generated: CharacterRecord) {
        for spec in FIELDS {
            if !self.is_field_empty(spec.name) {
                continue;
            }
            match spec.kind {
                FieldKind::List => {
                    if let (Some(slot), Some(items)) =
                        (self.list_slot_mut(spec.name), generated.list(spec.name))
                    {
                        *slot = items.to_vec();
                    }
                }
                FieldKind::Text | FieldKind::LongText => {
                    if let (Some(slot), Some(value)) =
                        (self.text_slot_mut(spec.name), generated.text(spec.name))
                    {
                        *slot = value.to_string();
                    }
                }
            }
        }
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        FIELDS
            .iter()
            .filter(|spec| self.is_field_empty(spec.name))
            .map(|spec| spec.name)
            .collect()
    }

    /// Schema fields only, in a form the completion service can echo back.
    pub fn to_prompt_json(&self) -> Value {
        let mut map = serde_json::Map::new();
        for spec in FIELDS {
            let value = match self.list(spec.name) {
                Some(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
                None => Value::String(self.text(spec.name).unwrap_or_default().to_string()),
            };
            map.insert(spec.name.to_string(), value);
        }
        Value::Object(map)
    }

    pub fn from_completion_text(text: &str) -> ForgeResult<Self> {
        let json_text = extract_json_object(text).ok_or_else(|| {
            ForgeError::DataFormat("completion response does not contain a JSON object".to_string())
        })?;
        let mut record: CharacterRecord = serde_json::from_str(json_text)
            .map_err(|err| ForgeError::DataFormat(format!("invalid character JSON: {err}")))?;
        record.portrait_filenames.clear();
        record.pdf_path = None;
        Ok(record)
    }

    /// Reports schema fields the generator left blank. Blank fields are allowed.
    pub fn validate(&self) -> Vec<&'static str> {
        let missing = self.missing_fields();
        if !missing.is_empty() {
            warn!(
                "Character '{}' still has {} empty field(s): {}",
                self.display_name(),
                missing.len(),
                missing.join(", ")
            );
        }
        missing
    }

    pub fn display_name(&self) -> &str {
        let trimmed = self.name.trim();
        if trimmed.is_empty() {
            "Unnamed Adventurer"
        } else {
            trimmed
        }
    }

    /// Folds "Custom" selections into the typed-in custom values.
    pub fn resolve_custom_choices(&mut self) {
        fn fold(items: &mut Vec<String>, custom: &str) {
            if let Some(index) = items.iter().position(|item| item == "Custom") {
                items.remove(index);
                let custom = custom.trim();
                if !custom.is_empty() && !items.iter().any(|item| item == custom) {
                    items.insert(index, custom.to_string());
                }
            }
        }
        let custom_language = self.custom_language.clone();
        let custom_skill = self.custom_skill.clone();
        fold(&mut self.languages, &custom_language);
        fold(&mut self.skills, &custom_skill);
    }
}
