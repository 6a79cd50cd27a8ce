pub mod html;
pub mod pdf;

use std::path::PathBuf;

pub use html::{portrait_sources, render_html, standalone_document};
pub use pdf::render_pdf_file;

pub struct Section {
    pub title: &'static str,
    pub fields: &'static [&'static str],
}

/// Sheet layout shared by both document formats. Every schema field is listed once.
pub const SECTIONS: &[Section] = &[
    Section {
        title: "Basic Information",
        fields: &[
            "name",
            "description",
            "age",
            "race",
            "class",
            "alignment",
            "background",
        ],
    },
    Section {
        title: "Personality & Backstory",
        fields: &[
            "personality_traits",
            "ideals",
            "bonds",
            "flaws",
            "character_backstory",
            "allies_enemies",
        ],
    },
    Section {
        title: "Abilities & Skills",
        fields: &["languages", "skills", "custom_language", "custom_skill"],
    },
    Section {
        title: "Equipment & Treasures",
        fields: &["equipment", "treasure", "custom_equipment", "custom_treasure"],
    },
    Section {
        title: "Spellcasting",
        fields: &[
            "spellcasting_class",
            "spellcasting_ability",
            "spell_save_dc",
            "spell_attack_bonus",
        ],
    },
    Section {
        title: "Portrait Prompt",
        fields: &["portrait_prompt"],
    },
];

pub const PORTRAITS_TITLE: &str = "Portraits";

/// A saved portrait plus the public URL it was mirrored to, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortraitAsset {
    pub path: PathBuf,
    pub public_url: Option<String>,
}

impl PortraitAsset {
    pub fn local(path: PathBuf) -> Self {
        PortraitAsset {
            path,
            public_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::FIELDS;

    #[test]
    fn sections_cover_every_field_exactly_once() {
        let listed: Vec<&str> = SECTIONS
            .iter()
            .flat_map(|section| section.fields.iter().copied())
            .collect();
        assert_eq!(listed.len(), FIELDS.len());
        for spec in FIELDS {
            assert_eq!(
                listed.iter().filter(|name| **name == spec.name).count(),
                1,
                "{} should appear once",
                spec.name
            );
        }
    }
}
