pub const CUSTOM_OPTION: &str = "Custom";

pub const RACE_OPTIONS: &[&str] = &[
    "", "Human", "Elf", "Dwarf", "Orc", "Tiefling", "Gnome", "Halfling", "Dragonborn",
    "Aarakocra", "Genasi", "Goliath", "Tabaxi", "Triton", CUSTOM_OPTION,
];

pub const CLASS_OPTIONS: &[&str] = &[
    "", "Barbarian", "Bard", "Cleric", "Druid", "Fighter", "Monk", "Paladin", "Ranger", "Rogue",
    "Sorcerer", "Warlock", "Wizard", CUSTOM_OPTION,
];

pub const ALIGNMENT_OPTIONS: &[&str] = &[
    "",
    "Lawful Good",
    "Neutral Good",
    "Chaotic Good",
    "Lawful Neutral",
    "True Neutral",
    "Chaotic Neutral",
    "Lawful Evil",
    "Neutral Evil",
    "Chaotic Evil",
];

pub const BACKGROUND_OPTIONS: &[&str] = &[
    "", "Acolyte", "Charlatan", "Criminal", "Entertainer", "Folk Hero", "Guild Artisan",
    "Hermit", "Noble", "Outlander", "Sage", "Sailor", "Soldier", "Urchin", CUSTOM_OPTION,
];

pub const LANGUAGE_OPTIONS: &[&str] = &[
    "Common", "Dwarvish", "Elvish", "Giant", "Gnomish", "Goblin", "Halfling", "Orc", "Abyssal",
    "Celestial", "Draconic", "Deep Speech", "Infernal", "Primordial", "Sylvan", "Undercommon",
    CUSTOM_OPTION,
];

pub const SKILL_OPTIONS: &[&str] = &[
    "Acrobatics",
    "Animal Handling",
    "Arcana",
    "Athletics",
    "Deception",
    "History",
    "Insight",
    "Intimidation",
    "Investigation",
    "Medicine",
    "Nature",
    "Perception",
    "Performance",
    "Persuasion",
    "Religion",
    "Sleight of Hand",
    "Stealth",
    "Survival",
    CUSTOM_OPTION,
];

/// Fixed choices for select-style fields; `None` means free text.
pub fn options_for(field: &str) -> Option<&'static [&'static str]> {
    match field {
        "race" => Some(RACE_OPTIONS),
        "class" | "spellcasting_class" => Some(CLASS_OPTIONS),
        "alignment" => Some(ALIGNMENT_OPTIONS),
        "background" => Some(BACKGROUND_OPTIONS),
        "languages" => Some(LANGUAGE_OPTIONS),
        "skills" => Some(SKILL_OPTIONS),
        _ => None,
    }
}

/// True when `value` is set but not one of the listed options.
pub fn is_custom_value(field: &str, value: &str) -> bool {
    let value = value.trim();
    if value.is_empty() {
        return false;
    }
    options_for(field).is_some_and(|options| !options.contains(&value))
}
