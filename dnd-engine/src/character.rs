//! Character records consumed and produced by the engine.
//!
//! A [`Character`] is the persistent, out-of-combat projection of a party
//! member. Combat builds a [`Combatant`](crate::combat::Combatant) from it and
//! writes the results back when the fight is over.

use crate::combat::{Attack, DamageType};
use crate::effects::StatusEffectInstance;
use crate::spellcasting::{Spellcaster, ThirdCasterSubclass};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacterId(pub Uuid);

impl CharacterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CharacterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Ability Scores
// ============================================================================

/// The six ability scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Ability {
    Strength,
    Dexterity,
    Constitution,
    Intelligence,
    Wisdom,
    Charisma,
}

impl Ability {
    pub fn abbreviation(&self) -> &'static str {
        match self {
            Ability::Strength => "STR",
            Ability::Dexterity => "DEX",
            Ability::Constitution => "CON",
            Ability::Intelligence => "INT",
            Ability::Wisdom => "WIS",
            Ability::Charisma => "CHA",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Ability::Strength => "Strength",
            Ability::Dexterity => "Dexterity",
            Ability::Constitution => "Constitution",
            Ability::Intelligence => "Intelligence",
            Ability::Wisdom => "Wisdom",
            Ability::Charisma => "Charisma",
        }
    }
}

impl fmt::Display for Ability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

/// Ability scores container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: u8,
    pub dexterity: u8,
    pub constitution: u8,
    pub intelligence: u8,
    pub wisdom: u8,
    pub charisma: u8,
}

impl AbilityScores {
    pub fn new(str: u8, dex: u8, con: u8, int: u8, wis: u8, cha: u8) -> Self {
        Self {
            strength: str,
            dexterity: dex,
            constitution: con,
            intelligence: int,
            wisdom: wis,
            charisma: cha,
        }
    }

    pub fn get(&self, ability: Ability) -> u8 {
        match ability {
            Ability::Strength => self.strength,
            Ability::Dexterity => self.dexterity,
            Ability::Constitution => self.constitution,
            Ability::Intelligence => self.intelligence,
            Ability::Wisdom => self.wisdom,
            Ability::Charisma => self.charisma,
        }
    }

    pub fn set(&mut self, ability: Ability, value: u8) {
        match ability {
            Ability::Strength => self.strength = value,
            Ability::Dexterity => self.dexterity = value,
            Ability::Constitution => self.constitution = value,
            Ability::Intelligence => self.intelligence = value,
            Ability::Wisdom => self.wisdom = value,
            Ability::Charisma => self.charisma = value,
        }
    }

    /// Ability modifier, rounding down for odd scores below 10.
    pub fn modifier(&self, ability: Ability) -> i32 {
        (self.get(ability) as i32 - 10).div_euclid(2)
    }
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::new(10, 10, 10, 10, 10, 10)
    }
}

// ============================================================================
// Classes
// ============================================================================

/// D&D character classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CharacterClass {
    Barbarian,
    Bard,
    Cleric,
    Druid,
    Fighter,
    Monk,
    Paladin,
    Ranger,
    Rogue,
    Sorcerer,
    Warlock,
    Wizard,
}

impl CharacterClass {
    /// Number of sides on the class hit die.
    pub fn hit_die(&self) -> u32 {
        match self {
            CharacterClass::Barbarian => 12,
            CharacterClass::Fighter | CharacterClass::Paladin | CharacterClass::Ranger => 10,
            CharacterClass::Bard
            | CharacterClass::Cleric
            | CharacterClass::Druid
            | CharacterClass::Monk
            | CharacterClass::Rogue
            | CharacterClass::Warlock => 8,
            CharacterClass::Sorcerer | CharacterClass::Wizard => 6,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CharacterClass::Barbarian => "Barbarian",
            CharacterClass::Bard => "Bard",
            CharacterClass::Cleric => "Cleric",
            CharacterClass::Druid => "Druid",
            CharacterClass::Fighter => "Fighter",
            CharacterClass::Monk => "Monk",
            CharacterClass::Paladin => "Paladin",
            CharacterClass::Ranger => "Ranger",
            CharacterClass::Rogue => "Rogue",
            CharacterClass::Sorcerer => "Sorcerer",
            CharacterClass::Warlock => "Warlock",
            CharacterClass::Wizard => "Wizard",
        }
    }

    /// Spellcasting ability. Fighters and Rogues only cast through an
    /// arcane subclass, which uses Intelligence.
    pub fn spellcasting_ability(&self) -> Option<Ability> {
        match self {
            CharacterClass::Bard
            | CharacterClass::Sorcerer
            | CharacterClass::Warlock
            | CharacterClass::Paladin => Some(Ability::Charisma),
            CharacterClass::Cleric | CharacterClass::Druid | CharacterClass::Ranger => {
                Some(Ability::Wisdom)
            }
            CharacterClass::Wizard | CharacterClass::Fighter | CharacterClass::Rogue => {
                Some(Ability::Intelligence)
            }
            CharacterClass::Barbarian | CharacterClass::Monk => None,
        }
    }

    /// Saving throw proficiencies granted by the class.
    pub fn saving_throws(&self) -> [Ability; 2] {
        match self {
            CharacterClass::Barbarian | CharacterClass::Fighter => {
                [Ability::Strength, Ability::Constitution]
            }
            CharacterClass::Bard => [Ability::Dexterity, Ability::Charisma],
            CharacterClass::Cleric | CharacterClass::Paladin | CharacterClass::Warlock => {
                [Ability::Wisdom, Ability::Charisma]
            }
            CharacterClass::Druid | CharacterClass::Wizard => {
                [Ability::Intelligence, Ability::Wisdom]
            }
            CharacterClass::Monk | CharacterClass::Ranger => {
                [Ability::Strength, Ability::Dexterity]
            }
            CharacterClass::Rogue => [Ability::Dexterity, Ability::Intelligence],
            CharacterClass::Sorcerer => [Ability::Constitution, Ability::Charisma],
        }
    }

    /// Subclasses that grant third-caster spellcasting to this class.
    pub fn casting_subclass(&self) -> Option<ThirdCasterSubclass> {
        match self {
            CharacterClass::Fighter => Some(ThirdCasterSubclass::EldritchKnight),
            CharacterClass::Rogue => Some(ThirdCasterSubclass::ArcaneTrickster),
            _ => None,
        }
    }
}

impl fmt::Display for CharacterClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Proficiency bonus by total level.
pub fn proficiency_bonus_for_level(level: u8) -> i32 {
    match level {
        0..=4 => 2,
        5..=8 => 3,
        9..=12 => 4,
        13..=16 => 5,
        _ => 6,
    }
}

// ============================================================================
// Character
// ============================================================================

/// A party member as the rest of the application stores it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Character {
    pub id: CharacterId,
    pub name: String,
    pub class: CharacterClass,
    pub level: u8,
    pub experience: u32,
    pub ability_scores: AbilityScores,

    pub hp: i32,
    pub max_hp: i32,
    pub armor_class: u8,

    pub conditions: Vec<StatusEffectInstance>,
    /// Exhaustion level, 0 to 6.
    pub exhaustion: u8,

    pub spellcasting: Option<Spellcaster>,
    pub attacks: Vec<Attack>,
}

impl Character {
    /// A level 1 character with hit points, AC and an unarmed strike derived
    /// from its class and ability scores.
    pub fn new(name: impl Into<String>, class: CharacterClass, ability_scores: AbilityScores) -> Self {
        let con_mod = ability_scores.modifier(Ability::Constitution);
        let max_hp = (class.hit_die() as i32 + con_mod).max(1);
        let str_mod = ability_scores.modifier(Ability::Strength);

        Self {
            id: CharacterId::new(),
            name: name.into(),
            class,
            level: 1,
            experience: 0,
            ability_scores,
            hp: max_hp,
            max_hp,
            armor_class: (10 + ability_scores.modifier(Ability::Dexterity)).max(0) as u8,
            conditions: Vec::new(),
            exhaustion: 0,
            spellcasting: Spellcaster::for_class(class, 1),
            attacks: vec![Attack::new(
                "Unarmed Strike",
                proficiency_bonus_for_level(1) + str_mod,
                (1 + str_mod).max(1).to_string(),
                DamageType::Bludgeoning,
            )],
        }
    }

    /// Jump straight to `level`, using average hit point growth. Intended for
    /// building pre-levelled characters; regular play goes through
    /// [`progression::level_up`](crate::progression::level_up).
    pub fn with_level(mut self, level: u8) -> Self {
        let level = level.clamp(1, 20);
        let con_mod = self.ability_scores.modifier(Ability::Constitution);
        let die = self.class.hit_die() as i32;
        let per_level = (die / 2 + 1 + con_mod).max(1);

        self.level = level;
        self.max_hp = (die + con_mod).max(1) + per_level * (level as i32 - 1);
        self.hp = self.max_hp;
        self.experience = self.experience.max(crate::progression::xp_for_level(level));
        if let Some(ref mut caster) = self.spellcasting {
            caster.sync_level(level);
        }
        self
    }

    pub fn with_armor_class(mut self, ac: u8) -> Self {
        self.armor_class = ac;
        self
    }

    /// Replace the default unarmed strike with real attacks.
    pub fn with_attacks(mut self, attacks: Vec<Attack>) -> Self {
        self.attacks = attacks;
        self
    }

    /// Pick a casting subclass. A choice the class cannot take is logged and
    /// ignored; use [`Spellcaster::choose_subclass`] to handle the error.
    pub fn with_subclass(mut self, subclass: ThirdCasterSubclass) -> Self {
        let result = match self.spellcasting {
            Some(ref mut caster) => caster.choose_subclass(subclass),
            None => Err(crate::error::EngineError::SubclassNotAvailable {
                subclass: subclass.name().to_string(),
                class: self.class.name().to_string(),
            }),
        };
        if let Err(e) = result {
            warn!(character = %self.name, error = %e, "subclass not applied");
        }
        self
    }

    pub fn proficiency_bonus(&self) -> i32 {
        proficiency_bonus_for_level(self.level)
    }

    pub fn initiative_modifier(&self) -> i32 {
        self.ability_scores.modifier(Ability::Dexterity)
    }

    pub fn saving_throw_modifier(&self, ability: Ability) -> i32 {
        let base = self.ability_scores.modifier(ability);
        if self.class.saving_throws().contains(&ability) {
            base + self.proficiency_bonus()
        } else {
            base
        }
    }

    pub fn subclass(&self) -> Option<ThirdCasterSubclass> {
        self.spellcasting.as_ref().and_then(|c| c.subclass)
    }

    pub fn concentration_spell(&self) -> Option<&str> {
        self.spellcasting
            .as_ref()
            .and_then(|c| c.concentration.as_deref())
    }

    pub fn is_dead(&self) -> bool {
        self.hp <= 0 || self.exhaustion >= crate::effects::MAX_EXHAUSTION
    }
}
