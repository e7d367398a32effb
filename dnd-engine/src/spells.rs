//! Spell database.
//!
//! Each spell carries a [`ResolutionStrategy`] tag that picks how a cast is
//! resolved, so casting never dispatches on spell names.

use crate::character::Ability;
use crate::combat::DamageType;
use crate::dice::{DiceError, DiceExpression};
use crate::effects::{DurationType, EffectType};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

/// Schools of magic in D&D.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpellSchool {
    Abjuration,
    Conjuration,
    Divination,
    Enchantment,
    Evocation,
    Illusion,
    Necromancy,
    Transmutation,
}

impl SpellSchool {
    pub fn name(&self) -> &'static str {
        match self {
            SpellSchool::Abjuration => "Abjuration",
            SpellSchool::Conjuration => "Conjuration",
            SpellSchool::Divination => "Divination",
            SpellSchool::Enchantment => "Enchantment",
            SpellSchool::Evocation => "Evocation",
            SpellSchool::Illusion => "Illusion",
            SpellSchool::Necromancy => "Necromancy",
            SpellSchool::Transmutation => "Transmutation",
        }
    }
}

/// How a cast of the spell is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionStrategy {
    /// Never misses; missiles are split between targets.
    AutoHitMultiHit,
    /// Every target saves; half damage on a success.
    SaveHalfAoE,
    /// One target saves against damage and/or an effect.
    SingleSaveEffect,
    /// One spell attack roll against AC.
    SingleAttackRoll,
    Healing,
    /// Applies an effect and deals no damage.
    StatusOnly,
}

/// What a successful save does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SaveOutcome {
    HalfDamage,
    Negates,
}

/// How spell dice scale with level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DamageScaling {
    /// Cantrip scaling: increases at character levels 5, 11, 17
    CantripScaling,
    /// Extra dice (or missiles) per slot level above the spell's level
    PerSlotLevel { extra_dice: u32 },
    None,
}

/// Status effect a spell places on its targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellEffect {
    pub effect_type: EffectType,
    pub duration: i32,
    pub duration_type: DurationType,
}

impl SpellEffect {
    pub fn new(effect_type: EffectType, duration: i32, duration_type: DurationType) -> Self {
        Self {
            effect_type,
            duration,
            duration_type,
        }
    }
}

/// Complete spell definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpellData {
    pub name: String,
    pub level: u8, // 0 for cantrips
    pub school: SpellSchool,
    pub concentration: bool,
    pub description: String,
    pub resolution: ResolutionStrategy,

    pub damage_dice: Option<String>,
    pub damage_type: Option<DamageType>,
    pub damage_scaling: DamageScaling,
    pub healing_dice: Option<String>,
    pub save_type: Option<Ability>,
    pub save_outcome: Option<SaveOutcome>,
    pub applies: Option<SpellEffect>,
    /// Targets per cast; `None` for area spells that hit everyone chosen.
    pub max_targets: Option<usize>,
    /// Missiles fired at the base level (auto-hit spells only).
    pub missiles: u32,
}

impl SpellData {
    pub fn new(
        name: impl Into<String>,
        level: u8,
        school: SpellSchool,
        resolution: ResolutionStrategy,
    ) -> Self {
        Self {
            name: name.into(),
            level,
            school,
            concentration: false,
            description: String::new(),
            resolution,
            damage_dice: None,
            damage_type: None,
            damage_scaling: DamageScaling::None,
            healing_dice: None,
            save_type: None,
            save_outcome: None,
            applies: None,
            max_targets: Some(1),
            missiles: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_damage(mut self, dice: &str, damage_type: DamageType) -> Self {
        self.damage_dice = Some(dice.to_string());
        self.damage_type = Some(damage_type);
        self
    }

    pub fn with_healing(mut self, dice: &str) -> Self {
        self.healing_dice = Some(dice.to_string());
        self
    }

    pub fn with_scaling(mut self, scaling: DamageScaling) -> Self {
        self.damage_scaling = scaling;
        self
    }

    pub fn with_upcast(self, extra_dice: u32) -> Self {
        self.with_scaling(DamageScaling::PerSlotLevel { extra_dice })
    }

    pub fn with_save(mut self, ability: Ability, outcome: SaveOutcome) -> Self {
        self.save_type = Some(ability);
        self.save_outcome = Some(outcome);
        self
    }

    pub fn with_effect(mut self, effect: SpellEffect) -> Self {
        self.applies = Some(effect);
        self
    }

    pub fn with_max_targets(mut self, max: Option<usize>) -> Self {
        self.max_targets = max;
        self
    }

    pub fn with_missiles(mut self, missiles: u32) -> Self {
        self.missiles = missiles;
        self
    }

    pub fn concentration(mut self) -> Self {
        self.concentration = true;
        self
    }

    /// Check if this is a cantrip.
    pub fn is_cantrip(&self) -> bool {
        self.level == 0
    }

    /// Concentration comes from the spell's own flag or the known-spell set.
    pub fn requires_concentration(&self) -> bool {
        self.concentration || CONCENTRATION_SPELLS.contains(self.name.to_lowercase().as_str())
    }

    /// Multiplier on cantrip damage dice by character level.
    pub fn cantrip_dice_count(&self, caster_level: u8) -> u32 {
        match caster_level {
            0..=4 => 1,
            5..=10 => 2,
            11..=16 => 3,
            _ => 4,
        }
    }

    fn levels_above_base(&self, slot_level: u8) -> u32 {
        slot_level.saturating_sub(self.level) as u32
    }

    fn scale(&self, base: &str, caster_level: u8, slot_level: u8) -> Result<DiceExpression, DiceError> {
        let expr = DiceExpression::parse(base)?;
        Ok(match self.damage_scaling {
            DamageScaling::CantripScaling => expr.scaled(self.cantrip_dice_count(caster_level)),
            DamageScaling::PerSlotLevel { extra_dice }
                if self.resolution != ResolutionStrategy::AutoHitMultiHit =>
            {
                let extra = extra_dice * self.levels_above_base(slot_level);
                expr.with_count(expr.count + extra)
            }
            _ => expr,
        })
    }

    /// Damage dice for a cast at `slot_level` by a character of
    /// `caster_level`. For auto-hit spells this is the damage of one missile.
    pub fn damage_dice_at(
        &self,
        caster_level: u8,
        slot_level: u8,
    ) -> Result<Option<DiceExpression>, DiceError> {
        self.damage_dice
            .as_deref()
            .map(|d| self.scale(d, caster_level, slot_level))
            .transpose()
    }

    pub fn healing_dice_at(
        &self,
        caster_level: u8,
        slot_level: u8,
    ) -> Result<Option<DiceExpression>, DiceError> {
        self.healing_dice
            .as_deref()
            .map(|d| self.scale(d, caster_level, slot_level))
            .transpose()
    }

    /// Missiles fired at `slot_level`. Upcasting adds missiles, not dice.
    pub fn missile_count(&self, slot_level: u8) -> u32 {
        match self.damage_scaling {
            DamageScaling::PerSlotLevel { extra_dice } => {
                self.missiles + extra_dice * self.levels_above_base(slot_level)
            }
            _ => self.missiles,
        }
    }
}

// ============================================================================
// Spell Database
// ============================================================================

/// Spells that always require concentration, whatever their entry says.
static CONCENTRATION_SPELLS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "bless",
        "bane",
        "hex",
        "hunter's mark",
        "shield of faith",
        "faerie fire",
        "tasha's hideous laughter",
        "hold person",
        "invisibility",
        "haste",
        "slow",
        "hold monster",
    ]
    .into_iter()
    .collect()
});

/// Global spell database.
static SPELL_DATABASE: LazyLock<HashMap<String, SpellData>> = LazyLock::new(build_spell_database);

/// Look up a spell by name (case-insensitive).
pub fn get_spell(name: &str) -> Option<&'static SpellData> {
    SPELL_DATABASE.get(&name.trim().to_lowercase())
}

/// Get all spells in the database.
pub fn all_spells() -> impl Iterator<Item = &'static SpellData> {
    SPELL_DATABASE.values()
}

/// Get all spells of a specific level.
pub fn spells_by_level(level: u8) -> impl Iterator<Item = &'static SpellData> {
    SPELL_DATABASE.values().filter(move |s| s.level == level)
}

fn build_spell_database() -> HashMap<String, SpellData> {
    use DurationType::*;
    use ResolutionStrategy::*;
    use SpellSchool::*;

    let spells = vec![
        // ====================================================================
        // CANTRIPS (Level 0)
        // ====================================================================
        SpellData::new("Fire Bolt", 0, Evocation, SingleAttackRoll)
            .with_description("A mote of fire streaks toward a creature: ranged spell attack, 1d10 fire.")
            .with_damage("1d10", DamageType::Fire)
            .with_scaling(DamageScaling::CantripScaling),
        SpellData::new("Eldritch Blast", 0, Evocation, SingleAttackRoll)
            .with_description("A beam of crackling energy: ranged spell attack, 1d10 force.")
            .with_damage("1d10", DamageType::Force)
            .with_scaling(DamageScaling::CantripScaling),
        SpellData::new("Sacred Flame", 0, Evocation, SingleSaveEffect)
            .with_description("Radiance descends on a creature, which must succeed on a DEX save or take 1d8 radiant.")
            .with_damage("1d8", DamageType::Radiant)
            .with_scaling(DamageScaling::CantripScaling)
            .with_save(Ability::Dexterity, SaveOutcome::Negates),
        SpellData::new("Ray of Frost", 0, Evocation, SingleAttackRoll)
            .with_description("A frigid beam: ranged spell attack, 1d8 cold, and the target's speed drops by 10 feet.")
            .with_damage("1d8", DamageType::Cold)
            .with_scaling(DamageScaling::CantripScaling)
            .with_effect(SpellEffect::new(EffectType::Chilled, 1, Rounds)),
        SpellData::new("Vicious Mockery", 0, Enchantment, SingleSaveEffect)
            .with_description("A string of insults: WIS save or take 1d4 psychic and have disadvantage on the next attack.")
            .with_damage("1d4", DamageType::Psychic)
            .with_scaling(DamageScaling::CantripScaling)
            .with_save(Ability::Wisdom, SaveOutcome::Negates)
            .with_effect(SpellEffect::new(EffectType::Mocked, 1, Rounds)),
        // ====================================================================
        // 1ST LEVEL
        // ====================================================================
        SpellData::new("Magic Missile", 1, Evocation, AutoHitMultiHit)
            .with_description("Three glowing darts of magical force, each dealing 1d4+1 force. One more dart per slot level above 1st.")
            .with_damage("1d4+1", DamageType::Force)
            .with_missiles(3)
            .with_upcast(1)
            .with_max_targets(Some(3)),
        SpellData::new("Burning Hands", 1, Evocation, SaveHalfAoE)
            .with_description("A thin sheet of flames: DEX save, 3d6 fire, half on a success.")
            .with_damage("3d6", DamageType::Fire)
            .with_upcast(1)
            .with_save(Ability::Dexterity, SaveOutcome::HalfDamage)
            .with_max_targets(None),
        SpellData::new("Thunderwave", 1, Evocation, SaveHalfAoE)
            .with_description("A wave of thunderous force: CON save, 2d8 thunder, half on a success.")
            .with_damage("2d8", DamageType::Thunder)
            .with_upcast(1)
            .with_save(Ability::Constitution, SaveOutcome::HalfDamage)
            .with_max_targets(None),
        SpellData::new("Cure Wounds", 1, Evocation, Healing)
            .with_description("A creature you touch regains 1d8 + your spellcasting modifier hit points.")
            .with_healing("1d8")
            .with_upcast(1),
        SpellData::new("Healing Word", 1, Evocation, Healing)
            .with_description("A creature you can see regains 1d4 + your spellcasting modifier hit points.")
            .with_healing("1d4")
            .with_upcast(1),
        SpellData::new("Guiding Bolt", 1, Evocation, SingleAttackRoll)
            .with_description("A flash of light: ranged spell attack, 4d6 radiant, and the next attack against the target has advantage.")
            .with_damage("4d6", DamageType::Radiant)
            .with_upcast(1)
            .with_effect(SpellEffect::new(EffectType::Illuminated, 1, Rounds)),
        SpellData::new("Inflict Wounds", 1, Necromancy, SingleAttackRoll)
            .with_description("Melee spell attack, 3d10 necrotic.")
            .with_damage("3d10", DamageType::Necrotic)
            .with_upcast(1),
        SpellData::new("Bless", 1, Enchantment, StatusOnly)
            .with_description("Up to three creatures add 1d4 to attack rolls and saving throws.")
            .with_effect(SpellEffect::new(EffectType::Blessed, 10, Concentration))
            .with_max_targets(Some(3)),
        SpellData::new("Bane", 1, Enchantment, StatusOnly)
            .with_description("Up to three creatures must make a CHA save or subtract 1d4 from attack rolls and saving throws.")
            .with_save(Ability::Charisma, SaveOutcome::Negates)
            .with_effect(SpellEffect::new(EffectType::Baned, 10, Concentration))
            .with_max_targets(Some(3)),
        SpellData::new("Hex", 1, Enchantment, StatusOnly)
            .with_description("Curse a creature: your hits deal an extra 1d6 necrotic to it.")
            .with_effect(SpellEffect::new(EffectType::Hexed, 600, Concentration)),
        SpellData::new("Hunter's Mark", 1, Divination, StatusOnly)
            .with_description("Mark a quarry: your weapon hits deal an extra 1d6 damage to it.")
            .with_effect(SpellEffect::new(EffectType::HuntersMarked, 600, Concentration)),
        SpellData::new("Shield of Faith", 1, Abjuration, StatusOnly)
            .with_description("A shimmering field grants +2 AC.")
            .with_effect(SpellEffect::new(EffectType::ShieldOfFaith, 100, Concentration)),
        SpellData::new("Faerie Fire", 1, Evocation, StatusOnly)
            .with_description("Creatures in the area must make a DEX save or be outlined in light, granting advantage to attackers.")
            .with_save(Ability::Dexterity, SaveOutcome::Negates)
            .with_effect(SpellEffect::new(EffectType::Outlined, 10, Concentration))
            .with_max_targets(None),
        SpellData::new("Tasha's Hideous Laughter", 1, Enchantment, StatusOnly)
            .with_description("A creature must make a WIS save or fall into fits of laughter, incapacitated until it saves.")
            .with_save(Ability::Wisdom, SaveOutcome::Negates)
            .with_effect(SpellEffect::new(EffectType::Incapacitated, 0, SaveEnds)),
        // ====================================================================
        // 2ND LEVEL
        // ====================================================================
        SpellData::new("Hold Person", 2, Enchantment, StatusOnly)
            .with_description("A humanoid must make a WIS save or be paralyzed, repeating the save at the end of each turn.")
            .with_save(Ability::Wisdom, SaveOutcome::Negates)
            .with_effect(SpellEffect::new(EffectType::Paralyzed, 0, SaveEnds))
            .concentration(),
        SpellData::new("Shatter", 2, Evocation, SaveHalfAoE)
            .with_description("A ringing burst: CON save, 3d8 thunder, half on a success.")
            .with_damage("3d8", DamageType::Thunder)
            .with_upcast(1)
            .with_save(Ability::Constitution, SaveOutcome::HalfDamage)
            .with_max_targets(None),
        SpellData::new("Blindness/Deafness", 2, Necromancy, StatusOnly)
            .with_description("A creature must make a CON save or be blinded, repeating the save at the end of each turn.")
            .with_save(Ability::Constitution, SaveOutcome::Negates)
            .with_effect(SpellEffect::new(EffectType::Blinded, 0, SaveEnds)),
        SpellData::new("Melf's Acid Arrow", 2, Evocation, SingleAttackRoll)
            .with_description("A shimmering arrow: ranged spell attack, 4d4 acid, and the acid keeps burning.")
            .with_damage("4d4", DamageType::Acid)
            .with_upcast(1)
            .with_effect(SpellEffect::new(EffectType::Corroded, 1, Rounds)),
        SpellData::new("Invisibility", 2, Illusion, StatusOnly)
            .with_description("A creature you touch becomes invisible.")
            .with_effect(SpellEffect::new(EffectType::Invisible, 60, Concentration)),
        // ====================================================================
        // 3RD LEVEL
        // ====================================================================
        SpellData::new("Fireball", 3, Evocation, SaveHalfAoE)
            .with_description("A bright streak blossoms into an explosion: DEX save, 8d6 fire, half on a success.")
            .with_damage("8d6", DamageType::Fire)
            .with_upcast(1)
            .with_save(Ability::Dexterity, SaveOutcome::HalfDamage)
            .with_max_targets(None),
        SpellData::new("Lightning Bolt", 3, Evocation, SaveHalfAoE)
            .with_description("A 100-foot line of lightning: DEX save, 8d6 lightning, half on a success.")
            .with_damage("8d6", DamageType::Lightning)
            .with_upcast(1)
            .with_save(Ability::Dexterity, SaveOutcome::HalfDamage)
            .with_max_targets(None),
        SpellData::new("Haste", 3, Transmutation, StatusOnly)
            .with_description("A willing creature gains +2 AC, doubled speed and an extra action.")
            .with_effect(SpellEffect::new(EffectType::Hasted, 10, Concentration)),
        SpellData::new("Slow", 3, Transmutation, StatusOnly)
            .with_description("Up to six creatures must make a WIS save or be slowed.")
            .with_save(Ability::Wisdom, SaveOutcome::Negates)
            .with_effect(SpellEffect::new(EffectType::Slowed, 0, SaveEnds))
            .with_max_targets(Some(6)),
        SpellData::new("Mass Healing Word", 3, Evocation, Healing)
            .with_description("Up to six creatures regain 1d4 + your spellcasting modifier hit points.")
            .with_healing("1d4")
            .with_upcast(1)
            .with_max_targets(Some(6)),
        // ====================================================================
        // 4TH AND 5TH LEVEL
        // ====================================================================
        SpellData::new("Blight", 4, Necromancy, SingleSaveEffect)
            .with_description("Necromantic energy drains moisture: CON save, 8d8 necrotic, half on a success.")
            .with_damage("8d8", DamageType::Necrotic)
            .with_upcast(1)
            .with_save(Ability::Constitution, SaveOutcome::HalfDamage),
        SpellData::new("Cone of Cold", 5, Evocation, SaveHalfAoE)
            .with_description("A blast of cold air: CON save, 8d8 cold, half on a success.")
            .with_damage("8d8", DamageType::Cold)
            .with_upcast(1)
            .with_save(Ability::Constitution, SaveOutcome::HalfDamage)
            .with_max_targets(None),
        SpellData::new("Hold Monster", 5, Enchantment, StatusOnly)
            .with_description("A creature must make a WIS save or be paralyzed, repeating the save at the end of each turn.")
            .with_save(Ability::Wisdom, SaveOutcome::Negates)
            .with_effect(SpellEffect::new(EffectType::Paralyzed, 0, SaveEnds))
            .concentration(),
    ];

    spells
        .into_iter()
        .map(|s| (s.name.to_lowercase(), s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_spell() {
        let spell = get_spell("fireball").unwrap();
        assert_eq!(spell.name, "Fireball");
        assert_eq!(spell.level, 3);
        assert_eq!(spell.resolution, ResolutionStrategy::SaveHalfAoE);
    }

    #[test]
    fn test_case_insensitive_lookup() {
        assert!(get_spell("MAGIC MISSILE").is_some());
        assert!(get_spell("Hunter's Mark").is_some());
        assert!(get_spell("wish").is_none());
    }

    #[test]
    fn test_cantrip_scaling() {
        let fire_bolt = get_spell("fire bolt").unwrap();
        let at = |level| fire_bolt.damage_dice_at(level, 0).unwrap().unwrap().to_string();
        assert_eq!(at(1), "1d10");
        assert_eq!(at(5), "2d10");
        assert_eq!(at(11), "3d10");
        assert_eq!(at(17), "4d10");
    }

    #[test]
    fn test_upcast_adds_dice() {
        let fireball = get_spell("fireball").unwrap();
        assert_eq!(
            fireball.damage_dice_at(5, 3).unwrap(),
            Some(DiceExpression::new(8, 6, 0))
        );
        assert_eq!(
            fireball.damage_dice_at(9, 5).unwrap(),
            Some(DiceExpression::new(10, 6, 0))
        );
        let cure = get_spell("cure wounds").unwrap();
        assert_eq!(cure.healing_dice_at(3, 2).unwrap().unwrap().count, 2);
    }

    #[test]
    fn test_upcast_magic_missile_adds_darts() {
        let missile = get_spell("magic missile").unwrap();
        assert_eq!(missile.missile_count(1), 3);
        assert_eq!(missile.missile_count(3), 5);
        // Each dart stays 1d4+1
        assert_eq!(
            missile.damage_dice_at(5, 3).unwrap(),
            Some(DiceExpression::new(1, 4, 1))
        );
    }

    #[test]
    fn test_concentration_flag_or_known_set() {
        assert!(get_spell("hold person").unwrap().requires_concentration());
        assert!(get_spell("bless").unwrap().requires_concentration());
        assert!(!get_spell("bless").unwrap().concentration);
        assert!(!get_spell("fireball").unwrap().requires_concentration());
        assert!(!get_spell("blindness/deafness").unwrap().requires_concentration());
    }

    #[test]
    fn test_catalog_is_well_formed() {
        for spell in all_spells() {
            assert!(spell.damage_dice_at(20, 9).is_ok(), "{}", spell.name);
            assert!(spell.healing_dice_at(20, 9).is_ok(), "{}", spell.name);
            match spell.resolution {
                ResolutionStrategy::AutoHitMultiHit => assert!(spell.missiles > 0),
                ResolutionStrategy::SaveHalfAoE | ResolutionStrategy::SingleSaveEffect => {
                    assert!(spell.save_type.is_some() && spell.damage_dice.is_some())
                }
                ResolutionStrategy::SingleAttackRoll => assert!(spell.damage_dice.is_some()),
                ResolutionStrategy::Healing => assert!(spell.healing_dice.is_some()),
                ResolutionStrategy::StatusOnly => assert!(spell.applies.is_some()),
            }
        }
    }

    #[test]
    fn test_spells_by_level() {
        assert!(spells_by_level(0).all(|s| s.is_cantrip()));
        assert!(spells_by_level(3).count() >= 4);
    }
}
