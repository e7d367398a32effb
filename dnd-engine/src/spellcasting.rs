//! Spell slot economy.
//!
//! Four slot progressions exist: full casters, half casters, Warlock pact
//! magic (all slots at a single level, recovered on a short rest) and the
//! third-caster subclasses (Eldritch Knight, Arcane Trickster) which only
//! gain slots once the subclass is chosen.

use crate::character::{proficiency_bonus_for_level, Ability, AbilityScores, CharacterClass};
use crate::error::{EngineError, EngineResult};
use crate::spells::SpellData;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Subclasses that turn a martial class into a third caster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThirdCasterSubclass {
    EldritchKnight,
    ArcaneTrickster,
}

impl ThirdCasterSubclass {
    pub fn name(&self) -> &'static str {
        match self {
            ThirdCasterSubclass::EldritchKnight => "Eldritch Knight",
            ThirdCasterSubclass::ArcaneTrickster => "Arcane Trickster",
        }
    }

    /// The class this subclass belongs to.
    pub fn class(&self) -> CharacterClass {
        match self {
            ThirdCasterSubclass::EldritchKnight => CharacterClass::Fighter,
            ThirdCasterSubclass::ArcaneTrickster => CharacterClass::Rogue,
        }
    }
}

impl fmt::Display for ThirdCasterSubclass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Slot progression a caster follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CasterType {
    NonCaster,
    Full,
    Half,
    Pact,
    /// `None` until the qualifying subclass has been chosen.
    Third(Option<ThirdCasterSubclass>),
}

impl CasterType {
    pub fn for_class(class: CharacterClass, subclass: Option<ThirdCasterSubclass>) -> Self {
        match class {
            CharacterClass::Bard
            | CharacterClass::Cleric
            | CharacterClass::Druid
            | CharacterClass::Sorcerer
            | CharacterClass::Wizard => CasterType::Full,
            CharacterClass::Paladin | CharacterClass::Ranger => CasterType::Half,
            CharacterClass::Warlock => CasterType::Pact,
            CharacterClass::Fighter | CharacterClass::Rogue => CasterType::Third(subclass),
            CharacterClass::Barbarian | CharacterClass::Monk => CasterType::NonCaster,
        }
    }
}

// ============================================================================
// Slot Tables
// ============================================================================

const FULL_CASTER_SLOTS: [[u8; 9]; 20] = [
    [2, 0, 0, 0, 0, 0, 0, 0, 0],
    [3, 0, 0, 0, 0, 0, 0, 0, 0],
    [4, 2, 0, 0, 0, 0, 0, 0, 0],
    [4, 3, 0, 0, 0, 0, 0, 0, 0],
    [4, 3, 2, 0, 0, 0, 0, 0, 0],
    [4, 3, 3, 0, 0, 0, 0, 0, 0],
    [4, 3, 3, 1, 0, 0, 0, 0, 0],
    [4, 3, 3, 2, 0, 0, 0, 0, 0],
    [4, 3, 3, 3, 1, 0, 0, 0, 0],
    [4, 3, 3, 3, 2, 0, 0, 0, 0],
    [4, 3, 3, 3, 2, 1, 0, 0, 0],
    [4, 3, 3, 3, 2, 1, 0, 0, 0],
    [4, 3, 3, 3, 2, 1, 1, 0, 0],
    [4, 3, 3, 3, 2, 1, 1, 0, 0],
    [4, 3, 3, 3, 2, 1, 1, 1, 0],
    [4, 3, 3, 3, 2, 1, 1, 1, 0],
    [4, 3, 3, 3, 2, 1, 1, 1, 1],
    [4, 3, 3, 3, 3, 1, 1, 1, 1],
    [4, 3, 3, 3, 3, 2, 1, 1, 1],
    [4, 3, 3, 3, 3, 2, 2, 1, 1],
];

// Paladins and Rangers gain spellcasting at level 2.
const HALF_CASTER_SLOTS: [[u8; 9]; 20] = [
    [0, 0, 0, 0, 0, 0, 0, 0, 0],
    [2, 0, 0, 0, 0, 0, 0, 0, 0],
    [3, 0, 0, 0, 0, 0, 0, 0, 0],
    [3, 0, 0, 0, 0, 0, 0, 0, 0],
    [4, 2, 0, 0, 0, 0, 0, 0, 0],
    [4, 2, 0, 0, 0, 0, 0, 0, 0],
    [4, 3, 0, 0, 0, 0, 0, 0, 0],
    [4, 3, 0, 0, 0, 0, 0, 0, 0],
    [4, 3, 2, 0, 0, 0, 0, 0, 0],
    [4, 3, 2, 0, 0, 0, 0, 0, 0],
    [4, 3, 3, 0, 0, 0, 0, 0, 0],
    [4, 3, 3, 0, 0, 0, 0, 0, 0],
    [4, 3, 3, 1, 0, 0, 0, 0, 0],
    [4, 3, 3, 1, 0, 0, 0, 0, 0],
    [4, 3, 3, 2, 0, 0, 0, 0, 0],
    [4, 3, 3, 2, 0, 0, 0, 0, 0],
    [4, 3, 3, 3, 1, 0, 0, 0, 0],
    [4, 3, 3, 3, 1, 0, 0, 0, 0],
    [4, 3, 3, 3, 2, 0, 0, 0, 0],
    [4, 3, 3, 3, 2, 0, 0, 0, 0],
];

// First slots at level 3, never above spell level 4.
const THIRD_CASTER_SLOTS: [[u8; 9]; 20] = [
    [0, 0, 0, 0, 0, 0, 0, 0, 0],
    [0, 0, 0, 0, 0, 0, 0, 0, 0],
    [2, 0, 0, 0, 0, 0, 0, 0, 0],
    [3, 0, 0, 0, 0, 0, 0, 0, 0],
    [3, 0, 0, 0, 0, 0, 0, 0, 0],
    [3, 0, 0, 0, 0, 0, 0, 0, 0],
    [4, 2, 0, 0, 0, 0, 0, 0, 0],
    [4, 2, 0, 0, 0, 0, 0, 0, 0],
    [4, 2, 0, 0, 0, 0, 0, 0, 0],
    [4, 3, 0, 0, 0, 0, 0, 0, 0],
    [4, 3, 0, 0, 0, 0, 0, 0, 0],
    [4, 3, 0, 0, 0, 0, 0, 0, 0],
    [4, 3, 2, 0, 0, 0, 0, 0, 0],
    [4, 3, 2, 0, 0, 0, 0, 0, 0],
    [4, 3, 2, 0, 0, 0, 0, 0, 0],
    [4, 3, 3, 0, 0, 0, 0, 0, 0],
    [4, 3, 3, 0, 0, 0, 0, 0, 0],
    [4, 3, 3, 0, 0, 0, 0, 0, 0],
    [4, 3, 3, 1, 0, 0, 0, 0, 0],
    [4, 3, 3, 1, 0, 0, 0, 0, 0],
];

/// Pact magic: (number of slots, slot level) by Warlock level.
fn pact_progression(level: u8) -> (u8, u8) {
    match level {
        0 => (0, 0),
        1 => (1, 1),
        2 => (2, 1),
        3..=4 => (2, 2),
        5..=6 => (2, 3),
        7..=8 => (2, 4),
        9..=10 => (2, 5),
        11..=16 => (3, 5),
        _ => (4, 5),
    }
}

/// Pact slot level (1 to 5) for a Warlock of the given level.
pub fn pact_slot_level(level: u8) -> u8 {
    pact_progression(level).1
}

/// Maximum slots per spell level (index 0 = 1st level).
///
/// A third caster without its subclass, a non-caster, or level 0 all yield
/// an empty table.
pub fn slot_table(caster_type: CasterType, level: u8) -> [u8; 9] {
    if level == 0 {
        return [0; 9];
    }
    let row = (level.min(20) - 1) as usize;
    match caster_type {
        CasterType::Full => FULL_CASTER_SLOTS[row],
        CasterType::Half => HALF_CASTER_SLOTS[row],
        CasterType::Third(Some(_)) => THIRD_CASTER_SLOTS[row],
        CasterType::Pact => {
            let (count, slot_level) = pact_progression(level);
            let mut table = [0; 9];
            table[slot_level as usize - 1] = count;
            table
        }
        CasterType::Third(None) | CasterType::NonCaster => [0; 9],
    }
}

// ============================================================================
// Slot Pool
// ============================================================================

/// Current and maximum slots, indexed by spell level minus one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellSlotPool {
    pub max: [u8; 9],
    pub current: [u8; 9],
}

impl SpellSlotPool {
    /// A full pool.
    pub fn new(max: [u8; 9]) -> Self {
        Self { max, current: max }
    }

    pub fn available(&self, level: u8) -> u8 {
        match level {
            1..=9 => self.current[level as usize - 1],
            _ => 0,
        }
    }

    /// Spend one slot of `level`. Returns false if none is left.
    pub fn spend(&mut self, level: u8) -> bool {
        if !(1..=9).contains(&level) {
            return false;
        }
        let slot = &mut self.current[level as usize - 1];
        if *slot == 0 {
            return false;
        }
        *slot -= 1;
        true
    }

    pub fn restore_all(&mut self) {
        self.current = self.max;
    }

    /// Swap in a new maximum. Newly gained slots are immediately available and
    /// nothing exceeds the new maximum.
    pub fn resize(&mut self, max: [u8; 9]) {
        for i in 0..9 {
            let gained = max[i].saturating_sub(self.max[i]);
            self.current[i] = (self.current[i] + gained).min(max[i]);
        }
        self.max = max;
    }

    pub fn is_full(&self) -> bool {
        self.current == self.max
    }

    /// True when no slot index exceeds its maximum.
    pub fn is_consistent(&self) -> bool {
        self.current.iter().zip(self.max.iter()).all(|(c, m)| c <= m)
    }
}

impl Default for SpellSlotPool {
    fn default() -> Self {
        Self::new([0; 9])
    }
}

// ============================================================================
// Spellcaster
// ============================================================================

/// Caster record: class progression, slots and concentration.
///
/// Lives on the [`Character`](crate::character::Character) and is copied onto
/// the combatant for the duration of a fight, so concentration survives
/// outside combat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spellcaster {
    pub class: CharacterClass,
    pub level: u8,
    pub ability: Ability,
    /// Immutable once set.
    pub subclass: Option<ThirdCasterSubclass>,
    pub slots: SpellSlotPool,
    /// Name of the spell currently being concentrated on.
    pub concentration: Option<String>,
}

impl Spellcaster {
    /// Caster record for a class, or `None` for classes that never cast.
    pub fn for_class(class: CharacterClass, level: u8) -> Option<Self> {
        let ability = class.spellcasting_ability()?;
        let caster_type = CasterType::for_class(class, None);
        if caster_type == CasterType::NonCaster {
            return None;
        }
        Some(Self {
            class,
            level,
            ability,
            subclass: None,
            slots: SpellSlotPool::new(slot_table(caster_type, level)),
            concentration: None,
        })
    }

    pub fn caster_type(&self) -> CasterType {
        CasterType::for_class(self.class, self.subclass)
    }

    /// The single pact slot level, for Warlocks.
    pub fn pact_slot_level(&self) -> Option<u8> {
        match self.caster_type() {
            CasterType::Pact => Some(pact_slot_level(self.level)).filter(|&l| l > 0),
            _ => None,
        }
    }

    /// Record the class level and resize the slot pool to match.
    pub fn sync_level(&mut self, level: u8) {
        self.level = level;
        self.slots.resize(slot_table(self.caster_type(), level));
    }

    /// Choose the arcane subclass. Can happen exactly once.
    pub fn choose_subclass(&mut self, subclass: ThirdCasterSubclass) -> EngineResult<()> {
        if let Some(existing) = self.subclass {
            return Err(EngineError::SubclassAlreadyChosen {
                name: self.class.name().to_string(),
                subclass: existing.name().to_string(),
            });
        }
        if subclass.class() != self.class {
            return Err(EngineError::SubclassNotAvailable {
                subclass: subclass.name().to_string(),
                class: self.class.name().to_string(),
            });
        }
        self.subclass = Some(subclass);
        self.slots.resize(slot_table(self.caster_type(), self.level));
        debug!(class = %self.class, subclass = %subclass, "subclass chosen");
        Ok(())
    }

    pub fn proficiency_bonus(&self) -> i32 {
        proficiency_bonus_for_level(self.level)
    }

    pub fn spell_save_dc(&self, scores: &AbilityScores) -> i32 {
        (8 + self.proficiency_bonus() + scores.modifier(self.ability)).max(8)
    }

    pub fn spell_attack_bonus(&self, scores: &AbilityScores) -> i32 {
        self.proficiency_bonus() + scores.modifier(self.ability)
    }

    pub fn is_concentrating(&self) -> bool {
        self.concentration.is_some()
    }
}

/// Which slot a successful cast used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastReceipt {
    /// `None` for cantrips.
    pub used_level: Option<u8>,
    /// Slots of that level left afterwards.
    pub remaining: u8,
}

/// Work out which slot level a cast would spend, without spending it.
pub fn slot_for_cast(
    caster: &Spellcaster,
    spell: &SpellData,
    chosen_slot: Option<u8>,
) -> EngineResult<Option<u8>> {
    if spell.is_cantrip() {
        return Ok(None);
    }

    match caster.caster_type() {
        CasterType::NonCaster => Err(EngineError::NotASpellcaster(caster.class.to_string())),
        CasterType::Third(None) => Err(EngineError::NoSubclassSelected(caster.class.to_string())),
        CasterType::Pact => {
            // The chosen slot is irrelevant: pact slots all share one level.
            let pact_level = pact_slot_level(caster.level);
            if pact_level == 0 {
                return Err(EngineError::NoSlotsRemaining { level: spell.level });
            }
            if spell.level > pact_level {
                return Err(EngineError::SpellLevelExceedsPactCap {
                    spell: spell.name.clone(),
                    spell_level: spell.level,
                    pact_level,
                });
            }
            if caster.slots.available(pact_level) == 0 {
                return Err(EngineError::NoSlotsRemaining { level: pact_level });
            }
            Ok(Some(pact_level))
        }
        CasterType::Full | CasterType::Half | CasterType::Third(Some(_)) => {
            let level = chosen_slot.unwrap_or(spell.level);
            if level < spell.level || level > 9 {
                return Err(EngineError::InvalidSlotLevel {
                    spell: spell.name.clone(),
                    slot: level,
                });
            }
            if caster.slots.available(level) == 0 {
                return Err(EngineError::NoSlotsRemaining { level });
            }
            Ok(Some(level))
        }
    }
}

/// Whether `spell` could be cast right now. Cantrips always can.
pub fn can_cast(caster: &Spellcaster, spell: &SpellData, chosen_slot: Option<u8>) -> bool {
    slot_for_cast(caster, spell, chosen_slot).is_ok()
}

/// Spend the slot for a cast.
pub fn cast(
    caster: &mut Spellcaster,
    spell: &SpellData,
    chosen_slot: Option<u8>,
) -> EngineResult<CastReceipt> {
    let Some(level) = slot_for_cast(caster, spell, chosen_slot)? else {
        return Ok(CastReceipt {
            used_level: None,
            remaining: 0,
        });
    };
    if !caster.slots.spend(level) {
        return Err(EngineError::NoSlotsRemaining { level });
    }
    let remaining = caster.slots.available(level);
    debug!(spell = %spell.name, level, remaining, "spell slot spent");
    Ok(CastReceipt {
        used_level: Some(level),
        remaining,
    })
}

/// Short rest: pact casters regain every slot, nobody else regains any.
/// Returns true if slots were restored.
pub fn short_rest(caster: &mut Spellcaster) -> bool {
    if caster.caster_type() == CasterType::Pact {
        caster.slots.restore_all();
        true
    } else {
        false
    }
}

/// Long rest: every caster regains every slot.
pub fn long_rest(caster: &mut Spellcaster) {
    caster.slots.restore_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spells::get_spell;

    fn spell(name: &str) -> &'static SpellData {
        get_spell(name).unwrap()
    }

    #[test]
    fn test_full_caster_table() {
        assert_eq!(slot_table(CasterType::Full, 1)[0], 2);
        assert_eq!(slot_table(CasterType::Full, 5)[..3], [4, 3, 2]);
        assert_eq!(slot_table(CasterType::Full, 20)[8], 1);
    }

    #[test]
    fn test_half_caster_starts_at_two() {
        assert_eq!(slot_table(CasterType::Half, 1), [0; 9]);
        assert_eq!(slot_table(CasterType::Half, 2)[0], 2);
        assert_eq!(slot_table(CasterType::Half, 20)[5..], [0, 0, 0, 0]);
    }

    #[test]
    fn test_pact_table_has_single_level() {
        for level in 1..=20 {
            let table = slot_table(CasterType::Pact, level);
            let nonzero: Vec<_> = table.iter().enumerate().filter(|(_, &n)| n > 0).collect();
            assert_eq!(nonzero.len(), 1, "level {level}");
            assert_eq!(nonzero[0].0 as u8 + 1, pact_slot_level(level));
        }
        assert_eq!(pact_slot_level(1), 1);
        assert_eq!(pact_slot_level(3), 2);
        assert_eq!(pact_slot_level(9), 5);
        assert_eq!(slot_table(CasterType::Pact, 3)[1], 2);
    }

    #[test]
    fn test_third_caster_needs_subclass() {
        assert_eq!(slot_table(CasterType::Third(None), 10), [0; 9]);
        let ek = CasterType::Third(Some(ThirdCasterSubclass::EldritchKnight));
        assert_eq!(slot_table(ek, 2), [0; 9]);
        assert_eq!(slot_table(ek, 3)[0], 2);
        // Capped at spell level 4
        assert!(slot_table(ek, 20)[4..].iter().all(|&n| n == 0));
        assert_eq!(slot_table(ek, 19)[3], 1);
    }

    #[test]
    fn test_cantrips_always_castable() {
        let caster = Spellcaster::for_class(CharacterClass::Fighter, 1).unwrap();
        assert!(can_cast(&caster, spell("fire bolt"), None));
    }

    #[test]
    fn test_third_caster_without_subclass_cannot_cast() {
        let mut caster = Spellcaster::for_class(CharacterClass::Fighter, 5).unwrap();
        let result = cast(&mut caster, spell("magic missile"), None);
        assert!(matches!(result, Err(EngineError::NoSubclassSelected(_))));

        caster
            .choose_subclass(ThirdCasterSubclass::EldritchKnight)
            .unwrap();
        assert_eq!(caster.slots.current[0], 3);
        assert!(cast(&mut caster, spell("magic missile"), None).is_ok());
    }

    #[test]
    fn test_subclass_is_immutable_and_class_checked() {
        let mut rogue = Spellcaster::for_class(CharacterClass::Rogue, 3).unwrap();
        assert!(matches!(
            rogue.choose_subclass(ThirdCasterSubclass::EldritchKnight),
            Err(EngineError::SubclassNotAvailable { .. })
        ));
        rogue
            .choose_subclass(ThirdCasterSubclass::ArcaneTrickster)
            .unwrap();
        assert!(matches!(
            rogue.choose_subclass(ThirdCasterSubclass::ArcaneTrickster),
            Err(EngineError::SubclassAlreadyChosen { .. })
        ));
    }

    #[test]
    fn test_pact_cast_ignores_chosen_slot() {
        let mut warlock = Spellcaster::for_class(CharacterClass::Warlock, 5).unwrap();
        let receipt = cast(&mut warlock, spell("hex"), Some(1)).unwrap();
        assert_eq!(receipt.used_level, Some(3));
        assert_eq!(warlock.slots.current[2], 1);
        assert_eq!(warlock.slots.current[0], 0);
    }

    #[test]
    fn test_pact_cap() {
        let mut warlock = Spellcaster::for_class(CharacterClass::Warlock, 3).unwrap();
        let result = cast(&mut warlock, spell("fireball"), None);
        assert!(matches!(
            result,
            Err(EngineError::SpellLevelExceedsPactCap { pact_level: 2, .. })
        ));
        assert!(warlock.slots.is_full());
    }

    #[test]
    fn test_upcast_requires_valid_slot() {
        let mut wizard = Spellcaster::for_class(CharacterClass::Wizard, 5).unwrap();
        let missile = spell("magic missile");
        assert_eq!(
            cast(&mut wizard, missile, Some(3)).unwrap().used_level,
            Some(3)
        );
        assert!(matches!(
            cast(&mut wizard, spell("fireball"), Some(2)),
            Err(EngineError::InvalidSlotLevel { .. })
        ));
        assert!(matches!(
            cast(&mut wizard, missile, Some(4)),
            Err(EngineError::NoSlotsRemaining { level: 4 })
        ));
    }

    #[test]
    fn test_short_rest_only_restores_pact() {
        let mut wizard = Spellcaster::for_class(CharacterClass::Wizard, 3).unwrap();
        cast(&mut wizard, spell("magic missile"), None).unwrap();
        assert!(!short_rest(&mut wizard));
        assert_eq!(wizard.slots.current[0], 3);

        long_rest(&mut wizard);
        assert!(wizard.slots.is_full());
    }

    #[test]
    fn test_level_up_grants_new_slots() {
        let mut cleric = Spellcaster::for_class(CharacterClass::Cleric, 2).unwrap();
        cast(&mut cleric, spell("cure wounds"), None).unwrap();
        cleric.sync_level(3);
        assert_eq!(cleric.slots.max[..2], [4, 2]);
        assert_eq!(cleric.slots.current[..2], [3, 2]);
        assert!(cleric.slots.is_consistent());
    }
}
