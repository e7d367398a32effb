//! Experience, levelling and rests.

use crate::character::{Ability, Character};
use crate::combat::CombatState;
use crate::config::HitPointGrowth;
use crate::effects::{self, DurationType, EffectType};
use crate::error::{EngineError, EngineResult};
use crate::spellcasting::{self, ThirdCasterSubclass};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const MAX_LEVEL: u8 = 20;

/// Total experience needed to reach each level, 1 through 20.
pub const XP_THRESHOLDS: [u32; 20] = [
    0, 300, 900, 2700, 6500, 14000, 23000, 34000, 48000, 64000, 85000, 100000, 120000, 140000,
    165000, 195000, 225000, 265000, 305000, 355000,
];

/// Levels that grant an ability score improvement.
pub const ASI_LEVELS: [u8; 5] = [4, 8, 12, 16, 19];

/// Level at which the subclass is chosen.
pub const SUBCLASS_LEVEL: u8 = 3;

const ABILITY_SCORE_CAP: u8 = 20;

pub fn xp_for_level(level: u8) -> u32 {
    let level = level.clamp(1, MAX_LEVEL);
    XP_THRESHOLDS[(level - 1) as usize]
}

pub fn level_for_xp(xp: u32) -> u8 {
    XP_THRESHOLDS
        .iter()
        .rposition(|&threshold| xp >= threshold)
        .map(|idx| (idx + 1) as u8)
        .unwrap_or(1)
}

/// Add experience. Returns true when the character now qualifies for at
/// least one level-up.
pub fn gain_experience(character: &mut Character, amount: u32) -> bool {
    character.experience = character.experience.saturating_add(amount);
    debug!(character = %character.name, amount, total = character.experience, "experience gained");
    level_for_xp(character.experience) > character.level
}

// ============================================================================
// Level Up
// ============================================================================

/// The decision a player makes when levelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelUpChoice {
    /// +1 to each ability; naming the same ability twice gives +2.
    AbilityScoreImprovement(Ability, Ability),
    Subclass(ThirdCasterSubclass),
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUp {
    pub new_level: u8,
    pub hp_gained: i32,
    /// Slot maxima after the level-up, for casters.
    pub slots: Option<[u8; 9]>,
}

/// Advance one level. Checks experience and the choice first, and leaves
/// the character untouched if either is wrong.
pub fn level_up<R: Rng + ?Sized>(
    character: &mut Character,
    choice: LevelUpChoice,
    growth: HitPointGrowth,
    rng: &mut R,
) -> EngineResult<LevelUp> {
    if character.level >= MAX_LEVEL {
        return Err(EngineError::InvalidLevelUpChoice(format!(
            "{} is already level {MAX_LEVEL}",
            character.name
        )));
    }
    let new_level = character.level + 1;
    let needed = xp_for_level(new_level);
    if character.experience < needed {
        return Err(EngineError::InsufficientExperience {
            name: character.name.clone(),
            level: new_level,
            needed,
        });
    }

    let mut scores = character.ability_scores;
    let mut caster = character.spellcasting.clone();
    match choice {
        LevelUpChoice::AbilityScoreImprovement(first, second) => {
            if !ASI_LEVELS.contains(&new_level) {
                return Err(EngineError::InvalidLevelUpChoice(format!(
                    "no ability score improvement at level {new_level}"
                )));
            }
            for ability in [first, second] {
                let raised = scores.get(ability) + 1;
                if raised > ABILITY_SCORE_CAP {
                    return Err(EngineError::InvalidLevelUpChoice(format!(
                        "{} cannot exceed {ABILITY_SCORE_CAP}",
                        ability.name()
                    )));
                }
                scores.set(ability, raised);
            }
        }
        LevelUpChoice::Subclass(subclass) => {
            if new_level != SUBCLASS_LEVEL {
                return Err(EngineError::InvalidLevelUpChoice(format!(
                    "subclasses are chosen at level {SUBCLASS_LEVEL}"
                )));
            }
            let Some(c) = caster.as_mut() else {
                return Err(EngineError::SubclassNotAvailable {
                    subclass: subclass.name().to_string(),
                    class: character.class.name().to_string(),
                });
            };
            c.choose_subclass(subclass)?;
        }
        LevelUpChoice::None => {
            if ASI_LEVELS.contains(&new_level) {
                return Err(EngineError::InvalidLevelUpChoice(format!(
                    "level {new_level} requires an ability score improvement"
                )));
            }
        }
    }

    let con_mod = scores.modifier(Ability::Constitution);
    let die = character.class.hit_die();
    let base = match growth {
        HitPointGrowth::Average => (die / 2 + 1) as i32,
        HitPointGrowth::Rolled => rng.gen_range(1..=die) as i32,
    };
    let hp_gained = (base + con_mod).max(1);

    // A CON increase raises hit points for every earlier level too.
    let retro = (con_mod - character.ability_scores.modifier(Ability::Constitution))
        * character.level as i32;

    character.level = new_level;
    character.ability_scores = scores;
    character.max_hp += hp_gained + retro;
    character.hp = (character.hp + hp_gained + retro).clamp(0, character.max_hp);
    if let Some(ref mut c) = caster {
        c.sync_level(new_level);
    }
    character.spellcasting = caster;

    info!(character = %character.name, level = new_level, hp_gained, "level up");
    Ok(LevelUp {
        new_level,
        hp_gained: hp_gained + retro,
        slots: character.spellcasting.as_ref().map(|c| c.slots.max),
    })
}

// ============================================================================
// Experience Awards
// ============================================================================

/// Experience for every enemy that fell in the encounter.
pub fn encounter_xp(state: &CombatState) -> u32 {
    state
        .combatants
        .iter()
        .filter(|c| c.is_enemy && c.is_dead)
        .map(|c| c.xp_value)
        .sum()
}

/// Split `xp` evenly between the living party members. Any remainder is
/// lost. Returns each recipient's name and share.
pub fn award_experience(party: &mut [Character], xp: u32) -> Vec<(String, u32)> {
    let living = party.iter().filter(|c| !c.is_dead()).count() as u32;
    if living == 0 || xp == 0 {
        return Vec::new();
    }
    let share = xp / living;
    party
        .iter_mut()
        .filter(|c| !c.is_dead())
        .map(|c| {
            if gain_experience(c, share) {
                info!(character = %c.name, "ready to level up");
            }
            (c.name.clone(), share)
        })
        .collect()
}

// ============================================================================
// Rests
// ============================================================================

/// Short rest. Pact casters regain their slots. Returns true if any slots
/// came back.
pub fn short_rest(character: &mut Character) -> bool {
    let restored = character
        .spellcasting
        .as_mut()
        .is_some_and(spellcasting::short_rest);
    effects::advance_time(&mut character.conditions, 60);
    restored
}

/// Long rest: full hit points, every slot, one level of exhaustion removed
/// and eight hours of effects elapsed. Concentration ends.
pub fn long_rest(character: &mut Character) -> Vec<EffectType> {
    if character.is_dead() {
        return Vec::new();
    }
    character.hp = character.max_hp;
    character.exhaustion = character.exhaustion.saturating_sub(1);
    if let Some(ref mut caster) = character.spellcasting {
        spellcasting::long_rest(caster);
        caster.concentration = None;
    }

    let mut expired = effects::advance_time(&mut character.conditions, 8 * 60);
    character.conditions.retain(|c| {
        let keep = !matches!(
            c.duration_type,
            DurationType::Concentration | DurationType::SaveEnds
        );
        if !keep {
            expired.push(c.effect_type);
        }
        keep
    });
    info!(character = %character.name, "long rest");
    expired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{AbilityScores, CharacterClass};
    use crate::effects::StatusEffectInstance;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fighter() -> Character {
        Character::new(
            "Bram",
            CharacterClass::Fighter,
            AbilityScores::new(16, 12, 14, 10, 10, 8),
        )
    }

    #[test]
    fn test_xp_thresholds() {
        assert_eq!(xp_for_level(1), 0);
        assert_eq!(xp_for_level(5), 6500);
        assert_eq!(xp_for_level(20), 355000);
        assert_eq!(level_for_xp(0), 1);
        assert_eq!(level_for_xp(299), 1);
        assert_eq!(level_for_xp(300), 2);
        assert_eq!(level_for_xp(400000), 20);
    }

    #[test]
    fn test_level_up_requires_experience() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut bram = fighter();
        let before = bram.clone();
        assert!(matches!(
            level_up(&mut bram, LevelUpChoice::None, HitPointGrowth::Average, &mut rng),
            Err(EngineError::InsufficientExperience { level: 2, needed: 300, .. })
        ));
        assert_eq!(bram.level, before.level);
        assert_eq!(bram.max_hp, before.max_hp);

        assert!(gain_experience(&mut bram, 300));
        let up = level_up(&mut bram, LevelUpChoice::None, HitPointGrowth::Average, &mut rng).unwrap();
        // d10: 6 + 2 CON
        assert_eq!(up.hp_gained, 8);
        assert_eq!(bram.level, 2);
        assert_eq!(bram.max_hp, 20);
    }

    #[test]
    fn test_subclass_and_asi_choices() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut bram = fighter().with_level(2);
        bram.experience = xp_for_level(4);

        assert!(matches!(
            level_up(
                &mut bram,
                LevelUpChoice::Subclass(ThirdCasterSubclass::ArcaneTrickster),
                HitPointGrowth::Average,
                &mut rng
            ),
            Err(EngineError::SubclassNotAvailable { .. })
        ));
        let up = level_up(
            &mut bram,
            LevelUpChoice::Subclass(ThirdCasterSubclass::EldritchKnight),
            HitPointGrowth::Average,
            &mut rng,
        )
        .unwrap();
        assert_eq!(up.slots.unwrap()[0], 2);
        assert_eq!(bram.subclass(), Some(ThirdCasterSubclass::EldritchKnight));

        assert!(matches!(
            level_up(&mut bram, LevelUpChoice::None, HitPointGrowth::Average, &mut rng),
            Err(EngineError::InvalidLevelUpChoice(_))
        ));
        let max_hp = bram.max_hp;
        level_up(
            &mut bram,
            LevelUpChoice::AbilityScoreImprovement(Ability::Constitution, Ability::Constitution),
            HitPointGrowth::Average,
            &mut rng,
        )
        .unwrap();
        assert_eq!(bram.ability_scores.constitution, 16);
        // 6 + 3 CON, plus 1 for each of the three earlier levels
        assert_eq!(bram.max_hp, max_hp + 12);
    }

    #[test]
    fn test_rolled_growth_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..20 {
            let mut bram = fighter();
            bram.experience = 300;
            let up = level_up(&mut bram, LevelUpChoice::None, HitPointGrowth::Rolled, &mut rng).unwrap();
            assert!((3..=12).contains(&up.hp_gained));
        }
    }

    #[test]
    fn test_award_skips_the_fallen() {
        let mut party = vec![fighter(), fighter(), fighter()];
        party[2].hp = 0;
        let awards = award_experience(&mut party, 101);
        assert_eq!(awards.len(), 2);
        assert!(awards.iter().all(|(_, share)| *share == 50));
        assert_eq!(party[0].experience, 50);
        assert_eq!(party[2].experience, 0);
    }

    #[test]
    fn test_rests() {
        let mut warlock = Character::new(
            "Vex",
            CharacterClass::Warlock,
            AbilityScores::new(8, 14, 12, 10, 10, 16),
        )
        .with_level(5);
        let mut wizard = Character::new(
            "Elara",
            CharacterClass::Wizard,
            AbilityScores::new(8, 14, 12, 16, 10, 10),
        )
        .with_level(5);
        for c in [&mut warlock, &mut wizard] {
            let caster = c.spellcasting.as_mut().unwrap();
            let level = if caster.class == CharacterClass::Warlock { 3 } else { 1 };
            assert!(caster.slots.spend(level));
        }

        assert!(short_rest(&mut warlock));
        assert!(!short_rest(&mut wizard));
        assert!(warlock.spellcasting.as_ref().unwrap().slots.is_full());
        assert!(!wizard.spellcasting.as_ref().unwrap().slots.is_full());

        wizard.hp = 3;
        wizard.exhaustion = 2;
        wizard.spellcasting.as_mut().unwrap().concentration = Some("Haste".to_string());
        wizard.conditions.push(StatusEffectInstance::new(EffectType::Poisoned, 10, DurationType::Rounds));
        wizard.conditions.push(StatusEffectInstance::new(EffectType::Hasted, 10, DurationType::Concentration));
        let expired = long_rest(&mut wizard);
        assert_eq!(wizard.hp, wizard.max_hp);
        assert_eq!(wizard.exhaustion, 1);
        assert!(wizard.spellcasting.as_ref().unwrap().slots.is_full());
        assert!(wizard.concentration_spell().is_none());
        assert!(wizard.conditions.is_empty());
        assert_eq!(expired.len(), 2);
    }
}
