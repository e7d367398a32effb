//! Concentration tracking.
//!
//! A caster holds at most one concentration spell, stored on its
//! [`Spellcaster`] record so it survives outside combat.

use crate::character::Ability;
use crate::combat::Combatant;
use crate::effects::{self, EffectType, SaveResult};
use crate::spellcasting::Spellcaster;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Conditions that end concentration on application, with no save.
pub const BREAKING_CONDITIONS: [EffectType; 5] = [
    EffectType::Incapacitated,
    EffectType::Stunned,
    EffectType::Paralyzed,
    EffectType::Unconscious,
    EffectType::Petrified,
];

/// DC of the Constitution save after taking `damage`.
pub fn concentration_dc(damage: i32) -> i32 {
    (damage / 2).max(10)
}

/// Start concentrating on `spell`, dropping whatever was held before.
/// Returns the dropped spell.
pub fn begin(caster: &mut Spellcaster, spell: &str) -> Option<String> {
    let previous = caster.concentration.replace(spell.to_string());
    if let Some(ref old) = previous {
        info!(dropped = %old, spell, "concentration replaced");
    }
    previous
}

/// Stop concentrating. Returns the spell that ended, if any.
pub fn end(caster: &mut Spellcaster) -> Option<String> {
    let ended = caster.concentration.take();
    if let Some(ref spell) = ended {
        info!(spell = %spell, "concentration ended");
    }
    ended
}

/// Outcome of one concentration check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcentrationCheck {
    pub spell: String,
    pub dc: i32,
    /// `None` when the caster dropped to 0 HP and lost concentration outright.
    pub save: Option<SaveResult>,
    pub maintained: bool,
}

/// Check concentration after one damage event. Call once per event, however
/// many dice or missiles made it up.
pub fn check_on_damage<R: Rng + ?Sized>(
    combatant: &mut Combatant,
    damage: i32,
    rng: &mut R,
) -> Option<ConcentrationCheck> {
    if damage <= 0 {
        return None;
    }
    let spell = combatant.caster.as_ref()?.concentration.clone()?;
    let dc = concentration_dc(damage);

    if combatant.hp <= 0 {
        combatant.caster.as_mut().and_then(end);
        return Some(ConcentrationCheck {
            spell,
            dc,
            save: None,
            maintained: false,
        });
    }

    let save = effects::roll_saving_throw(combatant, Ability::Constitution, dc, rng);
    let maintained = save.success;
    if !maintained {
        combatant.caster.as_mut().and_then(end);
    }
    Some(ConcentrationCheck {
        spell,
        dc,
        save: Some(save),
        maintained,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{AbilityScores, CharacterClass};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn concentrating_caster(con: u8) -> Combatant {
        let mut combatant = Combatant::new(
            "Mira",
            20,
            12,
            AbilityScores::new(10, 10, con, 10, 16, 10),
        );
        let mut caster = Spellcaster::for_class(CharacterClass::Cleric, 5).unwrap();
        caster.concentration = Some("Bless".to_string());
        combatant.caster = Some(caster);
        combatant
    }

    #[test]
    fn test_dc_floor() {
        assert_eq!(concentration_dc(1), 10);
        assert_eq!(concentration_dc(21), 10);
        assert_eq!(concentration_dc(22), 11);
        assert_eq!(concentration_dc(40), 20);
    }

    #[test]
    fn test_begin_replaces() {
        let mut caster = Spellcaster::for_class(CharacterClass::Wizard, 5).unwrap();
        assert_eq!(begin(&mut caster, "Hold Person"), None);
        assert_eq!(begin(&mut caster, "Haste").as_deref(), Some("Hold Person"));
        assert_eq!(caster.concentration.as_deref(), Some("Haste"));
        assert_eq!(end(&mut caster).as_deref(), Some("Haste"));
        assert_eq!(end(&mut caster), None);
    }

    #[test]
    fn test_failed_save_clears() {
        let mut rng = StdRng::seed_from_u64(4);
        // CON 1 gives -5; DC 50 cannot be met
        let mut combatant = concentrating_caster(1);
        combatant.hp = 10;
        let check = check_on_damage(&mut combatant, 100, &mut rng).unwrap();
        assert_eq!(check.dc, 50);
        assert!(!check.maintained);
        assert!(combatant.caster.as_ref().unwrap().concentration.is_none());
    }

    #[test]
    fn test_easy_save_keeps_concentration() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut combatant = concentrating_caster(30);
        // +10 CON always beats DC 10
        let check = check_on_damage(&mut combatant, 4, &mut rng).unwrap();
        assert!(check.maintained);
        assert_eq!(
            combatant.caster.as_ref().unwrap().concentration.as_deref(),
            Some("Bless")
        );
    }

    #[test]
    fn test_zero_hp_drops_without_save() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut combatant = concentrating_caster(30);
        combatant.hp = 0;
        let check = check_on_damage(&mut combatant, 20, &mut rng).unwrap();
        assert!(check.save.is_none());
        assert!(!check.maintained);
    }

    #[test]
    fn test_no_check_without_concentration() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut combatant = concentrating_caster(10);
        combatant.caster.as_mut().unwrap().concentration = None;
        assert!(check_on_damage(&mut combatant, 10, &mut rng).is_none());
    }
}
