//! Spellcasting, slot economy and concentration through the rules engine.

use dnd_engine::combat::{CombatEvent, CombatState, Combatant};
use dnd_engine::effects::{self, BonusDie};
use dnd_engine::{
    concentration, monsters, progression, spellcasting, AbilityScores, Attack, Character,
    CharacterClass, DamageType, DurationType, EffectType, EngineError, RulesEngine,
    StatusEffectInstance,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn setup() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn wizard(level: u8) -> Character {
    Character::new("Elara", CharacterClass::Wizard, AbilityScores::new(8, 14, 14, 16, 12, 10))
        .with_level(level)
}

fn warlock(level: u8) -> Character {
    Character::new("Vex", CharacterClass::Warlock, AbilityScores::new(8, 14, 14, 10, 12, 16))
        .with_level(level)
}

fn cleric(level: u8) -> Character {
    Character::new("Brother Aldous", CharacterClass::Cleric, AbilityScores::new(12, 10, 1, 10, 16, 12))
        .with_level(level)
}

/// A fight where `hero` acts first against the given enemies.
fn duel(hero: &Character, enemies: Vec<Combatant>) -> CombatState {
    let mut combatants = vec![Combatant::from_character(hero).with_initiative(30)];
    combatants.extend(enemies.into_iter().map(|e| e.with_initiative(1)));
    CombatState::new(combatants)
}

fn sturdy(name: &str) -> Combatant {
    Combatant::new(name, 500, 12, AbilityScores::default()).as_enemy()
}

// =============================================================================
// Magic Missile
// =============================================================================

#[test]
fn test_magic_missile_never_misses_a_goblin() {
    setup();
    let engine = RulesEngine::default();
    let mut rng = StdRng::seed_from_u64(100);

    for _ in 0..25 {
        let elara = wizard(5);
        let mut state = duel(&elara, monsters::spawn("Goblin", 1).unwrap());
        let caster = state.combatants[0].id;
        let goblin = state.combatants[1].id;

        let res = engine
            .cast_spell(&mut state, caster, "Magic Missile", &[goblin], None, &mut rng)
            .unwrap();

        let raw = res
            .events
            .iter()
            .find_map(|e| match e {
                CombatEvent::AttackRolled { hit, total, .. } => {
                    assert!(*hit);
                    Some(*total)
                }
                _ => None,
            })
            .unwrap();
        // Three darts of 1d4+1
        assert!((6..=15).contains(&raw));

        let goblin_after = state.get(goblin).unwrap();
        assert_eq!(goblin_after.hp, (7 - raw).max(0));
        assert_eq!(goblin_after.is_dead, raw >= 7);
        assert_eq!(res.damage_to(goblin), raw.min(7));
        assert!(res
            .events
            .iter()
            .any(|e| matches!(e, CombatEvent::SlotSpent { level: 1, remaining: 3, .. })));
    }
}

// =============================================================================
// Pact magic
// =============================================================================

#[test]
fn test_pact_slots_run_out_and_return_on_short_rest() {
    setup();
    let engine = RulesEngine::default();
    let mut rng = StdRng::seed_from_u64(7);
    let mut party = vec![warlock(5)];
    let mut state = duel(&party[0], vec![sturdy("Ogre")]);
    let vex = state.combatants[0].id;
    let ogre = state.combatants[1].id;

    // Level 5 warlock: two 3rd-level pact slots, even for a 1st-level spell
    for remaining in [1, 0] {
        let res = engine
            .cast_spell(&mut state, vex, "hex", &[ogre], Some(1), &mut rng)
            .unwrap();
        assert!(res.events.iter().any(|e| matches!(
            e,
            CombatEvent::SlotSpent { level: 3, remaining: r, .. } if *r == remaining
        )));
    }
    assert!(matches!(
        engine.cast_spell(&mut state, vex, "hex", &[ogre], None, &mut rng),
        Err(EngineError::NoSlotsRemaining { level: 3 })
    ));
    // Cantrips need no slot
    assert!(engine
        .cast_spell(&mut state, vex, "eldritch blast", &[ogre], None, &mut rng)
        .is_ok());

    state.write_back(&mut party);
    let slots = &party[0].spellcasting.as_ref().unwrap().slots;
    assert_eq!(slots.available(3), 0);

    assert!(progression::short_rest(&mut party[0]));
    let caster = party[0].spellcasting.as_ref().unwrap();
    assert_eq!(caster.slots.available(3), 2);
    assert!(spellcasting::can_cast(caster, dnd_engine::spells::get_spell("hex").unwrap(), None));
}

#[test]
fn test_pact_cap_blocks_high_level_spells() {
    let engine = RulesEngine::default();
    let mut rng = StdRng::seed_from_u64(8);
    let vex = warlock(1);
    let mut state = duel(&vex, vec![sturdy("Ogre")]);
    let caster = state.combatants[0].id;
    let ogre = state.combatants[1].id;
    assert!(matches!(
        engine.cast_spell(&mut state, caster, "hold person", &[ogre], None, &mut rng),
        Err(EngineError::SpellLevelExceedsPactCap { spell_level: 2, pact_level: 1, .. })
    ));
    assert_eq!(state.combatants[0].caster.as_ref().unwrap().slots.available(1), 1);
}

// =============================================================================
// Concentration
// =============================================================================

#[test]
fn test_new_concentration_spell_replaces_the_old_one() {
    setup();
    let engine = RulesEngine::default();
    let mut rng = StdRng::seed_from_u64(3);
    let aldous = cleric(5);
    let mut state = duel(&aldous, vec![sturdy("Troll"), sturdy("Ogre")]);
    let caster = state.combatants[0].id;
    let troll = state.combatants[1].id;
    let ogre = state.combatants[2].id;
    // DC 21 against a -5 CHA save cannot be made
    state.combatants[0].abilities.wisdom = 30;
    for c in &mut state.combatants[1..] {
        c.abilities.charisma = 1;
    }

    engine
        .cast_spell(&mut state, caster, "bane", &[troll, ogre], None, &mut rng)
        .unwrap();
    assert!(state.get(troll).unwrap().has_effect(EffectType::Baned));
    assert!(state.get(ogre).unwrap().has_effect(EffectType::Baned));
    assert_eq!(state.combatants[0].concentration(), Some("Bane"));

    let res = engine
        .cast_spell(&mut state, caster, "bless", &[caster], None, &mut rng)
        .unwrap();
    assert_eq!(state.combatants[0].concentration(), Some("Bless"));
    assert!(!state.get(troll).unwrap().has_effect(EffectType::Baned));
    assert!(!state.get(ogre).unwrap().has_effect(EffectType::Baned));
    assert!(state.combatants[0].has_effect(EffectType::Blessed));
    assert!(res.events.iter().any(|e| matches!(
        e,
        CombatEvent::ConcentrationEnded { spell, .. } if spell == "Bane"
    )));
}

#[test]
fn test_heavy_damage_breaks_concentration() {
    setup();
    let engine = RulesEngine::default();
    let mut rng = StdRng::seed_from_u64(4);
    let aldous = cleric(5);
    let brute = Combatant::new("Brute", 50, 10, AbilityScores::default())
        .as_enemy()
        .with_attacks(vec![Attack::new("Slam", 40, "40", DamageType::Bludgeoning)]);
    let mut state = duel(&aldous, vec![brute]);
    state.combatants[0].hp = 100;
    state.combatants[0].max_hp = 100;
    let caster = state.combatants[0].id;

    engine
        .cast_spell(&mut state, caster, "shield of faith", &[caster], None, &mut rng)
        .unwrap();
    assert_eq!(state.combatants[0].effective_ac(), state.combatants[0].ac + 2);
    engine.end_turn(&mut state, &mut rng).unwrap();

    // DC 20 against a -5 CON save cannot be made
    let mut broken = false;
    for _ in 0..5 {
        let res = engine.run_enemy_turn(&mut state, &mut rng).unwrap();
        if res.any_hit() {
            assert!(res.events.iter().any(|e| matches!(
                e,
                CombatEvent::ConcentrationChecked { dc: 20, maintained: false, .. }
            )));
            broken = true;
            break;
        }
        engine.end_turn(&mut state, &mut rng).unwrap();
        engine.end_turn(&mut state, &mut rng).unwrap();
    }
    assert!(broken);
    let aldous = &state.combatants[0];
    assert!(aldous.is_alive());
    assert!(aldous.concentration().is_none());
    assert!(!aldous.has_effect(EffectType::ShieldOfFaith));
}

#[test]
fn test_stunned_caster_loses_concentration() {
    let engine = RulesEngine::default();
    let mut rng = StdRng::seed_from_u64(5);
    let aldous = cleric(3);
    let mut state = duel(&aldous, vec![sturdy("Ogre")]);
    let caster = state.combatants[0].id;

    engine
        .cast_spell(&mut state, caster, "bless", &[caster], None, &mut rng)
        .unwrap();
    let outcome = effects::apply(
        &mut state.combatants[0],
        StatusEffectInstance::new(EffectType::Stunned, 1, DurationType::Rounds),
    );
    assert_eq!(outcome.broke_concentration.as_deref(), Some("Bless"));
    assert!(state.combatants[0].concentration().is_none());

    // No save is involved, however good the caster's CON would be
    let mut hardy = Combatant::new("Hardy", 40, 10, AbilityScores::new(10, 10, 30, 10, 10, 10))
        .with_caster(aldous.spellcasting.clone().unwrap());
    concentration::begin(hardy.caster.as_mut().unwrap(), "Bless");
    let outcome = effects::apply(
        &mut hardy,
        StatusEffectInstance::new(EffectType::Paralyzed, 0, DurationType::SaveEnds),
    );
    assert!(outcome.broke_concentration.is_some());
}

#[test]
fn test_blessed_attacks_roll_the_bonus_die() {
    let mut rng = StdRng::seed_from_u64(6);
    let mut hero = Combatant::new("Hero", 20, 12, AbilityScores::default());
    let target = Combatant::new("Target", 20, 12, AbilityScores::default()).as_enemy();
    effects::apply(
        &mut hero,
        StatusEffectInstance::new(EffectType::Blessed, 10, DurationType::Rounds),
    );
    let mods = effects::attack_modifiers(&hero, &target);
    assert_eq!(mods.bonus_dice.len(), 1);
    let BonusDie { sign, .. } = mods.bonus_dice[0];
    assert_eq!(sign, 1);
    for _ in 0..20 {
        let bonus = effects::roll_bonus_dice(&mods.bonus_dice, &mut rng);
        assert!((1..=4).contains(&bonus));
    }
}
