//! Play out a seeded skirmish and print the transcript.
//!
//! Run with: `cargo run -p dnd-engine --example skirmish -- [seed]`

use dnd_engine::{
    monsters, AbilityScores, Attack, Character, CharacterClass, DamageType, RulesEngine,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn main() {
    let seed = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(42);
    let mut rng = StdRng::seed_from_u64(seed);
    let engine = RulesEngine::default();

    let mut party = vec![
        Character::new("Kira Stonefist", CharacterClass::Fighter, AbilityScores::new(16, 12, 16, 8, 12, 10))
            .with_level(3)
            .with_armor_class(18)
            .with_attacks(vec![Attack::new("Battleaxe", 5, "1d8+3", DamageType::Slashing)]),
        Character::new("Vaeris Moonwhisper", CharacterClass::Wizard, AbilityScores::new(8, 14, 12, 16, 12, 10))
            .with_level(3)
            .with_attacks(vec![Attack::new("Quarterstaff", 1, "1d6-1", DamageType::Bludgeoning)]),
    ];
    let enemies = match monsters::spawn_encounter(&[("Goblin", 3), ("Wolf", 1)]) {
        Ok(enemies) => enemies,
        Err(e) => {
            eprintln!("Could not build the encounter: {e}");
            return;
        }
    };

    println!("=== The Goblin Ambush (seed {seed}) ===\n");
    let (mut state, intro) = engine.start_combat(&party, enemies, &mut rng);
    print_lines(&intro.log);

    while state.is_active() && state.round <= 20 {
        let Some(current) = state.current().cloned() else {
            break;
        };
        let result = if current.is_enemy {
            engine.run_enemy_turn(&mut state, &mut rng)
        } else {
            let targets: Vec<_> = state.living_enemies().map(|e| e.id).collect();
            if current.caster.is_some() && targets.len() > 1 {
                engine
                    .cast_spell(&mut state, current.id, "Burning Hands", &targets, None, &mut rng)
                    .or_else(|_| engine.cast_spell(&mut state, current.id, "Fire Bolt", &targets[..1], None, &mut rng))
            } else {
                engine.execute_attack(&mut state, current.id, targets[0], 0, &mut rng)
            }
        };
        match result {
            Ok(res) => print_lines(&res.log),
            Err(e) => println!("  ({} cannot act: {e})", current.name),
        }
        if state.is_active() {
            if let Ok(res) = engine.end_turn(&mut state, &mut rng) {
                print_lines(&res.log);
            }
        }
    }

    let outro = engine.finish_combat(&state, &mut party);
    print_lines(&outro.log);
    println!();
    for member in &party {
        println!(
            "{}: {}/{} HP, {} XP",
            member.name, member.hp, member.max_hp, member.experience
        );
    }
}

fn print_lines(lines: &[String]) {
    for line in lines {
        println!("  {line}");
    }
}
