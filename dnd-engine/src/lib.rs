//! D&D 5e combat rules engine.
//!
//! This crate provides:
//! - Dice expressions and d20 rolls with advantage
//! - Status effects with stacking, durations and damage over time
//! - Spell slots for full, half, third and pact casters
//! - Concentration tracking and cleanup
//! - Turn-based combat with attacks, spells and automated enemies
//! - An enemy catalog, experience and levelling
//!
//! Every random operation takes an injected [`rand::Rng`], so a seeded RNG
//! gives a reproducible fight.
//!
//! # Quick Start
//!
//! ```
//! use dnd_engine::{monsters, AbilityScores, Character, CharacterClass, RulesEngine};
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//!
//! let mut rng = StdRng::seed_from_u64(7);
//! let engine = RulesEngine::default();
//! let mut party = vec![Character::new(
//!     "Elara",
//!     CharacterClass::Wizard,
//!     AbilityScores::new(8, 14, 14, 16, 12, 10),
//! )
//! .with_level(5)];
//! let goblins = monsters::spawn("Goblin", 2).unwrap();
//!
//! let (mut state, log) = engine.start_combat(&party, goblins, &mut rng);
//! assert!(!log.log.is_empty());
//! while state.is_active() && state.round < 20 {
//!     if state.current().is_some_and(|c| c.is_enemy) {
//!         engine.run_enemy_turn(&mut state, &mut rng).unwrap();
//!     }
//!     if state.is_active() {
//!         engine.end_turn(&mut state, &mut rng).unwrap();
//!     }
//! }
//! engine.finish_combat(&state, &mut party);
//! ```

pub mod casting;
pub mod character;
pub mod combat;
pub mod concentration;
pub mod config;
pub mod dice;
pub mod effects;
pub mod error;
pub mod monsters;
pub mod progression;
pub mod rules;
pub mod spellcasting;
pub mod spells;

// Primary public API
pub use character::{Ability, AbilityScores, Character, CharacterClass, CharacterId};
pub use combat::{
    Attack, CombatEnd, CombatEvent, CombatPhase, CombatResult, CombatState, Combatant,
    CombatantId, DamageType, Resolution,
};
pub use config::{EnemyTargeting, EngineConfig, HitPointGrowth};
pub use dice::{Advantage, DiceExpression, RollResult};
pub use effects::{DurationType, EffectType, StatusEffectInstance};
pub use error::{EngineError, EngineResult};
pub use monsters::EnemyTemplate;
pub use progression::LevelUpChoice;
pub use rules::RulesEngine;
pub use spellcasting::{CasterType, SpellSlotPool, Spellcaster, ThirdCasterSubclass};
pub use spells::{ResolutionStrategy, SpellData};
