//! Enemy catalog and spawning.

use crate::character::{Ability, AbilityScores};
use crate::combat::{Attack, Combatant, DamageType, OnHitEffect};
use crate::effects::{DurationType, EffectType};
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Read-only stat block an enemy combatant is stamped from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemyTemplate {
    pub name: String,
    /// Challenge rating; fractional below 1.
    pub cr: f32,
    pub hp: i32,
    pub ac: i32,
    pub abilities: AbilityScores,
    pub attacks: Vec<Attack>,
    pub save_proficiencies: Vec<Ability>,
    pub resistances: Vec<DamageType>,
    pub vulnerabilities: Vec<DamageType>,
    pub immunities: Vec<DamageType>,
    pub condition_immunities: Vec<EffectType>,
    pub xp_value: u32,
}

impl EnemyTemplate {
    pub fn new(name: &str, cr: f32, hp: i32, ac: i32, xp_value: u32) -> Self {
        Self {
            name: name.to_string(),
            cr,
            hp,
            ac,
            abilities: AbilityScores::default(),
            attacks: Vec::new(),
            save_proficiencies: Vec::new(),
            resistances: Vec::new(),
            vulnerabilities: Vec::new(),
            immunities: Vec::new(),
            condition_immunities: Vec::new(),
            xp_value,
        }
    }

    pub fn with_abilities(mut self, str: u8, dex: u8, con: u8, int: u8, wis: u8, cha: u8) -> Self {
        self.abilities = AbilityScores::new(str, dex, con, int, wis, cha);
        self
    }

    pub fn with_attack(mut self, attack: Attack) -> Self {
        self.attacks.push(attack);
        self
    }

    pub fn with_saves(mut self, saves: Vec<Ability>) -> Self {
        self.save_proficiencies = saves;
        self
    }

    pub fn with_resistances(mut self, resistances: Vec<DamageType>) -> Self {
        self.resistances = resistances;
        self
    }

    pub fn with_vulnerabilities(mut self, vulnerabilities: Vec<DamageType>) -> Self {
        self.vulnerabilities = vulnerabilities;
        self
    }

    pub fn with_immunities(mut self, immunities: Vec<DamageType>) -> Self {
        self.immunities = immunities;
        self
    }

    pub fn with_condition_immunities(mut self, conditions: Vec<EffectType>) -> Self {
        self.condition_immunities = conditions;
        self
    }

    /// Proficiency bonus by challenge rating.
    pub fn proficiency_bonus(&self) -> i32 {
        match self.cr {
            cr if cr < 5.0 => 2,
            cr if cr < 9.0 => 3,
            cr if cr < 13.0 => 4,
            cr if cr < 17.0 => 5,
            cr if cr < 21.0 => 6,
            cr if cr < 25.0 => 7,
            cr if cr < 29.0 => 8,
            _ => 9,
        }
    }

    /// Stamp out a fresh combatant.
    pub fn spawn(&self, name: impl Into<String>) -> Combatant {
        let mut combatant = Combatant::new(name, self.hp, self.ac, self.abilities)
            .as_enemy()
            .with_attacks(self.attacks.clone());
        combatant.level = self.cr.max(1.0) as u8;
        combatant.save_proficiencies = self.save_proficiencies.clone();
        combatant.proficiency_bonus = self.proficiency_bonus();
        combatant.resistances = self.resistances.clone();
        combatant.vulnerabilities = self.vulnerabilities.clone();
        combatant.immunities = self.immunities.clone();
        combatant.condition_immunities = self.condition_immunities.clone();
        combatant.xp_value = self.xp_value;
        combatant
    }
}

/// The victim stands back up when its next turn starts.
fn knock_prone(dc: i32) -> OnHitEffect {
    OnHitEffect {
        effect_type: EffectType::Prone,
        duration: 1,
        duration_type: DurationType::Rounds,
        save: Some((Ability::Strength, dc)),
    }
}

lazy_static::lazy_static! {
    /// Standard enemies, weakest first.
    pub static ref ENEMIES: Vec<EnemyTemplate> = vec![
        EnemyTemplate::new("Kobold", 0.125, 5, 12, 25)
            .with_abilities(7, 15, 9, 8, 7, 8)
            .with_attack(Attack::new("Dagger", 4, "1d4+2", DamageType::Piercing)),
        EnemyTemplate::new("Goblin", 0.25, 7, 15, 50)
            .with_abilities(8, 14, 10, 10, 8, 8)
            .with_attack(Attack::new("Scimitar", 4, "1d6+2", DamageType::Slashing))
            .with_attack(Attack::new("Shortbow", 4, "1d6+2", DamageType::Piercing)),
        EnemyTemplate::new("Wolf", 0.25, 11, 13, 50)
            .with_abilities(12, 15, 12, 3, 12, 6)
            .with_attack(
                Attack::new("Bite", 4, "2d4+2", DamageType::Piercing).with_on_hit(knock_prone(11)),
            ),
        EnemyTemplate::new("Skeleton", 0.25, 13, 13, 50)
            .with_abilities(10, 14, 15, 6, 8, 5)
            .with_attack(Attack::new("Shortsword", 4, "1d6+2", DamageType::Piercing))
            .with_vulnerabilities(vec![DamageType::Bludgeoning])
            .with_immunities(vec![DamageType::Poison])
            .with_condition_immunities(vec![EffectType::Poisoned]),
        EnemyTemplate::new("Zombie", 0.25, 22, 8, 50)
            .with_abilities(13, 6, 16, 3, 6, 5)
            .with_attack(Attack::new("Slam", 3, "1d6+1", DamageType::Bludgeoning))
            .with_saves(vec![Ability::Wisdom])
            .with_immunities(vec![DamageType::Poison])
            .with_condition_immunities(vec![EffectType::Poisoned]),
        EnemyTemplate::new("Bandit", 0.125, 11, 12, 25)
            .with_abilities(11, 12, 12, 10, 10, 10)
            .with_attack(Attack::new("Scimitar", 3, "1d6+1", DamageType::Slashing))
            .with_attack(Attack::new("Light Crossbow", 3, "1d8+1", DamageType::Piercing)),
        EnemyTemplate::new("Orc", 0.5, 15, 13, 100)
            .with_abilities(16, 12, 16, 7, 11, 10)
            .with_attack(Attack::new("Greataxe", 5, "1d12+3", DamageType::Slashing))
            .with_attack(Attack::new("Javelin", 5, "1d6+3", DamageType::Piercing)),
        EnemyTemplate::new("Hobgoblin", 0.5, 11, 18, 100)
            .with_abilities(13, 12, 12, 10, 10, 9)
            .with_attack(Attack::new("Longsword", 3, "1d8+1", DamageType::Slashing)),
        EnemyTemplate::new("Giant Spider", 1.0, 26, 14, 200)
            .with_abilities(14, 16, 12, 2, 11, 4)
            .with_attack(
                Attack::new("Bite", 5, "1d8+3", DamageType::Piercing).with_on_hit(OnHitEffect {
                    effect_type: EffectType::Envenomed,
                    duration: 2,
                    duration_type: DurationType::Rounds,
                    save: Some((Ability::Constitution, 11)),
                }),
            ),
        EnemyTemplate::new("Bugbear", 1.0, 27, 16, 200)
            .with_abilities(15, 14, 13, 8, 11, 9)
            .with_attack(Attack::new("Morningstar", 4, "2d8+2", DamageType::Piercing)),
        EnemyTemplate::new("Gnoll", 0.5, 22, 15, 100)
            .with_abilities(14, 12, 11, 6, 10, 7)
            .with_attack(Attack::new("Spear", 4, "1d6+2", DamageType::Piercing))
            .with_attack(Attack::new("Bite", 4, "1d4+2", DamageType::Piercing)),
        EnemyTemplate::new("Ghoul", 1.0, 22, 12, 200)
            .with_abilities(13, 15, 10, 7, 10, 6)
            .with_attack(
                Attack::new("Claws", 4, "2d4+2", DamageType::Slashing).with_on_hit(OnHitEffect {
                    effect_type: EffectType::Paralyzed,
                    duration: 0,
                    duration_type: DurationType::SaveEnds,
                    save: Some((Ability::Constitution, 10)),
                }),
            )
            .with_immunities(vec![DamageType::Poison])
            .with_condition_immunities(vec![EffectType::Charmed, EffectType::Poisoned]),
        EnemyTemplate::new("Ogre", 2.0, 59, 11, 450)
            .with_abilities(19, 8, 16, 5, 7, 7)
            .with_attack(Attack::new("Greatclub", 6, "2d8+4", DamageType::Bludgeoning)),
        EnemyTemplate::new("Hell Hound", 3.0, 45, 15, 700)
            .with_abilities(17, 12, 14, 6, 13, 6)
            .with_attack(Attack::new("Fire Breath", 5, "6d6", DamageType::Fire).with_recharge(5))
            .with_attack(Attack::new("Bite", 5, "1d8+3", DamageType::Piercing))
            .with_immunities(vec![DamageType::Fire]),
        EnemyTemplate::new("Owlbear", 3.0, 59, 13, 700)
            .with_abilities(20, 12, 17, 3, 12, 7)
            .with_attack(Attack::new("Claws", 7, "2d8+5", DamageType::Slashing))
            .with_attack(Attack::new("Beak", 7, "1d10+5", DamageType::Piercing)),
        EnemyTemplate::new("Troll", 5.0, 84, 15, 1800)
            .with_abilities(18, 13, 20, 7, 9, 7)
            .with_attack(Attack::new("Claw", 7, "2d6+4", DamageType::Slashing))
            .with_attack(Attack::new("Bite", 7, "1d6+4", DamageType::Piercing))
            .with_vulnerabilities(vec![DamageType::Fire, DamageType::Acid]),
    ];
}

/// Look up a template by name (case-insensitive).
pub fn get_enemy(name: &str) -> EngineResult<&'static EnemyTemplate> {
    let name_lower = name.trim().to_lowercase();
    ENEMIES
        .iter()
        .find(|e| e.name.to_lowercase() == name_lower)
        .ok_or_else(|| EngineError::UnknownEnemy(name.to_string()))
}

/// Spawn `count` enemies of one kind. A group of more than one is numbered
/// so the names can be told apart.
pub fn spawn(name: &str, count: usize) -> EngineResult<Vec<Combatant>> {
    let template = get_enemy(name)?;
    let spawned = if count == 1 {
        vec![template.spawn(template.name.clone())]
    } else {
        (1..=count)
            .map(|i| template.spawn(format!("{} {i}", template.name)))
            .collect()
    };
    debug!(enemy = %template.name, count, "enemies spawned");
    Ok(spawned)
}

/// Spawn a mixed encounter. Fails on the first unknown name.
pub fn spawn_encounter(groups: &[(&str, usize)]) -> EngineResult<Vec<Combatant>> {
    let mut enemies = Vec::new();
    for &(name, count) in groups {
        enemies.extend(spawn(name, count)?);
    }
    Ok(enemies)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_goblin_stat_block() {
        let goblin = get_enemy("goblin").unwrap();
        assert_eq!(goblin.hp, 7);
        assert_eq!(goblin.ac, 15);
        assert_eq!(goblin.xp_value, 50);
        assert_eq!(goblin.attacks[0].damage_expr, "1d6+2");
    }

    #[test]
    fn test_unknown_enemy() {
        assert!(matches!(
            get_enemy("Beholder"),
            Err(EngineError::UnknownEnemy(name)) if name == "Beholder"
        ));
        assert!(spawn_encounter(&[("Goblin", 1), ("Tarrasque", 1)]).is_err());
    }

    #[test]
    fn test_spawn_numbers_groups() {
        let goblins = spawn("Goblin", 3).unwrap();
        let names: Vec<_> = goblins.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, ["Goblin 1", "Goblin 2", "Goblin 3"]);
        assert!(goblins.iter().all(|g| g.is_enemy && g.hp == 7));
        assert_ne!(goblins[0].id, goblins[1].id);

        let single = spawn("orc", 1).unwrap();
        assert_eq!(single[0].name, "Orc");
    }

    #[test]
    fn test_spawned_enemy_keeps_defenses() {
        let skeleton = &spawn("Skeleton", 1).unwrap()[0];
        assert_eq!(skeleton.adjust_damage(10, DamageType::Poison), 0);
        assert_eq!(skeleton.adjust_damage(5, DamageType::Bludgeoning), 10);
        assert!(skeleton.condition_immunities.contains(&EffectType::Poisoned));

        let hound = &spawn("Hell Hound", 1).unwrap()[0];
        assert!(hound.attacks[0].recharge.is_some());
        assert_eq!(hound.proficiency_bonus, 2);
    }

    #[test]
    fn test_catalog_dice_parse() {
        for enemy in ENEMIES.iter() {
            assert!(!enemy.attacks.is_empty(), "{} has no attacks", enemy.name);
            for attack in &enemy.attacks {
                assert!(
                    crate::dice::DiceExpression::parse(&attack.damage_expr).is_ok(),
                    "{}: {}",
                    enemy.name,
                    attack.damage_expr
                );
            }
        }
    }
}
