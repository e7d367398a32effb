//! Combat state: combatants, initiative order and turn advancement.
//!
//! Action resolution (attacks, spells, enemy turns) lives on
//! [`RulesEngine`](crate::rules::RulesEngine); this module owns the data and
//! the pure state transitions.

use crate::character::{Ability, AbilityScores, Character, CharacterId};
use crate::dice::roll_check_with_rng;
use crate::effects::{self, DurationType, EffectType, StatusEffectInstance};
use crate::error::{EngineError, EngineResult};
use crate::spellcasting::Spellcaster;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

// ============================================================================
// Damage and Attacks
// ============================================================================

/// Types of damage in D&D 5e.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DamageType {
    Slashing,
    Piercing,
    Bludgeoning,
    Fire,
    Cold,
    Lightning,
    Thunder,
    Acid,
    Poison,
    Necrotic,
    Radiant,
    Force,
    Psychic,
}

impl DamageType {
    pub fn name(&self) -> &'static str {
        match self {
            DamageType::Slashing => "slashing",
            DamageType::Piercing => "piercing",
            DamageType::Bludgeoning => "bludgeoning",
            DamageType::Fire => "fire",
            DamageType::Cold => "cold",
            DamageType::Lightning => "lightning",
            DamageType::Thunder => "thunder",
            DamageType::Acid => "acid",
            DamageType::Poison => "poison",
            DamageType::Necrotic => "necrotic",
            DamageType::Radiant => "radiant",
            DamageType::Force => "force",
            DamageType::Psychic => "psychic",
        }
    }
}

impl fmt::Display for DamageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A limited-use attack that comes back on a d6 roll of `min` or higher at
/// the start of its owner's turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recharge {
    pub min: u8,
    pub ready: bool,
}

/// A status effect an attack inflicts on hit, optionally resisted by a save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnHitEffect {
    pub effect_type: EffectType,
    pub duration: i32,
    pub duration_type: DurationType,
    pub save: Option<(Ability, i32)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attack {
    pub name: String,
    pub to_hit_bonus: i32,
    pub damage_expr: String,
    pub damage_type: DamageType,
    pub recharge: Option<Recharge>,
    pub on_hit: Option<OnHitEffect>,
}

impl Attack {
    pub fn new(
        name: impl Into<String>,
        to_hit_bonus: i32,
        damage_expr: impl Into<String>,
        damage_type: DamageType,
    ) -> Self {
        Self {
            name: name.into(),
            to_hit_bonus,
            damage_expr: damage_expr.into(),
            damage_type,
            recharge: None,
            on_hit: None,
        }
    }

    pub fn with_recharge(mut self, min: u8) -> Self {
        self.recharge = Some(Recharge { min, ready: true });
        self
    }

    pub fn with_on_hit(mut self, effect: OnHitEffect) -> Self {
        self.on_hit = Some(effect);
        self
    }

    pub fn is_ready(&self) -> bool {
        self.recharge.map_or(true, |r| r.ready)
    }
}

// ============================================================================
// Combatants
// ============================================================================

/// Unique identifier for a combatant within one fight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CombatantId(pub Uuid);

impl CombatantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CombatantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CombatantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A participant in combat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Combatant {
    pub id: CombatantId,
    /// Set for party members, used to write results back.
    pub character_id: Option<CharacterId>,
    /// Display only; several combatants may share a name.
    pub name: String,
    pub is_enemy: bool,
    pub level: u8,

    pub hp: i32,
    pub max_hp: i32,
    pub ac: i32,
    pub initiative: i32,

    pub attacks: Vec<Attack>,
    pub conditions: Vec<StatusEffectInstance>,
    pub exhaustion: u8,
    pub is_dead: bool,

    pub abilities: AbilityScores,
    pub save_proficiencies: Vec<Ability>,
    pub proficiency_bonus: i32,
    pub resistances: Vec<DamageType>,
    pub vulnerabilities: Vec<DamageType>,
    pub immunities: Vec<DamageType>,
    pub condition_immunities: Vec<EffectType>,

    pub caster: Option<Spellcaster>,
    /// Experience awarded for defeating this combatant.
    pub xp_value: u32,
}

impl Combatant {
    pub fn new(name: impl Into<String>, hp: i32, ac: i32, abilities: AbilityScores) -> Self {
        Self {
            id: CombatantId::new(),
            character_id: None,
            name: name.into(),
            is_enemy: false,
            level: 1,
            hp,
            max_hp: hp,
            ac,
            initiative: 0,
            attacks: Vec::new(),
            conditions: Vec::new(),
            exhaustion: 0,
            is_dead: hp <= 0,
            abilities,
            save_proficiencies: Vec::new(),
            proficiency_bonus: 2,
            resistances: Vec::new(),
            vulnerabilities: Vec::new(),
            immunities: Vec::new(),
            condition_immunities: Vec::new(),
            caster: None,
            xp_value: 0,
        }
    }

    /// Project a party member into combat.
    pub fn from_character(character: &Character) -> Self {
        Self {
            id: CombatantId::new(),
            character_id: Some(character.id),
            name: character.name.clone(),
            is_enemy: false,
            level: character.level,
            hp: character.hp,
            max_hp: character.max_hp,
            ac: character.armor_class as i32,
            initiative: 0,
            attacks: character.attacks.clone(),
            conditions: character.conditions.clone(),
            exhaustion: character.exhaustion,
            is_dead: character.is_dead(),
            abilities: character.ability_scores,
            save_proficiencies: character.class.saving_throws().to_vec(),
            proficiency_bonus: character.proficiency_bonus(),
            resistances: Vec::new(),
            vulnerabilities: Vec::new(),
            immunities: Vec::new(),
            condition_immunities: Vec::new(),
            caster: character.spellcasting.clone(),
            xp_value: 0,
        }
    }

    pub fn as_enemy(mut self) -> Self {
        self.is_enemy = true;
        self
    }

    pub fn with_attacks(mut self, attacks: Vec<Attack>) -> Self {
        self.attacks = attacks;
        self
    }

    pub fn with_initiative(mut self, initiative: i32) -> Self {
        self.initiative = initiative;
        self
    }

    pub fn with_caster(mut self, caster: Spellcaster) -> Self {
        self.level = caster.level;
        self.proficiency_bonus = caster.proficiency_bonus();
        self.caster = Some(caster);
        self
    }

    pub fn is_alive(&self) -> bool {
        !self.is_dead
    }

    pub fn has_effect(&self, effect_type: EffectType) -> bool {
        self.conditions.iter().any(|c| c.effect_type == effect_type)
    }

    /// AC including bonuses and penalties from active effects.
    pub fn effective_ac(&self) -> i32 {
        self.ac
            + self
                .conditions
                .iter()
                .map(|c| c.definition().ac_bonus)
                .sum::<i32>()
    }

    pub fn initiative_modifier(&self) -> i32 {
        self.abilities.modifier(Ability::Dexterity)
    }

    pub fn saving_throw_modifier(&self, ability: Ability) -> i32 {
        let base = self.abilities.modifier(ability);
        if self.save_proficiencies.contains(&ability) {
            base + self.proficiency_bonus
        } else {
            base
        }
    }

    /// Scale raw damage by immunities, resistances (including from effects)
    /// and vulnerabilities.
    pub fn adjust_damage(&self, amount: i32, damage_type: DamageType) -> i32 {
        if amount <= 0 || self.immunities.contains(&damage_type) {
            return 0;
        }
        let resistant = self.resistances.contains(&damage_type)
            || self
                .conditions
                .iter()
                .any(|c| c.definition().resistances.contains(&damage_type));
        let mut amount = amount;
        if resistant {
            amount /= 2;
        }
        if self.vulnerabilities.contains(&damage_type) {
            amount *= 2;
        }
        amount
    }

    pub fn concentration(&self) -> Option<&str> {
        self.caster.as_ref().and_then(|c| c.concentration.as_deref())
    }

    pub fn spell_save_dc(&self) -> Option<i32> {
        self.caster.as_ref().map(|c| c.spell_save_dc(&self.abilities))
    }

    pub fn spell_attack_bonus(&self) -> Option<i32> {
        self.caster
            .as_ref()
            .map(|c| c.spell_attack_bonus(&self.abilities))
    }
}

/// Subtract hit points, clamping at zero. Returns the damage actually taken.
pub fn apply_damage(combatant: &mut Combatant, amount: i32) -> i32 {
    let amount = amount.max(0);
    let before = combatant.hp;
    combatant.hp = (combatant.hp - amount).max(0);
    if combatant.hp == 0 {
        combatant.is_dead = true;
    }
    before - combatant.hp
}

/// Restore hit points, clamping at `max_hp`. The dead cannot be healed.
/// Returns the hit points actually restored.
pub fn heal(combatant: &mut Combatant, amount: i32) -> i32 {
    if combatant.is_dead {
        return 0;
    }
    let before = combatant.hp;
    combatant.hp = (combatant.hp + amount.max(0)).min(combatant.max_hp);
    combatant.hp - before
}

// ============================================================================
// Combat State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombatResult {
    Victory,
    Defeat,
    Fled,
}

impl fmt::Display for CombatResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CombatResult::Victory => write!(f, "Victory"),
            CombatResult::Defeat => write!(f, "Defeat"),
            CombatResult::Fled => write!(f, "Fled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombatPhase {
    Inactive,
    Active,
    Ended(CombatResult),
}

/// Answer to "is the fight over?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatEnd {
    pub ended: bool,
    pub result: Option<CombatResult>,
    pub message: String,
}

/// Where the turn pointer moved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnAdvance {
    pub combatant: CombatantId,
    pub round: u32,
    pub new_round: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatState {
    /// In initiative order. The dead stay in place and are skipped.
    pub combatants: Vec<Combatant>,
    pub current_turn: usize,
    pub round: u32,
    pub phase: CombatPhase,
}

impl CombatState {
    /// Build a fight from combatants whose initiative is already set.
    /// Ties keep insertion order.
    pub fn new(mut combatants: Vec<Combatant>) -> Self {
        combatants.sort_by(|a, b| b.initiative.cmp(&a.initiative));
        let mut state = Self {
            combatants,
            current_turn: 0,
            round: 1,
            phase: CombatPhase::Active,
        };
        if state.combatants.first().is_some_and(|c| c.is_dead) {
            // Ignore the error: with nobody alive the end check below ends it.
            let _ = state.advance_pointer();
            state.round = 1;
        }
        state.check_combat_end();
        state
    }

    /// Roll initiative (d20 + DEX) for the party and the enemies and start.
    pub fn start<R: Rng + ?Sized>(party: &[Character], enemies: Vec<Combatant>, rng: &mut R) -> Self {
        let mut combatants: Vec<Combatant> = party.iter().map(Combatant::from_character).collect();
        combatants.extend(enemies.into_iter().map(Combatant::as_enemy));
        for c in &mut combatants {
            c.initiative = roll_check_with_rng(rng) as i32 + c.initiative_modifier();
            debug!(combatant = %c.name, initiative = c.initiative, "initiative rolled");
        }
        let state = Self::new(combatants);
        let order = state
            .combatants
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        info!(combatants = state.combatants.len(), %order, "combat started");
        state
    }

    pub fn is_active(&self) -> bool {
        self.phase == CombatPhase::Active
    }

    pub fn current(&self) -> Option<&Combatant> {
        self.combatants.get(self.current_turn)
    }

    pub fn current_mut(&mut self) -> Option<&mut Combatant> {
        self.combatants.get_mut(self.current_turn)
    }

    pub fn index_of(&self, id: CombatantId) -> Option<usize> {
        self.combatants.iter().position(|c| c.id == id)
    }

    pub fn get(&self, id: CombatantId) -> Option<&Combatant> {
        self.combatants.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: CombatantId) -> Option<&mut Combatant> {
        self.combatants.iter_mut().find(|c| c.id == id)
    }

    /// Look up a combatant that must exist.
    pub fn require(&self, id: CombatantId) -> EngineResult<&Combatant> {
        self.get(id)
            .ok_or_else(|| EngineError::UnknownCombatant(id.to_string()))
    }

    pub fn living_party(&self) -> impl Iterator<Item = &Combatant> {
        self.combatants.iter().filter(|c| !c.is_enemy && c.is_alive())
    }

    pub fn living_enemies(&self) -> impl Iterator<Item = &Combatant> {
        self.combatants.iter().filter(|c| c.is_enemy && c.is_alive())
    }

    fn advance_pointer(&mut self) -> EngineResult<TurnAdvance> {
        if !self.combatants.iter().any(|c| c.is_alive()) {
            return Err(EngineError::NoLivingTarget);
        }
        let len = self.combatants.len();
        let mut new_round = false;
        let mut index = self.current_turn;
        loop {
            index += 1;
            if index >= len {
                index = 0;
                new_round = true;
                self.round += 1;
            }
            if self.combatants[index].is_alive() {
                break;
            }
        }
        self.current_turn = index;
        Ok(TurnAdvance {
            combatant: self.combatants[index].id,
            round: self.round,
            new_round,
        })
    }

    /// Move to the next living combatant, wrapping to a new round.
    pub fn next_turn(&mut self) -> EngineResult<TurnAdvance> {
        if !self.is_active() {
            return Err(EngineError::CombatNotActive);
        }
        let advance = self.advance_pointer()?;
        debug!(round = advance.round, turn = self.current_turn, "turn advanced");
        Ok(advance)
    }

    /// End the fight if one side has nobody left standing.
    pub fn check_combat_end(&mut self) -> CombatEnd {
        if let CombatPhase::Ended(result) = self.phase {
            return CombatEnd {
                ended: true,
                result: Some(result),
                message: end_message(result),
            };
        }

        let result = if self.living_party().next().is_none() {
            Some(CombatResult::Defeat)
        } else if self.living_enemies().next().is_none() {
            Some(CombatResult::Victory)
        } else {
            None
        };

        match result {
            Some(result) => {
                self.phase = CombatPhase::Ended(result);
                info!(%result, round = self.round, "combat ended");
                CombatEnd {
                    ended: true,
                    result: Some(result),
                    message: end_message(result),
                }
            }
            None => CombatEnd {
                ended: false,
                result: None,
                message: String::new(),
            },
        }
    }

    /// The party runs away.
    pub fn flee(&mut self) -> EngineResult<CombatEnd> {
        if !self.is_active() {
            return Err(EngineError::CombatNotActive);
        }
        self.phase = CombatPhase::Ended(CombatResult::Fled);
        info!(round = self.round, "party fled");
        Ok(self.check_combat_end())
    }

    /// Copy combat results onto the matching character records. Effects that
    /// only end on a turn boundary stay behind.
    pub fn write_back(&self, party: &mut [Character]) {
        for combatant in &self.combatants {
            let Some(character_id) = combatant.character_id else {
                continue;
            };
            if let Some(character) = party.iter_mut().find(|c| c.id == character_id) {
                character.hp = combatant.hp;
                character.conditions = combatant
                    .conditions
                    .iter()
                    .filter(|c| effects::outlasts_combat(c))
                    .cloned()
                    .collect();
                character.exhaustion = combatant.exhaustion;
                character.spellcasting = combatant.caster.clone();
            }
        }
    }
}

fn end_message(result: CombatResult) -> String {
    match result {
        CombatResult::Victory => "All enemies have been defeated!".to_string(),
        CombatResult::Defeat => "The party has fallen...".to_string(),
        CombatResult::Fled => "The party escapes.".to_string(),
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Machine-readable record of something that happened during resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombatEvent {
    TurnStarted {
        combatant: CombatantId,
        round: u32,
    },
    TurnSkipped {
        combatant: CombatantId,
        condition: EffectType,
    },
    AttackRolled {
        attacker: CombatantId,
        target: CombatantId,
        natural: u32,
        total: i32,
        ac: i32,
        hit: bool,
        critical: bool,
    },
    DamageDealt {
        target: CombatantId,
        amount: i32,
        hp_after: i32,
        dropped_to_zero: bool,
    },
    Healed {
        target: CombatantId,
        amount: i32,
        hp_after: i32,
    },
    SavingThrow {
        target: CombatantId,
        ability: Ability,
        total: i32,
        dc: i32,
        success: bool,
    },
    EffectApplied {
        target: CombatantId,
        effect_type: EffectType,
    },
    EffectEnded {
        target: CombatantId,
        effect_type: EffectType,
    },
    SlotSpent {
        caster: CombatantId,
        level: u8,
        remaining: u8,
    },
    ConcentrationChecked {
        caster: CombatantId,
        spell: String,
        dc: i32,
        maintained: bool,
    },
    ConcentrationEnded {
        caster: CombatantId,
        spell: String,
    },
    AttackRecharged {
        combatant: CombatantId,
        attack: String,
    },
    CombatEnded {
        result: CombatResult,
    },
}

/// The result of resolving an action: narrative lines plus events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub log: Vec<String>,
    pub events: Vec<CombatEvent>,
}

impl Resolution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn narrate(&mut self, line: impl Into<String>) {
        self.log.push(line.into());
    }

    pub fn record(&mut self, event: CombatEvent) {
        self.events.push(event);
    }

    pub fn with_line(mut self, line: impl Into<String>) -> Self {
        self.narrate(line);
        self
    }

    pub fn with_event(mut self, event: CombatEvent) -> Self {
        self.record(event);
        self
    }

    pub fn extend(&mut self, other: Resolution) {
        self.log.extend(other.log);
        self.events.extend(other.events);
    }

    /// Total damage dealt to `target` in this resolution.
    pub fn damage_to(&self, target: CombatantId) -> i32 {
        self.events
            .iter()
            .filter_map(|e| match e {
                CombatEvent::DamageDealt { target: t, amount, .. } if *t == target => {
                    Some(*amount)
                }
                _ => None,
            })
            .sum()
    }

    /// Whether any attack roll in this resolution hit.
    pub fn any_hit(&self) -> bool {
        self.events
            .iter()
            .any(|e| matches!(e, CombatEvent::AttackRolled { hit: true, .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::CharacterClass;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fighter(name: &str, initiative: i32) -> Combatant {
        Combatant::new(name, 20, 16, AbilityScores::default()).with_initiative(initiative)
    }

    fn goblin(name: &str, initiative: i32) -> Combatant {
        Combatant::new(name, 7, 15, AbilityScores::default())
            .as_enemy()
            .with_initiative(initiative)
    }

    #[test]
    fn test_initiative_order_is_stable() {
        let state = CombatState::new(vec![
            fighter("A", 10),
            goblin("G1", 15),
            fighter("B", 10),
            goblin("G2", 10),
        ]);
        let names: Vec<_> = state.combatants.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["G1", "A", "B", "G2"]);
        assert_eq!(state.current_turn, 0);
        assert_eq!(state.round, 1);
        assert!(state.is_active());
    }

    #[test]
    fn test_next_turn_wraps_and_skips_dead() {
        let mut state = CombatState::new(vec![
            fighter("A", 20),
            goblin("G1", 15),
            goblin("G2", 10),
        ]);
        state.combatants[1].is_dead = true;

        let advance = state.next_turn().unwrap();
        assert_eq!(state.current().unwrap().name, "G2");
        assert!(!advance.new_round);

        let advance = state.next_turn().unwrap();
        assert_eq!(state.current_turn, 0);
        assert!(advance.new_round);
        assert_eq!(state.round, 2);
    }

    #[test]
    fn test_damage_and_heal_clamp() {
        let mut c = fighter("A", 0);
        assert_eq!(heal(&mut c, 10), 0);
        assert_eq!(apply_damage(&mut c, 5), 5);
        assert_eq!(heal(&mut c, 100), 5);
        assert_eq!(c.hp, c.max_hp);
        assert_eq!(apply_damage(&mut c, -3), 0);
        assert_eq!(apply_damage(&mut c, 500), 20);
        assert_eq!(c.hp, 0);
        assert!(c.is_dead);
        assert_eq!(heal(&mut c, 5), 0);
    }

    #[test]
    fn test_adjust_damage() {
        let mut c = fighter("A", 0);
        c.resistances = vec![DamageType::Fire];
        c.vulnerabilities = vec![DamageType::Radiant];
        c.immunities = vec![DamageType::Poison];
        assert_eq!(c.adjust_damage(9, DamageType::Fire), 4);
        assert_eq!(c.adjust_damage(9, DamageType::Radiant), 18);
        assert_eq!(c.adjust_damage(9, DamageType::Poison), 0);
        assert_eq!(c.adjust_damage(9, DamageType::Slashing), 9);
    }

    #[test]
    fn test_check_combat_end() {
        let mut state = CombatState::new(vec![fighter("A", 10), goblin("G", 5)]);
        assert!(!state.check_combat_end().ended);

        state.combatants[1].hp = 0;
        state.combatants[1].is_dead = true;
        let end = state.check_combat_end();
        assert!(end.ended);
        assert_eq!(end.result, Some(CombatResult::Victory));
        assert!(!state.is_active());
        assert!(matches!(state.next_turn(), Err(EngineError::CombatNotActive)));
    }

    #[test]
    fn test_flee() {
        let mut state = CombatState::new(vec![fighter("A", 10), goblin("G", 5)]);
        let end = state.flee().unwrap();
        assert_eq!(end.result, Some(CombatResult::Fled));
        assert!(state.flee().is_err());
    }

    #[test]
    fn test_start_and_write_back() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut party = vec![Character::new(
            "Roland",
            CharacterClass::Fighter,
            AbilityScores::new(16, 12, 14, 10, 10, 8),
        )];
        let mut state = CombatState::start(&party, vec![goblin("Goblin", 0)], &mut rng);
        assert_eq!(state.combatants.len(), 2);
        assert_eq!(state.living_enemies().count(), 1);

        let id = state.living_party().next().unwrap().id;
        apply_damage(state.get_mut(id).unwrap(), 4);
        state.write_back(&mut party);
        assert_eq!(party[0].hp, party[0].max_hp - 4);
    }
}
