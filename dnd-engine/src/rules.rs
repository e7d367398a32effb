//! Rules engine - resolves combat actions against a [`CombatState`].
//!
//! Every action validates first and mutates second: an action that returns
//! an error leaves the state exactly as it found it.

use crate::character::{Ability, Character};
use crate::combat::{self, CombatEvent, CombatResult, CombatState, Combatant, CombatantId, Resolution};
use crate::concentration;
use crate::config::{EnemyTargeting, EngineConfig};
use crate::dice::{self, DiceExpression, RollResult};
use crate::effects::{self, ApplyKind, ApplyOutcome, StatusEffectInstance};
use crate::error::{EngineError, EngineResult};
use crate::progression;
use rand::Rng;
use tracing::{debug, info, warn};

/// The rules engine.
#[derive(Debug, Clone, Default)]
pub struct RulesEngine {
    config: EngineConfig,
}

impl RulesEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Dice
    // ========================================================================

    /// Parse a dice expression under the configured strictness. Lenient mode
    /// turns a malformed expression into `None`, which rolls as zero.
    pub(crate) fn dice(&self, expr: &str) -> EngineResult<Option<DiceExpression>> {
        match DiceExpression::parse(expr) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(e) if self.config.strict_dice => Err(e.into()),
            Err(e) => {
                warn!(expression = expr, error = %e, "malformed dice expression resolved to zero");
                Ok(None)
            }
        }
    }

    pub(crate) fn roll<R: Rng + ?Sized>(&self, expr: Option<DiceExpression>, rng: &mut R) -> RollResult {
        expr.map_or_else(RollResult::zero, |e| e.roll_with_rng(rng))
    }

    /// Dice breakdown for a log line, if narration of rolls is enabled.
    pub(crate) fn show(&self, roll: &RollResult) -> String {
        if self.config.narrate_rolls && !roll.rolls.is_empty() {
            format!(" ({})", roll.dice_display())
        } else {
            String::new()
        }
    }

    // ========================================================================
    // Combat Lifecycle
    // ========================================================================

    /// Roll initiative and begin the first turn.
    pub fn start_combat<R: Rng + ?Sized>(
        &self,
        party: &[Character],
        enemies: Vec<Combatant>,
        rng: &mut R,
    ) -> (CombatState, Resolution) {
        let mut state = CombatState::start(party, enemies, rng);
        let mut res = Resolution::new().with_line("Roll for initiative!");
        for c in &state.combatants {
            res.narrate(format!("{}: {}", c.name, c.initiative));
        }
        if state.is_active() {
            res.extend(self.begin_turn(&mut state, rng));
        } else {
            let end = state.check_combat_end();
            res.narrate(end.message);
        }
        (state, res)
    }

    /// Write combat results back to the party and award experience on a
    /// victory.
    pub fn finish_combat(&self, state: &CombatState, party: &mut [Character]) -> Resolution {
        let mut res = Resolution::new();
        state.write_back(party);

        if state.phase == combat::CombatPhase::Ended(CombatResult::Victory) {
            let xp = progression::encounter_xp(state);
            for (name, share) in progression::award_experience(party, xp) {
                res.narrate(format!("{name} gains {share} XP."));
            }
        }
        info!(phase = ?state.phase, "combat finished");
        res
    }

    /// Advance a character one level, growing hit points the way the engine
    /// is configured to.
    pub fn level_up<R: Rng + ?Sized>(
        &self,
        character: &mut Character,
        choice: progression::LevelUpChoice,
        rng: &mut R,
    ) -> EngineResult<progression::LevelUp> {
        progression::level_up(character, choice, self.config.hit_point_growth, rng)
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// The acting combatant must exist, be alive, hold the turn and be able
    /// to act.
    pub(crate) fn validate_actor(
        &self,
        state: &CombatState,
        actor: CombatantId,
    ) -> EngineResult<usize> {
        if !state.is_active() {
            return Err(EngineError::CombatNotActive);
        }
        let idx = state
            .index_of(actor)
            .ok_or_else(|| EngineError::UnknownCombatant(actor.to_string()))?;
        let combatant = &state.combatants[idx];
        if combatant.is_dead {
            return Err(EngineError::ActionOnDeadCombatant(combatant.name.clone()));
        }
        if idx != state.current_turn {
            return Err(EngineError::NotYourTurn(combatant.name.clone()));
        }
        if let Some(condition) = effects::incapacitating_condition(combatant) {
            return Err(EngineError::CombatantIncapacitated {
                name: combatant.name.clone(),
                condition: condition.name().to_lowercase(),
            });
        }
        Ok(idx)
    }

    /// A target must exist and be alive.
    pub(crate) fn validate_target(
        &self,
        state: &CombatState,
        target: CombatantId,
    ) -> EngineResult<usize> {
        let idx = state
            .index_of(target)
            .ok_or_else(|| EngineError::UnknownCombatant(target.to_string()))?;
        if state.combatants[idx].is_dead {
            return Err(EngineError::ActionOnDeadCombatant(
                state.combatants[idx].name.clone(),
            ));
        }
        Ok(idx)
    }

    // ========================================================================
    // Attacks
    // ========================================================================

    /// Weapon or natural attack. A natural 20 always hits and doubles the
    /// damage dice; a natural 1 always misses.
    pub fn execute_attack<R: Rng + ?Sized>(
        &self,
        state: &mut CombatState,
        attacker_id: CombatantId,
        defender_id: CombatantId,
        attack_index: usize,
        rng: &mut R,
    ) -> EngineResult<Resolution> {
        let a = self.validate_actor(state, attacker_id)?;
        let d = self.validate_target(state, defender_id)?;
        let attacker_name = state.combatants[a].name.clone();
        let attack = state.combatants[a]
            .attacks
            .get(attack_index)
            .cloned()
            .ok_or_else(|| EngineError::InvalidAttackIndex {
                name: attacker_name.clone(),
                index: attack_index,
            })?;
        if !attack.is_ready() {
            return Err(EngineError::AttackRecharging {
                name: attacker_name,
                attack: attack.name,
            });
        }
        let damage_dice = self.dice(&attack.damage_expr)?;

        let mut res = Resolution::new();
        let defender_name = state.combatants[d].name.clone();
        let mods = effects::attack_modifiers(&state.combatants[a], &state.combatants[d]);
        let d20 = dice::roll_d20(mods.advantage_state(), rng);
        let bonus = effects::roll_bonus_dice(&mods.bonus_dice, rng);
        let total = d20.natural as i32 + attack.to_hit_bonus + bonus;
        let ac = state.combatants[d].effective_ac();
        let critical = d20.is_natural_20();
        let hit = critical || (!d20.is_natural_1() && total >= ac);

        effects::consume_on_attack(&mut state.combatants[a]);
        effects::consume_when_attacked(&mut state.combatants[d]);
        if let Some(recharge) = state.combatants[a].attacks[attack_index].recharge.as_mut() {
            recharge.ready = false;
        }

        debug!(
            attacker = %attacker_name,
            defender = %defender_name,
            natural = d20.natural,
            total,
            ac,
            hit,
            "attack rolled"
        );
        res.record(CombatEvent::AttackRolled {
            attacker: attacker_id,
            target: defender_id,
            natural: d20.natural,
            total,
            ac,
            hit,
            critical,
        });
        let verdict = if critical {
            "CRITICAL HIT!"
        } else if hit {
            "hit."
        } else {
            "miss."
        };
        res.narrate(format!(
            "{attacker_name} attacks {defender_name} with {}: {total} vs AC {ac} - {verdict}",
            attack.name
        ));

        if hit {
            let expr = damage_dice.map(|e| if critical { e.doubled() } else { e });
            let roll = self.roll(expr, rng);
            let mut damage = state.combatants[d].adjust_damage(roll.total, attack.damage_type);
            let mut detail = format!("{} {}{}", roll.total, attack.damage_type, self.show(&roll));

            for extra in effects::source_damage(attacker_id, &state.combatants[d]) {
                let extra_roll = roll_static(extra.dice, critical, rng);
                let damage_type = extra.damage_type.unwrap_or(attack.damage_type);
                damage += state.combatants[d].adjust_damage(extra_roll.total, damage_type);
                detail.push_str(&format!(" + {} {damage_type}", extra_roll.total));
            }
            res.narrate(format!("Damage: {detail}"));
            self.deal_damage(state, d, damage, rng, &mut res);

            if let Some(on_hit) = attack.on_hit {
                if state.combatants[d].is_alive() {
                    let resisted = on_hit.save.is_some_and(|(ability, dc)| {
                        self.saving_throw(state, d, ability, dc, rng, &mut res)
                    });
                    if !resisted {
                        let mut instance = StatusEffectInstance::new(
                            on_hit.effect_type,
                            on_hit.duration,
                            on_hit.duration_type,
                        )
                        .with_source(attacker_name.clone(), Some(attacker_id));
                        if let Some((ability, dc)) = on_hit.save {
                            instance = instance.with_save(dc, ability);
                        }
                        self.apply_effect(state, d, instance, &mut res);
                    }
                }
            }
        }

        self.check_end(state, &mut res);
        Ok(res)
    }

    // ========================================================================
    // Shared Resolution Steps
    // ========================================================================

    /// Apply one damage event, then make the target's concentration check.
    pub(crate) fn deal_damage<R: Rng + ?Sized>(
        &self,
        state: &mut CombatState,
        idx: usize,
        amount: i32,
        rng: &mut R,
        res: &mut Resolution,
    ) -> i32 {
        let target = &mut state.combatants[idx];
        let was_alive = target.is_alive();
        let taken = combat::apply_damage(target, amount);
        let target_id = target.id;
        res.record(CombatEvent::DamageDealt {
            target: target_id,
            amount: taken,
            hp_after: target.hp,
            dropped_to_zero: was_alive && target.is_dead,
        });
        res.narrate(format!(
            "{} takes {taken} damage ({}/{} HP).",
            target.name, target.hp, target.max_hp
        ));
        if was_alive && target.is_dead {
            res.narrate(format!("{} falls!", target.name));
            info!(combatant = %target.name, "dropped to 0 HP");
        }

        if let Some(check) = concentration::check_on_damage(target, amount, rng) {
            self.narrate_concentration_check(target_id, &target.name.clone(), &check, res);
            if !check.maintained {
                self.release_concentration(state, target_id, &check.spell, res);
            }
        }
        taken
    }

    fn narrate_concentration_check(
        &self,
        caster: CombatantId,
        name: &str,
        check: &concentration::ConcentrationCheck,
        res: &mut Resolution,
    ) {
        res.record(CombatEvent::ConcentrationChecked {
            caster,
            spell: check.spell.clone(),
            dc: check.dc,
            maintained: check.maintained,
        });
        match &check.save {
            Some(save) => res.narrate(format!(
                "{name} makes a DC {} Constitution save to maintain concentration on {}. Rolls {} - {}",
                check.dc,
                check.spell,
                save.total,
                if check.maintained { "maintained." } else { "FAILED!" }
            )),
            None => res.narrate(format!(
                "{name} drops to 0 HP and loses concentration on {}.",
                check.spell
            )),
        }
    }

    /// Clean up after `caster` stops concentrating on `spell`: every effect
    /// it placed with that spell ends.
    pub(crate) fn release_concentration(
        &self,
        state: &mut CombatState,
        caster: CombatantId,
        spell: &str,
        res: &mut Resolution,
    ) {
        let caster_name = state
            .get(caster)
            .map(|c| c.name.clone())
            .unwrap_or_default();
        res.record(CombatEvent::ConcentrationEnded {
            caster,
            spell: spell.to_string(),
        });
        res.narrate(format!("{caster_name}'s {spell} ends."));

        for target in &mut state.combatants {
            for effect_type in effects::remove_concentration_effects(target, caster, spell) {
                res.record(CombatEvent::EffectEnded {
                    target: target.id,
                    effect_type,
                });
                res.narrate(format!("{} is no longer {}.", target.name, effect_type));
            }
        }
    }

    /// Apply an effect and handle the concentration it may break.
    pub(crate) fn apply_effect(
        &self,
        state: &mut CombatState,
        idx: usize,
        instance: StatusEffectInstance,
        res: &mut Resolution,
    ) -> ApplyOutcome {
        let effect_type = instance.effect_type;
        let target = &mut state.combatants[idx];
        let target_id = target.id;
        let outcome = effects::apply(target, instance);
        match outcome.kind {
            ApplyKind::Ignored => {
                res.narrate(format!("{} is immune to {effect_type}.", target.name));
            }
            ApplyKind::Stacked => {
                let stacks = target
                    .conditions
                    .iter()
                    .find(|c| c.effect_type == effect_type)
                    .map_or(1, |c| c.stack_count);
                res.record(CombatEvent::EffectApplied {
                    target: target_id,
                    effect_type,
                });
                res.narrate(format!("{} is {effect_type} (x{stacks}).", target.name));
            }
            ApplyKind::Added | ApplyKind::Refreshed => {
                res.record(CombatEvent::EffectApplied {
                    target: target_id,
                    effect_type,
                });
                res.narrate(format!("{} is {effect_type}.", target.name));
            }
        }

        if let Some(ref spell) = outcome.broke_concentration {
            self.release_concentration(state, target_id, spell, res);
        }
        outcome
    }

    /// Roll a save for the combatant at `idx` and record it. Returns success.
    pub(crate) fn saving_throw<R: Rng + ?Sized>(
        &self,
        state: &CombatState,
        idx: usize,
        ability: Ability,
        dc: i32,
        rng: &mut R,
        res: &mut Resolution,
    ) -> bool {
        let target = &state.combatants[idx];
        let save = effects::roll_saving_throw(target, ability, dc, rng);
        res.record(CombatEvent::SavingThrow {
            target: target.id,
            ability,
            total: save.total,
            dc,
            success: save.success,
        });
        let outcome = if save.auto_failed {
            "automatically fails".to_string()
        } else if save.success {
            format!("succeeds ({})", save.total)
        } else {
            format!("fails ({})", save.total)
        };
        res.narrate(format!(
            "{} makes a DC {dc} {} save and {outcome}.",
            target.name,
            ability.name()
        ));
        save.success
    }

    pub(crate) fn check_end(&self, state: &mut CombatState, res: &mut Resolution) {
        let was_active = state.is_active();
        let end = state.check_combat_end();
        if was_active && end.ended {
            if let Some(result) = end.result {
                res.record(CombatEvent::CombatEnded { result });
            }
            res.narrate(end.message);
        }
    }

    // ========================================================================
    // Turns
    // ========================================================================

    /// Start of the current combatant's turn: recharge rolls, then damage over
    /// time and duration ticks.
    pub fn begin_turn<R: Rng + ?Sized>(&self, state: &mut CombatState, rng: &mut R) -> Resolution {
        let mut res = Resolution::new();
        if !state.is_active() {
            return res;
        }
        let idx = state.current_turn;
        let round = state.round;
        let current = &mut state.combatants[idx];
        let id = current.id;
        let name = current.name.clone();

        res.record(CombatEvent::TurnStarted {
            combatant: id,
            round,
        });
        res.narrate(format!("Round {round}: {name}'s turn."));

        for attack in &mut current.attacks {
            if let Some(recharge) = attack.recharge.as_mut() {
                if !recharge.ready && rng.gen_range(1..=6) >= recharge.min {
                    recharge.ready = true;
                    res.record(CombatEvent::AttackRecharged {
                        combatant: id,
                        attack: attack.name.clone(),
                    });
                    res.narrate(format!("{name}'s {} recharges!", attack.name));
                }
            }
        }

        let report = effects::tick(current, rng);
        for dot in &report.damage_events {
            let current = &mut state.combatants[idx];
            res.record(CombatEvent::DamageDealt {
                target: id,
                amount: dot.damage,
                hp_after: current.hp,
                dropped_to_zero: current.is_dead,
            });
            res.narrate(format!(
                "{name} takes {} {} damage from {}{}.",
                dot.damage,
                dot.damage_type,
                dot.effect_type,
                self.show(&dot.roll)
            ));
            if let Some(check) = concentration::check_on_damage(current, dot.damage, rng) {
                self.narrate_concentration_check(id, &name, &check, &mut res);
                if !check.maintained {
                    self.release_concentration(state, id, &check.spell, &mut res);
                }
            }
        }
        for effect_type in report.expired {
            res.record(CombatEvent::EffectEnded {
                target: id,
                effect_type,
            });
            res.narrate(format!("{effect_type} on {name} wears off."));
        }
        if state.combatants[idx].is_dead {
            res.narrate(format!("{name} falls!"));
        }

        self.check_end(state, &mut res);
        res
    }

    /// Finish the current turn and begin the next living combatant's.
    pub fn end_turn<R: Rng + ?Sized>(
        &self,
        state: &mut CombatState,
        rng: &mut R,
    ) -> EngineResult<Resolution> {
        if !state.is_active() {
            return Err(EngineError::CombatNotActive);
        }
        let mut res = Resolution::new();
        let idx = state.current_turn;
        let current = &mut state.combatants[idx];
        let id = current.id;
        let name = current.name.clone();

        let report = effects::end_of_turn(current, rng);
        for attempt in &report.saves {
            res.record(CombatEvent::SavingThrow {
                target: id,
                ability: attempt.save.ability,
                total: attempt.save.total,
                dc: attempt.save.dc,
                success: attempt.save.success,
            });
            res.narrate(format!(
                "{name} attempts to shake off {}: {} vs DC {} - {}",
                attempt.effect_type,
                attempt.save.total,
                attempt.save.dc,
                if attempt.save.success { "success!" } else { "failure." }
            ));
        }
        for effect_type in report.expired {
            res.record(CombatEvent::EffectEnded {
                target: id,
                effect_type,
            });
            res.narrate(format!("{name} is no longer {effect_type}."));
        }

        self.check_end(state, &mut res);
        // Damage over time can kill the incoming combatant; keep going until
        // someone alive holds the turn.
        for _ in 0..state.combatants.len() {
            if !state.is_active() {
                break;
            }
            state.next_turn()?;
            res.extend(self.begin_turn(state, rng));
            if state.current().is_some_and(|c| c.is_alive()) {
                break;
            }
        }
        Ok(res)
    }

    /// Resolve the current enemy's action: a living party member chosen by
    /// the configured targeting rule, hit with the first ready attack.
    /// Does not end the turn.
    pub fn run_enemy_turn<R: Rng + ?Sized>(
        &self,
        state: &mut CombatState,
        rng: &mut R,
    ) -> EngineResult<Resolution> {
        if !state.is_active() {
            return Err(EngineError::CombatNotActive);
        }
        let enemy = state
            .current()
            .ok_or(EngineError::CombatNotActive)?;
        if !enemy.is_enemy {
            return Err(EngineError::NotYourTurn(enemy.name.clone()));
        }
        if let Some(condition) = effects::incapacitating_condition(enemy) {
            let res = Resolution::new()
                .with_event(CombatEvent::TurnSkipped {
                    combatant: enemy.id,
                    condition,
                })
                .with_line(format!(
                    "{} is {} and loses its action.",
                    enemy.name,
                    condition.name().to_lowercase()
                ));
            return Ok(res);
        }

        let targets: Vec<&Combatant> = state.living_party().collect();
        let target = match self.config.enemy_targeting {
            EnemyTargeting::Random if !targets.is_empty() => {
                Some(targets[rng.gen_range(0..targets.len())])
            }
            EnemyTargeting::Random => None,
            EnemyTargeting::LowestHp => targets.iter().copied().min_by_key(|c| c.hp),
        }
        .map(|c| c.id)
        .ok_or(EngineError::NoLivingTarget)?;

        let Some(attack_index) = enemy.attacks.iter().position(|a| a.is_ready()) else {
            return Ok(Resolution::new().with_line(format!("{} has no attack ready.", enemy.name)));
        };
        let enemy_id = enemy.id;
        self.execute_attack(state, enemy_id, target, attack_index, rng)
    }
}

/// Roll a catalog dice string, doubling the dice on a critical hit.
fn roll_static<R: Rng + ?Sized>(expr: &str, critical: bool, rng: &mut R) -> RollResult {
    match DiceExpression::parse(expr) {
        Ok(e) if critical => e.doubled().roll_with_rng(rng),
        Ok(e) => e.roll_with_rng(rng),
        Err(_) => dice::roll_lenient(expr, rng),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::AbilityScores;
    use crate::combat::{Attack, DamageType};
    use crate::effects::{DurationType, EffectType};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn hero(initiative: i32) -> Combatant {
        Combatant::new("Hero", 30, 14, AbilityScores::new(16, 12, 14, 10, 10, 10))
            .with_initiative(initiative)
            .with_attacks(vec![Attack::new("Longsword", 5, "1d8+3", DamageType::Slashing)])
    }

    fn orc(initiative: i32) -> Combatant {
        Combatant::new("Orc", 15, 13, AbilityScores::new(16, 12, 16, 7, 11, 10))
            .as_enemy()
            .with_initiative(initiative)
            .with_attacks(vec![Attack::new("Greataxe", 5, "1d12+3", DamageType::Slashing)])
    }

    #[test]
    fn test_attack_validation_leaves_state_untouched() {
        let engine = RulesEngine::default();
        let mut rng = StdRng::seed_from_u64(1);
        let mut state = CombatState::new(vec![hero(20), orc(10)]);
        let hero_id = state.combatants[0].id;
        let orc_id = state.combatants[1].id;

        assert!(matches!(
            engine.execute_attack(&mut state, orc_id, hero_id, 0, &mut rng),
            Err(EngineError::NotYourTurn(_))
        ));
        assert!(matches!(
            engine.execute_attack(&mut state, hero_id, orc_id, 3, &mut rng),
            Err(EngineError::InvalidAttackIndex { index: 3, .. })
        ));
        state.combatants[1].is_dead = true;
        state.combatants[1].hp = 0;
        assert!(matches!(
            engine.execute_attack(&mut state, hero_id, orc_id, 0, &mut rng),
            Err(EngineError::ActionOnDeadCombatant(_))
        ));
        assert_eq!(state.combatants[0].hp, 30);
    }

    #[test]
    fn test_attack_damage_bounds() {
        let engine = RulesEngine::default();
        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..50 {
            let mut state = CombatState::new(vec![hero(20), orc(10)]);
            let hero_id = state.combatants[0].id;
            let orc_id = state.combatants[1].id;
            let res = engine
                .execute_attack(&mut state, hero_id, orc_id, 0, &mut rng)
                .unwrap();
            let dealt = res.damage_to(orc_id);
            let critical = res
                .events
                .iter()
                .any(|e| matches!(e, CombatEvent::AttackRolled { critical: true, .. }));
            if res.any_hit() {
                let max = if critical { 19 } else { 11 };
                assert!((4..=max).contains(&dealt));
            } else {
                assert_eq!(dealt, 0);
            }
            let orc = &state.combatants[1];
            assert!(orc.hp >= 0 && orc.hp <= orc.max_hp);
        }
    }

    #[test]
    fn test_incapacitated_cannot_attack() {
        let engine = RulesEngine::default();
        let mut rng = StdRng::seed_from_u64(1);
        let mut state = CombatState::new(vec![hero(20), orc(10)]);
        let hero_id = state.combatants[0].id;
        let orc_id = state.combatants[1].id;
        effects::apply(
            &mut state.combatants[0],
            StatusEffectInstance::new(EffectType::Stunned, 1, DurationType::Rounds),
        );
        assert!(matches!(
            engine.execute_attack(&mut state, hero_id, orc_id, 0, &mut rng),
            Err(EngineError::CombatantIncapacitated { .. })
        ));
    }

    #[test]
    fn test_strict_dice_rejects_bad_attack() {
        let engine = RulesEngine::new(EngineConfig::default().with_strict_dice(true));
        let mut rng = StdRng::seed_from_u64(1);
        let mut broken = hero(20);
        broken.attacks = vec![Attack::new("Wand", 5, "lots", DamageType::Force)];
        let mut state = CombatState::new(vec![broken, orc(10)]);
        let hero_id = state.combatants[0].id;
        let orc_id = state.combatants[1].id;
        assert!(matches!(
            engine.execute_attack(&mut state, hero_id, orc_id, 0, &mut rng),
            Err(EngineError::InvalidDiceExpression(_))
        ));

        // Lenient engines resolve it to zero damage
        let lenient = RulesEngine::default();
        for _ in 0..20 {
            let res = lenient
                .execute_attack(&mut state, hero_id, orc_id, 0, &mut rng)
                .unwrap();
            assert_eq!(res.damage_to(orc_id), 0);
        }
    }

    #[test]
    fn test_recharge_attack_is_spent() {
        let engine = RulesEngine::default();
        let mut rng = StdRng::seed_from_u64(3);
        let mut hound = orc(20);
        hound.attacks = vec![Attack::new("Fire Breath", 5, "6d6", DamageType::Fire).with_recharge(5)];
        let mut target = hero(10);
        target.hp = 200;
        target.max_hp = 200;
        let mut state = CombatState::new(vec![hound, target]);
        let hound_id = state.combatants[0].id;
        let hero_id = state.combatants[1].id;

        engine
            .execute_attack(&mut state, hound_id, hero_id, 0, &mut rng)
            .unwrap();
        assert!(!state.combatants[0].attacks[0].is_ready());
        assert!(matches!(
            engine.execute_attack(&mut state, hound_id, hero_id, 0, &mut rng),
            Err(EngineError::AttackRecharging { .. })
        ));
    }

    #[test]
    fn test_enemy_turn_targets_lowest_hp() {
        let engine = RulesEngine::new(
            EngineConfig::default().with_enemy_targeting(EnemyTargeting::LowestHp),
        );
        let mut rng = StdRng::seed_from_u64(12);
        let mut weak = hero(5);
        weak.name = "Weakling".to_string();
        weak.hp = 3;
        let mut state = CombatState::new(vec![orc(20), hero(10), weak]);
        let weak_id = state.combatants[2].id;

        let res = engine.run_enemy_turn(&mut state, &mut rng).unwrap();
        assert!(res.events.iter().any(|e| matches!(
            e,
            CombatEvent::AttackRolled { target, .. } if *target == weak_id
        )));
    }

    #[test]
    fn test_stunned_enemy_loses_action() {
        let engine = RulesEngine::default();
        let mut rng = StdRng::seed_from_u64(12);
        let mut state = CombatState::new(vec![orc(20), hero(10)]);
        effects::apply(
            &mut state.combatants[0],
            StatusEffectInstance::new(EffectType::Stunned, 1, DurationType::Rounds),
        );
        let res = engine.run_enemy_turn(&mut state, &mut rng).unwrap();
        assert!(matches!(res.events[0], CombatEvent::TurnSkipped { .. }));
        assert_eq!(state.combatants[1].hp, 30);
    }

    #[test]
    fn test_end_turn_ticks_incoming_combatant() {
        let engine = RulesEngine::default();
        let mut rng = StdRng::seed_from_u64(6);
        let mut state = CombatState::new(vec![hero(20), orc(10)]);
        effects::apply(
            &mut state.combatants[1],
            StatusEffectInstance::new(EffectType::Burning, 2, DurationType::Rounds),
        );
        let res = engine.end_turn(&mut state, &mut rng).unwrap();
        assert_eq!(state.current_turn, 1);
        let orc = &state.combatants[1];
        assert!(orc.hp < orc.max_hp);
        assert_eq!(orc.conditions[0].remaining_duration, 1);
        assert!(res
            .events
            .iter()
            .any(|e| matches!(e, CombatEvent::TurnStarted { round: 1, .. })));
    }

    #[test]
    fn test_level_up_uses_configured_growth() {
        use crate::character::{Character, CharacterClass};
        use crate::config::HitPointGrowth;
        use crate::progression::LevelUpChoice;

        let mut rng = StdRng::seed_from_u64(12);
        let fighter = || {
            let mut bram = Character::new(
                "Bram",
                CharacterClass::Fighter,
                AbilityScores::new(16, 12, 14, 10, 10, 8),
            );
            bram.experience = 300;
            bram
        };

        let average = RulesEngine::default();
        let rolled = RulesEngine::new(
            EngineConfig::default().with_hit_point_growth(HitPointGrowth::Rolled),
        );
        let mut rolled_gains = Vec::new();
        for _ in 0..20 {
            let up = average
                .level_up(&mut fighter(), LevelUpChoice::None, &mut rng)
                .unwrap();
            assert_eq!(up.hp_gained, 8);
            let up = rolled
                .level_up(&mut fighter(), LevelUpChoice::None, &mut rng)
                .unwrap();
            assert!((3..=12).contains(&up.hp_gained));
            rolled_gains.push(up.hp_gained);
        }
        assert!(rolled_gains.iter().any(|&hp| hp != 8));
    }
}
