//! Spell resolution in combat.
//!
//! A cast spends the slot, manages concentration, then hands off to the
//! branch for the spell's [`ResolutionStrategy`].

use crate::character::Ability;
use crate::combat::{self, CombatEvent, CombatState, CombatantId, Resolution};
use crate::concentration;
use crate::dice::{self, DiceError, DiceExpression};
use crate::effects::{self, DurationType, StatusEffectInstance};
use crate::error::{EngineError, EngineResult};
use crate::rules::RulesEngine;
use crate::spellcasting;
use crate::spells::{self, ResolutionStrategy, SaveOutcome, SpellData};
use rand::Rng;
use tracing::{debug, info, warn};

/// Everything a cast needs, computed before anything is mutated.
struct CastPlan {
    caster_idx: usize,
    caster_id: CombatantId,
    caster_name: String,
    spell: &'static SpellData,
    targets: Vec<usize>,
    slot_level: u8,
    damage: Option<DiceExpression>,
    healing: Option<DiceExpression>,
    save_dc: i32,
    attack_bonus: i32,
    spell_modifier: i32,
}

impl RulesEngine {
    /// Cast `spell_key` from the current combatant at `targets`.
    ///
    /// `slot` picks an upcast slot; pact casters always use their pact slot.
    pub fn cast_spell<R: Rng + ?Sized>(
        &self,
        state: &mut CombatState,
        caster_id: CombatantId,
        spell_key: &str,
        targets: &[CombatantId],
        slot: Option<u8>,
        rng: &mut R,
    ) -> EngineResult<Resolution> {
        let plan = self.plan_cast(state, caster_id, spell_key, targets, slot)?;
        let spell = plan.spell;
        let mut res = Resolution::new();

        // Slot spending cannot fail after planning succeeded.
        if let Some(caster) = state.combatants[plan.caster_idx].caster.as_mut() {
            let receipt = spellcasting::cast(caster, spell, slot)?;
            if let Some(level) = receipt.used_level {
                res.record(CombatEvent::SlotSpent {
                    caster: caster_id,
                    level,
                    remaining: receipt.remaining,
                });
            }
        }
        let slot_text = if spell.is_cantrip() {
            String::new()
        } else {
            format!(" using a level {} slot", plan.slot_level)
        };
        res.narrate(format!("{} casts {}{slot_text}!", plan.caster_name, spell.name));
        info!(caster = %plan.caster_name, spell = %spell.name, slot = plan.slot_level, "spell cast");

        if spell.requires_concentration() {
            let dropped = state.combatants[plan.caster_idx]
                .caster
                .as_mut()
                .and_then(|c| concentration::begin(c, &spell.name));
            if let Some(old) = dropped {
                res.narrate(format!(
                    "{} stops concentrating on {old} to concentrate on {}.",
                    plan.caster_name, spell.name
                ));
                self.release_concentration(state, caster_id, &old, &mut res);
            }
        }

        match spell.resolution {
            ResolutionStrategy::AutoHitMultiHit => self.resolve_missiles(state, &plan, rng, &mut res),
            ResolutionStrategy::SaveHalfAoE => self.resolve_area_save(state, &plan, rng, &mut res),
            ResolutionStrategy::SingleSaveEffect => self.resolve_single_save(state, &plan, rng, &mut res),
            ResolutionStrategy::SingleAttackRoll => self.resolve_spell_attack(state, &plan, rng, &mut res),
            ResolutionStrategy::Healing => self.resolve_healing(state, &plan, rng, &mut res),
            ResolutionStrategy::StatusOnly => self.resolve_status(state, &plan, rng, &mut res),
        }

        self.check_end(state, &mut res);
        Ok(res)
    }

    fn plan_cast(
        &self,
        state: &CombatState,
        caster_id: CombatantId,
        spell_key: &str,
        targets: &[CombatantId],
        slot: Option<u8>,
    ) -> EngineResult<CastPlan> {
        let caster_idx = self.validate_actor(state, caster_id)?;
        let combatant = &state.combatants[caster_idx];
        let spell = spells::get_spell(spell_key)
            .ok_or_else(|| EngineError::UnknownSpell(spell_key.to_string()))?;
        let caster = combatant
            .caster
            .as_ref()
            .ok_or_else(|| EngineError::NotASpellcaster(combatant.name.clone()))?;
        let slot_level = spellcasting::slot_for_cast(caster, spell, slot)?.unwrap_or(0);

        let mut target_idxs = Vec::new();
        for &id in targets {
            let idx = self.validate_target(state, id)?;
            if !target_idxs.contains(&idx) {
                target_idxs.push(idx);
            }
        }
        if target_idxs.is_empty() {
            return Err(EngineError::NoLivingTarget);
        }
        if let Some(max) = spell.max_targets {
            if target_idxs.len() > max {
                debug!(spell = %spell.name, max, given = target_idxs.len(), "extra targets ignored");
                target_idxs.truncate(max);
            }
        }

        let damage = self.spell_dice(spell, spell.damage_dice_at(combatant.level, slot_level))?;
        let healing = self.spell_dice(spell, spell.healing_dice_at(combatant.level, slot_level))?;

        Ok(CastPlan {
            caster_idx,
            caster_id,
            caster_name: combatant.name.clone(),
            spell,
            targets: target_idxs,
            slot_level,
            damage,
            healing,
            save_dc: caster.spell_save_dc(&combatant.abilities),
            attack_bonus: caster.spell_attack_bonus(&combatant.abilities),
            spell_modifier: combatant.abilities.modifier(caster.ability),
        })
    }

    fn spell_dice(
        &self,
        spell: &SpellData,
        parsed: Result<Option<DiceExpression>, DiceError>,
    ) -> EngineResult<Option<DiceExpression>> {
        match parsed {
            Ok(expr) => Ok(expr),
            Err(e) if self.config().strict_dice => Err(e.into()),
            Err(e) => {
                warn!(spell = %spell.name, error = %e, "malformed spell dice resolved to zero");
                Ok(None)
            }
        }
    }

    fn effect_instance(&self, plan: &CastPlan) -> Option<StatusEffectInstance> {
        let effect = plan.spell.applies?;
        let mut instance =
            StatusEffectInstance::new(effect.effect_type, effect.duration, effect.duration_type)
                .with_source(plan.caster_name.clone(), Some(plan.caster_id))
                .with_spell(plan.spell.name.clone());
        if effect.duration_type == DurationType::SaveEnds {
            if let Some(ability) = plan.spell.save_type {
                instance = instance.with_save(plan.save_dc, ability);
            }
        }
        Some(instance)
    }

    fn apply_spell_effect(
        &self,
        state: &mut CombatState,
        plan: &CastPlan,
        idx: usize,
        res: &mut Resolution,
    ) {
        if state.combatants[idx].is_dead {
            return;
        }
        if let Some(instance) = self.effect_instance(plan) {
            self.apply_effect(state, idx, instance, res);
        }
    }

    /// Magic Missile and friends: never miss, missiles are split round-robin
    /// and all missiles striking one target are a single damage event.
    fn resolve_missiles<R: Rng + ?Sized>(
        &self,
        state: &mut CombatState,
        plan: &CastPlan,
        rng: &mut R,
        res: &mut Resolution,
    ) {
        let missiles = plan.spell.missile_count(plan.slot_level) as usize;
        let mut per_target = vec![0usize; plan.targets.len()];
        for i in 0..missiles {
            per_target[i % plan.targets.len()] += 1;
        }

        for (&idx, &count) in plan.targets.iter().zip(per_target.iter()) {
            if count == 0 {
                continue;
            }
            let rolls: Vec<i32> = (0..count)
                .map(|_| self.roll(plan.damage, rng).total)
                .collect();
            let raw: i32 = rolls.iter().sum();
            let target = &state.combatants[idx];
            let damage = plan
                .spell
                .damage_type
                .map_or(raw, |dt| target.adjust_damage(raw, dt));
            res.record(CombatEvent::AttackRolled {
                attacker: plan.caster_id,
                target: target.id,
                natural: 0,
                total: raw,
                ac: target.effective_ac(),
                hit: true,
                critical: false,
            });
            let detail = if self.config().narrate_rolls {
                format!(" {rolls:?}")
            } else {
                String::new()
            };
            res.narrate(format!(
                "{count} missile{} strike {} for {raw} damage{detail}.",
                if count == 1 { "" } else { "s" },
                target.name
            ));
            self.deal_damage(state, idx, damage, rng, res);
        }
    }

    /// Area save-for-half: one damage roll shared by every target.
    fn resolve_area_save<R: Rng + ?Sized>(
        &self,
        state: &mut CombatState,
        plan: &CastPlan,
        rng: &mut R,
        res: &mut Resolution,
    ) {
        let roll = self.roll(plan.damage, rng);
        res.narrate(format!("{} damage{}.", roll.total, self.show(&roll)));
        let ability = plan.spell.save_type.unwrap_or(Ability::Dexterity);

        for &idx in &plan.targets {
            if state.combatants[idx].is_dead {
                continue;
            }
            let saved = self.saving_throw(state, idx, ability, plan.save_dc, rng, res);
            let raw = match (saved, plan.spell.save_outcome) {
                (false, _) => roll.total,
                (true, Some(SaveOutcome::Negates)) => 0,
                (true, _) => roll.total / 2,
            };
            let damage = self.typed_damage(state, plan, idx, raw);
            self.deal_damage(state, idx, damage, rng, res);
            if !saved {
                self.apply_spell_effect(state, plan, idx, res);
            }
        }
    }

    /// One target saves against damage and/or an effect.
    fn resolve_single_save<R: Rng + ?Sized>(
        &self,
        state: &mut CombatState,
        plan: &CastPlan,
        rng: &mut R,
        res: &mut Resolution,
    ) {
        let idx = plan.targets[0];
        let ability = plan.spell.save_type.unwrap_or(Ability::Dexterity);
        let saved = self.saving_throw(state, idx, ability, plan.save_dc, rng, res);
        let outcome = plan.spell.save_outcome.unwrap_or(SaveOutcome::Negates);
        if saved && outcome == SaveOutcome::Negates {
            res.narrate(format!(
                "{} is unaffected by {}.",
                state.combatants[idx].name, plan.spell.name
            ));
            return;
        }

        if plan.damage.is_some() {
            let roll = self.roll(plan.damage, rng);
            let raw = if saved { roll.total / 2 } else { roll.total };
            res.narrate(format!("{raw} damage{}.", self.show(&roll)));
            let damage = self.typed_damage(state, plan, idx, raw);
            self.deal_damage(state, idx, damage, rng, res);
        }
        if !saved {
            self.apply_spell_effect(state, plan, idx, res);
        }
    }

    /// Spell attack roll: crits double the dice, natural 1 misses.
    fn resolve_spell_attack<R: Rng + ?Sized>(
        &self,
        state: &mut CombatState,
        plan: &CastPlan,
        rng: &mut R,
        res: &mut Resolution,
    ) {
        let idx = plan.targets[0];
        let (hit, critical) = {
            let caster = &state.combatants[plan.caster_idx];
            let target = &state.combatants[idx];
            let mods = effects::attack_modifiers(caster, target);
            let d20 = dice::roll_d20(mods.advantage_state(), rng);
            let total = d20.natural as i32
                + plan.attack_bonus
                + effects::roll_bonus_dice(&mods.bonus_dice, rng);
            let ac = target.effective_ac();
            let critical = d20.is_natural_20();
            let hit = critical || (!d20.is_natural_1() && total >= ac);
            res.record(CombatEvent::AttackRolled {
                attacker: plan.caster_id,
                target: target.id,
                natural: d20.natural,
                total,
                ac,
                hit,
                critical,
            });
            res.narrate(format!(
                "Spell attack against {}: {total} vs AC {ac} - {}",
                target.name,
                if critical {
                    "CRITICAL HIT!"
                } else if hit {
                    "hit."
                } else {
                    "miss."
                }
            ));
            (hit, critical)
        };
        effects::consume_on_attack(&mut state.combatants[plan.caster_idx]);
        effects::consume_when_attacked(&mut state.combatants[idx]);

        if !hit {
            return;
        }
        let expr = plan.damage.map(|e| if critical { e.doubled() } else { e });
        let roll = self.roll(expr, rng);
        res.narrate(format!("{} damage{}.", roll.total, self.show(&roll)));
        let damage = self.typed_damage(state, plan, idx, roll.total);
        self.deal_damage(state, idx, damage, rng, res);
        self.apply_spell_effect(state, plan, idx, res);
    }

    fn resolve_healing<R: Rng + ?Sized>(
        &self,
        state: &mut CombatState,
        plan: &CastPlan,
        rng: &mut R,
        res: &mut Resolution,
    ) {
        for &idx in &plan.targets {
            let roll = self.roll(plan.healing, rng);
            let amount = (roll.total + plan.spell_modifier).max(0);
            let target = &mut state.combatants[idx];
            let restored = combat::heal(target, amount);
            res.record(CombatEvent::Healed {
                target: target.id,
                amount: restored,
                hp_after: target.hp,
            });
            res.narrate(format!(
                "{} regains {restored} HP{} ({}/{} HP).",
                target.name,
                self.show(&roll),
                target.hp,
                target.max_hp
            ));
        }
    }

    fn resolve_status<R: Rng + ?Sized>(
        &self,
        state: &mut CombatState,
        plan: &CastPlan,
        rng: &mut R,
        res: &mut Resolution,
    ) {
        for &idx in &plan.targets {
            let saved = match plan.spell.save_type {
                Some(ability) => self.saving_throw(state, idx, ability, plan.save_dc, rng, res),
                None => false,
            };
            if saved {
                res.narrate(format!(
                    "{} resists {}.",
                    state.combatants[idx].name, plan.spell.name
                ));
            } else {
                self.apply_spell_effect(state, plan, idx, res);
            }
        }
    }

    fn typed_damage(&self, state: &CombatState, plan: &CastPlan, idx: usize, raw: i32) -> i32 {
        match plan.spell.damage_type {
            Some(dt) => state.combatants[idx].adjust_damage(raw, dt),
            None => raw,
        }
    }
}
