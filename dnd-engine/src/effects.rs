//! Status effects: conditions, spell buffs and debuffs, damage over time.
//!
//! The catalog is a fixed table keyed by [`EffectType`]; every instance on a
//! combatant is a [`StatusEffectInstance`] with its own duration and source.
//! Exhaustion is not an effect instance: it is an integer level on the
//! combatant, handled by [`apply_exhaustion`].

use crate::character::Ability;
use crate::combat::{Combatant, CombatantId, DamageType};
use crate::concentration;
use crate::dice::{self, Advantage, D20Roll, RollResult};
use crate::error::{EngineError, EngineResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

/// Exhaustion level at which a creature dies.
pub const MAX_EXHAUSTION: u8 = 6;

/// Exhaustion level from which attack rolls and saves have disadvantage.
pub const EXHAUSTION_DISADVANTAGE: u8 = 3;

// ============================================================================
// Catalog
// ============================================================================

/// Every status effect the engine knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectType {
    // Conditions
    Blinded,
    Charmed,
    Deafened,
    Frightened,
    Grappled,
    Incapacitated,
    Invisible,
    Paralyzed,
    Petrified,
    Poisoned,
    Prone,
    Restrained,
    Stunned,
    Unconscious,

    // Buffs
    Blessed,
    Hasted,
    ShieldOfFaith,
    Dodging,
    Hidden,
    Raging,

    // Debuffs
    Baned,
    Slowed,
    Hexed,
    HuntersMarked,
    Outlined,
    Illuminated,
    Mocked,
    Chilled,

    // Damage over time
    Burning,
    Bleeding,
    Corroded,
    Envenomed,
}

impl EffectType {
    pub const ALL: [EffectType; 32] = [
        EffectType::Blinded,
        EffectType::Charmed,
        EffectType::Deafened,
        EffectType::Frightened,
        EffectType::Grappled,
        EffectType::Incapacitated,
        EffectType::Invisible,
        EffectType::Paralyzed,
        EffectType::Petrified,
        EffectType::Poisoned,
        EffectType::Prone,
        EffectType::Restrained,
        EffectType::Stunned,
        EffectType::Unconscious,
        EffectType::Blessed,
        EffectType::Hasted,
        EffectType::ShieldOfFaith,
        EffectType::Dodging,
        EffectType::Hidden,
        EffectType::Raging,
        EffectType::Baned,
        EffectType::Slowed,
        EffectType::Hexed,
        EffectType::HuntersMarked,
        EffectType::Outlined,
        EffectType::Illuminated,
        EffectType::Mocked,
        EffectType::Chilled,
        EffectType::Burning,
        EffectType::Bleeding,
        EffectType::Corroded,
        EffectType::Envenomed,
    ];

    /// Stable snake_case key, as accepted by [`FromStr`].
    pub fn key(&self) -> &'static str {
        match self {
            EffectType::Blinded => "blinded",
            EffectType::Charmed => "charmed",
            EffectType::Deafened => "deafened",
            EffectType::Frightened => "frightened",
            EffectType::Grappled => "grappled",
            EffectType::Incapacitated => "incapacitated",
            EffectType::Invisible => "invisible",
            EffectType::Paralyzed => "paralyzed",
            EffectType::Petrified => "petrified",
            EffectType::Poisoned => "poisoned",
            EffectType::Prone => "prone",
            EffectType::Restrained => "restrained",
            EffectType::Stunned => "stunned",
            EffectType::Unconscious => "unconscious",
            EffectType::Blessed => "blessed",
            EffectType::Hasted => "hasted",
            EffectType::ShieldOfFaith => "shield_of_faith",
            EffectType::Dodging => "dodging",
            EffectType::Hidden => "hidden",
            EffectType::Raging => "raging",
            EffectType::Baned => "baned",
            EffectType::Slowed => "slowed",
            EffectType::Hexed => "hexed",
            EffectType::HuntersMarked => "hunters_marked",
            EffectType::Outlined => "outlined",
            EffectType::Illuminated => "illuminated",
            EffectType::Mocked => "mocked",
            EffectType::Chilled => "chilled",
            EffectType::Burning => "burning",
            EffectType::Bleeding => "bleeding",
            EffectType::Corroded => "corroded",
            EffectType::Envenomed => "envenomed",
        }
    }

    pub fn name(&self) -> &'static str {
        self.definition().name
    }

    pub fn definition(&self) -> EffectDefinition {
        definition(*self)
    }
}

impl fmt::Display for EffectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for EffectType {
    type Err = EngineError;

    /// Accepts the key (`shield_of_faith`) or the display name
    /// (`Shield of Faith`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize_key(s);
        EffectType::ALL
            .iter()
            .copied()
            .find(|t| t.key() == wanted || normalize_key(t.name()) == wanted)
            .ok_or_else(|| EngineError::UnknownStatusEffectType(s.to_string()))
    }
}

fn normalize_key(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .chars()
        .filter(|c| *c != '\'')
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// A signed die added to a d20 roll (Bless, Bane).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BonusDie {
    pub dice: &'static str,
    /// +1 or -1.
    pub sign: i32,
}

/// Extra damage dealt by the effect's source on each hit (Hex, Hunter's Mark).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourceDamage {
    pub dice: &'static str,
    /// `None` uses the damage type of the triggering attack.
    pub damage_type: Option<DamageType>,
}

/// Static rules for one effect type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EffectDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub stackable: bool,
    pub max_stacks: u8,
    /// Rolled at the start of the owner's turn, once per stack.
    pub damage_per_turn: Option<(&'static str, DamageType)>,
    /// The owner's attack rolls have advantage.
    pub attack_advantage: bool,
    /// The owner's attack rolls have disadvantage.
    pub attack_disadvantage: bool,
    /// Attack rolls against the owner have advantage.
    pub grants_advantage_to_attackers: bool,
    /// Attack rolls against the owner have disadvantage.
    pub imposes_disadvantage_on_attackers: bool,
    pub attack_roll_die: Option<BonusDie>,
    pub save_roll_die: Option<BonusDie>,
    pub source_damage: Option<SourceDamage>,
    pub ac_bonus: i32,
    pub resistances: &'static [DamageType],
    pub incapacitates: bool,
    pub auto_fail_str_dex_saves: bool,
    /// Removed after the next attack roll made against the owner.
    pub consumed_when_attacked: bool,
    /// Removed after the owner's next attack roll.
    pub consumed_on_own_attack: bool,
    pub beneficial: bool,
}

const BASE: EffectDefinition = EffectDefinition {
    name: "",
    description: "",
    stackable: false,
    max_stacks: 1,
    damage_per_turn: None,
    attack_advantage: false,
    attack_disadvantage: false,
    grants_advantage_to_attackers: false,
    imposes_disadvantage_on_attackers: false,
    attack_roll_die: None,
    save_roll_die: None,
    source_damage: None,
    ac_bonus: 0,
    resistances: &[],
    incapacitates: false,
    auto_fail_str_dex_saves: false,
    consumed_when_attacked: false,
    consumed_on_own_attack: false,
    beneficial: false,
};

const BLESS_DIE: BonusDie = BonusDie {
    dice: "1d4",
    sign: 1,
};

const BANE_DIE: BonusDie = BonusDie {
    dice: "1d4",
    sign: -1,
};

fn definition(effect_type: EffectType) -> EffectDefinition {
    match effect_type {
        EffectType::Blinded => EffectDefinition {
            name: "Blinded",
            description: "Can't see. Attacks against it have advantage; its attacks have disadvantage.",
            attack_disadvantage: true,
            grants_advantage_to_attackers: true,
            ..BASE
        },
        EffectType::Charmed => EffectDefinition {
            name: "Charmed",
            description: "Can't attack the charmer or target it with harmful effects.",
            ..BASE
        },
        EffectType::Deafened => EffectDefinition {
            name: "Deafened",
            description: "Can't hear and automatically fails checks that require hearing.",
            ..BASE
        },
        EffectType::Frightened => EffectDefinition {
            name: "Frightened",
            description: "Disadvantage on ability checks and attack rolls while the source is in sight.",
            attack_disadvantage: true,
            ..BASE
        },
        EffectType::Grappled => EffectDefinition {
            name: "Grappled",
            description: "Speed becomes 0.",
            ..BASE
        },
        EffectType::Incapacitated => EffectDefinition {
            name: "Incapacitated",
            description: "Can't take actions or reactions.",
            incapacitates: true,
            ..BASE
        },
        EffectType::Invisible => EffectDefinition {
            name: "Invisible",
            description: "Attacks against it have disadvantage; its attacks have advantage.",
            attack_advantage: true,
            imposes_disadvantage_on_attackers: true,
            beneficial: true,
            ..BASE
        },
        EffectType::Paralyzed => EffectDefinition {
            name: "Paralyzed",
            description: "Incapacitated and can't move. Fails STR and DEX saves; attacks against it have advantage.",
            grants_advantage_to_attackers: true,
            incapacitates: true,
            auto_fail_str_dex_saves: true,
            ..BASE
        },
        EffectType::Petrified => EffectDefinition {
            name: "Petrified",
            description: "Transformed to stone. Incapacitated, fails STR and DEX saves, resists all damage.",
            grants_advantage_to_attackers: true,
            incapacitates: true,
            auto_fail_str_dex_saves: true,
            resistances: &[
                DamageType::Slashing,
                DamageType::Piercing,
                DamageType::Bludgeoning,
                DamageType::Fire,
                DamageType::Cold,
                DamageType::Lightning,
                DamageType::Thunder,
                DamageType::Acid,
                DamageType::Poison,
                DamageType::Necrotic,
                DamageType::Radiant,
                DamageType::Force,
                DamageType::Psychic,
            ],
            ..BASE
        },
        EffectType::Poisoned => EffectDefinition {
            name: "Poisoned",
            description: "Disadvantage on attack rolls and ability checks.",
            attack_disadvantage: true,
            ..BASE
        },
        EffectType::Prone => EffectDefinition {
            name: "Prone",
            description: "Its attacks have disadvantage; attacks against it have advantage.",
            attack_disadvantage: true,
            grants_advantage_to_attackers: true,
            ..BASE
        },
        EffectType::Restrained => EffectDefinition {
            name: "Restrained",
            description: "Speed 0. Its attacks have disadvantage; attacks against it have advantage.",
            attack_disadvantage: true,
            grants_advantage_to_attackers: true,
            ..BASE
        },
        EffectType::Stunned => EffectDefinition {
            name: "Stunned",
            description: "Incapacitated. Fails STR and DEX saves; attacks against it have advantage.",
            grants_advantage_to_attackers: true,
            incapacitates: true,
            auto_fail_str_dex_saves: true,
            ..BASE
        },
        EffectType::Unconscious => EffectDefinition {
            name: "Unconscious",
            description: "Incapacitated and unaware. Fails STR and DEX saves; attacks against it have advantage.",
            grants_advantage_to_attackers: true,
            incapacitates: true,
            auto_fail_str_dex_saves: true,
            ..BASE
        },

        EffectType::Blessed => EffectDefinition {
            name: "Blessed",
            description: "Adds 1d4 to attack rolls and saving throws.",
            attack_roll_die: Some(BLESS_DIE),
            save_roll_die: Some(BLESS_DIE),
            beneficial: true,
            ..BASE
        },
        EffectType::Hasted => EffectDefinition {
            name: "Hasted",
            description: "+2 AC, doubled speed and an extra action.",
            ac_bonus: 2,
            beneficial: true,
            ..BASE
        },
        EffectType::ShieldOfFaith => EffectDefinition {
            name: "Shield of Faith",
            description: "+2 AC.",
            ac_bonus: 2,
            beneficial: true,
            ..BASE
        },
        EffectType::Dodging => EffectDefinition {
            name: "Dodging",
            description: "Attacks against it have disadvantage until its next turn.",
            imposes_disadvantage_on_attackers: true,
            beneficial: true,
            ..BASE
        },
        EffectType::Hidden => EffectDefinition {
            name: "Hidden",
            description: "Unseen; its next attack has advantage.",
            attack_advantage: true,
            consumed_on_own_attack: true,
            beneficial: true,
            ..BASE
        },
        EffectType::Raging => EffectDefinition {
            name: "Raging",
            description: "Resistance to bludgeoning, piercing and slashing damage.",
            resistances: &[
                DamageType::Bludgeoning,
                DamageType::Piercing,
                DamageType::Slashing,
            ],
            beneficial: true,
            ..BASE
        },

        EffectType::Baned => EffectDefinition {
            name: "Baned",
            description: "Subtracts 1d4 from attack rolls and saving throws.",
            attack_roll_die: Some(BANE_DIE),
            save_roll_die: Some(BANE_DIE),
            ..BASE
        },
        EffectType::Slowed => EffectDefinition {
            name: "Slowed",
            description: "-2 AC, halved speed, no reactions.",
            ac_bonus: -2,
            ..BASE
        },
        EffectType::Hexed => EffectDefinition {
            name: "Hexed",
            description: "Takes an extra 1d6 necrotic damage whenever the hexer hits it.",
            source_damage: Some(SourceDamage {
                dice: "1d6",
                damage_type: Some(DamageType::Necrotic),
            }),
            ..BASE
        },
        EffectType::HuntersMarked => EffectDefinition {
            name: "Hunter's Mark",
            description: "Takes an extra 1d6 damage whenever the hunter hits it.",
            source_damage: Some(SourceDamage {
                dice: "1d6",
                damage_type: None,
            }),
            ..BASE
        },
        EffectType::Outlined => EffectDefinition {
            name: "Outlined",
            description: "Limned in light; attacks against it have advantage and it can't be invisible.",
            grants_advantage_to_attackers: true,
            ..BASE
        },
        EffectType::Illuminated => EffectDefinition {
            name: "Illuminated",
            description: "The next attack roll against it has advantage.",
            grants_advantage_to_attackers: true,
            consumed_when_attacked: true,
            ..BASE
        },
        EffectType::Mocked => EffectDefinition {
            name: "Mocked",
            description: "Its next attack roll has disadvantage.",
            attack_disadvantage: true,
            consumed_on_own_attack: true,
            ..BASE
        },
        EffectType::Chilled => EffectDefinition {
            name: "Chilled",
            description: "Speed reduced by 10 feet.",
            ..BASE
        },

        EffectType::Burning => EffectDefinition {
            name: "Burning",
            description: "Takes 1d6 fire damage at the start of each turn.",
            stackable: true,
            max_stacks: 5,
            damage_per_turn: Some(("1d6", DamageType::Fire)),
            ..BASE
        },
        EffectType::Bleeding => EffectDefinition {
            name: "Bleeding",
            description: "Takes 1d4 slashing damage at the start of each turn.",
            stackable: true,
            max_stacks: 5,
            damage_per_turn: Some(("1d4", DamageType::Slashing)),
            ..BASE
        },
        EffectType::Corroded => EffectDefinition {
            name: "Corroded",
            description: "Takes 2d4 acid damage at the start of each turn.",
            stackable: true,
            max_stacks: 3,
            damage_per_turn: Some(("2d4", DamageType::Acid)),
            ..BASE
        },
        EffectType::Envenomed => EffectDefinition {
            name: "Envenomed",
            description: "Takes 1d6 poison damage at the start of each turn.",
            stackable: true,
            max_stacks: 3,
            damage_per_turn: Some(("1d6", DamageType::Poison)),
            ..BASE
        },
    }
}

// ============================================================================
// Instances
// ============================================================================

/// Unique identifier for an effect instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectId(pub Uuid);

impl EffectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EffectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How an instance's `remaining_duration` is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurationType {
    Rounds,
    Minutes,
    Hours,
    /// Lasts until the owner succeeds on the instance's save at end of turn.
    SaveEnds,
    /// Lasts while the source concentrates on `spell_name`.
    Concentration,
    Permanent,
    /// Expires at the end of the owner's current turn.
    EndOfTurn,
}

/// One effect on one combatant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEffectInstance {
    pub id: EffectId,
    pub effect_type: EffectType,
    pub stack_count: u8,
    pub remaining_duration: i32,
    pub duration_type: DurationType,
    pub source_name: String,
    pub source_id: Option<CombatantId>,
    pub save_dc: Option<i32>,
    pub save_ability: Option<Ability>,
    pub spell_name: Option<String>,
}

impl StatusEffectInstance {
    pub fn new(effect_type: EffectType, duration: i32, duration_type: DurationType) -> Self {
        Self {
            id: EffectId::new(),
            effect_type,
            stack_count: 1,
            remaining_duration: duration,
            duration_type,
            source_name: String::new(),
            source_id: None,
            save_dc: None,
            save_ability: None,
            spell_name: None,
        }
    }

    pub fn with_source(mut self, name: impl Into<String>, id: Option<CombatantId>) -> Self {
        self.source_name = name.into();
        self.source_id = id;
        self
    }

    pub fn with_save(mut self, dc: i32, ability: Ability) -> Self {
        self.save_dc = Some(dc);
        self.save_ability = Some(ability);
        self
    }

    pub fn with_spell(mut self, spell_name: impl Into<String>) -> Self {
        self.spell_name = Some(spell_name.into());
        self
    }

    pub fn with_stacks(mut self, stack_count: u8) -> Self {
        self.stack_count = stack_count.max(1);
        self
    }

    pub fn definition(&self) -> EffectDefinition {
        self.effect_type.definition()
    }

    /// Duration normalized to rounds for comparing two instances.
    fn duration_rank(&self) -> i64 {
        let remaining = self.remaining_duration as i64;
        match self.duration_type {
            DurationType::EndOfTurn => 0,
            DurationType::Rounds => remaining,
            DurationType::Minutes => remaining * 10,
            DurationType::Hours => remaining * 600,
            DurationType::SaveEnds | DurationType::Concentration | DurationType::Permanent => {
                i64::MAX
            }
        }
    }

    fn take_duration_from(&mut self, other: &StatusEffectInstance) {
        if other.duration_rank() > self.duration_rank() {
            self.remaining_duration = other.remaining_duration;
            self.duration_type = other.duration_type;
            self.source_name = other.source_name.clone();
            self.source_id = other.source_id;
            self.save_dc = other.save_dc;
            self.save_ability = other.save_ability;
            self.spell_name = other.spell_name.clone();
        }
    }
}

/// Build an instance from a string key such as `"burning"` or `"Shield of Faith"`.
pub fn create_instance(
    key: &str,
    duration: i32,
    duration_type: DurationType,
) -> EngineResult<StatusEffectInstance> {
    let effect_type: EffectType = key.parse()?;
    Ok(StatusEffectInstance::new(effect_type, duration, duration_type))
}

// ============================================================================
// Apply / Remove
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyKind {
    Added,
    Stacked,
    Refreshed,
    /// The combatant is immune to this effect.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    /// Instance now carrying the effect, if any.
    pub id: Option<EffectId>,
    pub kind: ApplyKind,
    /// Spell whose concentration this application broke.
    pub broke_concentration: Option<String>,
}

/// Apply an effect, merging with an existing instance of the same type.
pub fn apply(combatant: &mut Combatant, instance: StatusEffectInstance) -> ApplyOutcome {
    let effect_type = instance.effect_type;
    if combatant.condition_immunities.contains(&effect_type) {
        debug!(target = %combatant.name, effect = %effect_type, "immune to effect");
        return ApplyOutcome {
            id: None,
            kind: ApplyKind::Ignored,
            broke_concentration: None,
        };
    }

    let def = effect_type.definition();
    let (id, kind) = match combatant
        .conditions
        .iter_mut()
        .find(|c| c.effect_type == effect_type)
    {
        Some(existing) if def.stackable => {
            existing.stack_count = existing
                .stack_count
                .saturating_add(instance.stack_count)
                .min(def.max_stacks);
            existing.take_duration_from(&instance);
            (existing.id, ApplyKind::Stacked)
        }
        Some(existing) => {
            existing.take_duration_from(&instance);
            (existing.id, ApplyKind::Refreshed)
        }
        None => {
            let mut instance = instance;
            instance.stack_count = instance.stack_count.min(def.max_stacks).max(1);
            let id = instance.id;
            combatant.conditions.push(instance);
            (id, ApplyKind::Added)
        }
    };
    debug!(target = %combatant.name, effect = %effect_type, ?kind, "effect applied");

    let broke_concentration = if concentration::BREAKING_CONDITIONS.contains(&effect_type) {
        combatant.caster.as_mut().and_then(concentration::end)
    } else {
        None
    };

    ApplyOutcome {
        id: Some(id),
        kind,
        broke_concentration,
    }
}

/// Remove an instance by id. Removing an absent id is a no-op.
pub fn remove(combatant: &mut Combatant, id: EffectId) -> Option<StatusEffectInstance> {
    let pos = combatant.conditions.iter().position(|c| c.id == id)?;
    Some(combatant.conditions.remove(pos))
}

/// Remove every instance of a type. Returns how many were removed.
pub fn remove_by_type(combatant: &mut Combatant, effect_type: EffectType) -> usize {
    let before = combatant.conditions.len();
    combatant.conditions.retain(|c| c.effect_type != effect_type);
    before - combatant.conditions.len()
}

/// Remove instances `source` placed with `spell`, once concentration on it
/// has ended. Save-ends effects from a concentration spell go too.
pub fn remove_concentration_effects(
    combatant: &mut Combatant,
    source: CombatantId,
    spell: &str,
) -> Vec<EffectType> {
    let mut removed = Vec::new();
    combatant.conditions.retain(|c| {
        let linked = c.source_id == Some(source) && c.spell_name.as_deref() == Some(spell);
        if linked {
            removed.push(c.effect_type);
        }
        !linked
    });
    removed
}

// ============================================================================
// Turn Boundaries
// ============================================================================

/// Damage dealt by one damage-over-time effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DotDamage {
    pub effect_type: EffectType,
    pub roll: RollResult,
    pub damage_type: DamageType,
    /// After resistances and immunities.
    pub damage: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    pub damage_events: Vec<DotDamage>,
    pub expired: Vec<EffectType>,
}

/// Start of the owner's turn: damage over time, then round durations.
pub fn tick<R: Rng + ?Sized>(combatant: &mut Combatant, rng: &mut R) -> TickReport {
    let mut report = TickReport::default();
    if combatant.is_dead {
        return report;
    }

    let dots: Vec<(EffectType, u8, &'static str, DamageType)> = combatant
        .conditions
        .iter()
        .filter_map(|c| {
            c.definition()
                .damage_per_turn
                .map(|(dice, dt)| (c.effect_type, c.stack_count, dice, dt))
        })
        .collect();

    for (effect_type, stacks, dice_expr, damage_type) in dots {
        let roll = match dice::DiceExpression::parse(dice_expr) {
            Ok(expr) => expr.scaled(stacks as u32).roll_with_rng(rng),
            Err(_) => dice::roll_lenient(dice_expr, rng),
        };
        let damage = combatant.adjust_damage(roll.total, damage_type);
        crate::combat::apply_damage(combatant, damage);
        debug!(target = %combatant.name, effect = %effect_type, damage, "damage over time");
        report.damage_events.push(DotDamage {
            effect_type,
            roll,
            damage_type,
            damage,
        });
    }

    combatant.conditions.retain_mut(|c| {
        if c.duration_type != DurationType::Rounds {
            return true;
        }
        c.remaining_duration -= 1;
        if c.remaining_duration <= 0 {
            report.expired.push(c.effect_type);
            false
        } else {
            true
        }
    });

    report
}

/// One save-ends attempt made at the end of a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveEndsAttempt {
    pub effect_type: EffectType,
    pub save: SaveResult,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndOfTurnReport {
    pub expired: Vec<EffectType>,
    pub saves: Vec<SaveEndsAttempt>,
}

/// End of the owner's turn: end-of-turn effects expire and save-ends effects
/// get a saving throw. Save-ends effects without a DC persist.
pub fn end_of_turn<R: Rng + ?Sized>(combatant: &mut Combatant, rng: &mut R) -> EndOfTurnReport {
    let mut report = EndOfTurnReport::default();

    combatant.conditions.retain(|c| {
        if c.duration_type == DurationType::EndOfTurn {
            report.expired.push(c.effect_type);
            false
        } else {
            true
        }
    });

    let pending: Vec<(EffectId, EffectType, i32, Ability)> = combatant
        .conditions
        .iter()
        .filter(|c| c.duration_type == DurationType::SaveEnds)
        .filter_map(|c| {
            let dc = c.save_dc?;
            Some((c.id, c.effect_type, dc, c.save_ability.unwrap_or(Ability::Constitution)))
        })
        .collect();

    for (id, effect_type, dc, ability) in pending {
        let save = roll_saving_throw(combatant, ability, dc, rng);
        if save.success {
            remove(combatant, id);
            report.expired.push(effect_type);
        }
        report.saves.push(SaveEndsAttempt { effect_type, save });
    }

    report
}

/// Let time pass outside combat. One round is six seconds.
pub fn advance_time(conditions: &mut Vec<StatusEffectInstance>, minutes: u32) -> Vec<EffectType> {
    let minutes = minutes as i32;
    let mut expired = Vec::new();
    conditions.retain_mut(|c| {
        let keep = match c.duration_type {
            DurationType::Rounds => {
                c.remaining_duration -= minutes.saturating_mul(10);
                c.remaining_duration > 0
            }
            DurationType::Minutes => {
                c.remaining_duration -= minutes;
                c.remaining_duration > 0
            }
            DurationType::Hours => {
                let left = c.remaining_duration.saturating_mul(60) - minutes;
                if left % 60 != 0 {
                    c.duration_type = DurationType::Minutes;
                    c.remaining_duration = left;
                } else {
                    c.remaining_duration = left / 60;
                }
                left > 0
            }
            DurationType::EndOfTurn => minutes == 0,
            DurationType::SaveEnds | DurationType::Concentration | DurationType::Permanent => true,
        };
        if !keep {
            expired.push(c.effect_type);
        }
        keep
    });
    expired
}

/// Whether an effect still means anything once the fight is over. Save-ends
/// and end-of-turn effects only resolve on turn boundaries.
pub fn outlasts_combat(effect: &StatusEffectInstance) -> bool {
    !matches!(
        effect.duration_type,
        DurationType::SaveEnds | DurationType::EndOfTurn
    )
}

// ============================================================================
// Derived Modifiers
// ============================================================================

/// Everything the effects on both sides contribute to one attack roll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttackModifiers {
    pub advantage: bool,
    pub disadvantage: bool,
    pub bonus_dice: Vec<BonusDie>,
}

impl AttackModifiers {
    /// Advantage and disadvantage together cancel out.
    pub fn advantage_state(&self) -> Advantage {
        Advantage::from_flags(self.advantage, self.disadvantage)
    }
}

pub fn attack_modifiers(attacker: &Combatant, defender: &Combatant) -> AttackModifiers {
    let mut mods = AttackModifiers::default();

    for c in &attacker.conditions {
        let def = c.definition();
        mods.advantage |= def.attack_advantage;
        mods.disadvantage |= def.attack_disadvantage;
        if let Some(die) = def.attack_roll_die {
            mods.bonus_dice.push(die);
        }
    }
    if attacker.exhaustion >= EXHAUSTION_DISADVANTAGE {
        mods.disadvantage = true;
    }

    for c in &defender.conditions {
        let def = c.definition();
        mods.advantage |= def.grants_advantage_to_attackers;
        mods.disadvantage |= def.imposes_disadvantage_on_attackers;
    }

    mods
}

/// Extra damage `attacker` deals to `defender` through effects it placed there.
pub fn source_damage(attacker: CombatantId, defender: &Combatant) -> Vec<SourceDamage> {
    defender
        .conditions
        .iter()
        .filter(|c| c.source_id == Some(attacker))
        .filter_map(|c| c.definition().source_damage)
        .collect()
}

/// Drop the attacker's one-shot effects after it makes an attack roll.
pub fn consume_on_attack(attacker: &mut Combatant) {
    attacker
        .conditions
        .retain(|c| !c.definition().consumed_on_own_attack);
}

/// Drop the defender's one-shot effects after an attack roll against it.
pub fn consume_when_attacked(defender: &mut Combatant) {
    defender
        .conditions
        .retain(|c| !c.definition().consumed_when_attacked);
}

/// Roll each bonus die and sum them with their signs.
pub fn roll_bonus_dice<R: Rng + ?Sized>(dice: &[BonusDie], rng: &mut R) -> i32 {
    dice.iter()
        .map(|d| d.sign * dice::roll_lenient(d.dice, rng).total)
        .sum()
}

/// First condition that prevents the combatant from acting.
pub fn incapacitating_condition(combatant: &Combatant) -> Option<EffectType> {
    combatant
        .conditions
        .iter()
        .map(|c| c.effect_type)
        .find(|t| t.definition().incapacitates)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveResult {
    pub ability: Ability,
    pub roll: D20Roll,
    /// Natural roll plus save modifier and bonus dice.
    pub total: i32,
    pub dc: i32,
    pub success: bool,
    pub auto_failed: bool,
}

/// Saving throw including effect bonus dice, exhaustion and automatic failure
/// from conditions.
pub fn roll_saving_throw<R: Rng + ?Sized>(
    combatant: &Combatant,
    ability: Ability,
    dc: i32,
    rng: &mut R,
) -> SaveResult {
    let advantage = Advantage::from_flags(false, combatant.exhaustion >= EXHAUSTION_DISADVANTAGE);
    let roll = dice::roll_d20(advantage, rng);

    let bonus_dice: Vec<BonusDie> = combatant
        .conditions
        .iter()
        .filter_map(|c| c.definition().save_roll_die)
        .collect();
    let total = roll.natural as i32
        + combatant.saving_throw_modifier(ability)
        + roll_bonus_dice(&bonus_dice, rng);

    let auto_failed = matches!(ability, Ability::Strength | Ability::Dexterity)
        && combatant
            .conditions
            .iter()
            .any(|c| c.definition().auto_fail_str_dex_saves);

    SaveResult {
        ability,
        roll,
        total,
        dc,
        success: !auto_failed && total >= dc,
        auto_failed,
    }
}

/// Add exhaustion levels. Returns true if this killed the combatant.
pub fn apply_exhaustion(combatant: &mut Combatant, levels: u8) -> bool {
    let was_dead = combatant.is_dead;
    combatant.exhaustion = combatant.exhaustion.saturating_add(levels).min(MAX_EXHAUSTION);
    if combatant.exhaustion >= MAX_EXHAUSTION {
        combatant.hp = 0;
        combatant.is_dead = true;
    }
    !was_dead && combatant.is_dead
}
