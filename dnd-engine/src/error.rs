//! Errors returned by engine operations.
//!
//! Every variant is recoverable: an operation that returns an error leaves
//! the state it was given untouched, and the caller decides how to surface it.

use crate::dice::DiceError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Invalid dice expression: {0}")]
    InvalidDiceExpression(String),

    #[error("Unknown status effect type: {0}")]
    UnknownStatusEffectType(String),

    #[error("No level {level} spell slots remaining")]
    NoSlotsRemaining { level: u8 },

    #[error("{spell} is level {spell_level}, above the pact slot level of {pact_level}")]
    SpellLevelExceedsPactCap {
        spell: String,
        spell_level: u8,
        pact_level: u8,
    },

    #[error("No living target")]
    NoLivingTarget,

    #[error("{0} is dead and cannot act or be targeted")]
    ActionOnDeadCombatant(String),

    #[error("{0} has not chosen a spellcasting subclass")]
    NoSubclassSelected(String),

    #[error("{name} cannot act while {condition}")]
    CombatantIncapacitated { name: String, condition: String },

    #[error("Unknown spell: {0}")]
    UnknownSpell(String),

    #[error("Unknown enemy: {0}")]
    UnknownEnemy(String),

    #[error("No combatant with id {0}")]
    UnknownCombatant(String),

    #[error("{name} has no attack at index {index}")]
    InvalidAttackIndex { name: String, index: usize },

    #[error("{name}'s {attack} is still recharging")]
    AttackRecharging { name: String, attack: String },

    #[error("Cannot cast {spell} with a level {slot} slot")]
    InvalidSlotLevel { spell: String, slot: u8 },

    #[error("{0} cannot cast spells")]
    NotASpellcaster(String),

    #[error("Combat is not active")]
    CombatNotActive,

    #[error("It is not {0}'s turn")]
    NotYourTurn(String),

    #[error("{name} already follows the {subclass} path")]
    SubclassAlreadyChosen { name: String, subclass: String },

    #[error("{subclass} is not available to a {class}")]
    SubclassNotAvailable { subclass: String, class: String },

    #[error("{name} needs {needed} XP to reach level {level}")]
    InsufficientExperience { name: String, level: u8, needed: u32 },

    #[error("Invalid level-up choice: {0}")]
    InvalidLevelUpChoice(String),

    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),
}

impl From<DiceError> for EngineError {
    fn from(e: DiceError) -> Self {
        let expr = match e {
            DiceError::InvalidExpression(s)
            | DiceError::InvalidDieSize(s)
            | DiceError::TooManyDice(s) => s,
        };
        EngineError::InvalidDiceExpression(expr)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
