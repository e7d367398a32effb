//! Engine configuration.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

/// How hit points grow on level-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HitPointGrowth {
    /// Half the hit die plus one, plus CON modifier.
    #[default]
    Average,
    /// Roll the hit die, plus CON modifier.
    Rolled,
}

/// How automated enemies pick their victims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EnemyTargeting {
    /// A uniformly random living party member.
    #[default]
    Random,
    /// The living party member with the fewest hit points.
    LowestHp,
}

/// Configuration for a [`RulesEngine`](crate::rules::RulesEngine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Reject malformed dice expressions instead of resolving them to zero.
    pub strict_dice: bool,
    /// Hit point growth used by level-ups.
    pub hit_point_growth: HitPointGrowth,
    /// Include individual dice in narrative log lines.
    pub narrate_rolls: bool,
    /// Target selection for automated enemy turns.
    pub enemy_targeting: EnemyTargeting,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict_dice: false,
            hit_point_growth: HitPointGrowth::Average,
            narrate_rolls: true,
            enemy_targeting: EnemyTargeting::Random,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> EngineResult<Self> {
        serde_json::from_str(json).map_err(|e| EngineError::InvalidConfig(e.to_string()))
    }

    pub fn with_strict_dice(mut self, strict: bool) -> Self {
        self.strict_dice = strict;
        self
    }

    pub fn with_hit_point_growth(mut self, growth: HitPointGrowth) -> Self {
        self.hit_point_growth = growth;
        self
    }

    pub fn with_narrated_rolls(mut self, narrate: bool) -> Self {
        self.narrate_rolls = narrate;
        self
    }

    pub fn with_enemy_targeting(mut self, targeting: EnemyTargeting) -> Self {
        self.enemy_targeting = targeting;
        self
    }
}
