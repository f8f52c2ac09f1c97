use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ability::definition::AbilityCost;
use crate::ability::effects::EffectResult;
use crate::combat::concentration::ConcentrationCheck;
use crate::combat::roll::{AttackRollResult, SaveRollResult};
use crate::combat::trace::CombatEvent;

/// Per-call knobs for [crate::ability::AbilityPipeline::execute].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOptions {
    #[serde(default)]
    pub variant_id: Option<String>,
    #[serde(default)]
    pub upcast_level: u32,
    /// Caller already validated budget and resources; they are still consumed.
    #[serde(default)]
    pub skip_cost_validation: bool,
}

impl ExecutionOptions {
    pub fn variant(variant_id: &str) -> Self {
        Self {
            variant_id: Some(variant_id.to_string()),
            ..Self::default()
        }
    }

    pub fn upcast(level: u32) -> Self {
        Self {
            upcast_level: level,
            ..Self::default()
        }
    }
}

/// Why a gate refused an execution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct ValidationFailure {
    pub reason: String,
}

impl ValidationFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AbilityExecutionResult {
    pub success: bool,
    pub ability_id: String,
    pub source_id: String,
    pub targets: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countered_by: Option<String>,
    /// A rule window cancelled the declaration.
    pub cancelled: bool,
    pub attack_cancelled: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attacks: BTreeMap<String, AttackRollResult>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub saves: BTreeMap<String, SaveRollResult>,
    pub effect_results: Vec<EffectResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_cost: Option<AbilityCost>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub concentration_checks: Vec<ConcentrationCheck>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<CombatEvent>,
}

impl AbilityExecutionResult {
    pub fn failure(ability_id: &str, source_id: &str, reason: impl Into<String>) -> Self {
        Self {
            ability_id: ability_id.to_string(),
            source_id: source_id.to_string(),
            failure_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub(crate) fn started(ability_id: &str, source_id: &str, targets: &[String]) -> Self {
        Self {
            ability_id: ability_id.to_string(),
            source_id: source_id.to_string(),
            targets: targets.to_vec(),
            ..Self::default()
        }
    }

    /// Total damage dealt across all effect results.
    pub fn total_damage(&self) -> i32 {
        self.effect_results
            .iter()
            .filter(|r| r.success && r.effect_type == "damage")
            .map(|r| r.value)
            .sum()
    }

    pub fn attack(&self, target_id: &str) -> Option<&AttackRollResult> {
        self.attacks.get(target_id)
    }

    pub fn save(&self, target_id: &str) -> Option<&SaveRollResult> {
        self.saves.get(target_id)
    }
}
