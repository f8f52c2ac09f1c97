use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::ability::{AbilityDefinition, EffectKind};
use crate::boost::parse_boosts_with_report;
use crate::combat::{DiceFormula, StatusDefinition};
use crate::data::loader::load_abilities;
use crate::data::scenario::Scenario;
use crate::data::DataError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationSeverity {
    Error,
    Warning,
    Info,
}

impl ValidationSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for ValidationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationDiagnostic {
    pub severity: ValidationSeverity,
    pub context: String,
    pub message: String,
}

impl fmt::Display for ValidationDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.context, self.message)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub diagnostics: Vec<ValidationDiagnostic>,
}

impl ValidationReport {
    pub fn push(
        &mut self,
        severity: ValidationSeverity,
        context: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.diagnostics.push(ValidationDiagnostic {
            severity,
            context: context.into(),
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|diag| diag.severity == ValidationSeverity::Error)
    }

    pub fn count(&self, severity: ValidationSeverity) -> usize {
        self.diagnostics
            .iter()
            .filter(|diag| diag.severity == severity)
            .count()
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.diagnostics.extend(other.diagnostics);
    }
}

fn check_boosts(report: &mut ValidationReport, context: &str, boosts: &str) {
    let parsed = parse_boosts_with_report(boosts);
    for error in &parsed.errors {
        report.push(ValidationSeverity::Error, context, format!("malformed boost: {error}"));
    }
    for name in &parsed.unknown_functions {
        let message = format!("unknown boost function '{name}'");
        report.push(ValidationSeverity::Warning, context, message);
    }
}

fn check_formula(report: &mut ValidationReport, context: &str, formula: Option<&str>) {
    if let Some(formula) = formula {
        if let Err(err) = formula.parse::<DiceFormula>() {
            report.push(ValidationSeverity::Error, context, err.to_string());
        }
    }
}

pub fn validate_abilities(abilities: &[AbilityDefinition]) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut seen = HashSet::new();

    for ability in abilities {
        let context = format!("ability '{}'", ability.id);
        if ability.id.trim().is_empty() {
            report.push(ValidationSeverity::Error, &context, "missing id");
        }
        if !seen.insert(ability.id.as_str()) {
            report.push(ValidationSeverity::Error, &context, "duplicate ability id");
        }
        if ability.can_upcast && ability.upcast.is_none() {
            report.push(ValidationSeverity::Warning, &context, "can_upcast without upcast scaling");
        }
        if ability.effects.is_empty() {
            report.push(ValidationSeverity::Info, &context, "no effects");
        }

        let mut variant_ids = HashSet::new();
        for variant in &ability.variants {
            if !variant_ids.insert(variant.id.as_str()) {
                report.push(
                    ValidationSeverity::Error,
                    &context,
                    format!("duplicate variant id '{}'", variant.id),
                );
            }
            check_formula(&mut report, &context, variant.additional_dice.as_deref());
        }
        if let Some(scaling) = &ability.upcast {
            check_formula(&mut report, &context, scaling.dice_per_level.as_deref());
        }

        for (index, effect) in ability.effects.iter().enumerate() {
            let effect_context = format!("{context} effect #{index}");
            let Some(kind) = EffectKind::from_tag(&effect.effect_type) else {
                report.push(
                    ValidationSeverity::Warning,
                    &effect_context,
                    format!("unknown effect type '{}'", effect.effect_type),
                );
                continue;
            };
            check_formula(&mut report, &effect_context, effect.dice_formula.as_deref());
            match kind {
                EffectKind::ApplyStatus | EffectKind::RemoveStatus
                    if effect.status_id.is_none() =>
                {
                    report.push(ValidationSeverity::Error, &effect_context, "missing status_id");
                }
                EffectKind::RestoreResource if effect.resource.is_none() => {
                    report.push(ValidationSeverity::Error, &effect_context, "missing resource");
                }
                EffectKind::Damage
                    if effect.dice_formula.is_none()
                        && effect.amount == 0
                        && !ability.attack_type.map_or(false, |t| t.is_weapon()) =>
                {
                    report.push(
                        ValidationSeverity::Warning,
                        &effect_context,
                        "damage without formula or amount outside a weapon attack",
                    );
                }
                _ => {}
            }
        }
    }
    report
}

pub fn validate_statuses(statuses: &[StatusDefinition]) -> ValidationReport {
    let mut report = ValidationReport::default();
    let mut seen = HashSet::new();
    for status in statuses {
        let context = format!("status '{}'", status.id);
        if !seen.insert(status.id.to_ascii_uppercase()) {
            report.push(ValidationSeverity::Error, &context, "duplicate status id");
        }
        check_boosts(&mut report, &context, &status.boosts);
    }
    report
}

/// Abilities, statuses, combatant boosts and step references.
pub fn validate_scenario(scenario: &Scenario) -> ValidationReport {
    let mut report = validate_abilities(&scenario.abilities);
    report.merge(validate_statuses(&scenario.statuses));

    let mut combatants = HashSet::new();
    for spec in &scenario.combatants {
        let context = format!("combatant '{}'", spec.id);
        if !combatants.insert(spec.id.as_str()) {
            report.push(ValidationSeverity::Error, &context, "duplicate combatant id");
        }
        for passive in spec.passives.iter().chain(&spec.equipment) {
            check_boosts(&mut report, &format!("{context} '{}'", passive.id), &passive.boosts);
        }
        if let Some(weapon) = &spec.weapon {
            check_formula(&mut report, &context, Some(&weapon.damage));
        }
    }

    let abilities: HashSet<&str> = scenario.abilities.iter().map(|a| a.id.as_str()).collect();
    for (index, step) in scenario.steps.iter().enumerate() {
        let context = format!("step #{index}");
        if !combatants.contains(step.actor.as_str()) {
            let message = format!("unknown actor '{}'", step.actor);
            report.push(ValidationSeverity::Error, &context, message);
        }
        if let Some(ability) = &step.ability {
            if !abilities.contains(ability.as_str()) {
                let message = format!("unknown ability '{ability}'");
                report.push(ValidationSeverity::Error, &context, message);
            }
        }
        for target in &step.targets {
            if !combatants.contains(target.as_str()) {
                let message = format!("unknown target '{target}'");
                report.push(ValidationSeverity::Error, &context, message);
            }
        }
    }
    report
}

pub fn validate_ability_file(path: impl AsRef<Path>) -> Result<ValidationReport, DataError> {
    Ok(validate_abilities(&load_abilities(path)?))
}
