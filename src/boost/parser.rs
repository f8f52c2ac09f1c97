//! Boost DSL parser: `[IF(condition):]Boost1(p, ...);Boost2(...)`.
//!
//! Separators (`;` between clauses, `,` between parameters) only split at parenthesis
//! depth 0, so conditions and parameters may embed function calls. Unknown function names
//! are skipped with a warning; malformed clauses are reported and skipped without aborting
//! their siblings.

use serde::Serialize;
use tracing::warn;

use crate::boost::types::{BoostDefinition, BoostType, BoostValue};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum BoostParseError {
    #[error("unbalanced parentheses in '{0}'")]
    UnbalancedParens(String),
    #[error("missing function name in '{0}'")]
    MissingFunctionName(String),
    #[error("unexpected text after closing parenthesis in '{0}'")]
    TrailingText(String),
    #[error("IF condition is not followed by ':' in '{0}'")]
    MissingConditionSeparator(String),
}

/// Everything learned while parsing one boost string.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BoostParseReport {
    pub definitions: Vec<BoostDefinition>,
    pub errors: Vec<BoostParseError>,
    /// Function names that parsed syntactically but are not part of the vocabulary.
    pub unknown_functions: Vec<String>,
}

impl BoostParseReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.unknown_functions.is_empty()
    }
}

/// Forgiving parse: logs and drops malformed or unknown clauses.
pub fn parse_boosts(input: &str) -> Vec<BoostDefinition> {
    let report = parse_boosts_with_report(input);
    for error in &report.errors {
        warn!(boost = input, %error, "skipping malformed boost clause");
    }
    for name in &report.unknown_functions {
        warn!(boost = input, function = %name, "skipping unknown boost function");
    }
    report.definitions
}

/// Parse and return the diagnostics alongside the definitions, without logging.
pub fn parse_boosts_with_report(input: &str) -> BoostParseReport {
    let mut report = BoostParseReport::default();
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return report;
    }

    let (condition, body) = match split_condition_prefix(trimmed) {
        Ok(parts) => parts,
        Err(err) => {
            report.errors.push(err);
            return report;
        }
    };

    for clause in split_top_level(body, ';') {
        let clause = clause.trim();
        if clause.is_empty() {
            continue;
        }
        match parse_clause(clause) {
            Ok(ParsedClause::Known(mut definition)) => {
                definition.condition = condition.clone();
                report.definitions.push(definition);
            }
            Ok(ParsedClause::Unknown(name)) => report.unknown_functions.push(name),
            Err(err) => report.errors.push(err),
        }
    }
    report
}

enum ParsedClause {
    Known(BoostDefinition),
    Unknown(String),
}

/// Splits off a leading `IF(...):` and returns `(condition, remainder)`.
fn split_condition_prefix(input: &str) -> Result<(Option<String>, &str), BoostParseError> {
    let starts_with_if = input
        .get(..3)
        .map_or(false, |prefix| prefix.eq_ignore_ascii_case("if("));
    if !starts_with_if {
        return Ok((None, input));
    }
    let open = 2;
    let close = matching_paren(input, open)
        .ok_or_else(|| BoostParseError::UnbalancedParens(input.to_string()))?;
    let condition = input[open + 1..close].trim().to_string();
    let rest = input[close + 1..].trim_start();
    let Some(body) = rest.strip_prefix(':') else {
        return Err(BoostParseError::MissingConditionSeparator(input.to_string()));
    };
    let condition = if condition.is_empty() { None } else { Some(condition) };
    Ok((condition, body))
}

/// Byte index of the `)` matching the `(` at `open`.
fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0i32;
    for (index, ch) in text.char_indices().skip_while(|(i, _)| *i < open) {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(index);
                }
                if depth < 0 {
                    return None;
                }
            }
            _ => {}
        }
    }
    None
}

/// Splits on `separator` only where parenthesis depth is zero.
pub(crate) fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0u32;
    let mut start = 0;
    for (index, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            // A stray `)` stays inside its own clause.
            ')' => depth = depth.saturating_sub(1),
            c if c == separator && depth == 0 => {
                parts.push(&text[start..index]);
                start = index + ch.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn parse_clause(clause: &str) -> Result<ParsedClause, BoostParseError> {
    let Some(open) = clause.find('(') else {
        // Bare identifiers such as `NonLethal` are zero-parameter boosts.
        if clause.contains(')') {
            return Err(BoostParseError::UnbalancedParens(clause.to_string()));
        }
        if !is_identifier(clause) {
            return Err(BoostParseError::MissingFunctionName(clause.to_string()));
        }
        return Ok(resolve(clause, Vec::new(), clause));
    };

    let name = clause[..open].trim();
    if name.is_empty() || !is_identifier(name) {
        return Err(BoostParseError::MissingFunctionName(clause.to_string()));
    }
    let close = matching_paren(clause, open)
        .ok_or_else(|| BoostParseError::UnbalancedParens(clause.to_string()))?;
    if !clause[close + 1..].trim().is_empty() {
        return Err(BoostParseError::TrailingText(clause.to_string()));
    }

    let inner = clause[open + 1..close].trim();
    let parameters = if inner.is_empty() {
        Vec::new()
    } else {
        split_top_level(inner, ',')
            .into_iter()
            .map(BoostValue::from_raw)
            .collect()
    };
    Ok(resolve(name, parameters, clause))
}

fn resolve(name: &str, parameters: Vec<BoostValue>, raw: &str) -> ParsedClause {
    match BoostType::from_name(name) {
        Some(boost_type) => ParsedClause::Known(BoostDefinition {
            boost_type,
            parameters,
            condition: None,
            raw: raw.to_string(),
        }),
        None => ParsedClause::Unknown(name.to_string()),
    }
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_whitespace_yield_nothing() {
        assert!(parse_boosts("").is_empty());
        assert!(parse_boosts("   \t").is_empty());
    }

    #[test]
    fn stray_semicolons_are_ignored() {
        let parsed = parse_boosts(";AC(1);;AC(2);");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].parameters, vec![BoostValue::Int(2)]);
    }

    #[test]
    fn nested_condition_is_isolated() {
        let parsed = parse_boosts("IF(HasStatus(RAGING)):DamageBonus(2,Slashing)");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].condition.as_deref(), Some("HasStatus(RAGING)"));
        assert_eq!(parsed[0].boost_type, BoostType::DamageBonus);
        assert_eq!(
            parsed[0].parameters,
            vec![BoostValue::Int(2), BoostValue::Str("Slashing".to_string())]
        );
    }

    #[test]
    fn condition_prefix_applies_to_every_clause() {
        let parsed = parse_boosts("IF(not HasStatus(PRONE)):AC(1);Advantage(AttackRoll)");
        assert_eq!(parsed.len(), 2);
        assert!(parsed
            .iter()
            .all(|d| d.condition.as_deref() == Some("not HasStatus(PRONE)")));
    }

    #[test]
    fn nested_parameters_do_not_split() {
        let parsed = parse_boosts("RollBonus(Attack, max(1d4, 2))");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].parameters.len(), 2);
        assert_eq!(parsed[0].str_param(1), Some("max(1d4, 2)"));
    }

    #[test]
    fn dice_parameters_stay_strings() {
        let parsed = parse_boosts("WeaponDamage(1d6, Fire)");
        assert_eq!(parsed[0].parameters[0], BoostValue::Str("1d6".to_string()));
    }

    #[test]
    fn unknown_functions_are_skipped_but_siblings_survive() {
        let report = parse_boosts_with_report("Frobnicate(3);AC(2)");
        assert_eq!(report.definitions.len(), 1);
        assert_eq!(report.unknown_functions, vec!["Frobnicate".to_string()]);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn malformed_clause_is_reported_and_skipped() {
        let report = parse_boosts_with_report("AC(2;Resistance(Fire,Resistant);(3)");
        // `AC(2;Resistance(...)` is one unbalanced clause at depth 0 because the `;` is nested.
        assert!(!report.errors.is_empty());

        let report = parse_boosts_with_report("(3);AC(2);Tag(X))");
        assert_eq!(report.definitions.len(), 1);
        assert_eq!(report.definitions[0].boost_type, BoostType::AC);
        assert_eq!(report.errors.len(), 2);
    }

    #[test]
    fn stray_close_paren_does_not_swallow_later_clauses() {
        let report = parse_boosts_with_report("AC(1));AC(2)");
        assert_eq!(report.definitions.len(), 1);
        assert_eq!(report.definitions[0].parameters, vec![BoostValue::Int(2)]);
        assert_eq!(
            report.errors,
            vec![BoostParseError::TrailingText("AC(1))".to_string())]
        );

        let parsed = parse_boosts("Tag(X)));Resistance(Fire,Resistant);AC(3)");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].boost_type, BoostType::Resistance);
        assert_eq!(parsed[1].boost_type, BoostType::AC);
    }

    #[test]
    fn unbalanced_condition_fails_whole_string() {
        let report = parse_boosts_with_report("IF(HasStatus(X):AC(1)");
        assert!(report.definitions.is_empty());
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn bare_identifier_is_zero_parameter_boost() {
        let parsed = parse_boosts("NonLethal;TwoWeaponFighting()");
        assert_eq!(parsed.len(), 2);
        assert!(parsed.iter().all(|d| d.parameters.is_empty()));
    }

    #[test]
    fn raw_text_is_kept_for_diagnostics() {
        let parsed = parse_boosts(" AC( 2 ) ");
        assert_eq!(parsed[0].raw, "AC( 2 )");
        assert_eq!(parsed[0].parameters, vec![BoostValue::Int(2)]);
    }
}
