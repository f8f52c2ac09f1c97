//! Evaluation of the `IF(...)` conditions attached to conditional boosts.

use std::collections::BTreeSet;

use tracing::debug;

use crate::boost::parser::split_top_level;
use crate::boost::types::RollType;
use crate::combat::status::StatusQuery;

/// Facts about the situation a boost is being queried in.
#[derive(Clone, Copy, Default)]
pub struct ConditionContext<'a> {
    /// Owner of the boost being evaluated (`context.Source`).
    pub source_id: &'a str,
    /// Other party of the interaction, if any (`context.Target`).
    pub target_id: Option<&'a str>,
    pub statuses: Option<&'a dyn StatusQuery>,
    pub ability_tags: Option<&'a BTreeSet<String>>,
    /// `Some(true)` for melee attacks, `Some(false)` for ranged ones.
    pub is_melee: Option<bool>,
    pub damage_type: Option<&'a str>,
    pub roll_type: Option<RollType>,
}

impl<'a> ConditionContext<'a> {
    pub fn for_actor(source_id: &'a str) -> Self {
        Self {
            source_id,
            ..Self::default()
        }
    }

    pub fn with_target(mut self, target_id: &'a str) -> Self {
        self.target_id = Some(target_id);
        self
    }

    pub fn with_statuses(mut self, statuses: &'a dyn StatusQuery) -> Self {
        self.statuses = Some(statuses);
        self
    }

    pub fn with_ability_tags(mut self, tags: &'a BTreeSet<String>) -> Self {
        self.ability_tags = Some(tags);
        self
    }

    pub fn with_melee(mut self, is_melee: bool) -> Self {
        self.is_melee = Some(is_melee);
        self
    }

    pub fn with_damage_type(mut self, damage_type: &'a str) -> Self {
        self.damage_type = Some(damage_type);
        self
    }

    pub fn with_roll_type(mut self, roll_type: RollType) -> Self {
        self.roll_type = Some(roll_type);
        self
    }
}

pub trait ConditionEvaluator {
    fn evaluate(&self, condition: &str, context: &ConditionContext<'_>) -> bool;
}

/// Evaluator plus the facts to evaluate against. Supplying one to a boost query
/// makes conditional boosts eligible.
#[derive(Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub evaluator: &'a dyn ConditionEvaluator,
    pub conditions: ConditionContext<'a>,
}

impl<'a> EvaluationContext<'a> {
    pub fn new(evaluator: &'a dyn ConditionEvaluator, conditions: ConditionContext<'a>) -> Self {
        Self {
            evaluator,
            conditions,
        }
    }

    pub fn holds(&self, condition: &str) -> bool {
        self.evaluator.evaluate(condition, &self.conditions)
    }
}

/// Understands `HasStatus`, `Tagged`, `IsMeleeAttack`, `IsRangedAttack`, `IsSpell`,
/// `IsDamageType`, `true`/`false`, combined with `not`, `and`, `or` and parentheses.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicConditionEvaluator;

impl ConditionEvaluator for BasicConditionEvaluator {
    fn evaluate(&self, condition: &str, context: &ConditionContext<'_>) -> bool {
        eval_expr(condition.trim(), context)
    }
}

fn eval_expr(text: &str, ctx: &ConditionContext<'_>) -> bool {
    let text = text.trim();
    let any = split_keyword(text, "or");
    if any.len() > 1 {
        return any.iter().any(|part| eval_expr(part, ctx));
    }
    let all = split_keyword(text, "and");
    if all.len() > 1 {
        return all.iter().all(|part| eval_expr(part, ctx));
    }
    if let Some(rest) = strip_keyword_prefix(text, "not") {
        return !eval_expr(rest, ctx);
    }
    if text.starts_with('(') && text.ends_with(')') && wraps_whole(text) {
        return eval_expr(&text[1..text.len() - 1], ctx);
    }
    eval_call(text, ctx)
}

fn eval_call(text: &str, ctx: &ConditionContext<'_>) -> bool {
    if text.eq_ignore_ascii_case("true") {
        return true;
    }
    if text.eq_ignore_ascii_case("false") {
        return false;
    }
    let (name, args) = match text.find('(') {
        Some(open) if text.ends_with(')') => {
            let inner = &text[open + 1..text.len() - 1];
            let args: Vec<&str> = if inner.trim().is_empty() {
                Vec::new()
            } else {
                split_top_level(inner, ',').into_iter().map(str::trim).collect()
            };
            (text[..open].trim(), args)
        }
        _ => (text, Vec::new()),
    };

    match name.to_ascii_lowercase().as_str() {
        "hasstatus" => {
            let Some(status_id) = args.first() else {
                return false;
            };
            let subject = match args.get(1) {
                Some(who) if who.eq_ignore_ascii_case("context.Target") => ctx.target_id,
                _ => Some(ctx.source_id),
            };
            match (subject, ctx.statuses) {
                (Some(actor), Some(statuses)) => statuses.has_status(actor, status_id),
                _ => false,
            }
        }
        "tagged" => args.first().map_or(false, |tag| {
            ctx.ability_tags
                .map_or(false, |tags| tags.iter().any(|t| t.eq_ignore_ascii_case(tag)))
        }),
        "ismeleeattack" => ctx.is_melee == Some(true),
        "israngedattack" => ctx.is_melee == Some(false),
        "isspell" => ctx
            .ability_tags
            .map_or(false, |tags| tags.iter().any(|t| t.eq_ignore_ascii_case("spell"))),
        "isdamagetype" => match (args.first(), ctx.damage_type) {
            (Some(wanted), Some(actual)) => wanted.eq_ignore_ascii_case(actual),
            _ => false,
        },
        _ => {
            debug!(condition = text, "unknown condition function evaluates false");
            false
        }
    }
}

/// Splits on a word operator (`and` / `or`) at parenthesis depth 0, case-insensitively.
fn split_keyword<'t>(text: &'t str, keyword: &str) -> Vec<&'t str> {
    let lower = text.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let needle = format!(" {keyword} ");
    let mut parts = Vec::new();
    let mut depth = 0u32;
    let mut start = 0;
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            _ if depth == 0 && bytes[index..].starts_with(needle.as_bytes()) => {
                parts.push(&text[start..index]);
                index += needle.len();
                start = index;
                continue;
            }
            _ => {}
        }
        index += 1;
    }
    parts.push(&text[start..]);
    parts
}

fn strip_keyword_prefix<'t>(text: &'t str, keyword: &str) -> Option<&'t str> {
    let head = text.get(..keyword.len())?;
    if !head.eq_ignore_ascii_case(keyword) {
        return None;
    }
    let rest = &text[keyword.len()..];
    (rest.starts_with(' ') || rest.starts_with('(')).then_some(rest)
}

fn wraps_whole(text: &str) -> bool {
    let mut depth = 0i32;
    for (index, ch) in text.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 && index != text.len() - 1 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}
