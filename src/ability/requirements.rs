//! Caster-side requirements checked before an ability may be used. An inverted
//! requirement must not hold.

use crate::ability::definition::{AbilityRequirement, RequirementKind};
use crate::boost::BoostType;
use crate::combat::status::StatusQuery;
use crate::combat::world::CombatWorld;

fn holds(kind: &RequirementKind, world: &CombatWorld, source_id: &str) -> bool {
    let Some(source) = world.combatant(source_id) else {
        return false;
    };
    match kind {
        RequirementKind::HasStatus { status_id } => world.has_status(source_id, status_id),
        RequirementKind::HasTag { tag } => source.has_tag(tag),
        RequirementKind::HpBelowPercent { percent } => {
            let max = source.effective_max_hp().max(1);
            source.hp.saturating_mul(100) < max.saturating_mul(*percent)
        }
        RequirementKind::HasBoost { boost_type } => {
            BoostType::from_name(boost_type).map_or(false, |t| source.boosts.has(t))
        }
        RequirementKind::HasWeapon => source.weapon.is_some(),
    }
}

fn describe(kind: &RequirementKind) -> String {
    match kind {
        RequirementKind::HasStatus { status_id } => format!("status {status_id}"),
        RequirementKind::HasTag { tag } => format!("tag {tag}"),
        RequirementKind::HpBelowPercent { percent } => format!("HP below {percent}%"),
        RequirementKind::HasBoost { boost_type } => format!("boost {boost_type}"),
        RequirementKind::HasWeapon => "a weapon".to_string(),
    }
}

/// First unmet requirement as a reason string. Inverted requirements must not hold.
pub fn unmet_requirement(
    requirements: &[AbilityRequirement],
    world: &CombatWorld,
    source_id: &str,
) -> Option<String> {
    requirements.iter().find_map(|req| {
        let ok = holds(&req.kind, world, source_id) != req.inverted;
        if ok {
            None
        } else if req.inverted {
            Some(format!("Requirement not met: must not have {}", describe(&req.kind)))
        } else {
            Some(format!("Requirement not met: requires {}", describe(&req.kind)))
        }
    })
}
