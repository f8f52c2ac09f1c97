//! Scripted encounters: a roster, the abilities and statuses they use, and an ordered
//! list of steps. Running one builds a fresh world and pipeline every time.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ability::{AbilityDefinition, AbilityExecutionResult, AbilityPipeline, ExecutionOptions};
use crate::boost::{source, AbilityScore};
use crate::combat::{
    AbilityScores, Combatant, CombatWorld, ConcentrationLedger, ElevationHeightService,
    InterruptReactionResolver, Position, StatusDefinition, Weapon,
};
use crate::config::EngineConfig;
use crate::data::loader::{load_abilities, parse_abilities};
use crate::data::{is_json, read_text, DataError};

/// A named boost string granted with its own provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassiveSpec {
    pub id: String,
    pub boosts: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatantSpec {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub faction: String,
    pub max_hp: i32,
    /// Defaults to `max_hp`.
    #[serde(default)]
    pub hp: Option<i32>,
    #[serde(default)]
    pub ability_scores: AbilityScores,
    #[serde(default)]
    pub proficiency_bonus: Option<i32>,
    #[serde(default)]
    pub base_ac: Option<i32>,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub weapon: Option<Weapon>,
    #[serde(default)]
    pub spellcasting_ability: Option<AbilityScore>,
    #[serde(default)]
    pub save_proficiencies: BTreeSet<AbilityScore>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Resource name to starting (and maximum) amount.
    #[serde(default)]
    pub resources: BTreeMap<String, i32>,
    #[serde(default)]
    pub passives: Vec<PassiveSpec>,
    #[serde(default)]
    pub equipment: Vec<PassiveSpec>,
    /// Status ids applied at the start with no expiry.
    #[serde(default)]
    pub statuses: Vec<String>,
}

impl CombatantSpec {
    /// The combatant without its passives, equipment and statuses.
    pub fn to_combatant(&self) -> Combatant {
        let mut combatant = Combatant::new(self.id.clone(), self.faction.clone(), self.max_hp)
            .with_scores(self.ability_scores)
            .at(self.position);
        if let Some(name) = &self.name {
            combatant.name = name.clone();
        }
        if let Some(hp) = self.hp {
            combatant.hp = hp.min(self.max_hp);
        }
        if let Some(bonus) = self.proficiency_bonus {
            combatant.proficiency_bonus = bonus;
        }
        if let Some(ac) = self.base_ac {
            combatant.base_ac = ac;
        }
        combatant.weapon = self.weapon.clone();
        combatant.spellcasting_ability = self.spellcasting_ability;
        combatant.save_proficiencies = self.save_proficiencies.clone();
        combatant.tags = self.tags.clone();
        for (name, amount) in &self.resources {
            combatant.resources.set(name.clone(), *amount, *amount);
        }
        combatant
    }
}

fn default_true() -> bool {
    true
}

/// Optional pipeline services to wire in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioServices {
    #[serde(default = "default_true")]
    pub concentration: bool,
    #[serde(default)]
    pub counterspell: bool,
    #[serde(default)]
    pub height: bool,
}

impl Default for ScenarioServices {
    fn default() -> Self {
        Self {
            concentration: true,
            counterspell: false,
            height: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioStep {
    pub actor: String,
    #[serde(default)]
    pub ability: Option<String>,
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub upcast_level: u32,
    /// Reset the actor's budget, tick its statuses and turn cooldowns before acting.
    #[serde(default)]
    pub start_turn: bool,
    /// Tick round cooldowns and advance the round after acting.
    #[serde(default)]
    pub end_round: bool,
}

impl ScenarioStep {
    pub fn options(&self) -> ExecutionOptions {
        ExecutionOptions {
            variant_id: self.variant.clone(),
            upcast_level: self.upcast_level,
            skip_cost_validation: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub services: ScenarioServices,
    #[serde(default)]
    pub statuses: Vec<StatusDefinition>,
    #[serde(default)]
    pub abilities: Vec<AbilityDefinition>,
    /// Extra ability files, relative to the scenario file.
    #[serde(default)]
    pub ability_files: Vec<String>,
    pub combatants: Vec<CombatantSpec>,
    #[serde(default)]
    pub steps: Vec<ScenarioStep>,
}

impl Scenario {
    pub fn parse(raw: &str, origin: &Path) -> Result<Self, DataError> {
        if is_json(origin) {
            serde_json::from_str(raw).map_err(|source| DataError::Json {
                path: origin.display().to_string(),
                source,
            })
        } else {
            serde_yaml::from_str(raw).map_err(|source| DataError::Yaml {
                path: origin.display().to_string(),
                source,
            })
        }
    }

    /// Parses the file and pulls in its `ability_files`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DataError> {
        let path = path.as_ref();
        let mut scenario = Self::parse(&read_text(path)?, path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        for file in std::mem::take(&mut scenario.ability_files) {
            scenario.abilities.extend(load_abilities(base.join(&file))?);
        }
        Ok(scenario)
    }

    /// Adds abilities from an inline YAML document.
    pub fn with_abilities_yaml(mut self, raw: &str) -> Result<Self, DataError> {
        self.abilities
            .extend(parse_abilities(raw, Path::new("inline.yaml"))?);
        Ok(self)
    }

    pub fn build_world(&self) -> Result<CombatWorld, DataError> {
        let mut world = CombatWorld::new();
        for status in &self.statuses {
            world.register_status(status.clone());
        }
        for spec in &self.combatants {
            world
                .add_combatant(spec.to_combatant())
                .map_err(|err| DataError::Invalid(err.to_string()))?;
            for passive in &spec.passives {
                grant(&mut world, &spec.id, source::PASSIVE, passive)?;
            }
            for item in &spec.equipment {
                grant(&mut world, &spec.id, source::EQUIPMENT, item)?;
            }
            for status_id in &spec.statuses {
                world
                    .apply_status(&spec.id, status_id, &spec.id, None)
                    .map_err(|err| DataError::Invalid(err.to_string()))?;
            }
        }
        Ok(world)
    }

    pub fn build_pipeline(&self, config: EngineConfig) -> AbilityPipeline {
        let mut pipeline = AbilityPipeline::new(config);
        if self.services.concentration {
            pipeline = pipeline.with_concentration_tracker(Box::new(ConcentrationLedger::new()));
        }
        if self.services.counterspell {
            let resolver = InterruptReactionResolver::counterspell();
            pipeline = pipeline.with_reaction_resolver(Box::new(resolver));
        }
        if self.services.height {
            pipeline = pipeline.with_height_service(Box::new(ElevationHeightService::default()));
        }
        pipeline.register_abilities(self.abilities.iter().cloned());
        pipeline
    }
}

fn grant(
    world: &mut CombatWorld,
    actor_id: &str,
    source: &str,
    spec: &PassiveSpec,
) -> Result<(), DataError> {
    world
        .grant_boosts(actor_id, source, &spec.id, &spec.boosts)
        .map(|_| ())
        .map_err(|err| DataError::Invalid(err.to_string()))
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioOutcome {
    pub seed: u64,
    pub results: Vec<AbilityExecutionResult>,
    pub final_hp: BTreeMap<String, i32>,
    /// Faction name to combatants still standing.
    pub survivors: BTreeMap<String, usize>,
    pub total_damage: i32,
}

impl ScenarioOutcome {
    pub fn successful_steps(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }
}

/// Runs every step in order against a fresh world, seeded from `config`.
pub fn run_scenario(
    scenario: &Scenario,
    config: &EngineConfig,
) -> Result<ScenarioOutcome, DataError> {
    let mut world = scenario.build_world()?;
    let mut pipeline = scenario.build_pipeline(config.clone());
    let mut outcome = ScenarioOutcome {
        seed: config.seed,
        ..ScenarioOutcome::default()
    };

    for step in &scenario.steps {
        if step.start_turn {
            world.start_turn(&step.actor);
            pipeline.process_turn_start(&step.actor);
        }
        if let Some(ability_id) = &step.ability {
            let options = step.options();
            let result =
                pipeline.execute(&mut world, ability_id, &step.actor, &step.targets, &options);
            outcome.total_damage += result.total_damage();
            outcome.results.push(result);
        }
        if step.end_round {
            pipeline.process_round_end();
            world.round += 1;
        }
    }

    for combatant in world.combatants() {
        outcome.final_hp.insert(combatant.id.clone(), combatant.hp);
        if combatant.is_alive() {
            *outcome.survivors.entry(combatant.faction.clone()).or_insert(0) += 1;
        }
    }
    Ok(outcome)
}
