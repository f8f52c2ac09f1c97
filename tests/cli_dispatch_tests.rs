use std::path::PathBuf;
use std::process::{Command, Output};

fn bin() -> &'static str {
    env!("CARGO_BIN_EXE_qdnd")
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn run(args: &[&str]) -> Output {
    Command::new(bin())
        .args(args)
        .env("QDND_CONFIG", fixture("missing-config.yaml"))
        .env("QDND_LOG", "error")
        .env_remove("QDND_SEED")
        .output()
        .expect("qdnd should run")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout).expect("stdout should be json")
}

#[test]
fn unknown_command_prints_usage() {
    let output = run(&["serve"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("usage: qdnd"));
}

#[test]
fn parse_emits_definitions_as_json() {
    let output = run(&["parse", "IF(HasStatus(RAGING)):DamageBonus(2,Slashing);AC(1)"]);
    assert_eq!(output.status.code(), Some(0));
    let payload = stdout_json(&output);
    let definitions = payload["definitions"].as_array().expect("definitions");
    assert_eq!(definitions.len(), 2);
    assert_eq!(definitions[0]["type"], "DamageBonus");
    assert_eq!(definitions[0]["condition"], "HasStatus(RAGING)");
}

#[test]
fn parse_of_malformed_input_fails() {
    let output = run(&["parse", "AC(2"]);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout_json(&output)["errors"].as_array().map(Vec::len), Some(1));
}

#[test]
fn parse_without_input_is_usage_error() {
    assert_eq!(run(&["parse"]).status.code(), Some(2));
}

#[test]
fn simulate_runs_fixture_scenario() {
    let scenario = fixture("duel.yaml");
    let output = run(&["simulate", scenario.to_str().expect("utf8 path"), "7"]);
    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));
    let payload = stdout_json(&output);
    assert_eq!(payload["seed"], 7);
    let results = payload["results"].as_array().expect("results");
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r["success"] == true));
    assert!(payload["final_hp"]["troll"].as_i64().is_some());
}

#[test]
fn simulate_is_deterministic_per_seed() {
    let scenario = fixture("duel.yaml");
    let path = scenario.to_str().expect("utf8 path");
    let a = stdout_json(&run(&["simulate", path]));
    let b = stdout_json(&run(&["simulate", path]));
    assert_eq!(a["seed"], 42);
    assert_eq!(a["final_hp"], b["final_hp"]);
}

#[test]
fn simulate_missing_file_fails() {
    let output = run(&["simulate", "no/such/scenario.yaml"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("failed to load scenario"));
}

#[test]
fn validate_passes_clean_file() {
    let abilities = fixture("duel.abilities.yaml");
    let output = run(&["validate", abilities.to_str().expect("utf8 path")]);
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("validation passed"));
}

#[test]
fn validate_reports_errors_and_exits_one() {
    let abilities = fixture("broken.abilities.yaml");
    let output = run(&["validate", abilities.to_str().expect("utf8 path")]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("duplicate ability id"));
    assert!(stderr.contains("missing status_id"));
    assert!(stderr.contains("unknown effect type 'summon'"));
}

#[test]
fn validate_scenario_flag_checks_references() {
    let scenario = fixture("duel.yaml");
    let output = run(&["validate", scenario.to_str().expect("utf8 path"), "--scenario"]);
    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));
}

#[test]
fn batch_aggregates_runs() {
    let scenario = fixture("duel.yaml");
    let output = run(&["batch", scenario.to_str().expect("utf8 path"), "12", "100"]);
    assert_eq!(output.status.code(), Some(0), "{}", String::from_utf8_lossy(&output.stderr));
    let payload = stdout_json(&output);
    assert_eq!(payload["runs"], 12);
    assert_eq!(payload["per_run"].as_array().map(Vec::len), Some(12));
    assert_eq!(payload["per_run"][0]["seed"], 100);
    assert_eq!(payload["survival_rate"]["party"], 1.0);
}

#[test]
fn batch_rejects_non_numeric_runs() {
    let scenario = fixture("duel.yaml");
    let output = run(&["batch", scenario.to_str().expect("utf8 path"), "many"]);
    assert_eq!(output.status.code(), Some(2));
}
