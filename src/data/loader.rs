//! Ability and status files. A file holds either a bare list or a map with an
//! `abilities:` / `statuses:` key; `.json` files are read as JSON, everything else as YAML.

use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::ability::AbilityDefinition;
use crate::combat::StatusDefinition;
use crate::data::{is_json, read_text, DataError};

/// Directory loading picks up files with this suffix.
pub const ABILITY_FILE_SUFFIX: &str = ".abilities.yaml";

#[derive(Deserialize)]
#[serde(untagged)]
enum AbilityDocument {
    List(Vec<AbilityDefinition>),
    Wrapped { abilities: Vec<AbilityDefinition> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StatusDocument {
    List(Vec<StatusDefinition>),
    Wrapped { statuses: Vec<StatusDefinition> },
}

fn parse_document<T: DeserializeOwned>(raw: &str, origin: &Path) -> Result<T, DataError> {
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

/// `origin` only selects the format and labels errors.
pub fn parse_abilities(raw: &str, origin: &Path) -> Result<Vec<AbilityDefinition>, DataError> {
    Ok(match parse_document(raw, origin)? {
        AbilityDocument::List(abilities) | AbilityDocument::Wrapped { abilities } => abilities,
    })
}

pub fn parse_statuses(raw: &str, origin: &Path) -> Result<Vec<StatusDefinition>, DataError> {
    Ok(match parse_document(raw, origin)? {
        StatusDocument::List(statuses) | StatusDocument::Wrapped { statuses } => statuses,
    })
}

pub fn load_abilities(path: impl AsRef<Path>) -> Result<Vec<AbilityDefinition>, DataError> {
    let path = path.as_ref();
    parse_abilities(&read_text(path)?, path)
}

pub fn load_statuses(path: impl AsRef<Path>) -> Result<Vec<StatusDefinition>, DataError> {
    let path = path.as_ref();
    parse_statuses(&read_text(path)?, path)
}

/// Every `*.abilities.yaml` directly inside `dir`, in file name order.
pub fn load_ability_dir(dir: impl AsRef<Path>) -> Result<Vec<AbilityDefinition>, DataError> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|source| DataError::Io {
        path: dir.display().to_string(),
        source,
    })?;
    let mut files: Vec<_> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.ends_with(ABILITY_FILE_SUFFIX))
        })
        .collect();
    files.sort();

    let mut abilities = Vec::new();
    for file in files {
        abilities.extend(load_abilities(&file)?);
    }
    Ok(abilities)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_list_and_wrapped_yaml_both_parse() {
        let origin = Path::new("inline.yaml");
        let bare = "- id: dash\n  cost:\n    uses_action: true\n";
        let wrapped = "abilities:\n  - id: dash\n";
        assert_eq!(parse_abilities(bare, origin).expect("bare")[0].id, "dash");
        assert_eq!(parse_abilities(wrapped, origin).expect("wrapped")[0].id, "dash");
    }

    #[test]
    fn json_is_selected_by_extension() {
        let statuses = parse_statuses(
            r#"[{"id": "BLESSED", "boosts": "RollBonus(AttackRoll,1d4)"}]"#,
            Path::new("statuses.json"),
        )
        .expect("json");
        assert_eq!(statuses[0].id, "BLESSED");
    }

    #[test]
    fn parse_errors_name_the_file() {
        let err = parse_abilities("- id: [", Path::new("broken.yaml")).expect_err("broken");
        assert!(err.to_string().contains("broken.yaml"));
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        assert!(matches!(
            load_ability_dir("no/such/dir"),
            Err(DataError::Io { .. })
        ));
    }
}
