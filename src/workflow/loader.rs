//! Workflow definition loader
//!
//! Load definitions from YAML or JSON files, singly or from a directory.

use std::path::Path;

use super::definition::{DefinitionError, WorkflowDefinition};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error in {file}: {error}")]
    Yaml {
        file: String,
        error: serde_yaml::Error,
    },

    #[error("JSON parse error in {file}: {error}")]
    Json {
        file: String,
        error: serde_json::Error,
    },

    #[error("Invalid workflow in {file}: {error}")]
    Invalid {
        file: String,
        error: DefinitionError,
    },
}

pub struct DefinitionLoader;

impl DefinitionLoader {
    pub fn load_directory(dir: &Path) -> Result<Vec<WorkflowDefinition>, LoadError> {
        let mut definitions = Vec::new();

        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        paths.sort();

        for path in paths {
            let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

            // engine.yaml configures the engine, it is not a workflow
            if filename == "engine.yaml" || filename == "engine.yml" || filename.starts_with('.')
            {
                continue;
            }

            let ext = path.extension().and_then(|e| e.to_str());
            if matches!(ext, Some("yaml") | Some("yml") | Some("json")) {
                definitions.push(Self::load_file(&path)?);
            }
        }

        Ok(definitions)
    }

    pub fn load_file(path: &Path) -> Result<WorkflowDefinition, LoadError> {
        let content = std::fs::read_to_string(path)?;
        let file = path.display().to_string();

        let definition: WorkflowDefinition =
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                serde_json::from_str(&content).map_err(|error| LoadError::Json {
                    file: file.clone(),
                    error,
                })?
            } else {
                serde_yaml::from_str(&content).map_err(|error| LoadError::Yaml {
                    file: file.clone(),
                    error,
                })?
            };

        definition
            .validate()
            .map_err(|error| LoadError::Invalid { file, error })?;

        Ok(definition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_directory() {
        let dir = tempdir().unwrap();

        fs::write(
            dir.path().join("a.yaml"),
            r#"
name: workflow-a
steps:
  - id: start
    type: trigger
"#,
        )
        .unwrap();

        fs::write(
            dir.path().join("b.json"),
            r#"{"name": "workflow-b", "steps": [{"id": "start", "type": "trigger"}]}"#,
        )
        .unwrap();

        fs::write(dir.path().join("engine.yaml"), "statistics_window: 5").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let definitions = DefinitionLoader::load_directory(dir.path()).unwrap();
        assert_eq!(definitions.len(), 2);
        assert_eq!(definitions[0].name, "workflow-a");
        assert_eq!(definitions[1].name, "workflow-b");
    }

    #[test]
    fn test_load_invalid_definition() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        fs::write(
            &path,
            r#"
name: bad
steps:
  - id: a
    type: trigger
  - id: a
    type: action
"#,
        )
        .unwrap();

        let err = DefinitionLoader::load_file(&path).unwrap_err();
        assert!(matches!(err, LoadError::Invalid { .. }));
    }
}
