//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use crate::address_space::NodeDefinition;
use crate::config::schema::ServerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(toml::de::Error),
    NodeFile(PathBuf, serde_json::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "IO error reading {}: {}", path.display(), e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::NodeFile(path, e) => {
                write!(f, "Invalid node file {}: {}", path.display(), e)
            }
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
///
/// Node files are resolved relative to the config file's directory and their
/// definitions are appended after the inline `[[nodes]]`.
/// The returned config has an empty `node_files` list, so serializing it
/// does not load the same nodes twice.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
    let mut config: ServerConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    for file in std::mem::take(&mut config.node_files) {
        let resolved = if file.is_absolute() { file } else { base.join(file) };
        let mut nodes = load_node_file(&resolved)?;
        tracing::debug!(path = %resolved.display(), count = nodes.len(), "Loaded node file");
        config.nodes.append(&mut nodes);
    }

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Read a JSON array of node definitions.
pub fn load_node_file(path: &Path) -> Result<Vec<NodeDefinition>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
    serde_json::from_str(&content).map_err(|e| ConfigError::NodeFile(path.to_path_buf(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_yields_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.name, "OPC-UA-Server");
        assert_eq!(config.scheduler.max_wait_ms, 50);
        assert!(config.server.application_uri.starts_with("urn:opcua-lite:"));
    }

    #[test]
    fn parses_sections_and_node_files() {
        let dir = tempfile::tempdir().unwrap();
        let nodes_path = dir.path().join("nodes.json");
        fs::write(
            &nodes_path,
            r#"[{"node_id": {"ns": 2, "i": 1000}, "node_class": "Object",
                 "browse_name": "Pump", "parent": {"ns": 0, "i": 85}}]"#,
        )
        .unwrap();

        let config_path = dir.path().join("server.toml");
        fs::write(
            &config_path,
            r#"
node_files = ["nodes.json"]

[server]
name = "Line 3"
endpoints = ["opc.tcp://127.0.0.1:4841/"]

[scheduler]
max_wait_ms = 20

[[namespaces]]
uri = "http://mynodes.local"

[[nodes]]
node_id = { ns = 2, i = 1001 }
node_class = "Variable"
browse_name = "Speed"
parent = { ns = 2, i = 1000 }
value = { type = "Double", value = 12.5 }
writable = true
"#,
        )
        .unwrap();

        let config = load_config(&config_path).unwrap();
        assert_eq!(config.server.name, "Line 3");
        assert_eq!(config.scheduler.max_wait_ms, 20);
        assert_eq!(config.namespaces.len(), 1);
        // Inline nodes first, then node files.
        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.nodes[0].browse_name, "Speed");
        assert_eq!(config.nodes[1].browse_name, "Pump");
        assert!(config.node_files.is_empty());

        // The merged config reloads without pulling the node file in again.
        let merged_path = dir.path().join("merged.toml");
        fs::write(&merged_path, toml::to_string_pretty(&config).unwrap()).unwrap();
        let reloaded = load_config(&merged_path).unwrap();
        let names: Vec<_> = reloaded.nodes.iter().map(|n| n.browse_name.as_str()).collect();
        assert_eq!(names, ["Speed", "Pump"]);
        assert_eq!(reloaded.nodes[0].value, config.nodes[0].value);
    }

    #[test]
    fn rejects_invalid_values() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nendpoints = []\n[scheduler]\nmax_wait_ms = 0").unwrap();

        match load_config(file.path()) {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 2),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/opcua-lite.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(..)));
    }
}
