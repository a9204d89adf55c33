// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{DEFAULT_QUEUE_CAPACITY, UNLIMITED_FLOW_DEPTH};
use crate::config::{validate_stage_configs, StageRegistry};
use crate::engine::conveyor::OverflowPolicy;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Complete description of one pipeline.
///
/// # Fields
/// * `name` - Pipeline name used in logs and errors
/// * `flow_depth` - Maximum in-flight frames per stream (0 = unlimited)
/// * `stages` - Stage definitions; a stage no other stage links to is a root
///
/// # Example
/// ```yaml
/// name: detector
/// flow_depth: 8
/// stages:
///   - name: decode
///     class_name: pass_through
///     next: [detect]
///   - name: detect
///     class_name: pass_through
///     parallelism: 4
///     max_input_queue_size: 32
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    #[serde(default = "default_flow_depth")]
    pub flow_depth: usize,
    pub stages: Vec<StageConfig>,
}

/// Configuration for a single stage of the pipeline.
///
/// # Fields
/// * `name` - Unique stage name
/// * `class_name` - Registry key of the stage implementation
/// * `parallelism` - Number of worker threads (and conveyors), at least 1
/// * `max_input_queue_size` - Capacity of each conveyor, at least 1
/// * `overflow_policy` - What a push does on a full conveyor (`block` or `drop_oldest`)
/// * `parameters` - String parameters handed to `Stage::open`
/// * `next` - Names of downstream stages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,
    pub class_name: String,
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default = "default_queue_size")]
    pub max_input_queue_size: usize,
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    #[serde(default)]
    pub next: Vec<String>,
}

fn default_flow_depth() -> usize {
    UNLIMITED_FLOW_DEPTH
}

fn default_parallelism() -> usize {
    1
}

fn default_queue_size() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

impl StageConfig {
    /// A single-worker stage with default queue settings and no links
    pub fn new(name: &str, class_name: &str) -> Self {
        Self {
            name: name.to_string(),
            class_name: class_name.to_string(),
            parallelism: default_parallelism(),
            max_input_queue_size: default_queue_size(),
            overflow_policy: OverflowPolicy::default(),
            parameters: HashMap::new(),
            next: Vec::new(),
        }
    }

    pub fn with_next(mut self, next: &[&str]) -> Self {
        self.next = next.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_queue_size(mut self, size: usize) -> Self {
        self.max_input_queue_size = size;
        self
    }

    pub fn with_overflow_policy(mut self, policy: OverflowPolicy) -> Self {
        self.overflow_policy = policy;
        self
    }

    pub fn with_parameter(mut self, key: &str, value: &str) -> Self {
        self.parameters.insert(key.to_string(), value.to_string());
        self
    }
}

/// Load a pipeline config from a YAML (`.yaml`/`.yml`) or TOML (`.toml`) file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
        Some("toml") => Ok(toml::from_str(&content)?),
        _ => Err(ConfigError::UnsupportedFormat {
            path: path.to_path_buf(),
        }),
    }
}

/// Load a pipeline config and validate its stage graph against `registry`.
///
/// Parameter checks need stage instances and happen when the pipeline is
/// built.
pub fn load_and_validate_config<P: AsRef<Path>>(
    path: P,
    registry: &StageRegistry,
) -> Result<PipelineConfig, ConfigError> {
    let cfg = load_config(path)?;
    validate_stage_configs(&cfg.name, &cfg.stages, registry).map_err(ConfigError::Invalid)?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ValidationError;
    use std::io::Write;
    use tempfile::Builder;

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parse_basic_config() {
        let yaml = r#"
name: detector
stages:
  - name: decode
    class_name: pass_through
    next: [detect]
  - name: detect
    class_name: collector
    parallelism: 4
    max_input_queue_size: 32
    overflow_policy: drop_oldest
    parameters:
      threshold: "0.6"
"#;

        let cfg: PipelineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.name, "detector");
        assert_eq!(cfg.flow_depth, 0);
        assert_eq!(cfg.stages.len(), 2);

        let decode = &cfg.stages[0];
        assert_eq!(decode.parallelism, 1);
        assert_eq!(decode.max_input_queue_size, 20);
        assert_eq!(decode.overflow_policy, OverflowPolicy::Block);
        assert_eq!(decode.next, vec!["detect"]);

        let detect = &cfg.stages[1];
        assert_eq!(detect.parallelism, 4);
        assert_eq!(detect.max_input_queue_size, 32);
        assert_eq!(detect.overflow_policy, OverflowPolicy::DropOldest);
        assert_eq!(detect.parameters.get("threshold").map(String::as_str), Some("0.6"));
        assert!(detect.next.is_empty());
    }

    #[test]
    fn test_load_yaml_and_toml_agree() {
        let yaml = write_temp(
            ".yaml",
            r#"
name: p
flow_depth: 4
stages:
  - name: a
    class_name: pass_through
    next: [b]
  - name: b
    class_name: collector
"#,
        );
        let toml = write_temp(
            ".toml",
            r#"
name = "p"
flow_depth = 4

[[stages]]
name = "a"
class_name = "pass_through"
next = ["b"]

[[stages]]
name = "b"
class_name = "collector"
"#,
        );

        let from_yaml = load_config(yaml.path()).unwrap();
        let from_toml = load_config(toml.path()).unwrap();
        assert_eq!(from_yaml, from_toml);
        assert_eq!(from_yaml.flow_depth, 4);
    }

    #[test]
    fn test_load_config_errors() {
        struct TestCase {
            name: &'static str,
            suffix: &'static str,
            content: &'static str,
            check: fn(&ConfigError) -> bool,
        }

        let test_cases = vec![
            TestCase {
                name: "unsupported extension",
                suffix: ".json",
                content: "{}",
                check: |e| matches!(e, ConfigError::UnsupportedFormat { .. }),
            },
            TestCase {
                name: "malformed yaml",
                suffix: ".yaml",
                content: "name: [unterminated",
                check: |e| matches!(e, ConfigError::Yaml(_)),
            },
            TestCase {
                name: "malformed toml",
                suffix: ".toml",
                content: "name = ",
                check: |e| matches!(e, ConfigError::Toml(_)),
            },
            TestCase {
                name: "missing stages",
                suffix: ".yml",
                content: "name: p\n",
                check: |e| matches!(e, ConfigError::Yaml(_)),
            },
        ];

        for case in test_cases {
            let file = write_temp(case.suffix, case.content);
            let err = load_config(file.path()).unwrap_err();
            assert!((case.check)(&err), "case '{}' produced {:?}", case.name, err);
        }
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("absent.yaml"));
    }

    #[test]
    fn test_load_and_validate_valid_config() {
        let file = write_temp(
            ".yaml",
            r#"
name: diamond
stages:
  - name: a
    class_name: pass_through
    next: [b, c]
  - name: b
    class_name: pass_through
    next: [d]
  - name: c
    class_name: pass_through
    next: [d]
  - name: d
    class_name: collector
"#,
        );

        let registry = StageRegistry::with_builtin_stages();
        let cfg = load_and_validate_config(file.path(), &registry).unwrap();
        assert_eq!(cfg.stages.len(), 4);
    }

    #[test]
    fn test_load_and_validate_cyclic_config() {
        let file = write_temp(
            ".yaml",
            r#"
name: loop
stages:
  - name: root
    class_name: pass_through
    next: [a]
  - name: a
    class_name: pass_through
    next: [b]
  - name: b
    class_name: pass_through
    next: [a]
"#,
        );

        let registry = StageRegistry::with_builtin_stages();
        let err = load_and_validate_config(file.path(), &registry).unwrap_err();
        match err {
            ConfigError::Invalid(errors) => {
                assert!(errors
                    .iter()
                    .any(|e| matches!(e, ValidationError::CyclicLink { .. })));
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_load_and_validate_unknown_class() {
        let file = write_temp(
            ".yaml",
            r#"
name: p
stages:
  - name: a
    class_name: does_not_exist
"#,
        );

        let registry = StageRegistry::with_builtin_stages();
        let err = load_and_validate_config(file.path(), &registry).unwrap_err();
        assert!(err.to_string().contains("does_not_exist"));
    }

    #[test]
    fn test_stage_config_builder() {
        let stage = StageConfig::new("detect", "collector")
            .with_next(&["track"])
            .with_parallelism(3)
            .with_queue_size(5)
            .with_overflow_policy(OverflowPolicy::DropOldest)
            .with_parameter("model", "yolo");

        assert_eq!(stage.next, vec!["track"]);
        assert_eq!(stage.parallelism, 3);
        assert_eq!(stage.max_input_queue_size, 5);
        assert_eq!(stage.overflow_policy, OverflowPolicy::DropOldest);
        assert_eq!(stage.parameters.get("model").map(String::as_str), Some("yolo"));
    }
}
