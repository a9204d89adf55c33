//! Validation of a pipeline's stage list before anything is instantiated.
//!
//! The checks run in a fixed order so that later checks can rely on the
//! structure established by earlier ones:
//!
//! 1. **Shape**: at least one stage, at most `MAX_STAGES`, non-empty unique
//!    names, `parallelism >= 1`, `max_input_queue_size >= 1`, registered
//!    class names
//! 2. **References**: every `next` entry names an existing stage
//! 3. **Reachability**: every stage can be reached from a root stage (a stage
//!    no other stage links to)
//! 4. **Cycles**: DFS with a recursion stack, reporting the cycle path
//!
//! Reachability and cycle detection need a resolvable graph and are skipped
//! when the earlier checks fail. All errors of one phase are reported
//! together.
//!
//! # Examples
//!
//! ```rust
//! use the_streamline::config::{validate_stage_configs, StageConfig, StageRegistry};
//! use the_streamline::errors::ValidationError;
//!
//! let registry = StageRegistry::with_builtin_stages();
//! let stages = vec![
//!     StageConfig::new("decode", "pass_through").with_next(&["detect"]),
//!     StageConfig::new("detect", "pass_through").with_next(&["decode"]),
//! ];
//!
//! match validate_stage_configs("looping", &stages, &registry) {
//!     Ok(()) => unreachable!(),
//!     Err(errors) => {
//!         for error in errors {
//!             if let ValidationError::CyclicLink { cycle } = &error {
//!                 eprintln!("cycle: {}", cycle.join(" -> "));
//!             }
//!         }
//!     }
//! }
//! ```

use std::collections::{HashMap, HashSet, VecDeque};

use crate::config::consts::MAX_STAGES;
use crate::config::{StageConfig, StageRegistry};
use crate::errors::ValidationError;
use crate::observability::messages::validation::{
    CyclicLinkDetected, DuplicateStageName, UnresolvedNextStage, ValidationCompleted,
    ValidationFailed, ValidationStarted,
};
use crate::observability::messages::StructuredLog;

/// Validate `stages` as the stage list of pipeline `pipeline`.
///
/// # Returns
///
/// * `Ok(())` - The stage graph can be built
/// * `Err(Vec<ValidationError>)` - Every problem found in the first failing phase
pub fn validate_stage_configs(
    pipeline: &str,
    stages: &[StageConfig],
    registry: &StageRegistry,
) -> Result<(), Vec<ValidationError>> {
    ValidationStarted {
        pipeline,
        stage_count: stages.len(),
    }
    .log();

    let result = run_checks(pipeline, stages, registry);
    match &result {
        Ok(()) => ValidationCompleted {
            pipeline,
            stage_count: stages.len(),
            root_count: root_stages(stages).len(),
        }
        .log(),
        Err(errors) => ValidationFailed {
            pipeline,
            error_count: errors.len(),
        }
        .log(),
    }
    result
}

fn run_checks(
    pipeline: &str,
    stages: &[StageConfig],
    registry: &StageRegistry,
) -> Result<(), Vec<ValidationError>> {
    if stages.is_empty() {
        return Err(vec![ValidationError::EmptyPipeline {
            pipeline: pipeline.to_string(),
        }]);
    }

    let mut errors = Vec::new();
    if stages.len() > MAX_STAGES {
        errors.push(ValidationError::TooManyStages {
            count: stages.len(),
            max: MAX_STAGES,
        });
    }
    errors.extend(validate_stage_shapes(stages, registry));
    errors.extend(validate_unique_names(stages));
    errors.extend(validate_next_references(stages));
    if !errors.is_empty() {
        return Err(errors);
    }

    let unreachable = validate_reachability(stages);
    let cycles = validate_acyclic_graph(stages);
    errors.extend(unreachable);
    errors.extend(cycles);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_stage_shapes(stages: &[StageConfig], registry: &StageRegistry) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    for (index, stage) in stages.iter().enumerate() {
        if stage.name.is_empty() {
            errors.push(ValidationError::EmptyStageName { index });
        }
        if stage.parallelism == 0 {
            errors.push(ValidationError::InvalidParallelism {
                stage: stage.name.clone(),
                parallelism: stage.parallelism,
            });
        }
        if stage.max_input_queue_size == 0 {
            errors.push(ValidationError::InvalidQueueSize {
                stage: stage.name.clone(),
                size: stage.max_input_queue_size,
            });
        }
        if !registry.contains(&stage.class_name) {
            errors.push(ValidationError::UnknownClass {
                stage: stage.name.clone(),
                class_name: stage.class_name.clone(),
            });
        }
    }
    errors
}

fn validate_unique_names(stages: &[StageConfig]) -> Vec<ValidationError> {
    let mut seen = HashSet::new();
    let mut errors = Vec::new();

    for stage in stages {
        if !stage.name.is_empty() && !seen.insert(stage.name.as_str()) {
            DuplicateStageName {
                stage_name: &stage.name,
            }
            .log();
            errors.push(ValidationError::DuplicateStageName {
                stage: stage.name.clone(),
            });
        }
    }
    errors
}

fn validate_next_references(stages: &[StageConfig]) -> Vec<ValidationError> {
    let names: HashSet<&str> = stages.iter().map(|s| s.name.as_str()).collect();
    let mut errors = Vec::new();

    for stage in stages {
        for next in &stage.next {
            if !names.contains(next.as_str()) {
                UnresolvedNextStage {
                    stage_name: &stage.name,
                    missing_next: next,
                }
                .log();
                errors.push(ValidationError::UnresolvedNext {
                    stage: stage.name.clone(),
                    missing_next: next.clone(),
                });
            }
        }
    }
    errors
}

/// Stages that no other stage lists in its `next`, in declaration order
pub(crate) fn root_stages(stages: &[StageConfig]) -> Vec<&str> {
    let linked: HashSet<&str> = stages
        .iter()
        .flat_map(|s| s.next.iter().map(String::as_str))
        .collect();
    stages
        .iter()
        .map(|s| s.name.as_str())
        .filter(|name| !linked.contains(name))
        .collect()
}

fn adjacency(stages: &[StageConfig]) -> HashMap<&str, Vec<&str>> {
    stages
        .iter()
        .map(|s| (s.name.as_str(), s.next.iter().map(String::as_str).collect()))
        .collect()
}

/// Breadth-first walk from every root; whatever is not visited is unreachable
fn validate_reachability(stages: &[StageConfig]) -> Vec<ValidationError> {
    let graph = adjacency(stages);
    let mut reached: HashSet<&str> = HashSet::new();
    let mut queue: VecDeque<&str> = root_stages(stages).into_iter().collect();

    while let Some(name) = queue.pop_front() {
        if !reached.insert(name) {
            continue;
        }
        if let Some(next) = graph.get(name) {
            queue.extend(next.iter().copied().filter(|n| !reached.contains(n)));
        }
    }

    stages
        .iter()
        .filter(|s| !reached.contains(s.name.as_str()))
        .map(|s| ValidationError::UnreachableStage {
            stage: s.name.clone(),
        })
        .collect()
}

/// Depth-first cycle search with a recursion stack.
///
/// Stages are visited in declaration order so the reported cycle is stable
/// between runs. Only the first cycle found is reported.
fn validate_acyclic_graph(stages: &[StageConfig]) -> Vec<ValidationError> {
    let graph = adjacency(stages);
    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();
    let mut path = Vec::new();

    for stage in stages {
        let name = stage.name.as_str();
        if visited.contains(name) {
            continue;
        }
        if let Some(cycle) = dfs_cycle_detection(name, &graph, &mut visited, &mut rec_stack, &mut path) {
            let cycle_refs: Vec<&str> = cycle.iter().map(String::as_str).collect();
            CyclicLinkDetected { cycle: &cycle_refs }.log();
            return vec![ValidationError::CyclicLink { cycle }];
        }
    }
    Vec::new()
}

fn dfs_cycle_detection<'a>(
    node: &'a str,
    graph: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(neighbors) = graph.get(node) {
        for &neighbor in neighbors {
            if !visited.contains(neighbor) {
                if let Some(cycle) = dfs_cycle_detection(neighbor, graph, visited, rec_stack, path) {
                    return Some(cycle);
                }
            } else if rec_stack.contains(neighbor) {
                // Back edge: the cycle is the path from `neighbor` to here
                let start = path.iter().position(|n| *n == neighbor).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
                cycle.push(neighbor.to_string());
                return Some(cycle);
            }
        }
    }

    rec_stack.remove(node);
    path.pop();
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage(name: &str, next: Vec<&str>) -> StageConfig {
        StageConfig::new(name, "pass_through").with_next(&next)
    }

    fn validate(stages: &[StageConfig]) -> Result<(), Vec<ValidationError>> {
        validate_stage_configs("test", stages, &StageRegistry::with_builtin_stages())
    }

    #[test]
    fn test_valid_graphs() {
        struct TestCase {
            name: &'static str,
            stages: Vec<StageConfig>,
        }

        let test_cases = vec![
            TestCase {
                name: "single stage",
                stages: vec![stage("a", vec![])],
            },
            TestCase {
                name: "linear chain",
                stages: vec![stage("a", vec!["b"]), stage("b", vec!["c"]), stage("c", vec![])],
            },
            TestCase {
                name: "diamond",
                stages: vec![
                    stage("a", vec!["b", "c"]),
                    stage("b", vec!["d"]),
                    stage("c", vec!["d"]),
                    stage("d", vec![]),
                ],
            },
            TestCase {
                name: "two roots sharing a sink",
                stages: vec![stage("a", vec!["c"]), stage("b", vec!["c"]), stage("c", vec![])],
            },
            TestCase {
                name: "declared out of order",
                stages: vec![stage("sink", vec![]), stage("src", vec!["sink"])],
            },
        ];

        for case in test_cases {
            assert!(validate(&case.stages).is_ok(), "case '{}' should be valid", case.name);
        }
    }

    #[test]
    fn test_empty_pipeline() {
        let errors = validate(&[]).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::EmptyPipeline {
                pipeline: "test".to_string()
            }]
        );
    }

    #[test]
    fn test_too_many_stages() {
        let stages: Vec<StageConfig> = (0..=MAX_STAGES)
            .map(|i| stage(&format!("s{}", i), vec![]))
            .collect();
        let errors = validate(&stages).unwrap_err();
        assert!(errors.contains(&ValidationError::TooManyStages {
            count: MAX_STAGES + 1,
            max: MAX_STAGES
        }));
    }

    #[test]
    fn test_shape_errors() {
        let stages = vec![
            StageConfig::new("", "pass_through"),
            StageConfig::new("zero_workers", "pass_through").with_parallelism(0),
            StageConfig::new("zero_queue", "pass_through").with_queue_size(0),
            StageConfig::new("mystery", "no_such_class"),
        ];
        let errors = validate(&stages).unwrap_err();

        assert!(errors.contains(&ValidationError::EmptyStageName { index: 0 }));
        assert!(errors.contains(&ValidationError::InvalidParallelism {
            stage: "zero_workers".to_string(),
            parallelism: 0
        }));
        assert!(errors.contains(&ValidationError::InvalidQueueSize {
            stage: "zero_queue".to_string(),
            size: 0
        }));
        assert!(errors.contains(&ValidationError::UnknownClass {
            stage: "mystery".to_string(),
            class_name: "no_such_class".to_string()
        }));
    }

    #[test]
    fn test_duplicate_stage_names() {
        let stages = vec![stage("a", vec![]), stage("b", vec![]), stage("a", vec![])];
        let errors = validate(&stages).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::DuplicateStageName {
                stage: "a".to_string()
            }]
        );
    }

    #[test]
    fn test_unresolved_next() {
        let stages = vec![stage("a", vec!["b", "ghost"]), stage("b", vec![])];
        let errors = validate(&stages).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::UnresolvedNext {
                stage: "a".to_string(),
                missing_next: "ghost".to_string()
            }]
        );
    }

    #[test]
    fn test_simple_cycle_behind_root() {
        let stages = vec![stage("root", vec!["a"]), stage("a", vec!["b"]), stage("b", vec!["a"])];
        let errors = validate(&stages).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::CyclicLink {
                cycle: vec!["a".to_string(), "b".to_string(), "a".to_string()]
            }]
        );
    }

    #[test]
    fn test_self_link_cycle() {
        let stages = vec![stage("root", vec!["a"]), stage("a", vec!["a"])];
        let errors = validate(&stages).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::CyclicLink {
                cycle: vec!["a".to_string(), "a".to_string()]
            }]
        );
    }

    #[test]
    fn test_cycle_without_roots_is_also_unreachable() {
        let stages = vec![stage("a", vec!["b"]), stage("b", vec!["a"])];
        let errors = validate(&stages).unwrap_err();

        assert!(errors.contains(&ValidationError::UnreachableStage {
            stage: "a".to_string()
        }));
        assert!(errors.contains(&ValidationError::UnreachableStage {
            stage: "b".to_string()
        }));
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::CyclicLink { .. })));
    }

    #[test]
    fn test_root_stages_in_declaration_order() {
        let stages = vec![
            stage("sink", vec![]),
            stage("b", vec!["sink"]),
            stage("a", vec!["sink"]),
        ];
        assert_eq!(root_stages(&stages), vec!["b", "a"]);
    }
}
