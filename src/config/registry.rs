use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::backends::stub::{CollectorStage, FailingStage, PassThroughStage};
use crate::traits::Stage;

/// Builds a fresh stage instance
pub type StageFactory = Arc<dyn Fn() -> Arc<dyn Stage> + Send + Sync>;

/// Resolves `class_name` strings from stage configs into stage instances.
///
/// Registries are plain values handed to [`crate::engine::Pipeline::build`];
/// nothing is registered globally.
#[derive(Clone, Default)]
pub struct StageRegistry {
    factories: HashMap<String, StageFactory>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry knowing `pass_through`, `collector` and `failing`
    pub fn with_builtin_stages() -> Self {
        let mut registry = Self::new();
        registry.register(PassThroughStage::CLASS_NAME, || {
            Arc::new(PassThroughStage::new()) as Arc<dyn Stage>
        });
        registry.register(CollectorStage::CLASS_NAME, || {
            Arc::new(CollectorStage::new()) as Arc<dyn Stage>
        });
        registry.register(FailingStage::CLASS_NAME, || {
            Arc::new(FailingStage::new()) as Arc<dyn Stage>
        });
        registry
    }

    /// Register (or replace) the factory for `class_name`
    pub fn register<F>(&mut self, class_name: &str, factory: F)
    where
        F: Fn() -> Arc<dyn Stage> + Send + Sync + 'static,
    {
        self.factories.insert(class_name.to_string(), Arc::new(factory));
    }

    pub fn create(&self, class_name: &str) -> Option<Arc<dyn Stage>> {
        self.factories.get(class_name).map(|factory| factory())
    }

    pub fn contains(&self, class_name: &str) -> bool {
        self.factories.contains_key(class_name)
    }

    /// Registered class names, sorted
    pub fn class_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageRegistry")
            .field("class_names", &self.class_names())
            .finish()
    }
}
