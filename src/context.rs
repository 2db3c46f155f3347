use crate::error::{MetricError, Result};
use crate::model::Anchor;
use serde::Deserialize;
use std::collections::HashMap;

/// Immutable snapshot of everything a SQL template may reference for one
/// code location. Produced per resolution request, consumed by a single
/// build call, then discarded.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContextInfo {
    #[serde(default)]
    pub method_fqn: Option<String>,
    #[serde(default)]
    pub feature_name: Option<String>,
    #[serde(default)]
    pub mapping_path: Option<String>,
    #[serde(default)]
    pub mapping_method: Option<String>,
    #[serde(default)]
    pub all_methods_in_file: Vec<String>,
    #[serde(default)]
    pub all_features_in_file: Vec<String>,
    #[serde(default)]
    pub all_mapping_paths_in_file: Vec<String>,
    #[serde(default)]
    pub all_mapping_methods_in_file: Vec<String>,
}

/// Seam to the host's source-code resolution. Implementations must be safe
/// to call from worker threads.
pub trait ContextResolver: Sync {
    fn resolve(&self, anchor: &Anchor) -> Result<ContextInfo>;
}

/// Resolver backed by pre-resolved per-anchor records. Used by the CLI
/// (element input files carry their own context) and by tests.
pub struct StaticResolver {
    contexts: HashMap<Anchor, ContextInfo>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self {
            contexts: HashMap::new(),
        }
    }

    pub fn insert(&mut self, anchor: Anchor, context: ContextInfo) {
        self.contexts.insert(anchor, context);
    }
}

impl Default for StaticResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextResolver for StaticResolver {
    fn resolve(&self, anchor: &Anchor) -> Result<ContextInfo> {
        self.contexts.get(anchor).cloned().ok_or_else(|| {
            MetricError::Unexpected(format!(
                "no context for {}:{}",
                anchor.file, anchor.line
            ))
        })
    }
}
