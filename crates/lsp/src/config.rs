use serde::Deserialize;

use crate::collector::MAX_COMPLETION_SIZE;

pub const DEFAULT_PACKAGE_EXPR: &str = "import <nixpkgs> { }";

/// Runtime configuration, populated from `initializationOptions` and
/// `workspace/didChangeConfiguration`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub completion: CompletionConfig,
    pub nixpkgs: NixpkgsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompletionConfig {
    /// Items past this count are dropped and the list is marked incomplete.
    pub max_items: usize,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            max_items: MAX_COMPLETION_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NixpkgsConfig {
    /// The expression the evaluator loads as the package set.
    pub expr: String,
}

impl Default for NixpkgsConfig {
    fn default() -> Self {
        Self {
            expr: DEFAULT_PACKAGE_EXPR.to_string(),
        }
    }
}
