//! User settings: the only persisted state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::HostError;
use crate::namespace::GLOBAL_NAMESPACE;

/// What else gets recompiled when one component changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecompilePolicy {
    /// Every registered component, so compile errors surface right away.
    #[default]
    All,
    /// Only the component whose source changed.
    ChangedOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Folder whose markdown files are whole-file components.
    pub components_folder: Option<PathBuf>,
    pub default_namespace: String,
    pub auto_refresh: bool,
    pub refresh_debounce_ms: u64,
    pub recompile_policy: RecompilePolicy,
    pub max_call_depth: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            components_folder: None,
            default_namespace: GLOBAL_NAMESPACE.to_string(),
            auto_refresh: true,
            refresh_debounce_ms: 250,
            recompile_policy: RecompilePolicy::All,
            max_call_depth: crate::interpreter::DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl Settings {
    pub fn from_json_str(text: &str) -> Result<Self, HostError> {
        Ok(serde_json::from_str(text)?)
    }

    /// A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, HostError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::from_json_str(&text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(HostError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.refresh_debounce_ms)
    }
}
