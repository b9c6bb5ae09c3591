//! Job spec (`mesh.yaml`)

use mesh_protocol::RemoteLayout;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Process name killed by cleanup when the job spec does not set one
pub const DEFAULT_KILL_PATTERN: &str = "python";

/// What to install, what to ship, and what to run before the job starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Setup commands run by `mesh setup`
    #[serde(default)]
    pub commands: Vec<String>,

    /// Glob patterns excluded from the workspace archive
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Commands run inside the job directory before launch
    #[serde(default)]
    pub prerun: Vec<String>,

    /// Process name passed to `pkill -9` on cleanup
    #[serde(default = "default_kill_pattern")]
    pub kill_pattern: String,

    /// Remote directory and file names
    #[serde(default)]
    pub remote: RemoteLayout,
}

fn default_kill_pattern() -> String {
    DEFAULT_KILL_PATTERN.to_string()
}

impl Default for JobSpec {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            ignore: Vec::new(),
            prerun: Vec::new(),
            kill_pattern: default_kill_pattern(),
            remote: RemoteLayout::default(),
        }
    }
}

impl JobSpec {
    /// Parse a job spec, warning about each empty list
    pub fn from_yaml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        // An empty file is a valid spec with every list empty
        let spec: JobSpec = if content.trim().is_empty() {
            JobSpec::default()
        } else {
            serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?
        };

        if spec.commands.is_empty() {
            tracing::warn!("no 'commands' specified in {}", path.display());
        }
        if spec.ignore.is_empty() {
            tracing::warn!("no 'ignore' patterns specified in {}", path.display());
        }
        if spec.prerun.is_empty() {
            tracing::warn!("no 'prerun' commands specified in {}", path.display());
        }

        Ok(spec)
    }
}
