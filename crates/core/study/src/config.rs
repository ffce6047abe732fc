//! Study configuration.
//!
//! Everything site-specific about a study deployment lives here: where the
//! data repository and work area are, the scheduler retry policy, software
//! module overrides, and parameter/switch bindings. The registry and the
//! pipeline definitions stay in code; the configuration binds them to one
//! concrete environment.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use job_executor::SchedulerConfig;
use pipeline_graph::RequirementName;
use study_common::{ItemName, ParamName, ParamValue, SwitchName, SwitchValue};

/// Errors raised while loading or interpreting a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid selector pattern for item '{item}'")]
    Selector {
        item: ItemName,
        #[source]
        source: regex::Error,
    },
}

/// Scheduler retry policy, in config-file form.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSettings {
    /// Times a failed job command is re-run before the job is reported
    /// failed.
    pub max_retries: usize,
    /// Initial backoff between retry attempts, in milliseconds.
    pub retry_backoff_ms: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_backoff_ms: 500,
        }
    }
}

impl From<SchedulerSettings> for SchedulerConfig {
    fn from(settings: SchedulerSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            retry_backoff: Duration::from_millis(settings.retry_backoff_ms),
        }
    }
}

/// Everything needed to assemble a [`Study`](crate::Study), apart from the
/// registry and the pipeline set.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StudyConfig {
    pub name: String,
    /// Root directory of the acquired-data repository.
    pub repository_root: PathBuf,
    /// Staging area for job outputs and the provenance cache.
    pub work_dir: PathBuf,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    /// Concrete module overrides for abstract software requirements.
    #[serde(default)]
    pub environment: BTreeMap<RequirementName, String>,
    /// Regex selectors binding acquired items to repository entries by
    /// pattern instead of by name.
    #[serde(default)]
    pub selectors: BTreeMap<ItemName, String>,
    /// Parameter overrides applied on top of registry defaults.
    #[serde(default)]
    pub parameters: BTreeMap<ParamName, ParamValue>,
    /// Switch overrides applied on top of registry defaults.
    #[serde(default)]
    pub switches: BTreeMap<SwitchName, SwitchValue>,
}

impl StudyConfig {
    /// Loads a configuration from a JSON file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
