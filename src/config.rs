//! `.jsguard.toml` loading.
//!
//! ```toml
//! [analyzer]
//! unsafe_paths = ["safejs::raw"]
//! recovery_functions = ["attempt", "attempt_side_effect"]
//! strict = false
//! ignore = ["target/**"]
//! ```

use crate::guard::{GuardError, GuardOptions, RAW_PATH, RECOVERY_FUNCTIONS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = ".jsguard.toml";

const MAX_TRAVERSAL_DEPTH: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardConfig {
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Canonical paths of raw modules whose calls must be wrapped
    pub unsafe_paths: Vec<String>,
    /// Names of the recovery boundary functions
    pub recovery_functions: Vec<String>,
    /// Report calls inside recovery closures too
    pub strict: bool,
    /// Glob patterns of files to skip
    pub ignore: Vec<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            unsafe_paths: vec![RAW_PATH.to_string()],
            recovery_functions: RECOVERY_FUNCTIONS.iter().map(|f| f.to_string()).collect(),
            strict: false,
            ignore: Vec::new(),
        }
    }
}

impl AnalyzerConfig {
    pub fn guard_options(&self) -> GuardOptions {
        GuardOptions {
            unsafe_paths: self.unsafe_paths.clone(),
            recovery_functions: self.recovery_functions.clone(),
            strict: self.strict,
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.unsafe_paths.is_empty() {
            return Err("unsafe_paths must name at least one module".to_string());
        }
        if let Some(path) = self
            .unsafe_paths
            .iter()
            .find(|path| path.is_empty() || path.split("::").any(str::is_empty))
        {
            return Err(format!("{path:?} is not a module path"));
        }
        Ok(())
    }
}

pub fn parse_config(contents: &str) -> Result<GuardConfig, String> {
    let config = toml::from_str::<GuardConfig>(contents)
        .map_err(|e| format!("Failed to parse {CONFIG_FILE_NAME}: {e}"))?;
    config.analyzer.validate()?;
    Ok(config)
}

/// Loads an explicitly named config file. Any failure is an error.
pub fn load_config_from(path: &Path) -> Result<GuardConfig, GuardError> {
    let contents = fs::read_to_string(path).map_err(|source| GuardError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&contents).map_err(|message| GuardError::Config {
        path: path.to_path_buf(),
        message,
    })
}

fn try_load_config_from_path(config_path: &Path) -> Option<GuardConfig> {
    let contents = match fs::read_to_string(config_path) {
        Ok(contents) => contents,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    "Failed to read config file {}: {}",
                    config_path.display(),
                    e
                );
            }
            return None;
        }
    };

    match parse_config(&contents) {
        Ok(config) => {
            tracing::debug!("Loaded config from {}", config_path.display());
            Some(config)
        }
        Err(e) => {
            tracing::warn!("{} in {}. Using defaults.", e, config_path.display());
            None
        }
    }
}

pub fn directory_ancestors(start: PathBuf, max_depth: usize) -> impl Iterator<Item = PathBuf> {
    std::iter::successors(Some(start), |dir| {
        let mut parent = dir.clone();
        if parent.pop() {
            Some(parent)
        } else {
            None
        }
    })
    .take(max_depth)
}

/// Searches `start` and its ancestors for `.jsguard.toml`.
pub fn discover_config(start: &Path) -> GuardConfig {
    directory_ancestors(start.to_path_buf(), MAX_TRAVERSAL_DEPTH)
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find_map(|path| try_load_config_from_path(&path))
        .unwrap_or_else(|| {
            tracing::debug!(
                "No config found after checking {} directories. Using default config.",
                MAX_TRAVERSAL_DEPTH
            );
            GuardConfig::default()
        })
}

/// Searches from the current directory.
pub fn load_config() -> GuardConfig {
    match std::env::current_dir() {
        Ok(dir) => discover_config(&dir),
        Err(e) => {
            tracing::warn!(
                "Failed to get current directory: {}. Using default config.",
                e
            );
            GuardConfig::default()
        }
    }
}
