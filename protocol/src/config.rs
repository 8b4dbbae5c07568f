//! Watch pipeline configuration.
//!
//! Candidate symbols and inspected fields are plain data; there is one
//! pipeline for all of them.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of syscall argument registers.
pub const MAX_SYSCALL_ARGS: u8 = 6;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no candidate symbol names configured")]
    EmptyCandidates,

    #[error("candidate #{0} is blank")]
    BlankCandidate(usize),

    #[error("argument index {0} out of range (0..{max})", max = MAX_SYSCALL_ARGS)]
    ArgumentIndex(u8),

    #[error("drain timeout must be non-zero")]
    ZeroDrainTimeout,

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Which optional fields the inspector reads on every call.
///
/// Pid and display name are always captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldSet {
    pub namespace: bool,
    pub argument: bool,
    pub cpu: bool,
}

impl Default for FieldSet {
    fn default() -> Self {
        Self {
            namespace: true,
            argument: true,
            cpu: true,
        }
    }
}

/// Which call argument to capture and how to label it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArgumentSpec {
    /// Zero-based syscall argument slot.
    pub index: u8,
    pub label: String,
}

impl Default for ArgumentSpec {
    fn default() -> Self {
        Self {
            index: 0,
            label: "fd".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Symbol names tried in order; host versions name the entry differently.
    pub candidates: Vec<String>,
    pub fields: FieldSet,
    pub argument: ArgumentSpec,
    pub format: RecordFormat,
    /// Upper bound on waiting for in-flight handler calls at uninstall.
    pub drain_timeout_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            candidates: vec!["__x64_sys_write".to_string(), "sys_write".to_string()],
            fields: FieldSet::default(),
            argument: ArgumentSpec::default(),
            format: RecordFormat::default(),
            drain_timeout_ms: 500,
        }
    }
}

impl WatchConfig {
    /// Parse a JSON blob; missing keys keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: WatchConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_candidates<I, S>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.candidates = candidates.into_iter().map(Into::into).collect();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.candidates.is_empty() {
            return Err(ConfigError::EmptyCandidates);
        }
        if let Some(i) = self.candidates.iter().position(|c| c.trim().is_empty()) {
            return Err(ConfigError::BlankCandidate(i));
        }
        if self.argument.index >= MAX_SYSCALL_ARGS {
            return Err(ConfigError::ArgumentIndex(self.argument.index));
        }
        if self.drain_timeout_ms == 0 {
            return Err(ConfigError::ZeroDrainTimeout);
        }
        Ok(())
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}
