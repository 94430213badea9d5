//! Tunables, loadable from a TOML file.
//!
//! ```toml
//! quantum_ms = 100
//! sjf_window = 5
//!
//! [mlfq]
//! q0_ms = 100
//! q1_ms = 200
//! q2_ms = 400
//! boost_ms = 1000
//! ```

use serde::Deserialize;
use std::{
    error::Error,
    fmt, fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::core::{CoreSettings, history::DEFAULT_ESTIMATE_MS, state::Millis};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MlfqConfig {
    pub q0_ms: Millis,
    pub q1_ms: Millis,
    pub q2_ms: Millis,
    /// Zero disables boosting.
    pub boost_ms: Millis,
}

impl Default for MlfqConfig {
    fn default() -> Self {
        Self {
            q0_ms: 100,
            q1_ms: 200,
            q2_ms: 400,
            boost_ms: 1000,
        }
    }
}

impl MlfqConfig {
    pub fn quanta(&self) -> [Millis; 3] {
        [self.q0_ms, self.q1_ms, self.q2_ms]
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedConfig {
    /// Round-robin quantum.
    pub quantum_ms: Millis,
    pub mlfq: MlfqConfig,
    pub sjf_window: usize,
    pub default_estimate_ms: f64,
    pub poll_interval_ms: Millis,
    pub idle_interval_ms: Millis,
    pub report_dir: PathBuf,
    pub exit_when_drained: bool,
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            quantum_ms: 100,
            mlfq: MlfqConfig::default(),
            sjf_window: 5,
            default_estimate_ms: DEFAULT_ESTIMATE_MS,
            poll_interval_ms: 1,
            idle_interval_ms: 1,
            report_dir: PathBuf::from("."),
            exit_when_drained: false,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Parse(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "cannot read config: {err}"),
            Self::Parse(err) => write!(f, "cannot parse config: {err}"),
            Self::Invalid(reason) => write!(f, "invalid config: {reason}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl SchedConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(ConfigError::Parse)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| Err(ConfigError::Invalid(reason.to_owned()));
        let [q0, q1, q2] = self.mlfq.quanta();
        if self.quantum_ms == 0 {
            return invalid("quantum_ms must be positive");
        }
        if q0 == 0 {
            return invalid("mlfq quanta must be positive");
        }
        if !(q0 <= q1 && q1 <= q2) {
            return invalid("mlfq quanta must satisfy q0 <= q1 <= q2");
        }
        if self.sjf_window == 0 {
            return invalid("sjf_window must be at least 1");
        }
        if !(self.default_estimate_ms.is_finite() && self.default_estimate_ms >= 0.0) {
            return invalid("default_estimate_ms must be a non-negative number");
        }
        Ok(())
    }

    pub fn core_settings(&self) -> CoreSettings {
        CoreSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            idle_interval: Duration::from_millis(self.idle_interval_ms),
            exit_when_drained: self.exit_when_drained,
        }
    }
}
