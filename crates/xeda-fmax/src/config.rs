//! Search knobs read from the flow's settings section.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use xeda_core::errors::{ErrorInfo, XedaError};
use xeda_core::settings::Mapping;

/// Operator-facing parameters of one Fmax search.
///
/// Deserialized from `flows.<flow>`; unrelated keys in that section are
/// ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FmaxConfig {
    /// Lower bound of the initial window (MHz).
    #[serde(rename = "fmax_low_freq", default = "default_low_freq")]
    pub low_freq: f64,
    /// Upper bound of the initial window (MHz).
    #[serde(rename = "fmax_high_freq", default = "default_high_freq")]
    pub high_freq: f64,
    /// Smallest frequency difference worth distinguishing (MHz).
    #[serde(rename = "fmax_resolution", default = "default_resolution")]
    pub resolution: f64,
    /// Consecutive non-improving iterations before giving up.
    #[serde(rename = "fmax_max_no_improvements", default = "default_max_no_improvements")]
    pub max_no_improvements: u32,
    /// Per-trial timeout in seconds.
    #[serde(rename = "timeout", default = "default_timeout_secs")]
    pub timeout_secs: f64,
    /// Threads granted to each trial.
    #[serde(default = "default_nthreads")]
    pub nthreads: usize,
    /// Interval heuristics.
    #[serde(rename = "fmax_tuning", default)]
    pub tuning: SearchTuning,
}

fn default_low_freq() -> f64 {
    1.0
}

fn default_high_freq() -> f64 {
    600.0
}

fn default_resolution() -> f64 {
    0.09
}

fn default_max_no_improvements() -> u32 {
    3
}

fn default_timeout_secs() -> f64 {
    3600.0
}

fn default_nthreads() -> usize {
    4
}

impl Default for FmaxConfig {
    fn default() -> Self {
        Self {
            low_freq: default_low_freq(),
            high_freq: default_high_freq(),
            resolution: default_resolution(),
            max_no_improvements: default_max_no_improvements(),
            timeout_secs: default_timeout_secs(),
            nthreads: default_nthreads(),
            tuning: SearchTuning::default(),
        }
    }
}

impl FmaxConfig {
    /// Reads and validates the knobs of a flow section.
    pub fn from_flow_section(section: Option<&Mapping>) -> Result<Self, XedaError> {
        let value = Value::Object(section.cloned().unwrap_or_default());
        let config: Self = serde_json::from_value(value).map_err(|err| {
            XedaError::Config(
                ErrorInfo::new("fmax.config", "invalid fmax settings")
                    .with_context("reason", err.to_string()),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects windows and limits the search cannot work with.
    pub fn validate(&self) -> Result<(), XedaError> {
        let invalid = |code: &str, message: &str| {
            XedaError::Config(
                ErrorInfo::new(code, message)
                    .with_context("fmax_low_freq", self.low_freq.to_string())
                    .with_context("fmax_high_freq", self.high_freq.to_string())
                    .with_context("fmax_resolution", self.resolution.to_string()),
            )
        };
        if !(self.low_freq > 0.0 && self.high_freq.is_finite()) {
            return Err(invalid("fmax.bounds", "frequency bounds must be positive and finite"));
        }
        if self.low_freq >= self.high_freq {
            return Err(invalid(
                "fmax.bounds",
                "fmax_low_freq must be lower than fmax_high_freq",
            ));
        }
        if !(self.resolution > 0.0 && self.resolution.is_finite()) {
            return Err(invalid("fmax.resolution", "fmax_resolution must be positive"));
        }
        if self.max_no_improvements == 0 {
            return Err(invalid(
                "fmax.no_improvements",
                "fmax_max_no_improvements must be at least 1",
            ));
        }
        if !(self.timeout_secs > 0.0 && self.timeout_secs.is_finite()) {
            return Err(invalid("fmax.timeout", "timeout must be a positive number of seconds"));
        }
        Ok(())
    }

    /// Per-trial timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }

    /// Jitter unit used by the interval heuristics.
    pub fn delta(&self) -> f64 {
        self.resolution * self.tuning.jitter_ratio
    }
}

/// Empirically tuned constants of the interval heuristics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchTuning {
    /// Base of the low-bound shrink factor; the no-improvement count is added.
    #[serde(default = "default_shrink_base")]
    pub shrink_base: f64,
    /// Jitter unit as a fraction of the resolution.
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
    /// Scale of the low-bound jitter applied while widening.
    #[serde(default = "default_low_jitter_scale")]
    pub low_jitter_scale: f64,
    /// Headroom added to the upper bound after every improvement, in
    /// resolutions.
    #[serde(default = "default_headroom_resolutions")]
    pub headroom_resolutions: f64,
    /// Margin subtracted from the slack-implied period (ns).
    #[serde(default = "default_slack_epsilon")]
    pub slack_epsilon: f64,
    /// After an improvement away from the top of the batch, clamp the upper
    /// bound to the first failing candidate before headroom is added.
    /// Off by default.
    #[serde(default)]
    pub pull_hi_to_failure: bool,
}

fn default_shrink_base() -> f64 {
    0.7
}

fn default_jitter_ratio() -> f64 {
    0.5
}

fn default_low_jitter_scale() -> f64 {
    0.1
}

fn default_headroom_resolutions() -> f64 {
    2.3
}

fn default_slack_epsilon() -> f64 {
    0.001
}

impl Default for SearchTuning {
    fn default() -> Self {
        Self {
            shrink_base: default_shrink_base(),
            jitter_ratio: default_jitter_ratio(),
            low_jitter_scale: default_low_jitter_scale(),
            headroom_resolutions: default_headroom_resolutions(),
            slack_epsilon: default_slack_epsilon(),
            pull_hi_to_failure: false,
        }
    }
}
