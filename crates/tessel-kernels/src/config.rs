//! Engine configuration: index policy and parallel scheduling knobs.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tessel_core::{Result, TesselError};

/// What the index-table kernels do with an index outside `[0, num_class)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexPolicy {
    /// Abort the call with `IndexOutOfRange` before anything is written.
    #[default]
    FailFast,
    /// Clamp the index to the nearest valid class.
    Clip,
    /// Ignore the element: gather leaves zero, scatter writes nothing.
    Skip,
}

impl FromStr for IndexPolicy {
    type Err = TesselError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail_fast" | "failfast" | "fail-fast" => Ok(IndexPolicy::FailFast),
            "clip" => Ok(IndexPolicy::Clip),
            "skip" => Ok(IndexPolicy::Skip),
            other => Err(TesselError::InvalidArgument(format!("unknown index policy '{other}'"))),
        }
    }
}

/// Configuration for a [`TransferEngine`](crate::TransferEngine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Out-of-range index handling.
    pub index_policy: IndexPolicy,

    /// Allow kernels to split work across the rayon pool.
    pub parallel: bool,

    /// Minimum number of moved elements before a kernel goes parallel.
    pub parallel_threshold: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            index_policy: IndexPolicy::FailFast,
            parallel: true,
            parallel_threshold: 32 * 1024,
        }
    }
}

impl TransferConfig {
    /// Environment variable selecting the [`IndexPolicy`].
    pub const ENV_INDEX_POLICY: &'static str = "TESSEL_INDEX_POLICY";
    /// Environment variable enabling/disabling parallel kernels.
    pub const ENV_PARALLEL: &'static str = "TESSEL_PARALLEL";
    /// Environment variable overriding the parallel threshold.
    pub const ENV_PARALLEL_THRESHOLD: &'static str = "TESSEL_PARALLEL_THRESHOLD";

    /// Single-threaded configuration (handy for deterministic tests).
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    pub fn with_index_policy(mut self, policy: IndexPolicy) -> Self {
        self.index_policy = policy;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    /// Parse a JSON object; missing fields keep their defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| TesselError::InvalidArgument(format!("transfer config: {e}")))
    }

    /// Defaults overridden by `TESSEL_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(policy) = lookup(Self::ENV_INDEX_POLICY) {
            config.index_policy = policy.parse()?;
        }
        if let Some(flag) = lookup(Self::ENV_PARALLEL) {
            config.parallel = match flag.trim() {
                "1" | "true" | "on" | "yes" => true,
                "0" | "false" | "off" | "no" => false,
                other => {
                    return Err(TesselError::InvalidArgument(format!(
                        "{}: expected a boolean, got '{other}'",
                        Self::ENV_PARALLEL
                    )))
                }
            };
        }
        if let Some(threshold) = lookup(Self::ENV_PARALLEL_THRESHOLD) {
            config.parallel_threshold = threshold.trim().parse().map_err(|_| {
                TesselError::InvalidArgument(format!(
                    "{}: expected an element count, got '{threshold}'",
                    Self::ENV_PARALLEL_THRESHOLD
                ))
            })?;
        }
        Ok(config)
    }

    /// Whether a kernel moving `work` elements should use the rayon pool.
    pub(crate) fn run_parallel(&self, work: usize) -> bool {
        self.parallel && work >= self.parallel_threshold && rayon::current_num_threads() > 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let c = TransferConfig::default();
        assert_eq!(c.index_policy, IndexPolicy::FailFast);
        assert!(c.parallel);
        assert!(!TransferConfig::sequential().parallel);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("clip".parse::<IndexPolicy>().unwrap(), IndexPolicy::Clip);
        assert_eq!(" Fail-Fast ".parse::<IndexPolicy>().unwrap(), IndexPolicy::FailFast);
        assert!("wrap".parse::<IndexPolicy>().is_err());
    }

    #[test]
    fn test_json_partial() {
        let c = TransferConfig::from_json_str(r#"{"index_policy": "skip"}"#).unwrap();
        assert_eq!(c.index_policy, IndexPolicy::Skip);
        assert_eq!(c.parallel_threshold, TransferConfig::default().parallel_threshold);

        assert!(TransferConfig::from_json_str(r#"{"index_policy": "nope"}"#).is_err());
    }

    #[test]
    fn test_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            (TransferConfig::ENV_INDEX_POLICY, "clip"),
            (TransferConfig::ENV_PARALLEL, "off"),
            (TransferConfig::ENV_PARALLEL_THRESHOLD, "128"),
        ]
        .into_iter()
        .collect();
        let c = TransferConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(c.index_policy, IndexPolicy::Clip);
        assert!(!c.parallel);
        assert_eq!(c.parallel_threshold, 128);
    }

    #[test]
    fn test_lookup_rejects_garbage() {
        let err = TransferConfig::from_lookup(|k| {
            (k == TransferConfig::ENV_PARALLEL_THRESHOLD).then(|| "many".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, TesselError::InvalidArgument(_)));
    }

    #[test]
    fn test_run_parallel_threshold() {
        let c = TransferConfig::default().with_parallel_threshold(100);
        assert!(!c.run_parallel(99));
        let off = c.clone().with_parallel(false);
        assert!(!off.run_parallel(1_000_000));
    }
}
