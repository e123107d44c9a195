//! Environment options.

use std::num::NonZeroUsize;
use std::path::Path;

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The default environment name.
pub const DEFAULT_NAME: &str = "ace";

/// Options controlling an [`Environment`](crate::env::Environment).
///
/// Can be read from TOML:
///
/// ```toml
/// name = "opamp"
/// verbose = false
/// restart_period = 50
/// seed = 42
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentOptions {
    /// The environment name, used as the prefix of session names.
    pub name: ArcStr,
    /// Report missing results in detail.
    pub verbose: bool,
    /// Restart simulator sessions after this many runs.
    pub restart_period: Option<NonZeroUsize>,
    /// Seed of the random number generator used for sampling parameters.
    pub seed: Option<u64>,
}

impl Default for EnvironmentOptions {
    fn default() -> Self {
        Self {
            name: ArcStr::from(DEFAULT_NAME),
            verbose: true,
            restart_period: None,
            seed: None,
        }
    }
}

impl EnvironmentOptions {
    /// Parses options from a TOML string. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Reads options from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Sets the environment name.
    pub fn with_name(mut self, name: impl Into<ArcStr>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the restart period.
    pub fn with_restart_period(mut self, period: usize) -> Self {
        self.restart_period = NonZeroUsize::new(period);
        self
    }

    /// Sets the sampling seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let opts = EnvironmentOptions::from_toml_str("").unwrap();
        assert_eq!(opts, EnvironmentOptions::default());
        assert_eq!(opts.name, "ace");
        assert!(opts.verbose);
    }

    #[test]
    fn parses_toml() {
        let opts = EnvironmentOptions::from_toml_str(
            r#"
            name = "opamp"
            verbose = false
            restart_period = 50
            "#,
        )
        .unwrap();
        assert_eq!(opts.name, "opamp");
        assert!(!opts.verbose);
        assert_eq!(opts.restart_period, NonZeroUsize::new(50));
        assert_eq!(opts.seed, None);
        assert!(EnvironmentOptions::from_toml_str("restart_period = 0").is_err());
    }
}
