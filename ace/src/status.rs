//! Snapshots of parameter values.

use std::path::{Path, PathBuf};

use arcstr::ArcStr;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::env::Environment;
use crate::error::{Error, Result};

/// The values of every parameter of an environment.
///
/// Serialized as a flat JSON object mapping parameter names to values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Status(IndexMap<ArcStr, f64>);

impl Status {
    /// Creates a status from parameter values.
    pub fn new(values: IndexMap<ArcStr, f64>) -> Self {
        Self(values)
    }

    /// The value of a parameter.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// All values in declaration order.
    pub fn values(&self) -> &IndexMap<ArcStr, f64> {
        &self.0
    }

    /// Reads a status from a JSON file.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Writes the status to a JSON file.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

impl Environment {
    /// A snapshot of the current parameter values.
    pub fn status(&self) -> Status {
        Status(self.parameters.values().clone())
    }

    /// Restores parameter values from a snapshot.
    ///
    /// The snapshot must hold a finite value for every declared parameter;
    /// otherwise nothing is changed. Values are validated as if set
    /// individually. Entries for undeclared parameters are ignored.
    pub fn set_status(&mut self, status: &Status) -> Result<()> {
        let mut values = Vec::with_capacity(self.parameters.len());
        for param in self.parameters.parameters() {
            let name = param.name();
            match status.get(name) {
                Some(v) if v.is_finite() => values.push((name.clone(), v)),
                Some(v) => {
                    return Err(Error::InvalidStatus(arcstr::format!(
                        "parameter `{name}` has non-finite value {v}"
                    )));
                }
                None => {
                    return Err(Error::InvalidStatus(arcstr::format!(
                        "parameter `{name}` is missing"
                    )));
                }
            }
        }
        for name in status.values().keys() {
            if self.parameters.get(name).is_none() {
                tracing::warn!(parameter = %name, "ignoring status of undeclared parameter");
            }
        }
        self.parameters.set_all(values)
    }

    /// Writes the current status to a JSON file.
    pub fn save_status(&self, path: impl AsRef<Path>) -> Result<()> {
        self.status().write(path)
    }

    /// Writes the current status to a new temporary file and returns its path.
    ///
    /// The file is not deleted automatically.
    pub fn save_status_temp(&self) -> Result<PathBuf> {
        let file = tempfile::Builder::new()
            .prefix(&format!("{}-status-", self.name()))
            .suffix(".json")
            .tempfile()?;
        serde_json::to_writer_pretty(file.as_file(), &self.status())?;
        let (_, path) = file.keep().map_err(|err| err.error)?;
        Ok(path)
    }

    /// Restores parameter values from a JSON file written by
    /// [`Environment::save_status`].
    pub fn load_status(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let status = Status::read(path)?;
        self.set_status(&status)
    }
}
