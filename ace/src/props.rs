//! The declarative description of a circuit (`properties.json`).
//!
//! ```json
//! {
//!   "parameters": { "M1w": { "min": 1e-6, "max": 5e-5, "grid": 1e-7, "init": 3e-6, "sizing": true } },
//!   "performances": { "dcop": { "A": { "reference": "DUT:a" } } },
//!   "corners": { "nom": { "netlist": "nom.scs", "nominal": true } },
//!   "environment": "SingleEndedOpampEnvironment",
//!   "scale": 1e-6
//! }
//! ```

use std::collections::HashSet;
use std::path::Path;

use arcstr::ArcStr;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::corner::CornerDecl;
use crate::error::{Error, Result};
use crate::param::ParameterDecl;

/// The file name of the circuit properties inside a circuit directory.
pub const PROPERTIES_FILE: &str = "properties.json";

/// A performance metric declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricDecl {
    /// The signal whose scalar value is copied into the metric.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<ArcStr>,
    /// Additional attributes (units, descriptions) that are carried but not interpreted.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl MetricDecl {
    /// A metric that copies the scalar value of `signal`.
    pub fn reference(signal: impl Into<ArcStr>) -> Self {
        Self {
            reference: Some(signal.into()),
            extra: Default::default(),
        }
    }

    /// A metric computed by a derived extractor.
    pub fn derived() -> Self {
        Self::default()
    }
}

/// The metrics of one analysis, in declaration order.
pub type AnalysisDecl = IndexMap<ArcStr, MetricDecl>;

/// Performance declarations, keyed by analysis identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Performances(IndexMap<ArcStr, AnalysisDecl>);

impl Performances {
    /// Creates performance declarations from analysis declarations.
    pub fn new(analyses: IndexMap<ArcStr, AnalysisDecl>) -> Self {
        Self(analyses)
    }

    /// Iterates over analysis identifiers and their metric declarations.
    pub fn iter(&self) -> impl Iterator<Item = (&ArcStr, &AnalysisDecl)> {
        self.0.iter()
    }

    /// The declared analysis identifiers.
    pub fn analyses(&self) -> impl Iterator<Item = &ArcStr> {
        self.0.keys()
    }

    /// The metric declarations of one analysis.
    pub fn analysis(&self, id: &str) -> Option<&AnalysisDecl> {
        self.0.get(id)
    }

    /// The identifiers of every metric whose analysis is not blacklisted.
    pub fn metric_ids(&self, blacklist: &HashSet<ArcStr>) -> Vec<ArcStr> {
        self.0
            .iter()
            .filter(|(analysis, _)| !blacklist.contains(*analysis))
            .flat_map(|(_, metrics)| metrics.keys().cloned())
            .collect()
    }
}

fn default_scale() -> f64 {
    1.0
}

/// The contents of a circuit's `properties.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitProperties {
    /// Declared parameters.
    pub parameters: IndexMap<ArcStr, ParameterDecl>,
    /// Declared performance metrics.
    pub performances: Performances,
    /// Declared corners; none means the implicit nominal corner.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub corners: IndexMap<ArcStr, CornerDecl>,
    /// Scaling factor between design units and simulator units.
    #[serde(default = "default_scale")]
    pub scale: f64,
    /// The kind of circuit, selecting the derived metric extractors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<ArcStr>,
}

impl CircuitProperties {
    /// Parses properties from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let props: Self = serde_json::from_str(json)?;
        props.checked()
    }

    /// Reads `properties.json` from a circuit directory.
    pub fn read(circuit_dir: impl AsRef<Path>) -> Result<Self> {
        let path = circuit_dir.as_ref().join(PROPERTIES_FILE);
        if !path.is_file() {
            return Err(Error::missing_path("circuit properties", &path));
        }
        let json = std::fs::read_to_string(&path)?;
        Self::from_json(&json).map_err(|err| {
            Error::config(arcstr::format!("invalid `{}`: {err}", path.display()))
        })
    }

    fn checked(self) -> Result<Self> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(Error::config(arcstr::format!(
                "scale must be a positive number, got {}",
                self.scale
            )));
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPAMP: &str = r#"{
        "parameters": {
            "M1w": { "min": 1e-6, "max": 5e-5, "grid": 1e-7, "init": 3e-6, "sizing": true },
            "vdd": { "init": 1.8 }
        },
        "performances": {
            "dcop": { "A": { "reference": "DUT:a", "unit": "V/V" }, "idd": { "reference": "DUT:idd" } },
            "tran": { "sr_r": {}, "sr_f": {} }
        },
        "environment": "SingleEndedOpampEnvironment"
    }"#;

    #[test]
    fn parses_properties_in_declaration_order() {
        let props = CircuitProperties::from_json(OPAMP).unwrap();
        assert_eq!(props.parameters.keys().collect::<Vec<_>>(), vec!["M1w", "vdd"]);
        assert_eq!(props.scale, 1.0);
        assert!(props.corners.is_empty());
        assert_eq!(props.environment.as_deref(), Some("SingleEndedOpampEnvironment"));

        let dcop = props.performances.analysis("dcop").unwrap();
        assert_eq!(dcop["A"].reference.as_deref(), Some("DUT:a"));
        assert_eq!(dcop["A"].extra["unit"], "V/V");
        assert_eq!(props.performances.analysis("tran").unwrap()["sr_r"].reference, None);
    }

    #[test]
    fn metric_ids_skip_blacklisted_analyses() {
        let props = CircuitProperties::from_json(OPAMP).unwrap();
        let all = props.performances.metric_ids(&HashSet::new());
        assert_eq!(all, vec!["A", "idd", "sr_r", "sr_f"]);
        let blacklist = HashSet::from([ArcStr::from("tran")]);
        assert_eq!(props.performances.metric_ids(&blacklist), vec!["A", "idd"]);
    }

    #[test]
    fn rejects_missing_sections() {
        assert!(CircuitProperties::from_json(r#"{ "parameters": {} }"#).is_err());
        assert!(CircuitProperties::from_json(r#"{ "parameters": {}, "performances": {}, "scale": -1 }"#).is_err());
    }
}
