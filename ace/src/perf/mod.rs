//! Reduction of simulator plots to performance metrics.
//!
//! Every declared metric is either a *reference* metric, which copies the
//! scalar value of a named signal, or a *derived* metric computed by an
//! [`Extractor`] registered for its analysis. Metrics that cannot be computed
//! (missing signals, non-finite results) are omitted rather than reported as
//! bogus numbers.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use arcstr::ArcStr;
use indexmap::IndexMap;
use rdb::{Plot, Plots};

use crate::props::{AnalysisDecl, Performances};

pub mod nand;
pub mod opamp;
pub mod schmitt;

/// Supply voltage assumed by digital extractors when the circuit declares none.
pub const DEFAULT_VDD: f64 = 3.3;

/// Metric values of one corner, keyed by metric identifier.
pub type MetricTable = IndexMap<ArcStr, f64>;

/// Metric values of every simulated corner, keyed by corner name.
pub type PerformanceTable = IndexMap<ArcStr, MetricTable>;

/// Context handed to an [`Extractor`].
#[derive(Debug, Clone, Copy)]
pub struct ExtractCtx<'a> {
    /// The corner being reduced.
    pub corner: &'a str,
    /// The analysis identifier.
    pub analysis: &'a str,
    /// The parameter values the corner was simulated with.
    pub parameters: &'a IndexMap<ArcStr, f64>,
    /// The metric declarations of the analysis.
    pub metrics: &'a AnalysisDecl,
}

impl ExtractCtx<'_> {
    /// The value of a parameter, or `default` if it is not declared.
    pub fn parameter_or(&self, name: &str, default: f64) -> f64 {
        self.parameters.get(name).copied().unwrap_or(default)
    }
}

/// Computes derived metrics from the plot of one analysis.
pub trait Extractor: Send + Sync {
    /// Returns every metric that could be computed.
    ///
    /// Only metrics declared for the analysis are kept by the reducer.
    fn extract(&self, ctx: &ExtractCtx<'_>, plot: &Plot) -> MetricTable;
}

/// Inserts `value` into `table` if it is present and finite.
pub(crate) fn insert_finite(table: &mut MetricTable, id: &str, value: Option<f64>) {
    match value {
        Some(v) if v.is_finite() => {
            table.insert(id.into(), v);
        }
        Some(v) => tracing::debug!(metric = id, value = v, "dropping non-finite metric"),
        None => {}
    }
}

/// The family of circuit a set of extractors is designed for.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum CircuitKind {
    /// Single-ended operational amplifiers.
    SingleEndedOpamp,
    /// Schmitt triggers.
    SchmittTrigger,
    /// Four-input NAND gates.
    Nand4,
    /// Circuits with reference metrics only.
    #[default]
    Generic,
}

impl CircuitKind {
    /// Maps the `environment` field of the circuit properties to a kind.
    ///
    /// Unknown or absent names map to [`CircuitKind::Generic`].
    pub fn from_environment(name: Option<&str>) -> Self {
        match name {
            None => Self::Generic,
            Some(name) => name.parse().unwrap_or_else(|_| {
                tracing::warn!(environment = name, "unknown environment, using reference metrics only");
                Self::Generic
            }),
        }
    }
}

impl FromStr for CircuitKind {
    type Err = ArcStr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SingleEndedOpampEnvironment" | "op" => Ok(Self::SingleEndedOpamp),
            "SchmittTriggerEnvironment" | "st" => Ok(Self::SchmittTrigger),
            "Nand4Environment" | "nand4" => Ok(Self::Nand4),
            "AcEnvironment" | "generic" => Ok(Self::Generic),
            other => Err(other.into()),
        }
    }
}

impl fmt::Display for CircuitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SingleEndedOpamp => "SingleEndedOpampEnvironment",
            Self::SchmittTrigger => "SchmittTriggerEnvironment",
            Self::Nand4 => "Nand4Environment",
            Self::Generic => "AcEnvironment",
        };
        f.write_str(name)
    }
}

/// The metrics of one corner and the results that were expected but absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reduction {
    /// The computed metrics.
    pub metrics: MetricTable,
    /// Analyses that were expected but produced no plot.
    pub missing: Vec<ArcStr>,
    /// Reference metrics whose signal was not in the plot.
    pub unresolved: Vec<ArcStr>,
}

impl Reduction {
    /// Returns `true` if every expected plot and referenced signal was present.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.unresolved.is_empty()
    }
}

/// Reduces plots to metric tables.
pub struct ResultReducer {
    extractors: HashMap<ArcStr, Box<dyn Extractor>>,
    verbose: bool,
}

impl fmt::Debug for ResultReducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultReducer")
            .field("extractors", &self.extractors.keys().collect::<Vec<_>>())
            .field("verbose", &self.verbose)
            .finish()
    }
}

impl Default for ResultReducer {
    fn default() -> Self {
        Self {
            extractors: HashMap::new(),
            verbose: true,
        }
    }
}

impl ResultReducer {
    /// A reducer with the extractors of the given circuit family.
    pub fn for_kind(kind: CircuitKind) -> Self {
        let mut reducer = Self::default();
        match kind {
            CircuitKind::SingleEndedOpamp => {
                reducer.register("stb", opamp::Stability::default());
                reducer.register("tran", opamp::SlewRate::default());
                reducer.register("noise", opamp::Noise::default());
                reducer.register("dc1", opamp::OutputSwing::default());
                reducer.register("xf", opamp::Rejection::default());
            }
            CircuitKind::SchmittTrigger => {
                reducer.register("tran", schmitt::Hysteresis::default());
            }
            CircuitKind::Nand4 => {
                for i in 0..4 {
                    reducer.register(
                        arcstr::format!("dc{i}"),
                        nand::SwitchingThreshold::new(arcstr::format!("vs{i}")),
                    );
                }
            }
            CircuitKind::Generic => {}
        }
        reducer
    }

    /// Registers the extractor for an analysis, replacing any previous one.
    pub fn register(&mut self, analysis: impl Into<ArcStr>, extractor: impl Extractor + 'static) {
        self.extractors.insert(analysis.into(), Box::new(extractor));
    }

    /// Enables or disables detailed reporting of missing results.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Reduces the plots of one corner.
    ///
    /// Blacklisted analyses are skipped. Missing plots are reported in
    /// [`Reduction::missing`] and absent reference signals in
    /// [`Reduction::unresolved`]; everything else is still reduced.
    pub fn reduce(
        &self,
        corner: &str,
        plots: &Plots,
        performances: &Performances,
        parameters: &IndexMap<ArcStr, f64>,
        blacklist: &HashSet<ArcStr>,
        log: Option<&Path>,
    ) -> Reduction {
        let mut out = Reduction::default();
        for (analysis, metrics) in performances.iter() {
            if blacklist.contains(analysis) {
                continue;
            }
            let Some(plot) = plots.get(analysis) else {
                if self.verbose {
                    tracing::warn!(corner, %analysis, ?log, "no results for analysis");
                }
                out.missing.push(analysis.clone());
                continue;
            };

            let derived = match self.extractors.get(analysis) {
                Some(extractor) => {
                    let ctx = ExtractCtx {
                        corner,
                        analysis,
                        parameters,
                        metrics,
                    };
                    extractor.extract(&ctx, plot)
                }
                None => MetricTable::new(),
            };

            for (id, decl) in metrics {
                if let Some(&value) = derived.get(id) {
                    out.metrics.insert(id.clone(), value);
                } else if let Some(signal) = &decl.reference {
                    match plot.scalar(signal) {
                        Some(value) => {
                            out.metrics.insert(id.clone(), value);
                        }
                        None => {
                            if self.verbose {
                                tracing::warn!(corner, %analysis, metric = %id, %signal, ?log, "referenced signal not found");
                            }
                            out.unresolved.push(id.clone());
                        }
                    }
                } else {
                    tracing::debug!(corner, %analysis, metric = %id, "metric could not be computed");
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props::MetricDecl;

    fn performances() -> Performances {
        Performances::new(IndexMap::from([
            (
                ArcStr::from("dcop"),
                IndexMap::from([
                    (ArcStr::from("A"), MetricDecl::reference("DUT:a")),
                    (ArcStr::from("B"), MetricDecl::reference("DUT:b")),
                ]),
            ),
            (
                ArcStr::from("dcmatch"),
                IndexMap::from([(ArcStr::from("voff"), MetricDecl::reference("offset"))]),
            ),
        ]))
    }

    #[test]
    fn copies_reference_scalars() {
        let plots = Plots::from([(
            ArcStr::from("dcop"),
            Plot::new("dcop").with_signal("DUT:a", vec![42.0]),
        )]);
        let red = ResultReducer::default().reduce(
            "nom",
            &plots,
            &performances(),
            &IndexMap::new(),
            &HashSet::from([ArcStr::from("dcmatch")]),
            None,
        );
        assert_eq!(red.metrics, MetricTable::from([(ArcStr::from("A"), 42.0)]));
        assert!(red.missing.is_empty());
        assert_eq!(red.unresolved, vec![ArcStr::from("B")]);
        assert!(!red.is_complete());
    }

    #[test]
    fn missing_plots_are_reported() {
        let plots = Plots::from([(
            ArcStr::from("dcop"),
            Plot::new("dcop")
                .with_signal("DUT:a", vec![1.0])
                .with_signal("DUT:b", vec![2.0]),
        )]);
        let red = ResultReducer::default().reduce(
            "nom",
            &plots,
            &performances(),
            &IndexMap::new(),
            &HashSet::new(),
            Some(Path::new("/tmp/nom/spectre.log")),
        );
        assert_eq!(red.metrics.len(), 2);
        assert_eq!(red.missing, vec![ArcStr::from("dcmatch")]);
    }

    struct Constant;

    impl Extractor for Constant {
        fn extract(&self, _ctx: &ExtractCtx<'_>, _plot: &Plot) -> MetricTable {
            MetricTable::from([(ArcStr::from("B"), 7.0), (ArcStr::from("undeclared"), 1.0)])
        }
    }

    #[test]
    fn derived_metrics_take_precedence_and_are_filtered() {
        let mut reducer = ResultReducer::default();
        reducer.register("dcop", Constant);
        let plots = Plots::from([(
            ArcStr::from("dcop"),
            Plot::new("dcop").with_signal("DUT:a", vec![1.0]),
        )]);
        let red = reducer.reduce(
            "nom",
            &plots,
            &performances(),
            &IndexMap::new(),
            &HashSet::from([ArcStr::from("dcmatch")]),
            None,
        );
        assert_eq!(
            red.metrics,
            MetricTable::from([(ArcStr::from("A"), 1.0), (ArcStr::from("B"), 7.0)])
        );
    }

    #[test]
    fn circuit_kinds_from_environment_names() {
        assert_eq!(
            CircuitKind::from_environment(Some("SingleEndedOpampEnvironment")),
            CircuitKind::SingleEndedOpamp
        );
        assert_eq!(CircuitKind::from_environment(Some("bogus")), CircuitKind::Generic);
        assert_eq!(CircuitKind::from_environment(None), CircuitKind::Generic);
        assert_eq!(CircuitKind::Nand4.to_string().parse::<CircuitKind>(), Ok(CircuitKind::Nand4));
    }
}
