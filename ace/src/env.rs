//! Characterization environments.

use std::collections::HashSet;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arcstr::ArcStr;
use indexmap::IndexMap;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rdb::Plots;

use crate::config::EnvironmentOptions;
use crate::corner::CornerRegistry;
use crate::error::{Error, Result};
use crate::param::{Parameter, ParameterSet, Sample};
use crate::perf::{CircuitKind, MetricTable, PerformanceTable, ResultReducer};
use crate::props::{CircuitProperties, Performances};
use crate::session::{RunReport, Session, SessionFactory, SessionOrchestrator};

/// A parametrized circuit with its corners, simulator sessions and latest
/// performance results.
pub struct Environment {
    name: ArcStr,
    circuit_dir: PathBuf,
    kind: CircuitKind,
    performances: Performances,
    pub(crate) parameters: ParameterSet,
    corners: CornerRegistry,
    scale: f64,
    orchestrator: SessionOrchestrator,
    reducer: ResultReducer,
    table: PerformanceTable,
    corrupted: bool,
    verbose: bool,
    rng: StdRng,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("name", &self.name)
            .field("circuit_dir", &self.circuit_dir)
            .field("kind", &self.kind)
            .field("corners", &self.corners)
            .field("orchestrator", &self.orchestrator)
            .field("corrupted", &self.corrupted)
            .finish_non_exhaustive()
    }
}

impl Environment {
    /// Opens the circuit in `circuit_dir`.
    ///
    /// The directory must contain `properties.json` and every corner netlist.
    /// Sessions are created lazily on the first run of each corner.
    pub fn open(
        circuit_dir: impl AsRef<Path>,
        include_dirs: &[PathBuf],
        factory: Arc<dyn SessionFactory>,
        options: EnvironmentOptions,
    ) -> Result<Self> {
        let circuit_dir = circuit_dir.as_ref();
        if !circuit_dir.is_dir() {
            return Err(Error::missing_path("circuit directory", circuit_dir));
        }
        let props = CircuitProperties::read(circuit_dir)?;
        Self::from_properties(circuit_dir, props, include_dirs, factory, options)
    }

    /// Creates an environment from already parsed circuit properties.
    pub fn from_properties(
        circuit_dir: impl AsRef<Path>,
        props: CircuitProperties,
        include_dirs: &[PathBuf],
        factory: Arc<dyn SessionFactory>,
        options: EnvironmentOptions,
    ) -> Result<Self> {
        let circuit_dir = circuit_dir.as_ref().to_path_buf();
        for dir in include_dirs {
            if !dir.is_dir() {
                return Err(Error::missing_path("include directory", dir));
            }
        }

        let parameters = ParameterSet::from_decls(&props.parameters)?;
        let corners = CornerRegistry::from_decls(&circuit_dir, &props.corners);
        corners.check_netlists()?;

        let mut include_dirs = include_dirs.to_vec();
        if corners.is_declared() {
            include_dirs.push(circuit_dir.clone());
        }

        let kind = CircuitKind::from_environment(props.environment.as_deref());
        let mut reducer = ResultReducer::for_kind(kind);
        reducer.set_verbose(options.verbose);

        let mut orchestrator = SessionOrchestrator::new(factory, options.name.clone(), include_dirs);
        orchestrator.set_restart_period(options.restart_period);

        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        tracing::debug!(
            name = %options.name,
            ?circuit_dir,
            %kind,
            parameters = parameters.len(),
            corners = corners.len(),
            "opened environment"
        );

        Ok(Self {
            name: options.name,
            circuit_dir,
            kind,
            performances: props.performances,
            parameters,
            corners,
            scale: props.scale,
            orchestrator,
            reducer,
            table: PerformanceTable::new(),
            corrupted: false,
            verbose: options.verbose,
            rng,
        })
    }

    /// The environment name.
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// The circuit directory.
    pub fn circuit_dir(&self) -> &Path {
        &self.circuit_dir
    }

    /// The circuit family, which determines the derived metrics.
    pub fn kind(&self) -> CircuitKind {
        self.kind
    }

    /// The scaling factor between design and simulator units.
    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Enables or disables detailed reporting of missing results.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
        self.reducer.set_verbose(verbose);
    }

    /// Returns `true` if missing results are reported in detail.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// The restart period of the simulator sessions.
    pub fn restart_period(&self) -> Option<NonZeroUsize> {
        self.orchestrator.restart_period()
    }

    /// Restarts the simulator sessions after every `period` runs.
    ///
    /// A period of zero disables restarts.
    pub fn set_restart_period(&mut self, period: usize) {
        self.orchestrator.set_restart_period(NonZeroUsize::new(period));
    }

    /// The declared parameters.
    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    /// Looks up a parameter declaration.
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.get(name)
    }

    /// The current values of all parameters.
    pub fn parameter_values(&self) -> &IndexMap<ArcStr, f64> {
        self.parameters.values()
    }

    /// Validates and stores a parameter value, returning the stored value.
    pub fn set_parameter(&mut self, name: &str, value: f64) -> Result<f64> {
        self.parameters.set(name, value)
    }

    /// Validates and stores a batch of parameter values.
    ///
    /// See [`ParameterSet::set_all`].
    pub fn set_parameters<K: AsRef<str>>(
        &mut self,
        values: impl IntoIterator<Item = (K, f64)>,
    ) -> Result<()> {
        self.parameters.set_all(values)
    }

    /// Validates a value for a parameter without storing it.
    pub fn validate(&self, name: &str, value: f64) -> Result<f64> {
        self.parameters.validate(name, value)
    }

    /// Draws a random legal value for a parameter.
    pub fn sample(&mut self, name: &str) -> Result<Sample> {
        self.parameters.sample(name, &mut self.rng)
    }

    /// The validated initial values of the sizing parameters.
    pub fn initial_sizing_values(&self) -> IndexMap<ArcStr, f64> {
        self.parameters.initial_sizing_values()
    }

    /// Random legal values for the sizing parameters.
    pub fn random_sizing_values(&mut self) -> IndexMap<ArcStr, f64> {
        self.parameters.random_sizing_values(&mut self.rng)
    }

    /// The corners of the circuit.
    pub fn corners(&self) -> &CornerRegistry {
        &self.corners
    }

    /// The name of the nominal corner.
    pub fn nominal_corner(&self) -> &ArcStr {
        self.corners.nominal().name()
    }

    /// The declared analysis identifiers.
    pub fn analyses(&self) -> impl Iterator<Item = &ArcStr> {
        self.performances.analyses()
    }

    /// The declared performance metrics.
    pub fn performances(&self) -> &Performances {
        &self.performances
    }

    /// The metric identifiers produced when the given analyses are skipped.
    pub fn performance_identifiers(&self, blacklist: &[&str]) -> Vec<ArcStr> {
        self.performances.metric_ids(&to_set(blacklist))
    }

    /// The session of a corner, if one is allocated.
    pub fn session(&self, corner: &str) -> Option<&Session> {
        self.orchestrator.session(corner)
    }

    /// Simulates the nominal corner with every analysis.
    pub fn simulate(&mut self) -> Result<RunReport> {
        self.simulate_with(&[], &[])
    }

    /// Simulates the given corners, skipping the blacklisted analyses.
    ///
    /// An empty corner list simulates the nominal corner. The performance
    /// table is replaced by the results of this run. Failing sessions are
    /// reported per corner in the returned [`RunReport`]; the environment is
    /// marked corrupted if any expected result is missing.
    pub fn simulate_with(&mut self, blacklist: &[&str], corners: &[&str]) -> Result<RunReport> {
        let corners = self.corners.resolve(corners)?;
        let blacklist = to_set(blacklist);
        for analysis in &blacklist {
            if self.performances.analysis(analysis).is_none() {
                tracing::debug!(%analysis, "blacklisted analysis is not declared");
            }
        }

        self.corrupted = false;
        if let Err(err) = self.orchestrator.allocate(&self.corners, &corners) {
            self.table.clear();
            self.corrupted = true;
            return Err(err);
        }

        let values = self.parameters.values().clone();
        let report = self.orchestrator.run(&corners, &values, &blacklist);

        let empty = Plots::new();
        let mut table = PerformanceTable::new();
        for corner in &corners {
            let session = self.orchestrator.session(corner);
            let plots = session.map_or(&empty, Session::plots);
            let log = session.and_then(Session::log_path);
            let reduction = self.reducer.reduce(
                corner,
                plots,
                &self.performances,
                &values,
                &blacklist,
                log.as_deref(),
            );
            if !reduction.is_complete() {
                self.corrupted = true;
            }
            table.insert(corner.clone(), reduction.metrics);
        }
        self.table = table;
        self.orchestrator.finish_run(&report);
        Ok(report)
    }

    /// The metrics of the nominal corner from the last run.
    pub fn performance_values(&self) -> Option<&MetricTable> {
        self.table.get(self.nominal_corner())
    }

    /// The metrics of a corner from the last run.
    pub fn performance_values_of(&self, corner: &str) -> Option<&MetricTable> {
        self.table.get(corner)
    }

    /// The metrics of every corner simulated in the last run.
    pub fn all_performance_values(&self) -> &PerformanceTable {
        &self.table
    }

    /// Returns `true` if the last run was missing expected results.
    pub fn is_corrupted(&self) -> bool {
        self.corrupted
    }

    /// Stops all simulator sessions. They are restarted by the next run.
    pub fn stop(&mut self) {
        self.orchestrator.stop();
    }

    /// Stops all simulator sessions and deletes their working directories.
    pub fn clear(&mut self) {
        self.orchestrator.clear();
    }
}

fn to_set(names: &[&str]) -> HashSet<ArcStr> {
    names.iter().map(|&name| ArcStr::from(name)).collect()
}

fn write_table(f: &mut fmt::Formatter<'_>, rows: &[Vec<String>]) -> fmt::Result {
    let cols = rows.iter().map(Vec::len).max().unwrap_or_default();
    let widths = (0..cols)
        .map(|c| {
            rows.iter()
                .filter_map(|row| row.get(c))
                .map(String::len)
                .max()
                .unwrap_or_default()
        })
        .collect::<Vec<_>>();
    for row in rows {
        let line = row
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ");
        writeln!(f, "  {}", line.trim_end())?;
    }
    Ok(())
}

fn fmt_bound(v: f64) -> String {
    if v == f64::MIN || v == f64::MAX {
        "-".to_string()
    } else {
        format!("{v:e}")
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} `{}` in {}",
            self.kind,
            self.name,
            self.circuit_dir.display()
        )?;

        writeln!(f, "parameters:")?;
        let mut rows = vec![
            ["name", "value", "min", "max", "grid", "sizing"]
                .map(String::from)
                .to_vec(),
        ];
        for param in self.parameters.parameters() {
            let value = self.parameters.value(param.name()).unwrap_or(f64::NAN);
            rows.push(vec![
                param.name().to_string(),
                format!("{value:e}"),
                fmt_bound(param.min()),
                fmt_bound(param.max()),
                param.grid().map_or_else(|| "-".to_string(), |g| format!("{g:e}")),
                param.is_sizing().to_string(),
            ]);
        }
        write_table(f, &rows)?;

        writeln!(f, "corners:")?;
        for corner in self.corners.corners() {
            let marker = if corner.name() == self.nominal_corner() {
                " (nominal)"
            } else {
                ""
            };
            writeln!(f, "  {}{marker}: {}", corner.name(), corner.netlist().display())?;
        }

        writeln!(f, "performances:")?;
        let corners = self.table.keys().collect::<Vec<_>>();
        let mut rows = vec![
            std::iter::once("metric".to_string())
                .chain(corners.iter().map(|c| c.to_string()))
                .collect::<Vec<_>>(),
        ];
        for (analysis, metrics) in self.performances.iter() {
            for id in metrics.keys() {
                let mut row = vec![format!("{analysis}.{id}")];
                for corner in &corners {
                    row.push(
                        self.table[*corner]
                            .get(id)
                            .map_or_else(|| "-".to_string(), |v| format!("{v:e}")),
                    );
                }
                rows.push(row);
            }
        }
        write_table(f, &rows)?;
        if self.corrupted {
            writeln!(f, "  (results of the last run are incomplete)")?;
        }
        Ok(())
    }
}
