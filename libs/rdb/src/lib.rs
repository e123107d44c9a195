//! Queryable result databases built from simulator plots.
//!
//! A [`Plot`] holds the named traces produced by one completed analysis.
//! Traces can be viewed as [`RealWaveform`]s or [`ComplexWaveform`]s over the
//! plot's sweep variable, which provide the primitives used to reduce raw
//! simulation output to scalar figures of merit.
#![warn(missing_docs)]

use arcstr::ArcStr;
use indexmap::IndexMap;
use num::complex::Complex64;
use serde::{Deserialize, Serialize};

pub mod complex;
pub mod error;
pub mod nutmeg;
pub mod waveform;

pub use complex::ComplexWaveform;
pub use waveform::{Edge, EdgeDir, RealWaveform, Waveform};

/// Plots produced by one simulation run, keyed by analysis identifier.
pub type Plots = IndexMap<ArcStr, Plot>;

/// The values of a single saved signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Trace {
    /// A real-valued trace.
    Real(Vec<f64>),
    /// A complex-valued trace.
    Complex(Vec<Complex64>),
}

impl Trace {
    /// The number of points in the trace.
    pub fn len(&self) -> usize {
        match self {
            Self::Real(values) => values.len(),
            Self::Complex(values) => values.len(),
        }
    }

    /// Returns `true` if the trace has no points.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The real part of the first point in the trace.
    pub fn first_real(&self) -> Option<f64> {
        match self {
            Self::Real(values) => values.first().copied(),
            Self::Complex(values) => values.first().map(|c| c.re),
        }
    }

    /// Returns `true` if the trace holds complex values.
    pub fn is_complex(&self) -> bool {
        matches!(self, Self::Complex(_))
    }
}

impl From<Vec<f64>> for Trace {
    fn from(value: Vec<f64>) -> Self {
        Self::Real(value)
    }
}

impl From<Vec<Complex64>> for Trace {
    fn from(value: Vec<Complex64>) -> Self {
        Self::Complex(value)
    }
}

/// The output of one completed simulation analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plot {
    name: ArcStr,
    sweep: Option<ArcStr>,
    signals: IndexMap<ArcStr, Trace>,
}

impl Plot {
    /// Creates an empty plot with the given name.
    pub fn new(name: impl Into<ArcStr>) -> Self {
        Self {
            name: name.into(),
            sweep: None,
            signals: IndexMap::new(),
        }
    }

    /// Sets the sweep (independent) variable, inserting its values as a signal.
    pub fn with_sweep(mut self, name: impl Into<ArcStr>, values: Vec<f64>) -> Self {
        let name = name.into();
        self.signals.insert(name.clone(), Trace::Real(values));
        self.sweep = Some(name);
        self
    }

    /// Adds a signal to the plot, returning `self`.
    pub fn with_signal(mut self, name: impl Into<ArcStr>, trace: impl Into<Trace>) -> Self {
        self.insert(name, trace);
        self
    }

    /// Adds or replaces a signal.
    pub fn insert(&mut self, name: impl Into<ArcStr>, trace: impl Into<Trace>) {
        self.signals.insert(name.into(), trace.into());
    }

    /// The name of the plot.
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// The name of the sweep variable, if any.
    pub fn sweep_name(&self) -> Option<&ArcStr> {
        self.sweep.as_ref()
    }

    /// The values of the sweep variable.
    ///
    /// Complex sweeps (as written by some simulators for AC analyses)
    /// are reduced to their real parts.
    pub fn sweep(&self) -> Option<Vec<f64>> {
        match self.signals.get(self.sweep.as_ref()?)? {
            Trace::Real(values) => Some(values.clone()),
            Trace::Complex(values) => Some(values.iter().map(|c| c.re).collect()),
        }
    }

    /// Looks up a signal by name.
    pub fn signal(&self, name: &str) -> Option<&Trace> {
        self.signals.get(name)
    }

    /// Returns `true` if the plot contains the named signal.
    pub fn contains(&self, name: &str) -> bool {
        self.signals.contains_key(name)
    }

    /// Iterates over all signal names in the order they were saved.
    pub fn signal_names(&self) -> impl Iterator<Item = &ArcStr> {
        self.signals.keys()
    }

    /// The scalar value of a signal: the real part of its first point.
    ///
    /// Intended for operating-point style plots that hold a single point.
    pub fn scalar(&self, name: &str) -> Option<f64> {
        self.signal(name)?.first_real()
    }

    /// Views a real signal as a waveform over the sweep variable.
    ///
    /// Returns [`None`] if the signal is missing, complex, the plot has no
    /// sweep, or the lengths disagree.
    pub fn real(&self, name: &str) -> Option<RealWaveform> {
        let Trace::Real(y) = self.signal(name)? else {
            return None;
        };
        let x = self.sweep()?;
        if x.len() != y.len() {
            tracing::warn!(plot = %self.name, signal = name, "sweep and signal lengths differ");
            return None;
        }
        Some(RealWaveform::new(x, y.clone()))
    }

    /// Views a signal as a complex waveform over the sweep variable.
    ///
    /// Real signals are promoted to complex values with zero imaginary part.
    pub fn complex(&self, name: &str) -> Option<ComplexWaveform> {
        let y = match self.signal(name)? {
            Trace::Complex(values) => values.clone(),
            Trace::Real(values) => values.iter().map(|&re| Complex64::new(re, 0.)).collect(),
        };
        let x = self.sweep()?;
        if x.len() != y.len() {
            tracing::warn!(plot = %self.name, signal = name, "sweep and signal lengths differ");
            return None;
        }
        Some(ComplexWaveform::new(x, y))
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn scalar_reads_first_point() {
        let plot = Plot::new("dcop")
            .with_signal("A", vec![42.0])
            .with_signal("Z", vec![Complex64::new(3.0, 4.0)]);
        assert_eq!(plot.scalar("A"), Some(42.0));
        assert_eq!(plot.scalar("Z"), Some(3.0));
        assert_eq!(plot.scalar("missing"), None);
    }

    #[test]
    fn real_waveform_requires_sweep() {
        let plot = Plot::new("dc").with_signal("OUT", vec![0.0, 1.0]);
        assert!(plot.real("OUT").is_none());

        let plot = plot.with_sweep("in", vec![0.0, 2.0]);
        let wav = plot.real("OUT").unwrap();
        assert_relative_eq!(wav.value_at(1.0).unwrap(), 0.5);
    }

    #[test]
    fn complex_view_promotes_real_traces() {
        let plot = Plot::new("xf")
            .with_sweep("freq", vec![1.0, 10.0])
            .with_signal("VID", vec![10.0, 5.0]);
        let wav = plot.complex("VID").unwrap();
        assert_relative_eq!(wav.db20().first().unwrap().y(), 20.0);
    }
}
