//! Circuit design parameters.
//!
//! Sizing parameters are the design variables of an optimizer; every value
//! written to them is clamped into their declared bounds and snapped to their
//! grid. Other parameters (supply voltages, temperatures) are passed through
//! verbatim.

use arcstr::ArcStr;
use indexmap::IndexMap;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Slack, in grid steps, for float error when comparing grid points to bounds.
const GRID_EPS: f64 = 1e-9;

/// A named design variable with bounds and an optional grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    name: ArcStr,
    min: f64,
    max: f64,
    grid: Option<f64>,
    init: f64,
    sizing: bool,
}

/// The result of drawing a random value for a parameter.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Sample {
    /// A random value inside the parameter's bounds.
    Value(f64),
    /// The parameter is not a sizing parameter and cannot be sampled.
    NotApplicable,
}

impl Sample {
    /// The sampled value, if any.
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Value(v) => Some(v),
            Self::NotApplicable => None,
        }
    }
}

/// Parameter attributes as declared in `properties.json`.
///
/// Absent fields take the defaults described on [`Parameter::from_decl`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterDecl {
    /// Lower bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Upper bound.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Grid step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<f64>,
    /// Initial value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<f64>,
    /// Whether the parameter is a design variable.
    #[serde(default)]
    pub sizing: bool,
}

impl Parameter {
    /// Creates a non-sizing parameter with the widest bounds, no grid and an
    /// initial value of zero.
    pub fn new(name: impl Into<ArcStr>) -> Self {
        Self {
            name: name.into(),
            min: f64::MIN,
            max: f64::MAX,
            grid: None,
            init: 0.0,
            sizing: false,
        }
    }

    /// Builds a parameter from its declaration.
    ///
    /// Missing bounds default to the widest representable range, a missing
    /// grid means "continuous", and a missing initial value defaults to zero
    /// (with a warning).
    pub fn from_decl(name: impl Into<ArcStr>, decl: &ParameterDecl) -> Result<Self> {
        let name = name.into();
        let init = decl.init.unwrap_or_else(|| {
            tracing::warn!(parameter = %name, "no initial value given, defaulting to 0");
            0.0
        });
        Self::new(name)
            .with_bounds(decl.min.unwrap_or(f64::MIN), decl.max.unwrap_or(f64::MAX))
            .with_grid(decl.grid)
            .with_init(init)
            .with_sizing(decl.sizing)
            .checked()
    }

    /// Sets the bounds of the parameter.
    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    /// Sets the grid step of the parameter.
    pub fn with_grid(mut self, grid: impl Into<Option<f64>>) -> Self {
        self.grid = grid.into();
        self
    }

    /// Sets the initial value of the parameter.
    pub fn with_init(mut self, init: f64) -> Self {
        self.init = init;
        self
    }

    /// Marks the parameter as a sizing parameter.
    pub fn with_sizing(mut self, sizing: bool) -> Self {
        self.sizing = sizing;
        self
    }

    /// Checks that the attributes of the parameter are consistent.
    pub fn checked(self) -> Result<Self> {
        let name = &self.name;
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(Error::config(arcstr::format!(
                "parameter `{name}` has non-finite bounds"
            )));
        }
        if self.min > self.max {
            return Err(Error::config(arcstr::format!(
                "parameter `{name}` has min {} greater than max {}",
                self.min,
                self.max
            )));
        }
        if let Some(grid) = self.grid {
            if !grid.is_finite() || grid <= 0.0 {
                return Err(Error::config(arcstr::format!(
                    "parameter `{name}` has invalid grid {grid}"
                )));
            }
        }
        if !self.init.is_finite() {
            return Err(Error::config(arcstr::format!(
                "parameter `{name}` has a non-finite initial value"
            )));
        }
        Ok(self)
    }

    /// The name of the parameter.
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// The lower bound.
    pub fn min(&self) -> f64 {
        self.min
    }

    /// The upper bound.
    pub fn max(&self) -> f64 {
        self.max
    }

    /// The grid step, if the parameter is discretized.
    pub fn grid(&self) -> Option<f64> {
        self.grid
    }

    /// The declared initial value.
    pub fn init(&self) -> f64 {
        self.init
    }

    /// Returns `true` if the parameter is a design variable.
    pub fn is_sizing(&self) -> bool {
        self.sizing
    }

    /// Maps a proposed value to a legal one.
    ///
    /// Non-sizing parameters return `value` unchanged. Sizing parameters clamp
    /// into `[min, max]` and then round to the nearest `min + n * grid`; a grid
    /// point beyond `max` is replaced by the largest grid point below it.
    /// Without a declared lower bound the grid points are `n * grid`.
    /// A NaN proposal is replaced by the initial value.
    pub fn validate(&self, value: f64) -> f64 {
        if !self.sizing {
            return value;
        }
        let value = if value.is_nan() { self.init } else { value };
        let mut value = value.clamp(self.min, self.max);
        if let Some(grid) = self.grid {
            let anchor = self.grid_anchor();
            let mut steps = ((value - anchor) / grid).round();
            if anchor + steps * grid > self.max + grid * GRID_EPS {
                steps = ((self.max - anchor) / grid + GRID_EPS).floor();
            } else if anchor + steps * grid < self.min - grid * GRID_EPS {
                steps = ((self.min - anchor) / grid - GRID_EPS).ceil();
            }
            value = (anchor + steps * grid).clamp(self.min, self.max);
        }
        value
    }

    /// The origin of the grid: `min`, or zero if the lower bound is left open.
    fn grid_anchor(&self) -> f64 {
        if self.min == f64::MIN { 0.0 } else { self.min }
    }

    fn max_steps(&self, grid: f64) -> f64 {
        ((self.max - self.min) / grid + GRID_EPS).floor().max(0.0)
    }

    /// Draws a uniformly distributed legal value.
    ///
    /// Gridded parameters draw a uniform step index in
    /// `0..=floor((max - min) / grid)`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Sample {
        if !self.sizing {
            return Sample::NotApplicable;
        }
        if self.max <= self.min {
            return Sample::Value(self.min);
        }
        if let Some(grid) = self.grid {
            let steps = self.max_steps(grid);
            if steps < u64::MAX as f64 {
                let step = rng.gen_range(0..=steps as u64);
                return Sample::Value(self.validate(self.min + step as f64 * grid));
            }
        }
        // Interpolating avoids overflowing `max - min` for the default bounds.
        let u: f64 = rng.r#gen();
        Sample::Value(self.validate(self.min * (1.0 - u) + self.max * u))
    }
}

/// The declared parameters of a circuit and their current values.
///
/// Declaration order is preserved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    params: IndexMap<ArcStr, Parameter>,
    values: IndexMap<ArcStr, f64>,
}

impl ParameterSet {
    /// Creates a parameter set with every value at its validated initial value.
    pub fn new(params: impl IntoIterator<Item = Parameter>) -> Self {
        let mut set = Self::default();
        for param in params {
            set.values
                .insert(param.name.clone(), param.validate(param.init));
            set.params.insert(param.name.clone(), param);
        }
        set
    }

    /// Builds a parameter set from declarations.
    pub fn from_decls<'a>(
        decls: impl IntoIterator<Item = (&'a ArcStr, &'a ParameterDecl)>,
    ) -> Result<Self> {
        let params = decls
            .into_iter()
            .map(|(name, decl)| Parameter::from_decl(name.clone(), decl))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(params))
    }

    /// The number of declared parameters.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns `true` if no parameters are declared.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Looks up a parameter declaration.
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        self.params.get(name)
    }

    /// All parameter declarations in declaration order.
    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.params.values()
    }

    /// The current value of a parameter.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// The current values of all parameters.
    pub fn values(&self) -> &IndexMap<ArcStr, f64> {
        &self.values
    }

    fn param(&self, name: &str) -> Result<&Parameter> {
        self.params
            .get(name)
            .ok_or_else(|| Error::UnknownParameter(name.into()))
    }

    /// Validates a proposed value for the named parameter without storing it.
    pub fn validate(&self, name: &str, value: f64) -> Result<f64> {
        Ok(self.param(name)?.validate(value))
    }

    /// Draws a random legal value for the named parameter.
    pub fn sample<R: Rng + ?Sized>(&self, name: &str, rng: &mut R) -> Result<Sample> {
        Ok(self.param(name)?.sample(rng))
    }

    /// Validates and stores a value, returning the stored value.
    ///
    /// Unknown names leave the set unchanged.
    pub fn set(&mut self, name: &str, value: f64) -> Result<f64> {
        let param = self.param(name)?;
        let value = param.validate(value);
        let key = param.name.clone();
        self.values.insert(key, value);
        Ok(value)
    }

    /// Stores a batch of values.
    ///
    /// Every known entry is applied; unknown names are collected into a single
    /// [`Error::UnknownParameters`].
    pub fn set_all<K: AsRef<str>>(
        &mut self,
        values: impl IntoIterator<Item = (K, f64)>,
    ) -> Result<()> {
        let mut unknown = Vec::new();
        for (name, value) in values {
            let name = name.as_ref();
            if self.set(name, value).is_err() {
                unknown.push(ArcStr::from(name));
            }
        }
        if unknown.is_empty() {
            Ok(())
        } else {
            tracing::warn!(?unknown, "ignored values for undeclared parameters");
            Err(Error::UnknownParameters(unknown))
        }
    }

    /// The sizing parameters in declaration order.
    pub fn sizing_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.params.values().filter(|p| p.sizing)
    }

    /// The validated initial values of all sizing parameters.
    pub fn initial_sizing_values(&self) -> IndexMap<ArcStr, f64> {
        self.sizing_parameters()
            .map(|p| (p.name.clone(), p.validate(p.init)))
            .collect()
    }

    /// Random legal values for all sizing parameters.
    pub fn random_sizing_values<R: Rng + ?Sized>(&self, rng: &mut R) -> IndexMap<ArcStr, f64> {
        self.sizing_parameters()
            .filter_map(|p| Some((p.name.clone(), p.sample(rng).value()?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn width() -> Parameter {
        Parameter::new("M1w")
            .with_bounds(1e-6, 5e-5)
            .with_grid(1e-7)
            .with_init(3e-6)
            .with_sizing(true)
            .checked()
            .unwrap()
    }

    fn on_grid(p: &Parameter, v: f64) -> bool {
        let grid = p.grid().unwrap();
        let n = (v - p.min()) / grid;
        (n - n.round()).abs() < 1e-6
    }

    #[test]
    fn validate_clamps_and_snaps() {
        let p = width();
        assert_relative_eq!(p.validate(7.3e-5), 5e-5, max_relative = 1e-12);
        assert_relative_eq!(p.validate(3.04e-6), 3.0e-6, max_relative = 1e-9);
        assert_relative_eq!(p.validate(-1.0), 1e-6, max_relative = 1e-12);
        assert_relative_eq!(p.validate(f64::NAN), 3e-6, max_relative = 1e-9);
    }

    #[test]
    fn open_lower_bound_snaps_to_multiples_of_grid() {
        let p = Parameter::new("vdd")
            .with_grid(0.1)
            .with_sizing(true)
            .checked()
            .unwrap();
        assert_relative_eq!(p.validate(5.32), 5.3, max_relative = 1e-12);
        assert_relative_eq!(p.validate(-0.26), -0.3, max_relative = 1e-12);
        assert_relative_eq!(p.validate(1e300), 1e300, max_relative = 1e-12);

        let p = p.with_bounds(f64::MIN, 1.0).checked().unwrap();
        assert_relative_eq!(p.validate(7.0), 1.0, max_relative = 1e-12);
    }

    #[test]
    fn validated_values_stay_on_grid() {
        let p = Parameter::new("L")
            .with_bounds(0.0, 1.05)
            .with_grid(0.1)
            .with_sizing(true)
            .checked()
            .unwrap();
        for i in -20..=140 {
            let v = p.validate(i as f64 * 0.01);
            assert!((p.min()..=p.max()).contains(&v), "{v} out of range");
            assert!(on_grid(&p, v), "{v} off grid");
        }
        // 1.1 lies beyond max; the largest grid point below it wins.
        assert_relative_eq!(p.validate(1.05), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn non_sizing_values_pass_through() {
        let p = Parameter::new("vdd").with_bounds(0.0, 1.0).with_init(1.8);
        assert_eq!(p.validate(3.3), 3.3);
        assert_eq!(p.sample(&mut StdRng::seed_from_u64(1)), Sample::NotApplicable);
    }

    #[test]
    fn samples_are_legal() {
        let mut rng = StdRng::seed_from_u64(0xace);
        let p = width();
        for _ in 0..1000 {
            let v = p.sample(&mut rng).value().unwrap();
            assert!((1e-6..=5e-5).contains(&v));
            assert!(on_grid(&p, v));
        }

        let unbounded = Parameter::new("x").with_sizing(true);
        for _ in 0..100 {
            assert!(unbounded.sample(&mut rng).value().unwrap().is_finite());
        }
    }

    #[test]
    fn decl_defaults() {
        let p = Parameter::from_decl("x", &ParameterDecl::default()).unwrap();
        assert_eq!(p.min(), f64::MIN);
        assert_eq!(p.max(), f64::MAX);
        assert_eq!(p.grid(), None);
        assert_eq!(p.init(), 0.0);
        assert!(!p.is_sizing());

        let bad = ParameterDecl {
            min: Some(2.0),
            max: Some(1.0),
            ..Default::default()
        };
        assert!(matches!(
            Parameter::from_decl("y", &bad),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn set_rejects_unknown_names_without_mutation() {
        let mut set = ParameterSet::new([width(), Parameter::new("vdd").with_init(1.8)]);
        let before = set.values().clone();
        assert!(matches!(set.set("M2w", 1e-6), Err(Error::UnknownParameter(_))));
        assert_eq!(set.values(), &before);

        assert_relative_eq!(set.set("M1w", 7.3e-5).unwrap(), 5e-5, max_relative = 1e-12);
        assert_eq!(set.set("vdd", 3.3).unwrap(), 3.3);
    }

    #[test]
    fn set_all_applies_known_entries() {
        let mut set = ParameterSet::new([width(), Parameter::new("vdd").with_init(1.8)]);
        let err = set
            .set_all([("vdd", 1.2), ("bogus", 1.0), ("M1w", 1e-5)])
            .unwrap_err();
        assert!(matches!(err, Error::UnknownParameters(names) if names == vec![ArcStr::from("bogus")]));
        assert_eq!(set.value("vdd"), Some(1.2));
        assert_relative_eq!(set.value("M1w").unwrap(), 1e-5, max_relative = 1e-9);
    }

    #[test]
    fn sizing_accessors_only_cover_sizing_parameters() {
        let set = ParameterSet::new([width(), Parameter::new("vdd").with_init(1.8)]);
        let init = set.initial_sizing_values();
        assert_eq!(init.keys().collect::<Vec<_>>(), vec!["M1w"]);
        let random = set.random_sizing_values(&mut StdRng::seed_from_u64(7));
        assert_eq!(random.len(), 1);
        assert!(matches!(
            set.sample("vdd", &mut StdRng::seed_from_u64(7)),
            Ok(Sample::NotApplicable)
        ));
    }
}
