//! Real-valued waveforms over a monotonically increasing sweep.

use std::iter::FusedIterator;

use serde::{Deserialize, Serialize};

/// A single point `(x, y)` on a waveform.
#[derive(Debug, Default, Copy, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Point {
    x: f64,
    y: f64,
}

impl Point {
    /// Create a new [`Point`].
    #[inline]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// The sweep value (time, frequency, swept source value) of this point.
    #[inline]
    pub fn x(&self) -> f64 {
        self.x
    }

    /// The signal value of this point.
    #[inline]
    pub fn y(&self) -> f64 {
        self.y
    }
}

impl From<(f64, f64)> for Point {
    #[inline]
    fn from(value: (f64, f64)) -> Self {
        Self {
            x: value.0,
            y: value.1,
        }
    }
}

/// A real-valued waveform.
pub trait Waveform {
    /// Get the point at the given index.
    fn get(&self, idx: usize) -> Option<Point>;

    /// Returns the number of points in the waveform.
    fn len(&self) -> usize;

    /// Returns `true` if the waveform is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The first point in the waveform.
    fn first(&self) -> Option<Point> {
        self.get(0)
    }

    /// The last point in the waveform.
    fn last(&self) -> Option<Point> {
        self.get(self.len().checked_sub(1)?)
    }

    /// Returns an iterator over the threshold crossings of the waveform.
    ///
    /// See [`Edges`] for more information.
    fn edges(&self, threshold: f64) -> Edges<'_, Self> {
        Edges {
            waveform: self,
            idx: 0,
            thresh: threshold,
        }
    }

    /// Returns the sweep value at which the waveform crosses `threshold` for the
    /// `occurrence`-th time (1-based) in the given direction.
    ///
    /// A direction of [`None`] counts crossings in either direction.
    fn cross(&self, threshold: f64, dir: Option<EdgeDir>, occurrence: usize) -> Option<f64> {
        let n = occurrence.checked_sub(1)?;
        self.edges(threshold)
            .filter(|edge| dir.is_none_or(|dir| edge.dir() == dir))
            .nth(n)
            .map(|edge| edge.x())
    }

    /// Returns the index of the last point with a sweep value at or before `x`.
    fn index_before(&self, x: f64) -> Option<usize> {
        search_for_x(self, x)
    }

    /// Retrieves the value of the waveform at the given sweep value,
    /// linearly interpolating between adjacent points.
    ///
    /// Returns [`None`] outside of the swept range.
    fn value_at(&self, x: f64) -> Option<f64> {
        if !x.is_finite() {
            return None;
        }
        let idx = self.index_before(x)?;
        let p0 = self.get(idx)?;
        if p0.x == x {
            return Some(p0.y);
        }
        let p1 = self.get(idx + 1)?;
        Some(linear_interp(p0.x, p0.y, p1.x, p1.y, x))
    }

    /// Returns the maximum value seen in this waveform.
    fn max_y(&self) -> Option<f64> {
        self.values().map(|p| p.y).reduce(f64::max)
    }

    /// Returns the minimum value seen in this waveform.
    fn min_y(&self) -> Option<f64> {
        self.values().map(|p| p.y).reduce(f64::min)
    }

    /// Returns an iterator over the points in the waveform.
    fn values(&self) -> Values<'_, Self> {
        Values {
            waveform: self,
            idx: 0,
        }
    }
}

fn linear_interp(x0: f64, y0: f64, x1: f64, y1: f64, x: f64) -> f64 {
    let c = (x - x0) / (x1 - x0);
    y0 + c * (y1 - y0)
}

fn search_for_x<T>(data: &T, target: f64) -> Option<usize>
where
    T: Waveform + ?Sized,
{
    // Number of points with a sweep value at or before `target`.
    let mut lo = 0usize;
    let mut hi = data.len();
    while lo < hi {
        let mid = (lo + hi) / 2;
        if data.get(mid)?.x <= target {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }
    lo.checked_sub(1)
}

/// An iterator over the points in a waveform.
#[derive(Debug, Clone)]
pub struct Values<'a, T: ?Sized> {
    waveform: &'a T,
    idx: usize,
}

impl<T> Iterator for Values<'_, T>
where
    T: Waveform + ?Sized,
{
    type Item = Point;
    fn next(&mut self) -> Option<Self::Item> {
        let val = self.waveform.get(self.idx);
        if val.is_some() {
            self.idx += 1;
        }
        val
    }
}

impl<T> FusedIterator for Values<'_, T> where T: Waveform + ?Sized {}

/// Possible edge directions.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum EdgeDir {
    /// A falling edge.
    Falling,
    /// A rising edge.
    Rising,
}

impl EdgeDir {
    /// Returns `true` if this is a rising edge.
    #[inline]
    pub fn is_rising(&self) -> bool {
        matches!(self, EdgeDir::Rising)
    }

    /// Returns `true` if this is a falling edge.
    #[inline]
    pub fn is_falling(&self) -> bool {
        matches!(self, EdgeDir::Falling)
    }
}

/// A threshold crossing.
#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Edge {
    x: f64,
    start_idx: usize,
    dir: EdgeDir,
}

impl Edge {
    /// The direction (rising or falling) of the edge.
    #[inline]
    pub fn dir(&self) -> EdgeDir {
        self.dir
    }

    /// The sweep value at which the waveform crossed the threshold.
    ///
    /// The waveform is linearly interpolated to find the crossing.
    #[inline]
    pub fn x(&self) -> f64 {
        self.x
    }

    /// The index in the waveform **before** the threshold was passed.
    #[inline]
    pub fn idx_before(&self) -> usize {
        self.start_idx
    }

    /// The index in the waveform **after** the threshold was passed.
    #[inline]
    pub fn idx_after(&self) -> usize {
        self.start_idx + 1
    }
}

/// An iterator over the threshold crossings of a waveform.
#[derive(Debug, Clone)]
pub struct Edges<'a, T: ?Sized> {
    waveform: &'a T,
    idx: usize,
    thresh: f64,
}

pub(crate) fn edge_crossing(x0: f64, y0: f64, x1: f64, y1: f64, thresh: f64) -> f64 {
    let c = (thresh - y0) / (y1 - y0);
    debug_assert!(c >= 0.0);
    debug_assert!(c <= 1.0);
    x0 + c * (x1 - x0)
}

impl<T> Edges<'_, T>
where
    T: Waveform + ?Sized,
{
    fn check(&self) -> Option<Edge> {
        let p0 = self.waveform.get(self.idx)?;
        let p1 = self.waveform.get(self.idx + 1)?;
        let first = p0.y - self.thresh;
        let second = p1.y - self.thresh;
        // A point sitting exactly on the threshold belongs to the segment it ends.
        let crosses = (first < 0.0 && second >= 0.0) || (first > 0.0 && second <= 0.0);
        if crosses {
            let dir = if second >= 0.0 {
                EdgeDir::Rising
            } else {
                EdgeDir::Falling
            };
            Some(Edge {
                dir,
                x: edge_crossing(p0.x, p0.y, p1.x, p1.y, self.thresh),
                start_idx: self.idx,
            })
        } else {
            None
        }
    }
}

impl<T> Iterator for Edges<'_, T>
where
    T: Waveform + ?Sized,
{
    type Item = Edge;
    fn next(&mut self) -> Option<Self::Item> {
        while self.idx + 1 < self.waveform.len() {
            let val = self.check();
            self.idx += 1;
            if val.is_some() {
                return val;
            }
        }
        None
    }
}

impl<T> FusedIterator for Edges<'_, T> where T: Waveform + ?Sized {}

/// A real-valued waveform that owns its data.
#[derive(Debug, Clone, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct RealWaveform {
    values: Vec<Point>,
}

impl Waveform for RealWaveform {
    fn get(&self, idx: usize) -> Option<Point> {
        self.values.get(idx).copied()
    }

    fn len(&self) -> usize {
        self.values.len()
    }
}

impl FromIterator<(f64, f64)> for RealWaveform {
    fn from_iter<T: IntoIterator<Item = (f64, f64)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().map(Point::from).collect(),
        }
    }
}

impl RealWaveform {
    /// Creates a waveform from matching sweep and signal vectors.
    ///
    /// # Panics
    ///
    /// Panics if the two vectors have different lengths.
    pub fn new(x: Vec<f64>, y: Vec<f64>) -> Self {
        assert_eq!(x.len(), y.len());
        x.into_iter().zip(y).collect()
    }

    /// Restricts the waveform to the sweep window `[from, to]`.
    ///
    /// The window is intersected with the swept range; interpolated end points
    /// are inserted at the window bounds.
    pub fn clip(&self, from: f64, to: f64) -> Self {
        let (Some(first), Some(last)) = (self.first(), self.last()) else {
            return Self::default();
        };
        let from = from.max(first.x);
        let to = to.min(last.x);
        if from > to {
            return Self::default();
        }

        let mut values = Vec::new();
        if let Some(y) = self.value_at(from) {
            values.push(Point::new(from, y));
        }
        values.extend(
            self.values
                .iter()
                .copied()
                .filter(|p| p.x > from && p.x < to),
        );
        if to > from {
            if let Some(y) = self.value_at(to) {
                values.push(Point::new(to, y));
            }
        }
        Self { values }
    }

    /// Applies `f` to every value of the waveform.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        self.values.iter().map(|p| (p.x, f(p.y))).collect()
    }

    /// The absolute value of the waveform.
    pub fn abs(&self) -> Self {
        self.map(f64::abs)
    }

    /// Adds a constant to every value of the waveform.
    pub fn add_scalar(&self, c: f64) -> Self {
        self.map(|y| y + c)
    }

    /// Multiplies every value of the waveform by a constant.
    pub fn scale(&self, c: f64) -> Self {
        self.map(|y| y * c)
    }

    /// Combines two waveforms pointwise over the sweep of `self`.
    ///
    /// `other` is interpolated at the sweep values of `self`; points of `self`
    /// outside the range of `other` are dropped.
    pub fn zip_with(&self, other: &impl Waveform, f: impl Fn(f64, f64) -> f64) -> Self {
        self.values
            .iter()
            .filter_map(|p| Some((p.x, f(p.y, other.value_at(p.x)?))))
            .collect()
    }

    /// Pointwise difference `self - other`.
    pub fn sub(&self, other: &impl Waveform) -> Self {
        self.zip_with(other, |a, b| a - b)
    }

    /// Pointwise sum `self + other`.
    pub fn add(&self, other: &impl Waveform) -> Self {
        self.zip_with(other, |a, b| a + b)
    }

    /// The waveform whose value is the sweep variable itself.
    pub fn sweep_identity(&self) -> Self {
        self.values.iter().map(|p| (p.x, p.x)).collect()
    }

    /// The integral over the whole sweep, by the trapezoidal rule.
    pub fn integral(&self) -> f64 {
        self.values
            .windows(2)
            .map(|w| 0.5 * (w[1].x - w[0].x) * (w[0].y + w[1].y))
            .sum()
    }
}

impl std::ops::Index<usize> for RealWaveform {
    type Output = Point;
    fn index(&self, index: usize) -> &Self::Output {
        self.values.index(index)
    }
}
