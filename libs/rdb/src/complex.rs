//! Complex-valued waveforms from small-signal analyses.

use num::complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::waveform::RealWaveform;

/// A complex-valued waveform over a real sweep, typically frequency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplexWaveform {
    x: Vec<f64>,
    y: Vec<Complex64>,
}

impl ComplexWaveform {
    /// Creates a waveform from matching sweep and value vectors.
    ///
    /// # Panics
    ///
    /// Panics if the two vectors have different lengths.
    pub fn new(x: Vec<f64>, y: Vec<Complex64>) -> Self {
        assert_eq!(x.len(), y.len());
        Self { x, y }
    }

    /// The number of points in the waveform.
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns `true` if the waveform has no points.
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// The sweep values.
    pub fn sweep(&self) -> &[f64] {
        &self.x
    }

    /// The first `(x, value)` pair of the waveform.
    pub fn first(&self) -> Option<(f64, Complex64)> {
        Some((*self.x.first()?, *self.y.first()?))
    }

    fn to_real(&self, f: impl Fn(&Complex64) -> f64) -> RealWaveform {
        self.x
            .iter()
            .copied()
            .zip(self.y.iter().map(f))
            .collect()
    }

    /// The real part of the waveform.
    pub fn real(&self) -> RealWaveform {
        self.to_real(|c| c.re)
    }

    /// The magnitude of the waveform.
    pub fn magnitude(&self) -> RealWaveform {
        self.to_real(|c| c.norm())
    }

    /// The magnitude of the waveform in decibels (`20·log10|y|`).
    pub fn db20(&self) -> RealWaveform {
        self.to_real(|c| 20.0 * c.norm().log10())
    }

    /// The phase of the waveform in degrees.
    ///
    /// The phase is unwrapped so that consecutive points never differ by more
    /// than 180 degrees; the first point lies in `(-180, 180]`.
    pub fn phase_deg(&self) -> RealWaveform {
        let mut offset = 0.0;
        let mut prev: Option<f64> = None;
        let mut values = Vec::with_capacity(self.len());
        for (x, y) in self.x.iter().zip(self.y.iter()) {
            let raw = y.arg().to_degrees();
            if let Some(prev) = prev {
                let mut phase = raw + offset;
                while phase - prev > 180.0 {
                    offset -= 360.0;
                    phase -= 360.0;
                }
                while phase - prev < -180.0 {
                    offset += 360.0;
                    phase += 360.0;
                }
            }
            let phase = raw + offset;
            values.push((*x, phase));
            prev = Some(phase);
        }
        values.into_iter().collect()
    }

    /// The value of the waveform at the given sweep value, linearly
    /// interpolating real and imaginary parts.
    pub fn value_at(&self, x: f64) -> Option<Complex64> {
        if !x.is_finite() {
            return None;
        }
        let idx = self.x.partition_point(|&v| v <= x).checked_sub(1)?;
        if self.x[idx] == x {
            return Some(self.y[idx]);
        }
        let (x0, x1) = (self.x[idx], *self.x.get(idx + 1)?);
        let (y0, y1) = (self.y[idx], self.y[idx + 1]);
        let c = (x - x0) / (x1 - x0);
        Some(y0 + (y1 - y0) * c)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::waveform::Waveform;

    #[test]
    fn phase_is_unwrapped() {
        let wav = ComplexWaveform::new(
            vec![1.0, 2.0, 3.0],
            vec![
                Complex64::from_polar(1.0, 170f64.to_radians()),
                Complex64::from_polar(1.0, -170f64.to_radians()),
                Complex64::from_polar(1.0, -100f64.to_radians()),
            ],
        );
        let phase = wav.phase_deg();
        assert_relative_eq!(phase[0].y(), 170.0, epsilon = 1e-9);
        assert_relative_eq!(phase[1].y(), 190.0, epsilon = 1e-9);
        assert_relative_eq!(phase[2].y(), 260.0, epsilon = 1e-9);
    }

    #[test]
    fn db_and_interpolation() {
        let wav = ComplexWaveform::new(
            vec![1.0, 3.0],
            vec![Complex64::new(100.0, 0.0), Complex64::new(0.0, 2.0)],
        );
        let db = wav.db20();
        assert_relative_eq!(db.first().unwrap().y(), 40.0);
        let mid = wav.value_at(2.0).unwrap();
        assert_relative_eq!(mid.re, 50.0);
        assert_relative_eq!(mid.im, 1.0);
        assert!(wav.value_at(0.5).is_none());
    }
}
