//! Derived metrics of Schmitt triggers.

use arcstr::ArcStr;
use rdb::{Plot, Waveform};

use super::{DEFAULT_VDD, ExtractCtx, Extractor, MetricTable, insert_finite};

/// Switching levels and propagation delays from a `tran` analysis.
///
/// The testbench stimulus is divided into windows of length `period`: a slow
/// rising input ramp in `[0, T]`, a slow falling ramp in `[T, 2T]`, a fast
/// input edge producing a high-to-low output transition in `[3T, 4T]` and one
/// producing a low-to-high output transition in `[4T + delay, 5T + delay]`.
/// All crossings are taken at half the supply.
#[derive(Debug, Clone)]
pub struct Hysteresis {
    /// The input signal.
    pub input: ArcStr,
    /// The output signal.
    pub output: ArcStr,
    /// The supply voltage parameter.
    pub supply: ArcStr,
    /// Length of one stimulus window.
    pub period: f64,
    /// Offset of the last stimulus window.
    pub delay: f64,
}

impl Default for Hysteresis {
    fn default() -> Self {
        Self {
            input: arcstr::literal!("I"),
            output: arcstr::literal!("O"),
            supply: arcstr::literal!("vdd"),
            period: 1.0,
            delay: 100e-12,
        }
    }
}

impl Extractor for Hysteresis {
    fn extract(&self, ctx: &ExtractCtx<'_>, plot: &Plot) -> MetricTable {
        let mut out = MetricTable::new();
        let (Some(i), Some(o)) = (plot.real(&self.input), plot.real(&self.output)) else {
            return out;
        };
        let half = ctx.parameter_or(&self.supply, DEFAULT_VDD) / 2.0;
        let t = self.period;

        let level = |from: f64, to: f64| i.value_at(o.clip(from, to).cross(half, None, 1)?);
        let delay = |from: f64, to: f64| {
            Some(o.clip(from, to).cross(half, None, 1)? - i.clip(from, to).cross(half, None, 1)?)
        };

        insert_finite(&mut out, "v_ih", level(0.0, t));
        insert_finite(&mut out, "v_il", level(t, 2.0 * t));
        insert_finite(&mut out, "t_phl", delay(3.0 * t, 4.0 * t));
        insert_finite(
            &mut out,
            "t_plh",
            delay(4.0 * t + self.delay, 5.0 * t + self.delay),
        );
        out
    }
}
