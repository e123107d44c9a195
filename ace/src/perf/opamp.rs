//! Derived metrics of single-ended operational amplifiers.

use arcstr::ArcStr;
use rdb::{EdgeDir, Plot, RealWaveform, Waveform};

use super::{ExtractCtx, Extractor, MetricTable, insert_finite};

/// Loop stability from an `stb` analysis.
///
/// The loop gain phase is expected to start near 180 degrees and fall
/// towards zero.
///
/// | metric | meaning |
/// |--------|---------|
/// | `a_0`  | DC loop gain in dB |
/// | `ugbw` | unity gain bandwidth in Hz |
/// | `pm`   | phase margin in degrees |
/// | `cof`  | frequency at which the phase crosses zero |
/// | `gm`   | gain margin in dB |
#[derive(Debug, Clone)]
pub struct Stability {
    /// The loop gain signal.
    pub loop_gain: ArcStr,
}

impl Default for Stability {
    fn default() -> Self {
        Self {
            loop_gain: arcstr::literal!("loopGain"),
        }
    }
}

impl Extractor for Stability {
    fn extract(&self, _ctx: &ExtractCtx<'_>, plot: &Plot) -> MetricTable {
        let mut out = MetricTable::new();
        let Some(loop_gain) = plot.complex(&self.loop_gain) else {
            return out;
        };
        let gain = loop_gain.db20();
        let mut phase = loop_gain.phase_deg();
        if phase.first().is_some_and(|p| p.y() < -90.0) {
            phase = phase.add_scalar(360.0);
        }

        let ugbw = gain.cross(0.0, Some(EdgeDir::Falling), 1);
        let cof = phase.cross(0.0, Some(EdgeDir::Falling), 1);
        insert_finite(&mut out, "a_0", gain.first().map(|p| p.y()));
        insert_finite(&mut out, "ugbw", ugbw);
        insert_finite(&mut out, "pm", ugbw.and_then(|f| phase.value_at(f)));
        insert_finite(&mut out, "cof", cof);
        insert_finite(&mut out, "gm", cof.and_then(|f| gain.value_at(f)).map(|g| -g));
        out
    }
}

/// Slew rates and overshoots from a large-signal step `tran` analysis.
///
/// The output is expected to rise during the first half of the simulated
/// interval and fall during the second half. Slew rates are measured between
/// the `low` and `high` fractions of the supply; overshoots are in percent of
/// the step size.
#[derive(Debug, Clone)]
pub struct SlewRate {
    /// The output signal.
    pub output: ArcStr,
    /// The supply voltage parameter.
    pub supply: ArcStr,
    /// Lower threshold as a fraction of the supply.
    pub low: f64,
    /// Upper threshold as a fraction of the supply.
    pub high: f64,
}

impl Default for SlewRate {
    fn default() -> Self {
        Self {
            output: arcstr::literal!("OUT"),
            supply: arcstr::literal!("vdd"),
            low: 0.1,
            high: 0.9,
        }
    }
}

impl SlewRate {
    fn slew(wav: &RealWaveform, from: f64, to: f64, dir: EdgeDir) -> Option<f64> {
        let t0 = wav.cross(from, Some(dir), 1)?;
        let t1 = wav.cross(to, Some(dir), 1)?;
        Some((to - from).abs() / (t1 - t0))
    }

    /// Overshoot past the settled (final) value, in percent of the step.
    fn overshoot(wav: &RealWaveform, dir: EdgeDir) -> Option<f64> {
        let (initial, settled) = (wav.first()?.y(), wav.last()?.y());
        let excess = match dir {
            EdgeDir::Rising => wav.max_y()? - settled,
            EdgeDir::Falling => settled - wav.min_y()?,
        };
        Some(100.0 * excess / (settled - initial).abs())
    }
}

impl Extractor for SlewRate {
    fn extract(&self, ctx: &ExtractCtx<'_>, plot: &Plot) -> MetricTable {
        let mut out = MetricTable::new();
        let Some(wav) = plot.real(&self.output) else {
            return out;
        };
        let (Some(start), Some(stop)) = (wav.first(), wav.last()) else {
            return out;
        };
        let vdd = ctx.parameters.get(&self.supply).copied().unwrap_or_else(|| {
            let vdd = wav.max_y().unwrap_or_default();
            tracing::debug!(supply = %self.supply, vdd, "supply not a parameter, using output maximum");
            vdd
        });
        let (lo, hi) = (self.low * vdd, self.high * vdd);
        let mid = (start.x() + stop.x()) / 2.0;
        let rise = wav.clip(start.x(), mid);
        let fall = wav.clip(mid, stop.x());

        insert_finite(&mut out, "sr_r", Self::slew(&rise, lo, hi, EdgeDir::Rising));
        insert_finite(&mut out, "sr_f", Self::slew(&fall, hi, lo, EdgeDir::Falling));

        insert_finite(&mut out, "overshoot_r", Self::overshoot(&rise, EdgeDir::Rising));
        insert_finite(&mut out, "overshoot_f", Self::overshoot(&fall, EdgeDir::Falling));
        out
    }
}

/// Output-referred noise density at fixed frequencies from a `noise` analysis.
#[derive(Debug, Clone)]
pub struct Noise {
    /// The output noise signal.
    pub output: ArcStr,
    /// Metric identifiers and the frequencies at which they are sampled.
    pub points: Vec<(ArcStr, f64)>,
}

impl Default for Noise {
    fn default() -> Self {
        Self {
            output: arcstr::literal!("out"),
            points: vec![
                (arcstr::literal!("vn_1Hz"), 1.0),
                (arcstr::literal!("vn_10Hz"), 10.0),
                (arcstr::literal!("vn_100Hz"), 100.0),
                (arcstr::literal!("vn_1kHz"), 1e3),
                (arcstr::literal!("vn_10kHz"), 1e4),
                (arcstr::literal!("vn_100kHz"), 1e5),
            ],
        }
    }
}

impl Extractor for Noise {
    fn extract(&self, _ctx: &ExtractCtx<'_>, plot: &Plot) -> MetricTable {
        let mut out = MetricTable::new();
        let Some(density) = plot
            .real(&self.output)
            .or_else(|| Some(plot.complex(&self.output)?.magnitude()))
        else {
            return out;
        };
        for (id, freq) in &self.points {
            insert_finite(&mut out, id, density.value_at(*freq));
        }
        out
    }
}

/// Input and output swing of a unity-gain follower from a DC sweep (`dc1`).
///
/// The usable range is where the output deviates from the swept input by at
/// most `tolerance` volts.
///
/// | metric | meaning |
/// |--------|---------|
/// | `v_il` | lowest usable input |
/// | `v_ih` | highest usable input |
/// | `v_ol` | output at `v_il` |
/// | `v_oh` | output at `v_ih` |
#[derive(Debug, Clone)]
pub struct OutputSwing {
    /// The output signal.
    pub output: ArcStr,
    /// Maximum deviation from the ideal transfer, in volts.
    pub tolerance: f64,
}

impl Default for OutputSwing {
    fn default() -> Self {
        Self {
            output: arcstr::literal!("OUT"),
            tolerance: 0.05,
        }
    }
}

impl Extractor for OutputSwing {
    fn extract(&self, _ctx: &ExtractCtx<'_>, plot: &Plot) -> MetricTable {
        let mut out = MetricTable::new();
        let Some(wav) = plot.real(&self.output) else {
            return out;
        };
        let deviation = wav.sub(&wav.sweep_identity()).abs();
        let (Some(first), Some(last)) = (deviation.first(), deviation.last()) else {
            return out;
        };

        let low = if first.y() <= self.tolerance {
            Some(first.x())
        } else {
            deviation.cross(self.tolerance, Some(EdgeDir::Falling), 1)
        };
        let high = low.and_then(|low| {
            deviation
                .clip(low, last.x())
                .cross(self.tolerance, Some(EdgeDir::Rising), 1)
                .or_else(|| (last.y() <= self.tolerance).then_some(last.x()))
        });

        insert_finite(&mut out, "v_il", low);
        insert_finite(&mut out, "v_ih", high);
        insert_finite(&mut out, "v_ol", low.and_then(|x| wav.value_at(x)));
        insert_finite(&mut out, "v_oh", high.and_then(|x| wav.value_at(x)));
        out
    }
}

/// Common-mode and supply rejection from an `xf` analysis.
///
/// Rejection ratios are the transfer gain of the differential input over that
/// of the disturbance, in dB, at the lowest analyzed frequency.
#[derive(Debug, Clone)]
pub struct Rejection {
    /// Transfer from the differential input source.
    pub differential: ArcStr,
    /// Transfer from the common-mode source.
    pub common_mode: ArcStr,
    /// Transfer from the positive supply.
    pub positive_supply: ArcStr,
    /// Transfer from the negative supply.
    pub negative_supply: ArcStr,
}

impl Default for Rejection {
    fn default() -> Self {
        Self {
            differential: arcstr::literal!("VID"),
            common_mode: arcstr::literal!("VICM"),
            positive_supply: arcstr::literal!("VSUPP"),
            negative_supply: arcstr::literal!("VSUPN"),
        }
    }
}

impl Rejection {
    fn gain_db(plot: &Plot, signal: &str) -> Option<f64> {
        let (_, value) = plot.complex(signal)?.first()?;
        Some(20.0 * value.norm().log10())
    }
}

impl Extractor for Rejection {
    fn extract(&self, _ctx: &ExtractCtx<'_>, plot: &Plot) -> MetricTable {
        let mut out = MetricTable::new();
        let Some(diff) = Self::gain_db(plot, &self.differential) else {
            return out;
        };
        for (id, signal) in [
            ("cmrr", &self.common_mode),
            ("psrr_p", &self.positive_supply),
            ("psrr_n", &self.negative_supply),
        ] {
            insert_finite(&mut out, id, Self::gain_db(plot, signal).map(|g| diff - g));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use indexmap::IndexMap;
    use num::complex::Complex64;

    use super::*;
    use crate::props::AnalysisDecl;

    fn ctx<'a>(parameters: &'a IndexMap<ArcStr, f64>, metrics: &'a AnalysisDecl) -> ExtractCtx<'a> {
        ExtractCtx {
            corner: "nom",
            analysis: "test",
            parameters,
            metrics,
        }
    }

    fn log_sweep(start: f64, stop: f64, per_decade: usize) -> Vec<f64> {
        let decades = (stop / start).log10();
        let n = (decades * per_decade as f64).round() as usize;
        (0..=n)
            .map(|i| start * 10f64.powf(i as f64 / per_decade as f64))
            .collect()
    }

    #[test]
    fn stability_of_three_pole_loop() {
        // T(f) = -1000 / ((1 + jf/10) (1 + jf/1e6)^2)
        let freq = log_sweep(1.0, 1e9, 200);
        let lg = freq
            .iter()
            .map(|&f| {
                let p1 = Complex64::new(1.0, f / 10.0);
                let p2 = Complex64::new(1.0, f / 1e6);
                Complex64::new(-1000.0, 0.0) / (p1 * p2 * p2)
            })
            .collect::<Vec<_>>();
        let plot = Plot::new("stb")
            .with_sweep("freq", freq)
            .with_signal("loopGain", lg);

        let (params, metrics) = (IndexMap::new(), AnalysisDecl::new());
        let m = Stability::default().extract(&ctx(&params, &metrics), &plot);
        assert_relative_eq!(m["a_0"], 59.96, epsilon = 0.05);
        assert_relative_eq!(m["ugbw"], 1e4, max_relative = 0.02);
        assert_relative_eq!(m["pm"], 88.9, epsilon = 0.5);
        assert_relative_eq!(m["cof"], 1e6, max_relative = 0.05);
        assert_relative_eq!(m["gm"], 46.0, epsilon = 1.0);
    }

    fn step_response() -> Plot {
        let points = [
            (0.0, 0.0),
            (1e-6, 0.0),
            (2e-6, 1.8),
            (2.5e-6, 1.9),
            (3e-6, 1.8),
            (6e-6, 1.8),
            (7e-6, 0.0),
            (7.5e-6, -0.1),
            (8e-6, 0.0),
            (10e-6, 0.0),
        ];
        Plot::new("tran")
            .with_sweep("time", points.iter().map(|p| p.0).collect())
            .with_signal("OUT", points.iter().map(|p| p.1).collect::<Vec<_>>())
    }

    #[test]
    fn slew_rates_and_overshoots() {
        let params = IndexMap::from([(ArcStr::from("vdd"), 1.8)]);
        let metrics = AnalysisDecl::new();
        let m = SlewRate::default().extract(&ctx(&params, &metrics), &step_response());
        assert_relative_eq!(m["sr_r"], 1.8e6, max_relative = 1e-9);
        assert_relative_eq!(m["sr_f"], 1.8e6, max_relative = 1e-9);
        assert_relative_eq!(m["overshoot_r"], 100.0 / 18.0, max_relative = 1e-9);
        assert_relative_eq!(m["overshoot_f"], 100.0 / 18.0, max_relative = 1e-9);
    }

    #[test]
    fn zero_duration_edges_are_dropped() {
        let points = [(0.0, 0.0), (1e-6, 0.0), (1e-6, 1.8), (5e-6, 1.8), (10e-6, 1.8)];
        let plot = Plot::new("tran")
            .with_sweep("time", points.iter().map(|p| p.0).collect())
            .with_signal("OUT", points.iter().map(|p| p.1).collect::<Vec<_>>());
        let params = IndexMap::from([(ArcStr::from("vdd"), 1.8)]);
        let metrics = AnalysisDecl::new();
        let m = SlewRate::default().extract(&ctx(&params, &metrics), &plot);
        assert!(!m.contains_key("sr_r"));
        assert!(!m.contains_key("sr_f"));
    }

    #[test]
    fn noise_density_at_fixed_frequencies() {
        let freq = log_sweep(1.0, 1e6, 1);
        let density = freq.iter().map(|f| 1e-6 / f.sqrt()).collect::<Vec<_>>();
        let plot = Plot::new("noise")
            .with_sweep("freq", freq)
            .with_signal("out", density);
        let (params, metrics) = (IndexMap::new(), AnalysisDecl::new());
        let m = Noise::default().extract(&ctx(&params, &metrics), &plot);
        assert_eq!(m.len(), 6);
        assert_relative_eq!(m["vn_1Hz"], 1e-6, max_relative = 1e-9);
        assert_relative_eq!(m["vn_10kHz"], 1e-8, max_relative = 1e-6);
    }

    #[test]
    fn follower_swing() {
        let input = (0..=180).map(|i| i as f64 * 0.01).collect::<Vec<_>>();
        let output = input.iter().map(|v| v.clamp(0.2, 1.6)).collect::<Vec<_>>();
        let plot = Plot::new("dc1")
            .with_sweep("INP", input)
            .with_signal("OUT", output);
        let (params, metrics) = (IndexMap::new(), AnalysisDecl::new());
        let m = OutputSwing::default().extract(&ctx(&params, &metrics), &plot);
        assert_relative_eq!(m["v_il"], 0.15, epsilon = 1e-9);
        assert_relative_eq!(m["v_ol"], 0.2, epsilon = 1e-9);
        assert_relative_eq!(m["v_ih"], 1.65, epsilon = 1e-9);
        assert_relative_eq!(m["v_oh"], 1.6, epsilon = 1e-9);
    }

    #[test]
    fn rejection_ratios() {
        let freq = vec![1.0, 10.0];
        let plot = Plot::new("xf")
            .with_sweep("freq", freq)
            .with_signal("VID", vec![1000.0, 900.0])
            .with_signal("VICM", vec![1.0, 1.0])
            .with_signal("VSUPP", vec![10.0, 10.0])
            .with_signal("VSUPN", vec![0.1, 0.1]);
        let (params, metrics) = (IndexMap::new(), AnalysisDecl::new());
        let m = Rejection::default().extract(&ctx(&params, &metrics), &plot);
        assert_relative_eq!(m["cmrr"], 60.0, epsilon = 1e-9);
        assert_relative_eq!(m["psrr_p"], 40.0, epsilon = 1e-9);
        assert_relative_eq!(m["psrr_n"], 80.0, epsilon = 1e-9);
    }
}
