//! Derived metrics of NAND gates.

use arcstr::ArcStr;
use rdb::{Plot, Waveform};

use super::{DEFAULT_VDD, ExtractCtx, Extractor, MetricTable, insert_finite};

/// The switching threshold of one input from a DC sweep of that input.
///
/// The threshold is the swept input value at which the output first crosses
/// half the supply.
#[derive(Debug, Clone)]
pub struct SwitchingThreshold {
    /// The metric identifier.
    pub metric: ArcStr,
    /// The output signal.
    pub output: ArcStr,
    /// The supply voltage parameter.
    pub supply: ArcStr,
}

impl SwitchingThreshold {
    /// Measures the output `O` against the `vdd` parameter.
    pub fn new(metric: impl Into<ArcStr>) -> Self {
        Self {
            metric: metric.into(),
            output: arcstr::literal!("O"),
            supply: arcstr::literal!("vdd"),
        }
    }
}

impl Extractor for SwitchingThreshold {
    fn extract(&self, ctx: &ExtractCtx<'_>, plot: &Plot) -> MetricTable {
        let mut out = MetricTable::new();
        if let Some(o) = plot.real(&self.output) {
            let half = ctx.parameter_or(&self.supply, DEFAULT_VDD) / 2.0;
            insert_finite(&mut out, &self.metric, o.cross(half, None, 1));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use indexmap::IndexMap;

    use super::*;
    use crate::props::AnalysisDecl;

    #[test]
    fn threshold_at_half_supply() {
        let input = (0..=33).map(|i| i as f64 * 0.1).collect::<Vec<_>>();
        let output = input
            .iter()
            .map(|&v| if v < 1.4 { 3.3 } else if v > 1.6 { 0.0 } else { 3.3 * (1.6 - v) / 0.2 })
            .collect::<Vec<_>>();
        let plot = Plot::new("dc2")
            .with_sweep("A", input)
            .with_signal("O", output);
        let (params, metrics) = (IndexMap::new(), AnalysisDecl::new());
        let ctx = ExtractCtx {
            corner: "nom",
            analysis: "dc2",
            parameters: &params,
            metrics: &metrics,
        };
        let m = SwitchingThreshold::new("vs2").extract(&ctx, &plot);
        assert_relative_eq!(m["vs2"], 1.5, epsilon = 1e-9);
    }
}
