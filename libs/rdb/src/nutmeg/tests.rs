use approx::assert_relative_eq;

use super::*;
use crate::waveform::Waveform;

const VARIABLE: &str = " 0\tv(xdut.vdd)\tvoltage\r\n";

const TRAN_ASCII: &str = "Title: opamp testbench
Date: Thu Jan  1 00:00:00 2026
Plotname: Transient Analysis `tran': time = (0 s -> 2 us)
Flags: real
No. Variables: 3
No. Points: 3
Variables:
\t0\ttime\ts
\t1\tOUT\tV
\t2\tINP\tV
Values:
 0\t0.000000e+00
\t0.0
\t0.0
 1\t1.000000e-06
\t0.9
\t1.0
 2\t2.000000e-06
\t1.8
\t1.0
";

const AC_ASCII: &str = "Title: opamp testbench
Plotname: Stability Analysis `stb'
Flags: complex
No. Variables: 2
No. Points: 2
Variables:
\t0\tfreq\tHz grid=3
\t1\tloopGain\tV
Values:
 0\t1.0,0.0
\t1000.0,-10.0
 1\t10.0,0.0
\t100.0,-50.0
";

#[test]
fn parses_single_variable() {
    let (_, var) = variable(VARIABLE.as_bytes()).unwrap();
    assert_eq!(var.idx, 0);
    assert_eq!(var.name, "v(xdut.vdd)");
}

#[test]
fn parses_real_ascii_plot() {
    let plots = parse(TRAN_ASCII, Options::default()).unwrap();
    assert_eq!(plots.len(), 1);
    let plot = &plots[0];
    assert_eq!(plot.name(), "Transient Analysis `tran': time = (0 s -> 2 us)");
    assert_eq!(plot.sweep_name().map(|s| s.as_str()), Some("time"));
    assert_eq!(plot.sweep().unwrap(), vec![0.0, 1e-6, 2e-6]);
    let out = plot.real("OUT").unwrap();
    assert_relative_eq!(out.value_at(1.5e-6).unwrap(), 1.35);
}

#[test]
fn parses_complex_ascii_plot() {
    let plots = parse(AC_ASCII, Options::default()).unwrap();
    let lg = plots[0].complex("loopGain").unwrap();
    assert_eq!(lg.sweep(), &[1.0, 10.0]);
    let (_, first) = lg.first().unwrap();
    assert_relative_eq!(first.re, 1000.0);
    assert_relative_eq!(first.im, -10.0);
}

#[test]
fn parses_concatenated_plots() {
    let data = format!("{TRAN_ASCII}{AC_ASCII}");
    let plots = parse(data, Options::default()).unwrap();
    assert_eq!(plots.len(), 2);
    assert!(plots[1].signal("loopGain").unwrap().is_complex());
}

#[test]
fn parses_little_endian_binary_plot() {
    let mut data = b"Title: op\nPlotname: Operating Point\nFlags: real\nNo. Variables: 2\nNo. Points: 1\nVariables:\n\t0\tv(out)\tV\n\t1\ti(vdd)\tA\nBinary:\n".to_vec();
    data.extend_from_slice(&0.9f64.to_le_bytes());
    data.extend_from_slice(&(-1e-3f64).to_le_bytes());

    let plots = parse(
        &data,
        Options {
            endianness: ByteOrder::LittleEndian,
        },
    )
    .unwrap();
    assert_eq!(plots[0].scalar("v(out)"), Some(0.9));
    assert_eq!(plots[0].scalar("i(vdd)"), Some(-1e-3));
}

#[test]
fn rejects_variable_count_mismatch() {
    let data = TRAN_ASCII.replace("No. Variables: 3", "No. Variables: 4");
    assert!(parse(data, Options::default()).is_err());
}

#[test]
fn rejects_implausible_point_counts() {
    let data = TRAN_ASCII.replace("No. Points: 3", &format!("No. Points: {}", usize::MAX));
    assert!(parse(data, Options::default()).is_err());
}
