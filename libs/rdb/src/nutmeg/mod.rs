//! Reader for SPICE nutmeg rawfiles, as written by Spectre (`-format nutascii`
//! or `-format nutbin`) and most SPICE-class simulators.
use std::path::Path;
use std::str;

use nom::branch::alt;
use nom::bytes::complete::{tag_no_case, take, take_till1, take_while, take_while1};
use nom::character::complete::{line_ending, space0, space1};
use nom::combinator::opt;
use nom::error::{Error as NomError, ErrorKind};
use nom::multi::many0;
use nom::number::complete::{be_f64, le_f64};
use nom::sequence::{delimited, tuple};
use nom::{Err, IResult};
use num::complex::Complex64;

use crate::error::{Error, Result};
use crate::{Plot, Trace};

#[cfg(test)]
mod tests;

/// Nutmeg reading options.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct Options {
    /// The endianness of floating point numbers in the rawfile.
    ///
    /// Only used for binary data; ASCII values ignore this option.
    pub endianness: ByteOrder,
}

impl Default for Options {
    #[inline]
    fn default() -> Self {
        Self {
            endianness: ByteOrder::BigEndian,
        }
    }
}

/// Byte order for numbers.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum ByteOrder {
    /// Big endian.
    BigEndian,
    /// Little endian.
    LittleEndian,
}

/// Parses every plot contained in the given rawfile data.
///
/// The first variable of each plot is taken as its sweep variable.
pub fn parse(input: impl AsRef<[u8]>, options: Options) -> Result<Vec<Plot>> {
    let (rest, raw) = analyses(input.as_ref(), options).map_err(|_| Error::Parse)?;
    if !rest.iter().all(|c| is_space_or_line(*c)) {
        tracing::error!(remaining = rest.len(), "unparsed trailing rawfile data");
        return Err(Error::Parse);
    }
    raw.into_iter().map(RawPlot::into_plot).collect()
}

/// Reads and parses the rawfile at `path`.
pub fn read(path: impl AsRef<Path>, options: Options) -> Result<Vec<Plot>> {
    let data = std::fs::read(path.as_ref())?;
    parse(data, options)
}

#[derive(Debug, Clone, PartialEq)]
struct Variable<'a> {
    idx: usize,
    name: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
enum RawData {
    Real(Vec<Vec<f64>>),
    Complex(Vec<Vec<Complex64>>),
}

#[derive(Debug, Clone, PartialEq)]
struct RawPlot<'a> {
    plotname: &'a str,
    num_variables: usize,
    variables: Vec<Variable<'a>>,
    data: RawData,
}

impl RawPlot<'_> {
    fn into_plot(self) -> Result<Plot> {
        if self.variables.len() != self.num_variables {
            return Err(Error::VariableCount {
                plot: self.plotname.to_string(),
                declared: self.num_variables,
                listed: self.variables.len(),
            });
        }
        let mut plot = Plot::new(self.plotname);
        let traces: Vec<Trace> = match self.data {
            RawData::Real(data) => data.into_iter().map(Trace::Real).collect(),
            RawData::Complex(data) => data.into_iter().map(Trace::Complex).collect(),
        };
        // Data columns are stored in variable index order.
        let mut variables = self.variables;
        variables.sort_by_key(|var| var.idx);
        for (i, (var, trace)) in variables.iter().zip(traces).enumerate() {
            if i == 0 {
                let sweep = match trace {
                    Trace::Real(values) => values,
                    Trace::Complex(values) => values.iter().map(|c| c.re).collect(),
                };
                plot = plot.with_sweep(var.name, sweep);
            } else {
                plot.insert(var.name, trace);
            }
        }
        Ok(plot)
    }
}

fn is_newline(c: u8) -> bool {
    c == b'\n' || c == b'\r'
}

fn is_space_or_line(c: u8) -> bool {
    c == b'\n' || c == b'\r' || c == b' ' || c == b'\t'
}

fn header<'a, 'b>(key: &'b str) -> impl Fn(&'a [u8]) -> IResult<&'a [u8], &'a str> + 'b {
    move |input| {
        let tag = tag_no_case(key);
        let (input, _) = space0(input)?;
        let header_value = take_till1(is_newline);
        let (input, value) = delimited(tag, header_value, line_ending)(input)?;
        let value = from_utf8(value)?;
        Ok((input, value.trim()))
    }
}

fn from_utf8(input: &[u8]) -> std::result::Result<&str, Err<NomError<&[u8]>>> {
    str::from_utf8(input).map_err(|_| Err::Failure(NomError::new(input, ErrorKind::Char)))
}

fn parse_usize(input: &[u8]) -> std::result::Result<usize, Err<NomError<&[u8]>>> {
    from_utf8(input)?
        .trim()
        .parse::<usize>()
        .map_err(|_| Err::Failure(NomError::new(input, ErrorKind::Digit)))
}

fn parse_f64(input: &[u8]) -> std::result::Result<f64, Err<NomError<&[u8]>>> {
    from_utf8(input)?
        .trim()
        .parse::<f64>()
        .map_err(|_| Err::Failure(NomError::new(input, ErrorKind::Float)))
}

fn variable(input: &[u8]) -> IResult<&[u8], Variable<'_>> {
    let value = take_till1(is_space_or_line);
    // AC analyses may carry trailing `grid=X` style declarations.
    let kwargs = opt(take_till1(is_newline));
    let (input, (_, idx, _, name, _, _unit, _, _, _)) = tuple((
        space0,
        &value,
        space1,
        &value,
        space1,
        &value,
        space0,
        kwargs,
        line_ending,
    ))(input)?;
    let idx = parse_usize(idx)?;
    let name = from_utf8(name)?;
    Ok((input, Variable { idx, name }))
}

fn variables(input: &[u8]) -> IResult<&[u8], Vec<Variable<'_>>> {
    let (input, _) = tuple((tag_no_case("Variables:"), space0, opt(line_ending)))(input)?;
    let (input, vars) = many0(variable)(input)?;
    let (input, _) = take_while(is_space_or_line)(input)?;
    Ok((input, vars))
}

fn binary_f64(input: &[u8], opts: Options) -> IResult<&[u8], f64> {
    match opts.endianness {
        ByteOrder::BigEndian => be_f64(input),
        ByteOrder::LittleEndian => le_f64(input),
    }
}

/// Upper bound on the number of points preallocated from a header.
const MAX_PREALLOC: usize = 1 << 20;

fn columns<T>(vars: usize, points: usize) -> Vec<Vec<T>> {
    (0..vars)
        .map(|_| Vec::with_capacity(points.min(MAX_PREALLOC)))
        .collect()
}

fn real_data_binary(
    vars: usize,
    points: usize,
    opts: Options,
) -> impl Fn(&[u8]) -> IResult<&[u8], RawData> {
    move |input| {
        let (mut input, _) = tuple((tag_no_case("Binary:"), space0, line_ending))(input)?;
        let mut out = columns(vars, points);
        for _ in 0..points {
            for item in out.iter_mut() {
                let val;
                (input, val) = binary_f64(input, opts)?;
                item.push(val);
            }
        }
        Ok((input, RawData::Real(out)))
    }
}

fn real_data_ascii(vars: usize, points: usize) -> impl Fn(&[u8]) -> IResult<&[u8], RawData> {
    move |input| {
        let (mut input, _) = tuple((tag_no_case("Values:"), space0, line_ending))(input)?;
        (input, _) = take_while(is_space_or_line)(input)?;

        let mut out = columns(vars, points);
        for _ in 0..points {
            // Point index.
            (input, _) = take_till1(is_space_or_line)(input)?;
            for item in out.iter_mut() {
                let val;
                (input, _) = take_while1(is_space_or_line)(input)?;
                (input, val) = take_till1(is_space_or_line)(input)?;
                item.push(parse_f64(val)?);
            }
            (input, _) = take_while(is_space_or_line)(input)?;
        }
        Ok((input, RawData::Real(out)))
    }
}

fn complex_data_binary(
    vars: usize,
    points: usize,
    opts: Options,
) -> impl Fn(&[u8]) -> IResult<&[u8], RawData> {
    move |input| {
        let (mut input, _) = tuple((tag_no_case("Binary:"), space0, line_ending))(input)?;
        let mut out = columns(vars, points);
        for _ in 0..points {
            for item in out.iter_mut() {
                let (re, im);
                (input, re) = binary_f64(input, opts)?;
                (input, im) = binary_f64(input, opts)?;
                item.push(Complex64::new(re, im));
            }
        }
        Ok((input, RawData::Complex(out)))
    }
}

fn complex_data_ascii(
    vars: usize,
    points: usize,
) -> impl Fn(&[u8]) -> IResult<&[u8], RawData> {
    move |input| {
        let (mut input, _) = tuple((tag_no_case("Values:"), space0, line_ending))(input)?;
        (input, _) = take_while(is_space_or_line)(input)?;

        let mut out = columns(vars, points);
        for _ in 0..points {
            (input, _) = take_till1(is_space_or_line)(input)?;
            for item in out.iter_mut() {
                let (re, im);
                (input, _) = take_while1(is_space_or_line)(input)?;
                (input, re) = take_till1(|c| c == b',')(input)?;
                (input, _) = take(1u64)(input)?;
                (input, im) = take_till1(is_space_or_line)(input)?;
                item.push(Complex64::new(parse_f64(re)?, parse_f64(im)?));
            }
            (input, _) = take_while(is_space_or_line)(input)?;
        }
        Ok((input, RawData::Complex(out)))
    }
}

fn analysis(opts: Options) -> impl Fn(&[u8]) -> IResult<&[u8], RawPlot<'_>> {
    move |input: &[u8]| -> IResult<&[u8], RawPlot<'_>> {
        let (input, _) = take_while(is_space_or_line)(input)?;
        let (input, _title) = opt(header("Title:"))(input)?;
        let (input, _date) = opt(header("Date:"))(input)?;
        let (input, plotname) = header("Plotname:")(input)?;
        let (input, flags) = header("Flags:")(input)?;
        let (input, num_variables) = header("No. Variables:")(input)?;
        let num_variables = parse_usize(num_variables.as_bytes())?;
        let (input, num_points) = header("No. Points:")(input)?;
        let num_points = parse_usize(num_points.as_bytes())?;
        // Some writers emit additional headers (e.g. `Dimensions:`) before the variables.
        let (input, _) = many0(header("Dimensions:"))(input)?;
        let (input, _) = opt(header("Command:"))(input)?;
        let (input, variables) = variables(input)?;
        // Columns follow the variables actually listed; a disagreeing header
        // is reported once the plot is assembled.
        let vars = variables.len();

        let (input, data) = if flags.contains("complex") {
            alt((
                complex_data_binary(vars, num_points, opts),
                complex_data_ascii(vars, num_points),
            ))(input)?
        } else {
            alt((
                real_data_binary(vars, num_points, opts),
                real_data_ascii(vars, num_points),
            ))(input)?
        };

        Ok((
            input,
            RawPlot {
                plotname,
                num_variables,
                variables,
                data,
            },
        ))
    }
}

fn analyses(input: &[u8], opts: Options) -> IResult<&[u8], Vec<RawPlot<'_>>> {
    many0(analysis(opts))(input)
}
