//! SKILL commands understood by Spectre's interactive mode.

use arcstr::ArcStr;
use lazy_static::lazy_static;
use regex::Regex;

/// The interpreter prompt printed when Spectre is ready for a command.
pub const PROMPT: &str = "> ";

lazy_static! {
    static ref ANALYSIS: Regex = Regex::new(r#"\(\s*"([^"]+)"\s+"([^"]+)"\s*\)"#)
        .unwrap_or_else(|e| panic!("invalid analysis pattern: {e}"));
}

/// An analysis declared in the loaded netlist.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AnalysisInfo {
    /// The analysis instance name, e.g. `tran`.
    pub name: ArcStr,
    /// The analysis type, e.g. `tran` or `stb`.
    pub kind: ArcStr,
}

pub(crate) fn set_parameter(name: &str, value: f64) -> String {
    format!(r#"sclSetAttribute(sclGetParameter(sclGetCircuit("") "{name}") "value" {value:e})"#)
}

pub(crate) fn list_analyses() -> &'static str {
    r#"sclListAnalysis(sclGetCircuit(""))"#
}

pub(crate) fn run_analysis(name: &str) -> String {
    format!(r#"sclRunAnalysis(sclGetAnalysis(sclGetCircuit("") "{name}"))"#)
}

pub(crate) fn quit() -> &'static str {
    "sclQuit()"
}

/// Parses the reply to [`list_analyses`]: a list of `("name" "type")` pairs.
pub(crate) fn parse_analyses(reply: &str) -> Vec<AnalysisInfo> {
    ANALYSIS
        .captures_iter(reply)
        .map(|c| AnalysisInfo {
            name: ArcStr::from(&c[1]),
            kind: ArcStr::from(&c[2]),
        })
        .collect()
}

/// Returns `true` if the interpreter reply signals failure.
///
/// SKILL functions return `nil` on failure; errors are printed with an
/// `*Error*` prefix.
pub(crate) fn is_failure(reply: &str) -> bool {
    let reply = reply.trim();
    reply == "nil" || reply.lines().any(|line| line.trim_start().starts_with("*Error*"))
}

/// Removes the trailing prompt from accumulated interpreter output.
///
/// Returns [`None`] while the output does not end with a prompt.
pub(crate) fn strip_prompt(output: &str) -> Option<&str> {
    let body = output.strip_suffix(PROMPT)?;
    if body.is_empty() || body.ends_with('\n') {
        Some(body.trim())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_commands() {
        assert_eq!(
            set_parameter("M1w", 3e-6),
            r#"sclSetAttribute(sclGetParameter(sclGetCircuit("") "M1w") "value" 3e-6)"#
        );
        assert_eq!(
            run_analysis("tran"),
            r#"sclRunAnalysis(sclGetAnalysis(sclGetCircuit("") "tran"))"#
        );
    }

    #[test]
    fn parses_analysis_lists() {
        let reply = r#"(("dcop" "dc") ("dcmatch" "dcmatch")
            ("tran"  "tran"))"#;
        let analyses = parse_analyses(reply);
        assert_eq!(analyses.len(), 3);
        assert_eq!(analyses[1].name, "dcmatch");
        assert_eq!(analyses[2].kind, "tran");
        assert!(parse_analyses("nil").is_empty());
    }

    #[test]
    fn detects_prompts_and_failures() {
        assert_eq!(strip_prompt("> "), Some(""));
        assert_eq!(strip_prompt("t\n> "), Some("t"));
        assert_eq!(strip_prompt("a -> b"), None);
        assert_eq!(strip_prompt("t\n"), None);

        assert!(is_failure("nil"));
        assert!(is_failure("*Error* sclGetParameter: no such parameter"));
        assert!(!is_failure("t"));
    }
}
