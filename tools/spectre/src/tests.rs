use std::collections::HashSet;
#[cfg(unix)]
use std::os::unix::prelude::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ace::{Environment, EnvironmentOptions, SessionFactory, SessionRequest, SimSession};
use approx::assert_relative_eq;
use arcstr::ArcStr;
use indexmap::IndexMap;
use test_log::test;

use crate::{Error, Format, Spectre};

const BUILD_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/build");

/// Emulates `spectre +interactive=skill` for a netlist with a `dcop` and a
/// `tran` analysis. Every command is appended to `commands.log`.
///
/// A `delay` file in the working directory makes the next analysis sleep for
/// the given number of seconds; a `crash` file makes it exit instead.
const FAKE_SPECTRE: &str = r#"#!/bin/bash
raw=""
while [ $# -gt 0 ]; do
    case "$1" in
        -raw) raw="$2"; shift ;;
    esac
    shift
done
echo "Cadence (R) Virtuoso (R) Spectre (R) Circuit Simulator"
printf '> '
while IFS= read -r line; do
    echo "$line" >> commands.log
    case "$line" in
        *sclListAnalysis*)
            echo '(("dcop" "dc") ("tran" "tran") ("broken" "ac"))'
            ;;
        *sclRunAnalysis*broken*)
            echo "nil"
            ;;
        *sclRunAnalysis*)
            if [ -f delay ]; then d=$(cat delay); rm -f delay; sleep "$d"; fi
            if [ -f crash ]; then rm -f crash; exit 1; fi
            name=$(echo "$line" | sed -E 's/.*"([^"]+)"\)\)$/\1/')
            value=$(grep -o '"M1w") "value" [^)]*' commands.log | tail -n 1 | awk '{print $3}')
            cat > "$raw/$name.raw" <<RAW
Title: fake
Plotname: $name
Flags: real
No. Variables: 2
No. Points: 2
Variables:
	0	time	s
	1	DUT:a	V
Values:
 0	0.0
	$value
 1	1.0
	$value
RAW
            echo "t"
            ;;
        *sclQuit*)
            exit 0
            ;;
        *)
            echo "t"
            ;;
    esac
    printf '> '
done
"#;

fn test_dir(name: &str) -> PathBuf {
    let dir = PathBuf::from(BUILD_DIR).join(name);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn fake_spectre(dir: &Path) -> PathBuf {
    let path = dir.join("fake_spectre.sh");
    std::fs::write(&path, FAKE_SPECTRE).unwrap();
    #[cfg(unix)]
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn spectre(dir: &Path) -> Spectre {
    Spectre::builder()
        .root_dir(dir.join("sessions"))
        .binary(fake_spectre(dir))
        .format(Format::NutAscii)
        .command_timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

fn request<'a>(netlist: &'a Path, includes: &'a [PathBuf]) -> SessionRequest<'a> {
    SessionRequest {
        name: "ace.nom",
        corner: "nom",
        netlist,
        include_dirs: includes,
    }
}

#[test]
fn renders_session_script() {
    let dir = test_dir("renders_session_script");
    let netlist = dir.join("input.scs");
    let includes = vec![dir.join("models")];
    let spectre = Spectre::builder()
        .root_dir(&dir)
        .prelude("/tools/cadence.sh")
        .flags("+aps")
        .build()
        .unwrap();

    let session = spectre.session(request(&netlist, &includes)).unwrap();
    assert!(!session.is_running());
    assert_eq!(session.work_dir(), dir.join("ace.nom"));

    let script = std::fs::read_to_string(dir.join("ace.nom/session.sh")).unwrap();
    assert!(script.contains("source /tools/cadence.sh"));
    assert!(script.contains("exec spectre +interactive=skill -format nutbin"));
    assert!(script.contains(&format!("-I{}", includes[0].display())));
    assert!(script.contains("+aps"));
    assert!(script.trim_end().ends_with(&netlist.display().to_string()));
}

#[test]
fn builder_requires_root_dir() {
    assert!(Spectre::builder().build().is_err());
    let spectre = Spectre::new("/tmp/sim");
    assert_eq!(spectre.root_dir(), &PathBuf::from("/tmp/sim"));
}

#[cfg(unix)]
#[test]
fn runs_analyses_interactively() {
    let dir = test_dir("runs_analyses_interactively");
    let netlist = dir.join("input.scs");
    std::fs::write(&netlist, "// testbench\n").unwrap();
    let spectre = spectre(&dir);
    let mut session = spectre.session(request(&netlist, &[])).unwrap();

    session
        .set_parameters(&IndexMap::from([(ArcStr::from("M1w"), 2e-6)]))
        .unwrap();
    assert!(session.is_running());

    let plots = session.run(&HashSet::new()).unwrap();
    assert_eq!(plots.keys().collect::<Vec<_>>(), vec!["dcop", "tran"]);
    assert_relative_eq!(plots["dcop"].scalar("DUT:a").unwrap(), 2e-6);
    assert_eq!(session.analyses().unwrap().len(), 3);

    let blacklist = HashSet::from([ArcStr::from("tran")]);
    let plots = session.run(&blacklist).unwrap();
    assert_eq!(plots.keys().collect::<Vec<_>>(), vec!["dcop"]);

    session.stop();
    assert!(!session.is_running());
    let log = std::fs::read_to_string(session.work_dir().join("commands.log")).unwrap();
    assert_eq!(log.lines().filter(|l| l.contains("sclListAnalysis")).count(), 1);
    assert!(log.lines().last().unwrap().contains("sclQuit"));
}

#[cfg(unix)]
#[test]
fn idle_sessions_restart_with_their_parameters() {
    let dir = test_dir("idle_sessions_restart_with_their_parameters");
    let netlist = dir.join("input.scs");
    std::fs::write(&netlist, "// testbench\n").unwrap();
    let spectre = Spectre::builder()
        .root_dir(dir.join("sessions"))
        .binary(fake_spectre(&dir))
        .format(Format::NutAscii)
        .idle_timeout(Duration::from_millis(100))
        .build()
        .unwrap();
    let mut session = spectre.session(request(&netlist, &[])).unwrap();

    session
        .set_parameters(&IndexMap::from([(ArcStr::from("M1w"), 4e-6)]))
        .unwrap();
    std::thread::sleep(Duration::from_millis(300));
    let plots = session.run(&HashSet::new()).unwrap();
    assert_relative_eq!(plots["dcop"].scalar("DUT:a").unwrap(), 4e-6);

    let log = std::fs::read_to_string(session.work_dir().join("commands.log")).unwrap();
    assert_eq!(log.lines().filter(|l| l.contains("sclQuit")).count(), 1);
    assert_eq!(log.lines().filter(|l| l.contains("sclSetAttribute")).count(), 2);
}

#[cfg(unix)]
#[test]
fn timed_out_sessions_restart_instead_of_reading_stale_replies() {
    let dir = test_dir("timed_out_sessions_restart_instead_of_reading_stale_replies");
    let netlist = dir.join("input.scs");
    std::fs::write(&netlist, "// testbench\n").unwrap();
    let spectre = Spectre::builder()
        .root_dir(dir.join("sessions"))
        .binary(fake_spectre(&dir))
        .format(Format::NutAscii)
        .command_timeout(Duration::from_millis(500))
        .build()
        .unwrap();
    let mut session = spectre.session(request(&netlist, &[])).unwrap();
    session
        .set_parameters(&IndexMap::from([(ArcStr::from("M1w"), 2e-6)]))
        .unwrap();

    std::fs::write(session.work_dir().join("delay"), "2").unwrap();
    let err = session.run(&HashSet::new()).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Timeout(_))));
    assert!(!session.is_running());

    let plots = session.run(&HashSet::new()).unwrap();
    assert_eq!(plots.keys().collect::<Vec<_>>(), vec!["dcop", "tran"]);
    assert_relative_eq!(plots["dcop"].scalar("DUT:a").unwrap(), 2e-6);

    let log = std::fs::read_to_string(session.work_dir().join("commands.log")).unwrap();
    assert_eq!(log.lines().filter(|l| l.contains("sclSetAttribute")).count(), 2);
}

#[cfg(unix)]
#[test]
fn sessions_recover_from_a_crashed_simulator() {
    let dir = test_dir("sessions_recover_from_a_crashed_simulator");
    let netlist = dir.join("input.scs");
    std::fs::write(&netlist, "// testbench\n").unwrap();
    let spectre = spectre(&dir);
    let mut session = spectre.session(request(&netlist, &[])).unwrap();
    session
        .set_parameters(&IndexMap::from([(ArcStr::from("M1w"), 5e-6)]))
        .unwrap();

    std::fs::write(session.work_dir().join("crash"), "").unwrap();
    let err = session.run(&HashSet::new()).unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Exited)));
    assert!(!session.is_running());

    let plots = session.run(&HashSet::new()).unwrap();
    assert_relative_eq!(plots["tran"].scalar("DUT:a").unwrap(), 5e-6);
}

#[cfg(unix)]
#[test]
fn drives_an_environment() {
    let dir = test_dir("drives_an_environment");
    let circuit = dir.join("circuit");
    std::fs::create_dir_all(&circuit).unwrap();
    std::fs::write(circuit.join("input.scs"), "// testbench\n").unwrap();
    std::fs::write(
        circuit.join("properties.json"),
        r#"{
            "parameters": { "M1w": { "min": 1e-6, "max": 1e-5, "grid": 1e-7, "init": 3e-6, "sizing": true } },
            "performances": { "dcop": { "A": { "reference": "DUT:a" } } }
        }"#,
    )
    .unwrap();

    let factory: Arc<dyn SessionFactory> = Arc::new(spectre(&dir));
    let mut env =
        Environment::open(&circuit, &[], factory, EnvironmentOptions::default()).unwrap();
    let report = env.simulate().unwrap();
    assert!(report.is_success());
    assert!(!env.is_corrupted());
    assert_relative_eq!(env.performance_values().unwrap()["A"], 3e-6, max_relative = 1e-9);

    env.clear();
    assert!(!dir.join("sessions/ace.nom").exists());
}
