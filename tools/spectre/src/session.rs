//! Interactive Spectre sessions.

use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::{Duration, Instant};

use ace::{BoxError, SimSession};
use arcstr::ArcStr;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use indexmap::IndexMap;
use rdb::{Plot, Plots};

use crate::error::{Error, Result};
use crate::skill::{self, AnalysisInfo};

const QUIT_GRACE: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A running `spectre +interactive=skill` process.
struct Process {
    child: Child,
    stdin: ChildStdin,
    output: Receiver<Vec<u8>>,
    timeout: Option<Duration>,
    last_used: Instant,
}

impl Process {
    fn spawn(script: &Path, work_dir: &Path, timeout: Option<Duration>) -> Result<Self> {
        let stderr = File::create(work_dir.join("spectre.err"))?;
        let mut child = Command::new("/bin/bash")
            .arg(script)
            .current_dir(work_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(stderr)
            .spawn()?;
        let (Some(stdin), Some(mut stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(Error::Exited);
        };

        let (tx, rx) = crossbeam_channel::unbounded();
        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match stdout.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        let mut process = Self {
            child,
            stdin,
            output: rx,
            timeout,
            last_used: Instant::now(),
        };
        // Wait for the banner and the first prompt.
        if let Err(err) = process.reply() {
            process.kill();
            return Err(err);
        }
        Ok(process)
    }

    fn reply(&mut self) -> Result<String> {
        let mut out = Vec::new();
        loop {
            let chunk = match self.timeout {
                Some(timeout) => self.output.recv_timeout(timeout).map_err(|e| match e {
                    RecvTimeoutError::Timeout => Error::Timeout(timeout),
                    RecvTimeoutError::Disconnected => Error::Exited,
                })?,
                None => self.output.recv().map_err(|_| Error::Exited)?,
            };
            out.extend_from_slice(&chunk);
            if let Some(reply) = skill::strip_prompt(&String::from_utf8_lossy(&out)) {
                self.last_used = Instant::now();
                return Ok(reply.to_string());
            }
        }
    }

    fn command(&mut self, command: &str) -> Result<String> {
        tracing::trace!(command, "sending SKILL command");
        writeln!(self.stdin, "{command}")?;
        self.stdin.flush()?;
        let reply = self.reply()?;
        if skill::is_failure(&reply) {
            return Err(Error::Rejected {
                command: command.to_string(),
                reply,
            });
        }
        Ok(reply)
    }

    fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }

    fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }

    fn quit(mut self) {
        let _ = writeln!(self.stdin, "{}", skill::quit()).and_then(|()| self.stdin.flush());
        let start = Instant::now();
        while start.elapsed() < QUIT_GRACE {
            if self.has_exited() {
                return;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
        tracing::debug!("Spectre did not quit in time, killing it");
        self.kill();
    }

    fn kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// A Spectre session bound to one corner netlist.
///
/// The simulator is started lazily on first use and restarted transparently
/// if it exits or stays idle longer than the configured idle timeout.
/// Parameter values are re-sent after every restart.
pub struct SpectreSession {
    name: ArcStr,
    work_dir: PathBuf,
    raw_dir: PathBuf,
    log_path: PathBuf,
    script: PathBuf,
    idle_timeout: Option<Duration>,
    command_timeout: Option<Duration>,
    process: Option<Process>,
    analyses: Option<Vec<AnalysisInfo>>,
    values: IndexMap<ArcStr, f64>,
}

impl std::fmt::Debug for SpectreSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectreSession")
            .field("name", &self.name)
            .field("work_dir", &self.work_dir)
            .field("running", &self.process.is_some())
            .finish_non_exhaustive()
    }
}

impl SpectreSession {
    pub(crate) fn new(
        name: ArcStr,
        work_dir: PathBuf,
        script: PathBuf,
        idle_timeout: Option<Duration>,
        command_timeout: Option<Duration>,
    ) -> Self {
        Self {
            name,
            raw_dir: work_dir.join("raw"),
            log_path: work_dir.join("spectre.log"),
            work_dir,
            script,
            idle_timeout,
            command_timeout,
            process: None,
            analyses: None,
            values: IndexMap::new(),
        }
    }

    /// The session name.
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// Returns `true` if the simulator process is running.
    pub fn is_running(&self) -> bool {
        self.process.is_some()
    }

    /// The analyses of the netlist, if they have been queried yet.
    pub fn analyses(&self) -> Option<&[AnalysisInfo]> {
        self.analyses.as_deref()
    }

    /// Starts the simulator if needed. Returns `true` if a new process was
    /// started, in which case all stored parameter values were pushed.
    fn ensure_process(&mut self) -> Result<bool> {
        if let Some(process) = &mut self.process {
            let idle = process.idle_for();
            if self.idle_timeout.is_some_and(|limit| idle > limit) {
                tracing::info!(session = %self.name, ?idle, "restarting idle Spectre session");
                self.shutdown();
            } else if process.has_exited() {
                tracing::warn!(session = %self.name, log = ?self.log_path, "Spectre exited, restarting");
                self.process = None;
            }
        }
        if self.process.is_some() {
            return Ok(false);
        }

        std::fs::create_dir_all(&self.raw_dir)?;
        tracing::debug!(session = %self.name, work_dir = ?self.work_dir, "starting Spectre");
        let mut process = Process::spawn(&self.script, &self.work_dir, self.command_timeout)?;
        for (name, value) in &self.values {
            if let Err(err) = process.command(&skill::set_parameter(name, *value)) {
                process.kill();
                return Err(err);
            }
        }
        self.process = Some(process);
        Ok(true)
    }

    /// Kills the simulator after a failure that may leave a reply unread, so
    /// the next command starts a fresh process instead of reading a stale one.
    fn recover<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if !matches!(err, Error::Rejected { .. }) {
                if let Some(mut process) = self.process.take() {
                    tracing::warn!(session = %self.name, %err, "killing Spectre after a failed command");
                    process.kill();
                }
            }
        }
        result
    }

    fn shutdown(&mut self) {
        if let Some(process) = self.process.take() {
            process.quit();
        }
    }

    fn push_parameters(&mut self, values: &IndexMap<ArcStr, f64>) -> Result<()> {
        self.values = values.clone();
        if self.ensure_process()? {
            return Ok(());
        }
        let Some(process) = self.process.as_mut() else {
            return Err(Error::Exited);
        };
        for (name, value) in values {
            process.command(&skill::set_parameter(name, *value))?;
        }
        Ok(())
    }

    fn run_analyses(&mut self, blacklist: &HashSet<ArcStr>) -> Result<Plots> {
        self.ensure_process()?;
        let Some(process) = self.process.as_mut() else {
            return Err(Error::Exited);
        };
        if self.analyses.is_none() {
            let reply = process.command(skill::list_analyses())?;
            let analyses = skill::parse_analyses(&reply);
            tracing::debug!(session = %self.name, count = analyses.len(), "listed analyses");
            self.analyses = Some(analyses);
        }
        let analyses = self.analyses.as_deref().unwrap_or_default();

        clear_dir(&self.raw_dir)?;
        let mut plots = Plots::new();
        for analysis in analyses.iter().filter(|a| !blacklist.contains(&a.name)) {
            match process.command(&skill::run_analysis(&analysis.name)) {
                Ok(_) => {}
                Err(Error::Rejected { reply, .. }) => {
                    tracing::warn!(session = %self.name, analysis = %analysis.name, %reply, "analysis failed");
                    continue;
                }
                Err(err) => return Err(err),
            }
            match take_plot(&self.raw_dir)? {
                Some(plot) => {
                    plots.insert(analysis.name.clone(), plot);
                }
                None => {
                    tracing::warn!(session = %self.name, analysis = %analysis.name, "analysis wrote no results")
                }
            }
        }
        Ok(plots)
    }
}

/// Parses and deletes every rawfile in `dir`, returning the last plot written.
fn take_plot(dir: &Path) -> Result<Option<Plot>> {
    let mut files = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    files.sort();
    let mut last = None;
    for file in files.iter().filter(|f| f.is_file()) {
        let plots = rdb::nutmeg::read(file, Default::default())?;
        std::fs::remove_file(file)?;
        last = plots.into_iter().last().or(last);
    }
    Ok(last)
}

fn clear_dir(dir: &Path) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            std::fs::remove_file(path)?;
        }
    }
    Ok(())
}

impl SimSession for SpectreSession {
    fn set_parameters(
        &mut self,
        values: &IndexMap<ArcStr, f64>,
    ) -> std::result::Result<(), BoxError> {
        let result = self.push_parameters(values);
        Ok(self.recover(result)?)
    }

    fn run(&mut self, blacklist: &HashSet<ArcStr>) -> std::result::Result<Plots, BoxError> {
        let result = self.run_analyses(blacklist);
        Ok(self.recover(result)?)
    }

    fn stop(&mut self) {
        self.shutdown();
    }

    fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn log_path(&self) -> Option<PathBuf> {
        Some(self.log_path.clone())
    }
}

impl Drop for SpectreSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
