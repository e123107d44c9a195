//! Simulator sessions and their per-corner orchestration.
//!
//! A [`SessionFactory`] turns a corner netlist into a live [`SimSession`].
//! The [`SessionOrchestrator`] keeps one session per requested corner and
//! runs all of them concurrently, one scoped thread per corner.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arcstr::ArcStr;
use indexmap::IndexMap;
use rdb::Plots;

use crate::corner::CornerRegistry;
use crate::error::{BoxError, Error, Result, SessionError};

/// Everything a backend needs to start a session for one corner.
#[derive(Debug, Clone, Copy)]
pub struct SessionRequest<'a> {
    /// The session name, `<environment>.<corner>`.
    pub name: &'a str,
    /// The corner name.
    pub corner: &'a str,
    /// The corner netlist.
    pub netlist: &'a Path,
    /// Directories searched for included files.
    pub include_dirs: &'a [PathBuf],
}

/// A live simulator session bound to one corner netlist.
pub trait SimSession: Send {
    /// Pushes parameter values to the simulator.
    fn set_parameters(&mut self, values: &IndexMap<ArcStr, f64>) -> Result<(), BoxError>;

    /// Runs every analysis of the netlist not named in `blacklist`.
    ///
    /// Returns the produced plots keyed by analysis identifier.
    fn run(&mut self, blacklist: &HashSet<ArcStr>) -> Result<Plots, BoxError>;

    /// Terminates the simulator. Must be idempotent.
    ///
    /// A stopped session restarts its simulator on the next command.
    fn stop(&mut self);

    /// The working directory of the session.
    fn work_dir(&self) -> &Path;

    /// The simulator log file, if any.
    fn log_path(&self) -> Option<PathBuf> {
        None
    }
}

/// Creates simulator sessions.
pub trait SessionFactory: Send + Sync {
    /// Starts a session for the requested corner.
    fn create(&self, request: SessionRequest<'_>) -> Result<Box<dyn SimSession>, BoxError>;
}

/// The lifecycle state of a [`Session`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SessionState {
    /// Allocated and idle.
    Allocated,
    /// Executing a run.
    Running,
    /// The last run completed.
    Complete,
    /// The last run failed.
    Failed,
    /// The simulator was stopped; the next run restarts it.
    Stopped,
}

/// A simulator session owned by the orchestrator.
pub struct Session {
    corner: ArcStr,
    inner: Box<dyn SimSession>,
    state: SessionState,
    plots: Plots,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("corner", &self.corner)
            .field("state", &self.state)
            .field("work_dir", &self.inner.work_dir())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// The corner this session simulates.
    pub fn corner(&self) -> &ArcStr {
        &self.corner
    }

    /// The current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The plots produced by the last completed run.
    pub fn plots(&self) -> &Plots {
        &self.plots
    }

    /// The working directory of the session.
    pub fn work_dir(&self) -> &Path {
        self.inner.work_dir()
    }

    /// The simulator log file, if any.
    pub fn log_path(&self) -> Option<PathBuf> {
        self.inner.log_path()
    }

    fn execute(
        &mut self,
        values: &IndexMap<ArcStr, f64>,
        blacklist: &HashSet<ArcStr>,
    ) -> Result<(), BoxError> {
        self.inner.set_parameters(values)?;
        self.plots = self.inner.run(blacklist)?;
        Ok(())
    }
}

/// How a corner fared in a run.
#[derive(Debug, Clone)]
pub enum CornerOutcome {
    /// The session completed and its plots were reduced.
    Completed,
    /// The session failed; no metrics were produced for the corner.
    Failed(SessionError),
}

impl CornerOutcome {
    /// Returns `true` if the corner completed.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// The per-corner outcomes of one run, in request order.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    outcomes: IndexMap<ArcStr, CornerOutcome>,
}

impl RunReport {
    /// Returns `true` if every corner completed.
    pub fn is_success(&self) -> bool {
        self.outcomes.values().all(CornerOutcome::is_completed)
    }

    /// The outcome of one corner.
    pub fn outcome(&self, corner: &str) -> Option<&CornerOutcome> {
        self.outcomes.get(corner)
    }

    /// All outcomes in request order.
    pub fn outcomes(&self) -> &IndexMap<ArcStr, CornerOutcome> {
        &self.outcomes
    }

    /// The errors of the corners that failed.
    pub fn failures(&self) -> impl Iterator<Item = &SessionError> {
        self.outcomes.values().filter_map(|outcome| match outcome {
            CornerOutcome::Failed(err) => Some(err),
            CornerOutcome::Completed => None,
        })
    }
}

/// Owns the simulator sessions of an environment.
pub struct SessionOrchestrator {
    factory: Arc<dyn SessionFactory>,
    name: ArcStr,
    include_dirs: Vec<PathBuf>,
    sessions: IndexMap<ArcStr, Session>,
    runs: usize,
    restart_period: Option<NonZeroUsize>,
}

impl fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("name", &self.name)
            .field("include_dirs", &self.include_dirs)
            .field("sessions", &self.sessions)
            .field("runs", &self.runs)
            .field("restart_period", &self.restart_period)
            .finish_non_exhaustive()
    }
}

impl SessionOrchestrator {
    /// Creates an orchestrator without sessions.
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        name: impl Into<ArcStr>,
        include_dirs: Vec<PathBuf>,
    ) -> Self {
        Self {
            factory,
            name: name.into(),
            include_dirs,
            sessions: IndexMap::new(),
            runs: 0,
            restart_period: None,
        }
    }

    /// The number of runs after which all sessions are restarted.
    pub fn restart_period(&self) -> Option<NonZeroUsize> {
        self.restart_period
    }

    /// Sets the restart period. [`None`] disables restarts.
    pub fn set_restart_period(&mut self, period: Option<NonZeroUsize>) {
        self.restart_period = period;
    }

    /// The session of a corner, if one is allocated.
    pub fn session(&self, corner: &str) -> Option<&Session> {
        self.sessions.get(corner)
    }

    /// All allocated sessions.
    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Allocates sessions for the requested corners that do not have one yet.
    ///
    /// Allocation fails fast: if any corner cannot be allocated, the errors of
    /// all failed corners are returned together and no run should start.
    pub fn allocate(&mut self, registry: &CornerRegistry, corners: &[ArcStr]) -> Result<()> {
        let mut failures = Vec::new();
        for name in corners {
            if self.sessions.contains_key(name) {
                continue;
            }
            let corner = registry
                .get(name)
                .ok_or_else(|| Error::UnknownCorner(name.clone()))?;
            let session_name = format!("{}.{}", self.name, name);
            let request = SessionRequest {
                name: &session_name,
                corner: name,
                netlist: corner.netlist(),
                include_dirs: &self.include_dirs,
            };
            match self.factory.create(request) {
                Ok(inner) => {
                    tracing::debug!(session = %session_name, work_dir = ?inner.work_dir(), "allocated session");
                    self.sessions.insert(
                        name.clone(),
                        Session {
                            corner: name.clone(),
                            inner,
                            state: SessionState::Allocated,
                            plots: Plots::new(),
                        },
                    );
                }
                Err(err) => {
                    tracing::error!(session = %session_name, %err, "failed to allocate session");
                    failures.push(SessionError::new(name.clone(), err, None));
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Allocation(failures))
        }
    }

    /// Runs the sessions of the given corners concurrently.
    ///
    /// Each session receives its own copy of `values`. A failing or panicking
    /// session only affects its own corner.
    pub fn run(
        &mut self,
        corners: &[ArcStr],
        values: &IndexMap<ArcStr, f64>,
        blacklist: &HashSet<ArcStr>,
    ) -> RunReport {
        let mut results: HashMap<ArcStr, CornerOutcome> = std::thread::scope(|s| {
            let handles = self
                .sessions
                .iter_mut()
                .filter(|(name, _)| corners.contains(name))
                .map(|(name, session)| {
                    session.state = SessionState::Running;
                    session.plots.clear();
                    let values = values.clone();
                    let handle = s.spawn(move || {
                        let result = session.execute(&values, blacklist);
                        session.state = if result.is_ok() {
                            SessionState::Complete
                        } else {
                            SessionState::Failed
                        };
                        result.map_err(|err| (err, session.log_path()))
                    });
                    (name.clone(), handle)
                })
                .collect::<Vec<_>>();

            handles
                .into_iter()
                .map(|(name, handle)| {
                    let outcome = match handle.join() {
                        Ok(Ok(())) => CornerOutcome::Completed,
                        Ok(Err((err, log))) => {
                            tracing::error!(corner = %name, %err, ?log, "simulation failed");
                            CornerOutcome::Failed(SessionError::new(name.clone(), err, log))
                        }
                        Err(_) => {
                            tracing::error!(corner = %name, "simulation thread panicked");
                            CornerOutcome::Failed(SessionError::new(
                                name.clone(),
                                Box::new(Error::Panic),
                                None,
                            ))
                        }
                    };
                    (name, outcome)
                })
                .collect()
        });

        let mut outcomes = IndexMap::new();
        for name in corners {
            let outcome = results.remove(name).unwrap_or_else(|| {
                CornerOutcome::Failed(SessionError::new(
                    name.clone(),
                    "no session allocated".into(),
                    None,
                ))
            });
            if let (CornerOutcome::Failed(_), Some(session)) = (&outcome, self.sessions.get_mut(name)) {
                session.state = SessionState::Failed;
            }
            outcomes.insert(name.clone(), outcome);
        }
        RunReport { outcomes }
    }

    /// Counts a run in which every corner completed, restarting all sessions
    /// when the restart period is reached. Runs with failed corners are not
    /// counted.
    pub fn finish_run(&mut self, report: &RunReport) {
        if !report.is_success() {
            return;
        }
        self.runs += 1;
        if let Some(period) = self.restart_period {
            if self.runs >= period.get() {
                tracing::info!(environment = %self.name, runs = self.runs, "restarting sessions");
                self.runs = 0;
                self.teardown();
            }
        }
    }

    /// Stops every session without discarding it.
    ///
    /// Stopped sessions keep their plots and restart on the next run.
    pub fn stop(&mut self) {
        for session in self.sessions.values_mut() {
            session.inner.stop();
            session.state = SessionState::Stopped;
        }
    }

    /// Stops and discards every session, keeping their working directories.
    fn teardown(&mut self) {
        for (_, mut session) in self.sessions.drain(..) {
            session.inner.stop();
        }
    }

    /// Stops and discards every session and deletes their working directories.
    pub fn clear(&mut self) {
        for (_, mut session) in self.sessions.drain(..) {
            session.inner.stop();
            let dir = session.inner.work_dir().to_path_buf();
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    tracing::warn!(?dir, %err, "failed to remove session working directory")
                }
            }
        }
        self.runs = 0;
    }
}

impl Drop for SessionOrchestrator {
    fn drop(&mut self) {
        self.teardown();
    }
}
