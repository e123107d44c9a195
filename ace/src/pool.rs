//! Batch execution of independent environments.

use std::panic::{self, AssertUnwindSafe};

use crate::env::Environment;
use crate::error::{Error, Result};
use crate::session::RunReport;

/// Identifies an environment inside an [`EnvironmentPool`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct EnvId(usize);

impl EnvId {
    /// The insertion index of the environment.
    pub fn index(self) -> usize {
        self.0
    }
}

/// The result of every environment of one batch, in insertion order.
#[derive(Debug, Default)]
pub struct BatchReport {
    results: Vec<(EnvId, Result<RunReport>)>,
}

impl BatchReport {
    /// Returns `true` if every environment ran and every corner completed.
    pub fn is_success(&self) -> bool {
        self.results
            .iter()
            .all(|(_, result)| result.as_ref().is_ok_and(RunReport::is_success))
    }

    /// The result of one environment.
    pub fn get(&self, id: EnvId) -> Option<&Result<RunReport>> {
        self.results.get(id.0).map(|(_, result)| result)
    }

    /// All results in insertion order.
    pub fn results(&self) -> &[(EnvId, Result<RunReport>)] {
        &self.results
    }

    /// The environments whose run failed outright.
    pub fn failures(&self) -> impl Iterator<Item = (EnvId, &Error)> {
        self.results
            .iter()
            .filter_map(|(id, result)| Some((*id, result.as_ref().err()?)))
    }
}

/// Runs many independent environments concurrently.
///
/// Each environment is simulated with its current parameter values at its
/// nominal corner.
#[derive(Debug, Default)]
pub struct EnvironmentPool {
    envs: Vec<Environment>,
}

impl EnvironmentPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an environment to the pool.
    pub fn add(&mut self, env: Environment) -> EnvId {
        self.envs.push(env);
        EnvId(self.envs.len() - 1)
    }

    /// The number of environments in the pool.
    pub fn len(&self) -> usize {
        self.envs.len()
    }

    /// Returns `true` if the pool is empty.
    pub fn is_empty(&self) -> bool {
        self.envs.is_empty()
    }

    /// Looks up an environment.
    pub fn get(&self, id: EnvId) -> Option<&Environment> {
        self.envs.get(id.0)
    }

    /// Mutably looks up an environment, for example to set its parameters.
    pub fn get_mut(&mut self, id: EnvId) -> Option<&mut Environment> {
        self.envs.get_mut(id.0)
    }

    /// Iterates over the environments in insertion order.
    pub fn environments(&self) -> impl Iterator<Item = (EnvId, &Environment)> {
        self.envs.iter().enumerate().map(|(i, env)| (EnvId(i), env))
    }

    /// Consumes the pool, returning its environments.
    pub fn into_environments(self) -> Vec<Environment> {
        self.envs
    }

    /// Simulates every environment with at most `max_parallel` running at once.
    ///
    /// A `max_parallel` of zero is treated as one. Returns once every
    /// environment has finished; the failure of one environment does not
    /// affect the others.
    pub fn execute(&mut self, max_parallel: usize) -> BatchReport {
        let n = self.envs.len();
        let workers = max_parallel.clamp(1, n.max(1));
        tracing::debug!(environments = n, workers, "executing batch");

        let (job_tx, job_rx) = crossbeam_channel::unbounded();
        for job in self.envs.iter_mut().enumerate() {
            // The receiver outlives this loop.
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        std::thread::scope(|s| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                s.spawn(move || {
                    for (i, env) in job_rx.iter() {
                        let result = panic::catch_unwind(AssertUnwindSafe(|| env.simulate()))
                            .unwrap_or_else(|_| {
                                tracing::error!(environment = %env.name(), "environment panicked");
                                Err(Error::Panic)
                            });
                        if result_tx.send((i, result)).is_err() {
                            break;
                        }
                    }
                });
            }
        });
        drop(result_tx);

        let mut results: Vec<Option<Result<RunReport>>> = (0..n).map(|_| None).collect();
        for (i, result) in result_rx.iter() {
            results[i] = Some(result);
        }
        BatchReport {
            results: results
                .into_iter()
                .enumerate()
                .map(|(i, result)| (EnvId(i), result.unwrap_or(Err(Error::Panic))))
                .collect(),
        }
    }

    /// Simulates every environment, all at once.
    pub fn execute_all(&mut self) -> BatchReport {
        self.execute(self.envs.len())
    }
}
