//! Analog circuit characterization environments.
//!
//! An [`Environment`] wraps a parametrized circuit: its design parameters,
//! its process/voltage/temperature corners and the performance metrics to
//! extract. Running an environment pushes the current parameter values to one
//! simulator session per requested corner, runs all corners concurrently and
//! reduces the resulting plots to a table of metrics per corner.
//!
//! Simulators are plugged in through the [`SessionFactory`] and [`SimSession`]
//! traits.
#![warn(missing_docs)]

pub mod config;
pub mod corner;
pub mod env;
pub mod error;
pub mod handles;
pub mod param;
pub mod perf;
pub mod pool;
pub mod props;
pub mod session;
pub mod status;


pub use config::EnvironmentOptions;
pub use corner::{Corner, CornerRegistry};
pub use env::Environment;
pub use error::{BoxError, Error, Result, SessionError};
pub use handles::{Handle, HandleTable};
pub use param::{Parameter, ParameterSet, Sample};
pub use perf::{CircuitKind, Extractor, MetricTable, PerformanceTable, ResultReducer};
pub use pool::{BatchReport, EnvId, EnvironmentPool};
pub use props::CircuitProperties;
pub use session::{
    CornerOutcome, RunReport, SessionFactory, SessionOrchestrator, SessionRequest, SessionState,
    SimSession,
};
pub use status::Status;
