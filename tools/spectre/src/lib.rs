//! Spectre backend for ace characterization environments.
//!
//! [`Spectre`] implements [`ace::SessionFactory`]: every corner of an
//! environment gets a [`SpectreSession`] that drives one long-lived
//! `spectre +interactive=skill` process, so parameter changes do not require
//! re-reading the netlist.
#![warn(missing_docs)]

use std::fmt::Display;
#[cfg(any(unix, target_os = "redox"))]
use std::os::unix::prelude::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;

use ace::{BoxError, SessionFactory, SessionRequest, SimSession};
use arcstr::ArcStr;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use templates::{SessionScriptContext, write_session_script};

pub mod error;
pub mod session;
pub mod skill;
pub(crate) mod templates;

#[cfg(test)]
mod tests;

pub use error::{Error, Result};
pub use session::SpectreSession;

/// Rawfile formats Spectre can write that can be read back.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
pub enum Format {
    /// ASCII nutmeg.
    NutAscii,
    /// Binary nutmeg.
    #[default]
    NutBin,
}

impl Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::NutAscii => write!(f, "nutascii"),
            Self::NutBin => write!(f, "nutbin"),
        }
    }
}

/// Spectre simulator configuration.
///
/// Sessions are created in `<root_dir>/<session name>`.
#[derive(Debug, Clone, Builder)]
pub struct Spectre {
    /// The root of all session working directories.
    #[builder(setter(into))]
    root_dir: PathBuf,
    /// The Spectre executable.
    #[builder(setter(into), default = "PathBuf::from(\"spectre\")")]
    binary: PathBuf,
    /// Extra command line flags.
    #[builder(setter(into), default)]
    flags: String,
    /// A shell script sourced before starting Spectre, e.g. to set up licensing.
    #[builder(setter(into, strip_option), default)]
    prelude: Option<PathBuf>,
    /// The rawfile format.
    #[builder(default)]
    format: Format,
    /// Sessions idle for longer than this are restarted before their next command.
    #[builder(setter(strip_option), default)]
    idle_timeout: Option<Duration>,
    /// The longest time to wait for a reply to a single command.
    #[builder(setter(strip_option), default)]
    command_timeout: Option<Duration>,
}

impl Spectre {
    /// Returns a new [`SpectreBuilder`].
    #[inline]
    pub fn builder() -> SpectreBuilder {
        SpectreBuilder::default()
    }

    /// A configuration with default settings rooted at `root_dir`.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            binary: PathBuf::from("spectre"),
            flags: String::new(),
            prelude: None,
            format: Format::default(),
            idle_timeout: None,
            command_timeout: None,
        }
    }

    /// The root of all session working directories.
    pub fn root_dir(&self) -> &PathBuf {
        &self.root_dir
    }

    /// Prepares the working directory and run script of a session.
    ///
    /// The simulator itself is started on first use.
    pub fn session(&self, request: SessionRequest<'_>) -> Result<SpectreSession> {
        let work_dir = self.root_dir.join(request.name);
        let raw_dir = work_dir.join("raw");
        std::fs::create_dir_all(&raw_dir)?;

        let script = work_dir.join("session.sh");
        let format = self.format.to_string();
        write_session_script(
            SessionScriptContext {
                binary: &self.binary,
                netlist: request.netlist,
                raw_dir: &raw_dir,
                log_path: &work_dir.join("spectre.log"),
                include_dirs: request.include_dirs,
                prelude: self.prelude.as_deref(),
                format: &format,
                flags: &self.flags,
            },
            &script,
        )?;

        let mut perms = std::fs::metadata(&script)?.permissions();
        #[cfg(any(unix, target_os = "redox"))]
        perms.set_mode(0o744);
        std::fs::set_permissions(&script, perms)?;

        tracing::debug!(session = request.name, ?work_dir, "prepared Spectre session");
        Ok(SpectreSession::new(
            ArcStr::from(request.name),
            work_dir,
            script,
            self.idle_timeout,
            self.command_timeout,
        ))
    }
}

impl SessionFactory for Spectre {
    fn create(&self, request: SessionRequest<'_>) -> std::result::Result<Box<dyn SimSession>, BoxError> {
        Ok(Box::new(self.session(request)?))
    }
}
