//! Process/voltage/temperature corners of a circuit.

use std::path::{Path, PathBuf};

use arcstr::ArcStr;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The name of the implicit corner of circuits that declare no corners.
pub const DEFAULT_CORNER: &str = "nom";

/// The netlist file name of the implicit corner.
pub const DEFAULT_NETLIST: &str = "input.scs";

/// A corner as declared in `properties.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CornerDecl {
    /// The corner netlist, relative to the circuit directory.
    pub netlist: PathBuf,
    /// Marks the corner as the nominal corner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nominal: Option<bool>,
}

/// A named simulation corner with its own netlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Corner {
    name: ArcStr,
    netlist: PathBuf,
}

impl Corner {
    /// The corner name.
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// The absolute path of the corner netlist.
    pub fn netlist(&self) -> &Path {
        &self.netlist
    }
}

/// The corners of a circuit, with exactly one nominal corner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CornerRegistry {
    corners: IndexMap<ArcStr, Corner>,
    nominal: ArcStr,
    declared: bool,
}

impl CornerRegistry {
    /// The single implicit corner of a circuit directory without declared corners.
    pub fn implicit(circuit_dir: impl AsRef<Path>) -> Self {
        let name = ArcStr::from(DEFAULT_CORNER);
        let corner = Corner {
            name: name.clone(),
            netlist: circuit_dir.as_ref().join(DEFAULT_NETLIST),
        };
        Self {
            corners: IndexMap::from([(name.clone(), corner)]),
            nominal: name,
            declared: false,
        }
    }

    /// Builds the registry from declared corners.
    ///
    /// The first declared corner is nominal unless another one is flagged
    /// `nominal`; when several are flagged, the last flagged corner wins.
    /// No declarations yield the implicit corner.
    pub fn from_decls<'a>(
        circuit_dir: impl AsRef<Path>,
        decls: impl IntoIterator<Item = (&'a ArcStr, &'a CornerDecl)>,
    ) -> Self {
        let circuit_dir = circuit_dir.as_ref();
        let mut corners = IndexMap::new();
        let mut nominal = None;
        for (name, decl) in decls {
            if decl.nominal == Some(true) {
                if let Some(prev) = nominal.replace(name.clone()) {
                    tracing::warn!(%prev, corner = %name, "multiple nominal corners declared");
                }
            }
            corners.insert(
                name.clone(),
                Corner {
                    name: name.clone(),
                    netlist: circuit_dir.join(&decl.netlist),
                },
            );
        }
        let Some(first) = corners.keys().next().cloned() else {
            return Self::implicit(circuit_dir);
        };
        Self {
            corners,
            nominal: nominal.unwrap_or(first),
            declared: true,
        }
    }

    /// Returns `true` if the corners were declared rather than implicit.
    pub fn is_declared(&self) -> bool {
        self.declared
    }

    /// The nominal corner.
    pub fn nominal(&self) -> &Corner {
        &self.corners[&self.nominal]
    }

    /// Looks up a corner by name.
    pub fn get(&self, name: &str) -> Option<&Corner> {
        self.corners.get(name)
    }

    /// The number of corners.
    pub fn len(&self) -> usize {
        self.corners.len()
    }

    /// Always `false`; a registry holds at least the nominal corner.
    pub fn is_empty(&self) -> bool {
        self.corners.is_empty()
    }

    /// The corner names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &ArcStr> {
        self.corners.keys()
    }

    /// All corners in declaration order.
    pub fn corners(&self) -> impl Iterator<Item = &Corner> {
        self.corners.values()
    }

    /// Resolves a corner request into declared corner names.
    ///
    /// An empty request means the nominal corner. Duplicates are dropped,
    /// keeping first occurrence order.
    pub fn resolve<S: AsRef<str>>(&self, requested: &[S]) -> Result<Vec<ArcStr>> {
        if requested.is_empty() {
            return Ok(vec![self.nominal.clone()]);
        }
        let mut out: Vec<ArcStr> = Vec::with_capacity(requested.len());
        for name in requested {
            let name = name.as_ref();
            let corner = self
                .corners
                .get(name)
                .ok_or_else(|| Error::UnknownCorner(name.into()))?;
            if !out.contains(&corner.name) {
                out.push(corner.name.clone());
            }
        }
        Ok(out)
    }

    /// Checks that every corner netlist exists.
    pub fn check_netlists(&self) -> Result<()> {
        for corner in self.corners.values() {
            if !corner.netlist.is_file() {
                return Err(Error::missing_path(
                    &format!("netlist of corner `{}`", corner.name),
                    &corner.netlist,
                ));
            }
        }
        Ok(())
    }
}
