use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use serde::Serialize;
use tera::{Context, Tera};

pub(crate) const TEMPLATES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/templates");

lazy_static! {
    pub(crate) static ref TEMPLATES: Tera = {
        match Tera::new(&format!("{TEMPLATES_PATH}/*")) {
            Ok(t) => t,
            Err(e) => {
                panic!("Encountered errors while parsing Tera templates: {e}");
            }
        }
    };
}

#[derive(Debug, Copy, Clone, Serialize)]
pub(crate) struct SessionScriptContext<'a> {
    pub(crate) binary: &'a Path,
    pub(crate) netlist: &'a Path,
    pub(crate) raw_dir: &'a Path,
    pub(crate) log_path: &'a Path,
    pub(crate) include_dirs: &'a [PathBuf],
    pub(crate) prelude: Option<&'a Path>,
    pub(crate) format: &'a str,
    pub(crate) flags: &'a str,
}

pub(crate) fn write_session_script(
    ctx: SessionScriptContext,
    path: impl AsRef<Path>,
) -> crate::error::Result<()> {
    let ctx = Context::from_serialize(ctx)?;
    let mut f = std::fs::File::create(path.as_ref())?;
    TEMPLATES.render_to("session.sh", &ctx, &mut f)?;

    Ok(())
}
