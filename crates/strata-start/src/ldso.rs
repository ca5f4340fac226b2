use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{anyhow, Context, Result};
use strata_core::{remove_file_if_exists, write_file, SystemsLayout};
use tracing::warn;

const LD_SO_CONF_PATH: &str = "/etc/ld.so.conf";
const LDCONFIG_RUNNING: &str = "start_ldconfig";

pub fn refresh_cache(layout: &SystemsLayout) {
    refresh_cache_with(layout, Path::new(LD_SO_CONF_PATH), run_ldconfig);
}

pub fn refresh_cache_with<RunLdconfig>(
    layout: &SystemsLayout,
    conf_path: &Path,
    mut run_ldconfig: RunLdconfig,
) where
    RunLdconfig: FnMut() -> Result<()>,
{
    if let Err(err) = write_file(&layout.ldconfig_marker_path(), LDCONFIG_RUNNING.as_bytes()) {
        warn!("failed to update the linker cache marker: {err:#}");
    }

    let conf = format!("{}\n", layout.current_system_dir().join("lib").display());
    if let Err(err) = write_file(conf_path, conf.as_bytes()) {
        warn!("failed to write {}: {err:#}", conf_path.display());
    }

    match run_ldconfig() {
        Ok(()) => {
            if let Err(err) = remove_file_if_exists(&layout.ldconfig_marker_path()) {
                warn!("failed to clear the linker cache marker: {err:#}");
            }
        }
        Err(err) => warn!("linker cache refresh failed: {err:#}"),
    }
}

fn run_ldconfig() -> Result<()> {
    let status = Command::new("ldconfig")
        .stdout(Stdio::null())
        .status()
        .context("failed to run ldconfig")?;
    if !status.success() {
        return Err(anyhow!("ldconfig exited with {status}"));
    }
    Ok(())
}
