use std::fs;
use std::io;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::fsio;
use crate::layout::{SystemsLayout, CURRENT_SYSTEM, UNPACK_SYSTEM};
use crate::status::SystemStatus;

pub fn read_system_index(layout: &SystemsLayout, name: &str) -> Option<u32> {
    let path = layout.system_index_path(name);
    let raw = match fsio::read_file(&path) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(err) => {
            warn!("failed to read {}: {err:#}", path.display());
            return None;
        }
    };

    match raw.trim().parse::<u32>() {
        Ok(index) => Some(index),
        Err(_) => {
            warn!("invalid system index '{}' in {}", raw.trim(), path.display());
            None
        }
    }
}

pub fn system_status(layout: &SystemsLayout, name: &str) -> SystemStatus {
    let path = layout.system_status_path(name);
    match fsio::read_file(&path) {
        Ok(Some(raw)) => {
            let status = SystemStatus::parse(&raw);
            info!("status of system '{name}' is '{}'", raw.trim_end());
            status
        }
        Ok(None) => {
            info!("system '{name}' is new");
            SystemStatus::Tryable { tries: 0 }
        }
        Err(err) => {
            warn!("failed to read the status of system '{name}': {err:#}");
            SystemStatus::Bad
        }
    }
}

pub fn newest_non_bad(layout: &SystemsLayout) -> Option<u32> {
    let systems_dir = layout.systems_dir();
    let entries = match fs::read_dir(&systems_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            info!("no systems exist yet in {}", systems_dir.display());
            return None;
        }
        Err(err) => {
            warn!("cannot open {}: {err}", systems_dir.display());
            return None;
        }
    };

    let mut newest = None;
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("failed to read an entry of {}: {err}", systems_dir.display());
                continue;
            }
        };

        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if name.starts_with('.') || name == UNPACK_SYSTEM || !fsio::entry_is_dir(&entry) {
            continue;
        }

        let Some(index) = read_system_index(layout, name) else {
            continue;
        };
        match system_status(layout, name) {
            SystemStatus::Bad => warn!("system '{name}' is bad"),
            SystemStatus::Good | SystemStatus::Tryable { .. } => {
                if newest.map_or(true, |best| index > best) {
                    newest = Some(index);
                }
            }
        }
    }
    newest
}

pub fn write_current_status(layout: &SystemsLayout, status: SystemStatus) -> Result<()> {
    let path = layout.system_status_path(CURRENT_SYSTEM);
    fsio::write_file(&path, status.emit().as_bytes())
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
