use std::ffi::CString;
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::fsio;

const MOUNT_TABLE_PATH: &str = "/proc/self/mounts";

fn path_cstring(path: &Path) -> Result<CString> {
    CString::new(path.as_os_str().as_bytes())
        .with_context(|| format!("path contains a NUL byte: {}", path.display()))
}

pub fn try_lazy_unmount(path: &Path) {
    let target = match path_cstring(path) {
        Ok(target) => target,
        Err(err) => {
            warn!("cannot unmount: {err:#}");
            return;
        }
    };

    if unsafe { libc::umount2(target.as_ptr(), libc::MNT_DETACH) } == 0 {
        debug!("lazily unmounted {}", path.display());
        return;
    }

    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::EINVAL) | Some(libc::ENOENT) => {}
        _ => warn!("failed to lazily unmount {}: {err}", path.display()),
    }
}

pub fn is_mount_point(path: &Path) -> Result<bool> {
    let table = fs::read_to_string(MOUNT_TABLE_PATH)
        .with_context(|| format!("failed to read {MOUNT_TABLE_PATH}"))?;
    Ok(mount_table_lists(&table, path))
}

pub(crate) fn mount_table_lists(table: &str, target: &Path) -> bool {
    let target = target.to_string_lossy();
    table
        .lines()
        .any(|line| line.split_whitespace().nth(1) == Some(target.as_ref()))
}

pub fn bind_mount_if_needed(src: &Path, dst: &Path) -> Result<()> {
    let mounted = is_mount_point(dst).unwrap_or_else(|err| {
        warn!("cannot consult the mount table: {err:#}");
        false
    });
    if mounted {
        debug!("{} is already mounted", dst.display());
        return Ok(());
    }

    fsio::mkdir_p(src)?;

    let source = path_cstring(src)?;
    let target = path_cstring(dst)?;
    let rc = unsafe {
        libc::mount(
            source.as_ptr(),
            target.as_ptr(),
            std::ptr::null(),
            libc::MS_BIND,
            std::ptr::null(),
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error()).with_context(|| {
            format!("failed to bind mount {} at {}", src.display(), dst.display())
        });
    }
    Ok(())
}

pub fn path_is_writable(path: &Path) -> bool {
    let Ok(target) = path_cstring(path) else {
        return false;
    };
    unsafe { libc::access(target.as_ptr(), libc::W_OK) == 0 }
}
