use std::fs;
use std::io::{self, Write};
use std::os::unix::fs as unix_fs;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::warn;

pub fn ensure_path_within_limit(path: &Path) -> Result<()> {
    let len = path.as_os_str().len();
    if len >= libc::PATH_MAX as usize {
        bail!("path exceeds PATH_MAX ({len} bytes): {}", path.display());
    }
    Ok(())
}

pub fn write_file(path: &Path, bytes: &[u8]) -> Result<usize> {
    ensure_path_within_limit(path)?;
    let mut file =
        fs::File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(bytes.len())
}

pub fn read_file(path: &Path) -> Result<Option<String>> {
    ensure_path_within_limit(path)?;
    match fs::read_to_string(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

pub fn remove_file_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
    }
}

pub fn copy_file(src: &Path, dst: &Path) -> Result<u64> {
    ensure_path_within_limit(src)?;
    ensure_path_within_limit(dst)?;
    fs::copy(src, dst)
        .with_context(|| format!("failed to copy {} to {}", src.display(), dst.display()))
}

pub fn mkdir_p(path: &Path) -> Result<()> {
    ensure_path_within_limit(path)?;
    fs::create_dir_all(path).with_context(|| format!("failed to create {}", path.display()))
}

pub fn make_symlink(target: &Path, link: &Path) -> Result<()> {
    ensure_path_within_limit(link)?;
    unix_fs::symlink(target, link).with_context(|| {
        format!(
            "failed to create symlink {} -> {}",
            link.display(),
            target.display()
        )
    })
}

pub fn entry_is_dir(entry: &fs::DirEntry) -> bool {
    entry
        .file_type()
        .map(|file_type| file_type.is_dir())
        .unwrap_or(false)
}

pub fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    mkdir_p(dst)?;
    for entry in fs::read_dir(src).with_context(|| format!("failed to read {}", src.display()))? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let metadata = fs::symlink_metadata(&src_path)
            .with_context(|| format!("failed to stat {}", src_path.display()))?;
        if metadata.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
            continue;
        }

        remove_file_if_exists(&dst_path)?;
        if metadata.file_type().is_symlink() {
            let target = fs::read_link(&src_path)
                .with_context(|| format!("failed to read symlink {}", src_path.display()))?;
            make_symlink(&target, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path).with_context(|| {
                format!(
                    "failed to copy {} to {}",
                    src_path.display(),
                    dst_path.display()
                )
            })?;
        }
    }
    Ok(())
}

pub fn rename_replacing(src: &Path, dst: &Path) -> Result<()> {
    ensure_path_within_limit(src)?;
    ensure_path_within_limit(dst)?;
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(err) if destination_is_occupied_dir(&err) => {
            warn!("destination {} exists, deleting it", dst.display());
            recursive_delete(dst);
            fs::rename(src, dst).with_context(|| {
                format!("failed to rename {} to {}", src.display(), dst.display())
            })
        }
        Err(err) => Err(err)
            .with_context(|| format!("failed to rename {} to {}", src.display(), dst.display())),
    }
}

fn destination_is_occupied_dir(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::ENOTEMPTY) | Some(libc::EEXIST) | Some(libc::EISDIR)
    )
}

pub fn recursive_delete(path: &Path) {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return,
        Err(err) => {
            warn!("failed to stat {}: {err}", path.display());
            return;
        }
    };

    if !metadata.is_dir() {
        if let Err(err) = fs::remove_file(path) {
            warn!("failed to remove {}: {err}", path.display());
        }
        return;
    }

    if let Err(err) = delete_tree(path, metadata.dev()) {
        warn!("failed to recursively delete {}: {err:#}", path.display());
    }
}

fn delete_tree(path: &Path, device: u64) -> Result<()> {
    for entry in fs::read_dir(path).with_context(|| format!("failed to read {}", path.display()))? {
        let entry = entry?;
        let child = entry.path();
        let metadata = fs::symlink_metadata(&child)
            .with_context(|| format!("failed to stat {}", child.display()))?;
        if metadata.is_dir() {
            if metadata.dev() != device {
                warn!(
                    "not deleting {}: it is on a different filesystem",
                    child.display()
                );
                continue;
            }
            delete_tree(&child, device)?;
        } else {
            fs::remove_file(&child)
                .with_context(|| format!("failed to remove {}", child.display()))?;
        }
    }
    fs::remove_dir(path).with_context(|| format!("failed to remove {}", path.display()))
}

pub fn sync_filesystems() {
    unsafe { libc::sync() };
}
