use std::fs;

use anyhow::Result;
use strata_core::{
    copy_dir_recursive, copy_file, entry_is_dir, make_symlink, mkdir_p, read_file,
    recursive_delete, rename_replacing, sync_filesystems, try_lazy_unmount, write_file,
    SystemStatus, SystemsLayout, CURRENT_SYSTEM, UNPACK_SYSTEM,
};
use tracing::{error, info, warn};

use crate::apps;

const SYSTEM_IMAGE_LINKS: [&str; 3] = ["bin", "lib", "modules"];
const FACTORY_CONFIG_FILES: [&str; 3] = ["apps.cfg", "users.cfg", "modules.cfg"];

const LDCONFIG_REQUESTED: &str = "need_ldconfig";

pub fn should_install_golden(layout: &SystemsLayout, newest: Option<u32>) -> bool {
    if newest.is_none() {
        info!("no systems are installed yet");
        return true;
    }

    let installed = read_file(&layout.installed_version_marker_path())
        .ok()
        .flatten()
        .unwrap_or_default();

    let factory = match read_file(&layout.factory_version_path()) {
        Ok(Some(version)) if !version.is_empty() => version,
        _ => {
            error!(
                "factory image at {} is malformed, ignoring it",
                layout.factory_root().display()
            );
            return false;
        }
    };

    if installed == factory {
        info!("factory image is already installed");
        false
    } else {
        info!("factory image is new, installing it");
        true
    }
}

pub fn install_golden(
    layout: &SystemsLayout,
    newest: Option<u32>,
    current: Option<u32>,
) -> Result<u32> {
    install_golden_with_hook(layout, newest, current, apps::default_writable_update)
}

pub fn install_golden_with_hook<UpdateWritable>(
    layout: &SystemsLayout,
    newest: Option<u32>,
    current: Option<u32>,
    mut update_writable: UpdateWritable,
) -> Result<u32>
where
    UpdateWritable: FnMut(&SystemsLayout, &str, &str) -> Result<()>,
{
    let golden_index = newest.map_or(0, |index| index + 1);
    recursive_delete(&layout.indexed_system_dir(golden_index));

    if let Some(index) = current {
        try_lazy_unmount(&layout.current_system_dir());
        rename_replacing(
            &layout.current_system_dir(),
            &layout.indexed_system_dir(index),
        )?;
    }

    build_unpack_from_factory(layout, golden_index)?;

    if let Some(index) = newest {
        import_config_trees(layout, index, None);
    }

    apps::install_factory_apps_with_hook(layout, newest, &mut update_writable);

    rename_replacing(&layout.unpack_dir(), &layout.current_system_dir())?;

    delete_all_but_current(layout);
    request_ld_cache_refresh(layout);

    sync_filesystems();
    mark_install_complete(layout);

    info!("installed the factory system as index {golden_index}");
    Ok(golden_index)
}

fn build_unpack_from_factory(layout: &SystemsLayout, index: u32) -> Result<()> {
    mkdir_p(&layout.systems_dir())?;
    mkdir_p(&layout.unpack_dir())?;
    mkdir_p(&layout.unpack_config_dir())?;
    mkdir_p(&layout.unpack_apps_dir())?;
    mkdir_p(&layout.unpack_writable_dir())?;

    for name in SYSTEM_IMAGE_LINKS {
        make_symlink(
            &layout.factory_system_dir().join(name),
            &layout.unpack_dir().join(name),
        )?;
    }
    for name in FACTORY_CONFIG_FILES {
        make_symlink(
            &layout.factory_config_dir().join(name),
            &layout.unpack_config_dir().join(name),
        )?;
    }

    copy_file(
        &layout.factory_version_path(),
        &layout.unpack_dir().join("version"),
    )?;
    copy_file(
        &layout.factory_info_path(),
        &layout.unpack_dir().join("info.properties"),
    )?;

    write_file(
        &layout.system_index_path(UNPACK_SYSTEM),
        index.to_string().as_bytes(),
    )?;
    write_file(
        &layout.system_status_path(UNPACK_SYSTEM),
        SystemStatus::Good.emit().as_bytes(),
    )?;
    Ok(())
}

pub fn import_config_trees(layout: &SystemsLayout, old_index: u32, dest_index: Option<u32>) {
    let src = layout.indexed_config_dir(old_index);
    let dst = match dest_index {
        Some(index) => layout.indexed_config_dir(index),
        None => layout.unpack_config_dir(),
    };
    if let Err(err) = copy_dir_recursive(&src, &dst) {
        warn!("failed to import configuration from system {old_index}: {err:#}");
    }
}

pub fn delete_all_but_current(layout: &SystemsLayout) {
    if layout.legacy_root().is_dir() {
        recursive_delete(layout.legacy_root());
    }

    let systems_dir = layout.systems_dir();
    let entries = match fs::read_dir(&systems_dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!("cannot open {}: {err}", systems_dir.display());
            return;
        }
    };

    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if name.starts_with('.') || name == CURRENT_SYSTEM || !entry_is_dir(&entry) {
            continue;
        }

        let path = entry.path();
        try_lazy_unmount(&path);
        recursive_delete(&path);
    }
}

pub fn request_ld_cache_refresh(layout: &SystemsLayout) {
    if let Err(err) = write_file(&layout.ldconfig_marker_path(), LDCONFIG_REQUESTED.as_bytes()) {
        warn!("failed to request a linker cache refresh: {err:#}");
    }
}

pub fn mark_install_complete(layout: &SystemsLayout) {
    if let Err(err) = copy_file(
        &layout.factory_version_path(),
        &layout.installed_version_marker_path(),
    ) {
        error!("failed to record the installed factory version: {err:#}");
    }
}
