use std::fs;
use std::io;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use strata_core::{copy_dir_recursive, make_symlink, mkdir_p, SystemsLayout};
use tracing::{error, warn};

pub fn install_factory_apps(layout: &SystemsLayout, previous_index: Option<u32>) {
    install_factory_apps_with_hook(layout, previous_index, &mut default_writable_update);
}

pub fn install_factory_apps_with_hook<UpdateWritable>(
    layout: &SystemsLayout,
    previous_index: Option<u32>,
    update_writable: &mut UpdateWritable,
) where
    UpdateWritable: FnMut(&SystemsLayout, &str, &str) -> Result<()>,
{
    if let Err(err) = mkdir_p(&layout.app_store_dir()) {
        error!("failed to create the app store: {err:#}");
        return;
    }

    let apps_dir = layout.factory_apps_dir();
    let entries = match fs::read_dir(&apps_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return,
        Err(err) => {
            error!("cannot open {}: {err}", apps_dir.display());
            return;
        }
    };

    for entry in entries.flatten() {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }

        if let Err(err) = set_up_app_with_hook(layout, name, previous_index, &mut *update_writable)
        {
            error!("failed to stage app '{name}': {err:#}");
        }
    }
}

pub fn set_up_app(layout: &SystemsLayout, app_name: &str, previous_index: Option<u32>) -> Result<()> {
    set_up_app_with_hook(layout, app_name, previous_index, &mut default_writable_update)
}

pub fn set_up_app_with_hook<UpdateWritable>(
    layout: &SystemsLayout,
    app_name: &str,
    previous_index: Option<u32>,
    update_writable: &mut UpdateWritable,
) -> Result<()>
where
    UpdateWritable: FnMut(&SystemsLayout, &str, &str) -> Result<()>,
{
    let hash = app_hash_from_link(&layout.factory_app_link(app_name))?;

    let store_entry = layout.app_store_entry(&hash);
    make_symlink(&store_entry, &layout.unpack_apps_dir().join(app_name))?;
    if !store_entry.is_dir() {
        make_symlink(&layout.factory_app_store_entry(&hash), &store_entry)?;
    }

    match previous_index {
        Some(index) => import_writable_from_system(layout, index, app_name),
        None => import_writable_from_legacy(layout, app_name),
    }

    update_writable(layout, &hash, app_name)
        .with_context(|| format!("app writable update hook failed for '{app_name}'"))?;
    Ok(())
}

fn app_hash_from_link(link: &Path) -> Result<String> {
    let target = fs::read_link(link)
        .with_context(|| format!("failed to read app symlink {}", link.display()))?;
    let hash = target
        .file_name()
        .and_then(|value| value.to_str())
        .ok_or_else(|| anyhow!("app symlink {} has no hash component", link.display()))?;
    Ok(hash.to_string())
}

fn import_writable_from_system(layout: &SystemsLayout, previous_index: u32, app_name: &str) {
    let src = layout
        .system_writable_dir(&previous_index.to_string())
        .join(app_name);
    if !src.is_dir() {
        return;
    }

    let dst = layout.unpack_writable_dir().join(app_name);
    if let Err(err) = copy_dir_recursive(&src, &dst) {
        warn!("failed to import writable files for app '{app_name}': {err:#}");
    }
}

fn import_writable_from_legacy(layout: &SystemsLayout, app_name: &str) {
    let src = layout.legacy_app_dir(app_name);
    if !src.is_dir() {
        return;
    }

    let dst = layout.unpack_writable_dir().join(app_name);
    if let Err(err) = copy_dir_recursive(&src, &dst) {
        warn!("failed to harvest legacy writable files for app '{app_name}': {err:#}");
    }
}

pub fn default_writable_update(
    layout: &SystemsLayout,
    _app_hash: &str,
    app_name: &str,
) -> Result<()> {
    mkdir_p(&layout.unpack_writable_dir().join(app_name))
}
