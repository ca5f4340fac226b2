use anyhow::{bail, Result};
use strata_core::{
    newest_non_bad, read_system_index, recursive_delete, rename_replacing, system_status,
    try_lazy_unmount, SystemStatus, SystemsLayout, CURRENT_SYSTEM,
};
use strata_installer::{
    import_config_trees, install_golden, request_ld_cache_refresh, should_install_golden,
};
use tracing::info;

use crate::ldso;

pub fn select_and_prepare(layout: &SystemsLayout) -> Result<()> {
    select_and_prepare_with(layout, ldso::refresh_cache)
}

pub fn select_and_prepare_with<RefreshLdCache>(
    layout: &SystemsLayout,
    mut refresh_ld_cache: RefreshLdCache,
) -> Result<()>
where
    RefreshLdCache: FnMut(&SystemsLayout),
{
    recursive_delete(&layout.unpack_dir());
    recursive_delete(&layout.app_store_unpack_dir());

    let newest = newest_non_bad(layout);
    let current = read_system_index(layout, CURRENT_SYSTEM);
    if let Some(index) = current {
        info!("the previous current system has index {index}");
    }

    if should_install_golden(layout, newest) {
        install_golden(layout, newest, current)?;
    } else if newest != current {
        let Some(newest_index) = newest else {
            bail!("no bootable system exists and the factory image is not installable");
        };
        if let Some(current_index) = current {
            demote_current(layout, current_index, newest_index)?;
        }
        promote_to_current(layout, newest_index)?;
    }

    if layout.ldconfig_marker_path().is_file() {
        refresh_ld_cache(layout);
    }

    Ok(())
}

fn demote_current(layout: &SystemsLayout, current_index: u32, newest_index: u32) -> Result<()> {
    try_lazy_unmount(&layout.current_system_dir());
    let status = system_status(layout, CURRENT_SYSTEM);

    let demoted = layout.indexed_system_dir(current_index);
    rename_replacing(&layout.current_system_dir(), &demoted)?;

    match status {
        SystemStatus::Bad => recursive_delete(&demoted),
        SystemStatus::Tryable { .. } => {
            import_config_trees(layout, current_index, Some(newest_index));
            recursive_delete(&demoted);
        }
        SystemStatus::Good => import_config_trees(layout, current_index, Some(newest_index)),
    }
    Ok(())
}

pub fn promote_to_current(layout: &SystemsLayout, index: u32) -> Result<()> {
    info!("selecting system {index}");

    let path = layout.indexed_system_dir(index);
    try_lazy_unmount(&path);
    rename_replacing(&path, &layout.current_system_dir())?;

    request_ld_cache_refresh(layout);
    Ok(())
}
