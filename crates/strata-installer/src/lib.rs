mod apps;
mod golden;

pub use apps::{
    default_writable_update, install_factory_apps, install_factory_apps_with_hook, set_up_app,
    set_up_app_with_hook,
};
pub use golden::{
    delete_all_but_current, import_config_trees, install_golden, install_golden_with_hook,
    mark_install_complete, request_ld_cache_refresh, should_install_golden,
};

#[cfg(test)]
mod tests;
