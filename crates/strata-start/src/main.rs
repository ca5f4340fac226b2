mod daemon;
mod ldso;
mod runner;
mod selector;


use std::path::Path;

use anyhow::Result;
use strata_core::{bind_mount_if_needed, mkdir_p, path_is_writable, SystemsLayout};
use tracing::{error, info};

use crate::runner::SupervisorExit;

const WRITABLE_BACKING_DIR: &str = "/mnt/flash/strata";
const HOME_BACKING_DIR: &str = "/mnt/flash/home";
const HOME_DIR: &str = "/home";
const HOME_ROOT_DIR: &str = "/home/root";
const DAEMONIZE_TIMEOUT_MS: u64 = 5_000;

fn main() {
    let subscriber = tracing_subscriber::fmt().with_ansi(false).finish();
    tracing::subscriber::set_global_default(subscriber).ok();

    let layout = SystemsLayout::default_device();
    if let Err(err) = run(&layout) {
        error!("boot selector failed: {err:#}");
        std::process::exit(1);
    }
}

fn run(layout: &SystemsLayout) -> Result<()> {
    let read_only = layout.read_only_marker_path().exists();
    if read_only {
        info!("factory image is marked read-only, running in place");
    }

    if !read_only {
        bind_mount_if_needed(Path::new(WRITABLE_BACKING_DIR), layout.writable_root())?;
        bind_mount_if_needed(Path::new(HOME_BACKING_DIR), Path::new(HOME_DIR))?;
    }
    if path_is_writable(Path::new(HOME_DIR)) {
        mkdir_p(Path::new(HOME_ROOT_DIR))?;
    }

    daemon::daemonize(DAEMONIZE_TIMEOUT_MS)?;

    let mut last_exit = SupervisorExit::Failed;
    loop {
        if !read_only {
            selector::select_and_prepare(layout)?;
        }

        match runner::run_cycle(layout, last_exit)? {
            SupervisorExit::Stopped => {
                info!("framework stopped");
                return Ok(());
            }
            SupervisorExit::Failed => {
                runner::fault_reboot()?;
            }
            exit => last_exit = exit,
        }
    }
}
