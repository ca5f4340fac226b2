use std::fs::File;
use std::io;
use std::os::unix::io::AsRawFd;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{Command, ExitStatus};

use anyhow::{bail, Context, Result};
use strata_core::{
    sync_filesystems, system_status, write_current_status, SystemStatus, SystemsLayout,
    CURRENT_SYSTEM,
};
use tracing::{error, info, warn};

const CONSOLE_PATH: &str = "/dev/console";
const SYSLOG_TAIL_LINES: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    Stopped,
    Restart,
    UserRestart,
    Failed,
}

pub fn run_cycle(layout: &SystemsLayout, last_exit: SupervisorExit) -> Result<SupervisorExit> {
    run_cycle_with_launcher(layout, last_exit, launch_supervisor)
}

pub fn run_cycle_with_launcher<Launch>(
    layout: &SystemsLayout,
    last_exit: SupervisorExit,
    mut launch: Launch,
) -> Result<SupervisorExit>
where
    Launch: FnMut(&Path) -> Result<ExitStatus>,
{
    match system_status(layout, CURRENT_SYSTEM) {
        SystemStatus::Bad => {
            bail!("the current system is bad; selection should have demoted it")
        }
        SystemStatus::Tryable { tries } => {
            if last_exit != SupervisorExit::UserRestart || tries == 0 {
                write_current_status(layout, SystemStatus::Tryable { tries: tries + 1 })?;
            }
        }
        SystemStatus::Good => {}
    }

    let status = launch(&layout.supervisor_path())?;
    Ok(interpret_exit(status))
}

pub fn interpret_exit(status: ExitStatus) -> SupervisorExit {
    match status.code() {
        Some(0) => {
            info!("supervisor exited cleanly");
            SupervisorExit::Stopped
        }
        Some(2) => {
            info!("supervisor requested a framework restart");
            SupervisorExit::Restart
        }
        Some(3) => {
            info!("supervisor restarted at the user's request");
            SupervisorExit::UserRestart
        }
        Some(code) => {
            error!("unexpected supervisor exit code {code}");
            SupervisorExit::Failed
        }
        None => {
            error!(
                "supervisor was killed by signal {}",
                status.signal().unwrap_or_default()
            );
            SupervisorExit::Failed
        }
    }
}

fn launch_supervisor(path: &Path) -> Result<ExitStatus> {
    let mut child = Command::new(path)
        .arg("--no-daemonize")
        .spawn()
        .with_context(|| format!("failed to launch the supervisor {}", path.display()))?;

    reopen_stdin_to_null()?;

    child
        .wait()
        .with_context(|| format!("failed waiting for the supervisor {}", path.display()))
}

fn reopen_stdin_to_null() -> Result<()> {
    let null = File::open("/dev/null").context("failed to open /dev/null")?;
    if unsafe { libc::dup2(null.as_raw_fd(), libc::STDIN_FILENO) } == -1 {
        return Err(io::Error::last_os_error()).context("failed to redirect stdin to /dev/null");
    }
    Ok(())
}

pub fn fault_reboot() -> Result<()> {
    sync_filesystems();
    dump_syslog_tail_to(Path::new(CONSOLE_PATH));

    unsafe { libc::reboot(libc::RB_AUTOBOOT) };
    Err(io::Error::last_os_error()).context("reboot(2) returned instead of restarting the device")
}

fn dump_syslog_tail_to(console: &Path) {
    let output = match Command::new("logread").output() {
        Ok(output) => output,
        Err(err) => {
            warn!("failed to run logread: {err}");
            return;
        }
    };

    let tail = tail_lines(&String::from_utf8_lossy(&output.stdout), SYSLOG_TAIL_LINES);
    if let Err(err) = std::fs::write(console, tail) {
        warn!("failed to write the syslog tail to {}: {err}", console.display());
    }
}

pub fn tail_lines(raw: &str, count: usize) -> String {
    let lines: Vec<&str> = raw.lines().collect();
    let start = lines.len().saturating_sub(count);
    let mut tail = lines[start..].join("\n");
    if !tail.is_empty() {
        tail.push('\n');
    }
    tail
}
