use std::io;

use anyhow::{Context, Result};
use tracing::warn;

pub fn daemonize(timeout_ms: u64) -> Result<()> {
    let mut fds = [0i32; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } == -1 {
        return Err(io::Error::last_os_error()).context("failed to create the daemonization pipe");
    }
    let (read_fd, write_fd) = (fds[0], fds[1]);

    let pid = unsafe { libc::fork() };
    if pid == -1 {
        return Err(io::Error::last_os_error()).context("failed to fork for daemonization");
    }

    if pid != 0 {
        wait_for_handoff(read_fd, write_fd, timeout_ms);
        std::process::exit(0);
    }

    // The write end becomes the child's stdin so the Supervisor inherits it
    // and releases the waiting parent by closing it once startup is complete.
    unsafe { libc::close(read_fd) };
    if unsafe { libc::setsid() } == -1 {
        warn!(
            "failed to start a new session: {}",
            io::Error::last_os_error()
        );
    }
    if unsafe { libc::dup2(write_fd, libc::STDIN_FILENO) } == -1 {
        return Err(io::Error::last_os_error())
            .context("failed to move the daemonization pipe onto stdin");
    }
    if write_fd != libc::STDIN_FILENO {
        unsafe { libc::close(write_fd) };
    }
    Ok(())
}

fn wait_for_handoff(read_fd: i32, write_fd: i32, timeout_ms: u64) {
    unsafe { libc::close(write_fd) };

    let mut poll_fd = libc::pollfd {
        fd: read_fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let timeout = timeout_ms.min(i32::MAX as u64) as i32;
    loop {
        let rc = unsafe { libc::poll(&mut poll_fd, 1, timeout) };
        if rc == -1 && io::Error::last_os_error().raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        if rc == 0 {
            warn!("daemonization hand-off timed out after {timeout_ms} ms");
        }
        break;
    }
}
