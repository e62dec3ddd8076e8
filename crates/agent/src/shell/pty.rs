// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Native PTY plumbing: forkpty with a sanitized child environment, and
//! an async handle for the master side.

use std::ffi::CString;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd};

use anyhow::{bail, Context};
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::libc;
use nix::pty::{forkpty, ForkptyResult, Winsize};
use nix::unistd::{execvp, Pid};
use tokio::io::unix::AsyncFd;

/// Loader-injection variables stripped from the child so the agent's own
/// runtime paths never leak into the spawned shell.
const SCRUBBED_ENV: [&str; 2] = ["LD_LIBRARY_PATH", "LD_PRELOAD"];

/// Raw master fd, wrapped so it can register with the tokio reactor.
#[derive(Debug)]
struct MasterFd(OwnedFd);

impl AsRawFd for MasterFd {
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.0.as_raw_fd()
    }
}

/// Async handle for the master side of the PTY: terminal output comes
/// out, operator keystrokes go in, and the window size can be changed.
#[derive(Debug)]
pub struct Master {
    afd: AsyncFd<MasterFd>,
}

impl Master {
    /// Register the fd with the reactor. The fd must be non-blocking
    /// before `AsyncFd` sees it, so the flag flip happens here too.
    fn register(fd: OwnedFd) -> anyhow::Result<Self> {
        let flags = fcntl(&fd, FcntlArg::F_GETFL).context("F_GETFL on PTY master")?;
        let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
        fcntl(&fd, FcntlArg::F_SETFL(flags)).context("F_SETFL on PTY master")?;
        let afd = AsyncFd::new(MasterFd(fd)).context("register PTY master with reactor")?;
        Ok(Self { afd })
    }

    /// Read one burst of terminal output into `buf`. `Ok(0)` means the
    /// child side hung up; EIO from a PTY master means the same and is
    /// left to the caller to classify.
    pub async fn read_output(&self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let mut ready = self.afd.readable().await?;
            let attempt = ready
                .try_io(|fd| nix::unistd::read(fd, buf).map_err(io::Error::from));
            if let Ok(outcome) = attempt {
                return outcome;
            }
            // Spurious readiness; wait for the next edge.
        }
    }

    /// Write the whole input payload, resuming across short writes.
    pub async fn write_input(&self, mut data: &[u8]) -> io::Result<()> {
        while !data.is_empty() {
            let mut ready = self.afd.writable().await?;
            match ready.try_io(|fd| nix::unistd::write(fd, data).map_err(io::Error::from)) {
                Ok(Ok(written)) => data = &data[written..],
                Ok(Err(e)) => return Err(e),
                Err(_spurious) => {}
            }
        }
        Ok(())
    }

    /// Set the window size on the master.
    // TIOCSWINSZ requires unsafe for the libc::ioctl call
    #[allow(unsafe_code)]
    pub fn set_winsize(&self, rows: u16, cols: u16) -> anyhow::Result<()> {
        let ws = Winsize { ws_col: cols, ws_row: rows, ws_xpixel: 0, ws_ypixel: 0 };

        // SAFETY: TIOCSWINSZ is a well-defined ioctl that sets the window
        // size on the PTY master fd. The Winsize struct is fully
        // initialized.
        let ret = unsafe { libc::ioctl(self.afd.as_raw_fd(), libc::TIOCSWINSZ, &ws) };
        if ret < 0 {
            bail!("TIOCSWINSZ ioctl failed: {}", io::Error::last_os_error());
        }
        Ok(())
    }
}

/// A spawned PTY child: the async master handle and the child pid.
pub struct PtyChild {
    pub master: Master,
    pub pid: Pid,
}

/// Fork a PTY child running `command` (whitespace-split, resolved via
/// PATH).
// forkpty requires unsafe: the post-fork child is partially initialized
#[allow(unsafe_code)]
pub fn spawn(command: &str, cols: u16, rows: u16) -> anyhow::Result<PtyChild> {
    let args: Vec<String> = command.split_whitespace().map(str::to_owned).collect();
    if args.is_empty() {
        bail!("empty interactive command");
    }
    let c_args: Vec<CString> = args
        .iter()
        .map(|arg| CString::new(arg.as_bytes()))
        .collect::<Result<_, _>>()
        .context("invalid command argument")?;

    let winsize = Winsize { ws_col: cols, ws_row: rows, ws_xpixel: 0, ws_ypixel: 0 };

    // SAFETY: forkpty is unsafe because the child is in a
    // partially-initialized state after fork. The child only adjusts its
    // environment and execs.
    let result = unsafe { forkpty(&winsize, None) }.context("forkpty failed")?;

    match result {
        ForkptyResult::Child => {
            for var in SCRUBBED_ENV {
                std::env::remove_var(var);
            }
            std::env::set_var("TERM", "xterm-256color");
            std::env::set_var("LANG", "C.UTF-8");

            let _ = execvp(&c_args[0], &c_args);
            // exec failed; the forked child must not keep running agent code.
            std::process::exit(1);
        }
        ForkptyResult::Parent { child, master } => {
            Ok(PtyChild { master: Master::register(master)?, pid: child })
        }
    }
}
