//! Process termination by executable name
//!
//! Matches processes the way `killall` does: by the kernel `comm` name, or by
//! the basename of `argv[0]` for names longer than the 15 bytes `comm` keeps.

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to scan {path}: {source}")]
    Scan {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to send {signal} to pid {pid}: {errno}")]
    Signal {
        pid: i32,
        signal: Signal,
        errno: Errno,
    },
}

/// Sends a terminate request to every process with a given name
pub trait ProcessControl: Send {
    /// Returns how many processes were signalled; zero when none was running
    fn terminate_by_name(&mut self, name: &str) -> Result<usize, ProcessError>;
}

/// [`ProcessControl`] over procfs and `kill(2)`
#[derive(Debug)]
pub struct ProcfsProcessControl {
    proc_root: PathBuf,
    signal: Signal,
    own_pid: i32,
}

impl ProcfsProcessControl {
    pub fn new(signal: Signal) -> Self {
        Self::with_root("/proc", signal)
    }

    pub fn with_root(proc_root: impl Into<PathBuf>, signal: Signal) -> Self {
        Self {
            proc_root: proc_root.into(),
            signal,
            own_pid: std::process::id() as i32,
        }
    }

    /// Pids whose name matches `name`, excluding our own
    pub fn find_by_name(&self, name: &str) -> Result<Vec<i32>, ProcessError> {
        let entries = fs::read_dir(&self.proc_root).map_err(|source| ProcessError::Scan {
            path: self.proc_root.clone(),
            source,
        })?;

        let mut pids = Vec::new();
        for entry in entries.flatten() {
            let Some(pid) = entry
                .file_name()
                .to_str()
                .and_then(|s| s.parse::<i32>().ok())
            else {
                continue;
            };
            if pid == self.own_pid {
                continue;
            }
            // Processes can vanish mid-scan; unreadable entries are skipped
            if process_matches(&entry.path(), name) {
                pids.push(pid);
            }
        }
        pids.sort_unstable();
        Ok(pids)
    }
}

impl ProcessControl for ProcfsProcessControl {
    fn terminate_by_name(&mut self, name: &str) -> Result<usize, ProcessError> {
        let pids = self.find_by_name(name)?;
        if pids.is_empty() {
            debug!("No running process named {}", name);
            return Ok(0);
        }

        let mut signalled = 0;
        let mut first_error = None;
        for pid in pids {
            match kill(Pid::from_raw(pid), self.signal) {
                Ok(()) => {
                    info!("Sent {} to {} (pid {})", self.signal, name, pid);
                    signalled += 1;
                }
                // Exited between scan and kill
                Err(Errno::ESRCH) => debug!("{} (pid {}) already gone", name, pid),
                Err(errno) => {
                    warn!("Failed to signal {} (pid {}): {}", name, pid, errno);
                    first_error.get_or_insert(ProcessError::Signal {
                        pid,
                        signal: self.signal,
                        errno,
                    });
                }
            }
        }

        match first_error {
            Some(err) if signalled == 0 => Err(err),
            _ => Ok(signalled),
        }
    }
}

/// Longest name the kernel keeps in `comm`
const COMM_LEN: usize = 15;

fn process_matches(proc_dir: &Path, name: &str) -> bool {
    let comm = fs::read_to_string(proc_dir.join("comm")).unwrap_or_default();
    if comm.trim_end_matches('\n') == name {
        return true;
    }
    if name.len() <= COMM_LEN {
        return false;
    }

    let cmdline = fs::read(proc_dir.join("cmdline")).unwrap_or_default();
    let argv0 = cmdline.split(|b| *b == 0).next().unwrap_or_default();
    let argv0 = String::from_utf8_lossy(argv0);
    Path::new(argv0.as_ref())
        .file_name()
        .is_some_and(|base| base == name)
}

/// Logs the request without signalling anything
#[derive(Debug, Default)]
pub struct DryRunProcessControl;

impl ProcessControl for DryRunProcessControl {
    fn terminate_by_name(&mut self, name: &str) -> Result<usize, ProcessError> {
        info!("[dry-run] would terminate processes named {}", name);
        Ok(0)
    }
}
