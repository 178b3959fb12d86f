//! Process liveness probing

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::{getpid, Pid};

/// Decides whether a registered consumer identity still exists
pub trait Liveness: Send + Sync {
    fn is_alive(&self, identity: i32) -> bool;
}

/// Probes a process id with signal 0.
///
/// `EPERM` means the process exists but belongs to someone else, which still
/// counts as alive.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalProbe;

impl Liveness for SignalProbe {
    fn is_alive(&self, identity: i32) -> bool {
        if identity <= 0 {
            return false;
        }
        match kill(Pid::from_raw(identity), None::<Signal>) {
            Ok(()) | Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }
}

/// Identity of the calling process
pub fn current_identity() -> i32 {
    getpid().as_raw()
}
