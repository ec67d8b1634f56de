// Warden — Caller Verification
//
// Identifies the process on the other end of the Unix domain socket from its
// peer credentials, resolving /proc/<pid>/exe and fingerprinting the binary
// with SHA-256. The result tags gateway log lines with a connection origin;
// it is not an identity and grants nothing.

use std::fs::{self, File};
use std::io;
use std::path::PathBuf;

use sha2::{Digest, Sha256};

/// The process that connected to the socket.
#[derive(Debug, Clone)]
pub struct CallerInfo {
    pub pid: u32,
    pub uid: u32,
    /// Resolved path to the caller's executable.
    pub exe_path: PathBuf,
    /// SHA-256 hex digest of the caller's executable.
    pub exe_hash: String,
}

impl CallerInfo {
    /// Resolve a peer from its credentials. Linux only; fails elsewhere or
    /// when the process has already exited.
    pub fn from_peer(pid: u32, uid: u32) -> io::Result<Self> {
        let exe_path = fs::read_link(format!("/proc/{}/exe", pid))?;

        // Stream the binary through the hasher instead of loading it whole.
        let mut hasher = Sha256::new();
        io::copy(&mut File::open(&exe_path)?, &mut hasher)?;
        let exe_hash = hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<String>();

        Ok(Self {
            pid,
            uid,
            exe_path,
            exe_hash,
        })
    }

    /// Compact origin tag for log fields.
    pub fn origin(&self) -> String {
        format!("uid:{} pid:{} exe:{}", self.uid, self.pid, self.short_hash())
    }

    fn short_hash(&self) -> &str {
        self.exe_hash.get(..16).unwrap_or(&self.exe_hash)
    }
}

impl std::fmt::Display for CallerInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "PID {} UID {} ({}) [{}…]",
            self.pid,
            self.uid,
            self.exe_path.display(),
            self.short_hash()
        )
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
