//! Error types for process probing, process actions and configuration

use std::io;

use thiserror::Error;

/// Capturing a process snapshot failed. Transient; the next tick retries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("process enumeration failed: {0}")]
pub struct EnumerationError(pub String);

/// Failure reading a single fact about a single process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// The caller lacks permission. The process may still be running.
    #[error("access denied")]
    AccessDenied,

    /// The process no longer exists.
    #[error("process not found")]
    NotFound,

    /// Any other read failure.
    #[error("read failed: {0}")]
    Io(String),
}

impl ProbeError {
    /// Classify an I/O error from `/proc` or a syscall.
    pub fn from_io(err: &io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::ENOENT) | Some(libc::ESRCH) => return ProbeError::NotFound,
            Some(libc::EACCES) | Some(libc::EPERM) => return ProbeError::AccessDenied,
            _ => {}
        }
        match err.kind() {
            io::ErrorKind::NotFound => ProbeError::NotFound,
            io::ErrorKind::PermissionDenied => ProbeError::AccessDenied,
            _ => ProbeError::Io(err.to_string()),
        }
    }
}

impl From<io::Error> for ProbeError {
    fn from(err: io::Error) -> Self {
        ProbeError::from_io(&err)
    }
}

/// A user-initiated action on a process failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    #[error("process {pid} is not in the process table")]
    UnknownProcess { pid: u32 },

    #[error("failed to kill process {pid}: {cause}")]
    Kill { pid: u32, cause: String },

    #[error("failed to change priority of process {pid}: {cause}")]
    SetPriority { pid: u32, cause: String },

    #[error("tracking session {session} does not exist")]
    UnknownSession { session: u64 },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config i/o failed: {0}")]
    Io(#[from] io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
