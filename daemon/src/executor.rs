//! Process actions (kill, priority change)

use crate::collector::Priority;
use crate::error::OperationError;
use std::io;

fn last_os_error() -> String {
    io::Error::last_os_error().to_string()
}

/// Sends SIGKILL to `pid`.
pub fn kill(pid: u32) -> Result<(), OperationError> {
    // pid 0 and values that wrap negative address process groups.
    if pid == 0 || pid > i32::MAX as u32 {
        return Err(OperationError::Kill {
            pid,
            cause: "invalid process id".to_string(),
        });
    }
    let result = unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) };
    if result == 0 {
        Ok(())
    } else {
        Err(OperationError::Kill {
            pid,
            cause: last_os_error(),
        })
    }
}

/// Sets the nice value of `pid` to the one of `priority`.
pub fn set_priority(pid: u32, priority: Priority) -> Result<(), OperationError> {
    if pid == 0 {
        return Err(OperationError::SetPriority {
            pid,
            cause: "invalid process id".to_string(),
        });
    }
    let result =
        unsafe { libc::setpriority(libc::PRIO_PROCESS, pid as libc::id_t, priority.nice_value()) };
    if result == 0 {
        Ok(())
    } else {
        Err(OperationError::SetPriority {
            pid,
            cause: last_os_error(),
        })
    }
}
