//! Scheduling priority for the acquisition thread.

use std::io;

/// FIFO priority requested at startup.
pub const REALTIME_PRIORITY: i32 = 99;

/// Move the calling process to `SCHED_FIFO` at `priority`.
#[cfg(target_os = "linux")]
pub fn request_realtime_priority(priority: i32) -> io::Result<()> {
    let param = libc::sched_param {
        sched_priority: priority,
    };
    // SAFETY: pid 0 targets the calling process; param outlives the call.
    let rc = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
pub fn request_realtime_priority(_priority: i32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "realtime scheduling is only supported on Linux",
    ))
}
