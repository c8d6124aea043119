//! Open-file budget for probe workers (Unix). Every running probe holds a child process and its
//! pipes, so wide probe stages can exhaust the soft `RLIMIT_NOFILE`.

/// Descriptors one running probe may hold: stdout and stderr pipes (both ends until spawn
/// returns), the null stdin, plus slack for the exec.
pub const FDS_PER_PROBE: usize = 8;

/// Share of the soft limit given to probes. The rest stays with the walk, archives and output.
const PROBE_FD_SHARE: f64 = 0.8;

/// Soft limit on open descriptors, or `None` when unlimited or unknown.
#[cfg(unix)]
pub fn soft_fd_limit() -> Option<u64> {
    let mut rlim = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: rlim is a valid, writable rlimit for the duration of the call.
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut rlim) } != 0 {
        return None;
    }
    if rlim.rlim_cur == libc::RLIM_INFINITY {
        return None;
    }
    Some(rlim.rlim_cur)
}

#[cfg(not(unix))]
pub fn soft_fd_limit() -> Option<u64> {
    None
}

/// Workers allowed per probe stage when `probe_stages` stages run side by side.
/// `None` when there is no limit to respect; never below 1 otherwise.
pub fn probe_workers_per_stage(probe_stages: usize) -> Option<usize> {
    if probe_stages == 0 {
        return None;
    }
    let limit = soft_fd_limit()?;
    let budget = (limit as f64 * PROBE_FD_SHARE) as usize;
    let concurrent_probes = budget / FDS_PER_PROBE;
    Some((concurrent_probes / probe_stages).max(1))
}
