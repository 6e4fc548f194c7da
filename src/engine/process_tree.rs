use std::collections::HashMap;

use sysinfo::{Pid, ProcessesToUpdate, System};

/// Every live descendant of `root`, parents before children. `root` itself is not included.
pub fn descendants(root: u32) -> Vec<Pid> {
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::All, true);

    let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
    for (pid, process) in sys.processes() {
        if let Some(parent) = process.parent() {
            children.entry(parent).or_default().push(*pid);
        }
    }

    let mut out = Vec::new();
    let mut frontier = vec![Pid::from_u32(root)];
    while let Some(pid) = frontier.pop() {
        if let Some(kids) = children.get(&pid) {
            for kid in kids {
                // Guard against pid reuse producing a cycle in a racy snapshot.
                if !out.contains(kid) {
                    out.push(*kid);
                    frontier.push(*kid);
                }
            }
        }
    }
    out
}

/// Hard-kill every member of process group `pgid`. Returns `false` when nothing was signalled.
///
/// Reaches descendants that were re-parented after their parent exited, which a parent walk
/// from the root cannot see.
#[cfg(unix)]
pub fn kill_group(pgid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};

    // 0 and 1 would address our own group and init.
    let Some(raw) = i32::try_from(pgid).ok().filter(|raw| *raw > 1) else {
        return false;
    };
    match killpg(nix::unistd::Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(e) => {
            tracing::warn!(pgid, error = %e, "failed to signal process group");
            false
        }
    }
}

#[cfg(not(unix))]
pub fn kill_group(_pgid: u32) -> bool {
    false
}

/// Send a hard kill to each pid still alive. Returns how many signals were delivered.
pub fn kill_all(pids: &[Pid]) -> usize {
    if pids.is_empty() {
        return 0;
    }
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(pids), true);
    pids.iter()
        .filter_map(|pid| sys.process(*pid))
        .filter(|process| process.kill())
        .count()
}
