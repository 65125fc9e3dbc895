use nix::sched::{sched_getaffinity, sched_setaffinity, CpuSet};
use nix::unistd::Pid;

/// Restrict the calling process to `core`, returns the previous mask so it can be restored.
#[must_use = "This result must be used to restore affinity"]
pub fn pin_to_core(core: usize) -> Result<CpuSet, nix::Error> {
    let old = sched_getaffinity(Pid::from_raw(0))?;
    let mut single = CpuSet::new();
    single.set(core)?;
    sched_setaffinity(Pid::from_raw(0), &single)?;
    Ok(old)
}

pub fn restore_affinity(cpu_set: &CpuSet) -> Result<(), nix::Error> {
    sched_setaffinity(Pid::from_raw(0), cpu_set)
}

/// Lowest numbered core the process is currently allowed on.
pub fn first_allowed_core() -> Result<Option<usize>, nix::Error> {
    let current = sched_getaffinity(Pid::from_raw(0))?;
    for i in 0..CpuSet::count() {
        if current.is_set(i)? {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::{first_allowed_core, pin_to_core, restore_affinity};

    #[test]
    fn pin_and_restore() {
        let core = first_allowed_core().unwrap().unwrap();
        let old = pin_to_core(core).unwrap();
        restore_affinity(&old).unwrap();
    }
}
