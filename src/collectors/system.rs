use crate::collectors::{HostProbe, ProbeError};
use crate::snapshot::{clamp_percent, DiskStat, UsageStat};
use std::ffi::CString;
use std::fs;
use std::io;
use std::mem::MaybeUninit;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;
use sysinfo::{CpuExt, System, SystemExt};

/// Wall-clock window between the two CPU counter refreshes.
pub const CPU_SAMPLE_WINDOW: Duration = Duration::from_secs(1);

pub struct SysinfoProbe {
    system: System,
    cpu_window: Duration,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            cpu_window: CPU_SAMPLE_WINDOW,
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl HostProbe for SysinfoProbe {
    fn disk(&mut self, path: &Path) -> Result<DiskStat, ProbeError> {
        let target = path.canonicalize().map_err(|source| ProbeError::Path {
            path: path.display().to_string(),
            source,
        })?;

        let (total, used) = statvfs_usage(&target).map_err(|source| ProbeError::Statvfs {
            path: target.display().to_string(),
            source,
        })?;
        if total == 0 {
            return Err(ProbeError::NoCapacity(target.display().to_string()));
        }

        let mount = mount_point_of(&target).map_err(|source| ProbeError::Path {
            path: target.display().to_string(),
            source,
        })?;
        Ok(DiskStat {
            mount: mount.to_string_lossy().to_string(),
            usage: UsageStat::new(total, used),
        })
    }

    fn memory(&mut self) -> Result<UsageStat, ProbeError> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return Err(ProbeError::NoMemoryData);
        }
        let used = self.system.used_memory().min(total);
        Ok(UsageStat::new(total, used))
    }

    fn cpu_usage(&mut self) -> Result<f64, ProbeError> {
        self.system.refresh_cpu();
        thread::sleep(self.cpu_window);
        self.system.refresh_cpu();

        if self.system.cpus().is_empty() {
            return Err(ProbeError::NoCpuData);
        }
        let usage = self.system.global_cpu_info().cpu_usage() as f64;
        Ok(clamp_percent(usage))
    }
}

/// Total and used bytes of the filesystem holding `path`, the way `df` counts them.
fn statvfs_usage(path: &Path) -> io::Result<(u64, u64)> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
    let mut stat = MaybeUninit::<libc::statvfs>::uninit();
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), stat.as_mut_ptr()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    let stat = unsafe { stat.assume_init() };

    let frsize = stat.f_frsize as u64;
    let total = (stat.f_blocks as u64).saturating_mul(frsize);
    let free = (stat.f_bfree as u64).saturating_mul(frsize);
    Ok((total, total.saturating_sub(free)))
}

/// Topmost ancestor of `target` still on the same device.
fn mount_point_of(target: &Path) -> io::Result<PathBuf> {
    let dev = fs::metadata(target)?.dev();
    let mut mount = target;
    while let Some(parent) = mount.parent() {
        if fs::metadata(parent)?.dev() != dev {
            break;
        }
        mount = parent;
    }
    Ok(mount.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_is_reported() {
        let mut probe = SysinfoProbe::new();
        let err = probe
            .disk(Path::new("/definitely/not/here/hostmond"))
            .unwrap_err();
        assert!(matches!(err, ProbeError::Path { .. }));
        assert!(err.to_string().contains("/definitely/not/here/hostmond"));
    }

    #[test]
    fn root_is_its_own_mount() {
        let disk = SysinfoProbe::new().disk(Path::new("/")).unwrap();
        assert_eq!(disk.mount, "/");
        assert!(disk.usage.total_bytes > 0);
        assert!(disk.usage.used_bytes <= disk.usage.total_bytes);
    }

    #[test]
    fn mount_point_is_an_ancestor_on_the_same_device() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().canonicalize().unwrap();
        let mount = mount_point_of(&target).unwrap();

        assert!(target.starts_with(&mount));
        let dev = fs::metadata(&target).unwrap().dev();
        assert_eq!(fs::metadata(&mount).unwrap().dev(), dev);
        if let Some(parent) = mount.parent() {
            assert_ne!(fs::metadata(parent).unwrap().dev(), dev);
        }
    }

    #[test]
    fn separate_mount_reports_its_own_capacity() {
        // /dev/shm is a tmpfs on most Linux hosts; skip when it shares the root device.
        let shm = Path::new("/dev/shm");
        let Ok(shm_meta) = fs::metadata(shm) else {
            return;
        };
        if shm_meta.dev() == fs::metadata("/").unwrap().dev() {
            return;
        }

        let mut probe = SysinfoProbe::new();
        let disk = probe.disk(shm).unwrap();
        let root = probe.disk(Path::new("/")).unwrap();
        assert_eq!(disk.mount, "/dev/shm");
        assert_eq!(disk.usage.total_bytes, statvfs_usage(shm).unwrap().0);
        assert_eq!(root.usage.total_bytes, statvfs_usage(Path::new("/")).unwrap().0);
    }

    #[test]
    fn memory_percent_is_in_range() {
        let mut probe = SysinfoProbe::new();
        if let Ok(mem) = probe.memory() {
            assert!(mem.used_bytes <= mem.total_bytes);
            assert!((0.0..=100.0).contains(&mem.used_percent));
        }
    }

    #[test]
    fn cpu_usage_is_in_range() {
        let mut probe = SysinfoProbe::new();
        probe.cpu_window = Duration::from_millis(250);
        if let Ok(usage) = probe.cpu_usage() {
            assert!((0.0..=100.0).contains(&usage));
        }
    }
}
