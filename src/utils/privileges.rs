//! Root privilege check and re-execution through a privilege helper.

use std::ffi::OsStr;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{info, warn};

use crate::error::{Result, TunerError};

/// Helpers tried in order.
pub const PRIVILEGE_HELPERS: [&str; 3] = ["sudo", "doas", "pkexec"];

/// Set on the re-executed process so a failed escalation cannot loop.
const ESCALATED_ENV: &str = "NVIDIA_TUNER_ESCALATED";

pub fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

/// Find an executable called `name` in the directories of `path_var`.
pub fn find_in_path(name: &str, path_var: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Return when already root; otherwise re-run this binary through the first
/// helper found on `PATH`, forwarding all arguments.
///
/// On success this never returns, the process image is replaced.
pub fn ensure_root() -> Result<()> {
    if is_root() {
        return Ok(());
    }

    if std::env::var_os(ESCALATED_ENV).is_some() {
        warn!("Still not root after escalation");
        return Err(TunerError::PrivilegesRequired);
    }

    let path_var = std::env::var_os("PATH").unwrap_or_default();
    let Some(helper) = PRIVILEGE_HELPERS
        .iter()
        .find_map(|name| find_in_path(name, &path_var))
    else {
        return Err(TunerError::PrivilegesRequired);
    };

    let exe = std::env::current_exe()?;

    info!("Re-running with root privileges via {}", helper.display());

    // sudo and doas drop most of the environment, so pass the marker as an argument to env.
    let err = Command::new(&helper)
        .arg("env")
        .arg(format!("{}=1", ESCALATED_ENV))
        .arg(exe)
        .args(std::env::args_os().skip(1))
        .exec();

    warn!("Failed to execute {}: {}", helper.display(), err);
    Err(TunerError::PrivilegesRequired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    #[test]
    fn test_find_in_path_requires_executable() {
        let first = tempdir().unwrap();
        let second = tempdir().unwrap();

        let plain = first.path().join("doas");
        std::fs::write(&plain, "").unwrap();

        let script = second.path().join("doas");
        std::fs::write(&script, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let path_var = std::env::join_paths([first.path(), second.path()]).unwrap();
        assert_eq!(find_in_path("doas", &path_var), Some(script));
        assert_eq!(find_in_path("pkexec", &path_var), None);
    }
}
