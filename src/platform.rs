use crate::logw;
use std::ffi::OsStr;
use std::path::Path;
use std::process::Command;

fn system_opener(target: &OsStr) -> Command {
    #[cfg(target_os = "windows")]
    {
        let mut cmd = Command::new("rundll32");
        cmd.arg("url.dll,FileProtocolHandler").arg(target);
        cmd
    }

    #[cfg(target_os = "macos")]
    {
        let mut cmd = Command::new("open");
        cmd.arg(target);
        cmd
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        let mut cmd = Command::new("xdg-open");
        cmd.arg(target);
        cmd
    }
}

fn open_with_system(target: &OsStr) -> bool {
    if target.is_empty() {
        return false;
    }
    match system_opener(target).spawn() {
        Ok(_) => true,
        Err(err) => {
            logw(format!("Could not open {}: {}", target.to_string_lossy(), err));
            false
        }
    }
}

pub fn open_folder<P: AsRef<Path>>(path: P) -> bool {
    let path = path.as_ref();
    if !path.exists() {
        if let Err(err) = std::fs::create_dir_all(path) {
            logw(format!("Could not create {}: {}", path.display(), err));
            return false;
        }
    }
    open_with_system(path.as_os_str())
}

/// Opens `url` in the default browser. The URL is also logged by callers
/// that need the user to act on it, since this can fail headless.
pub fn open_url(url: &str) -> bool {
    open_with_system(OsStr::new(url))
}
