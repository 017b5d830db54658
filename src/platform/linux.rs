//! Linux probes: `xdotool` for the focused window (X11) and `/proc` for
//! the process table.

use super::Platform;
use crate::util;
use anyhow::{Context, Result};
use std::fs;
use std::process::Command;

pub struct LinuxPlatform;

impl Platform for LinuxPlatform {
    /// Focused window's process name via `xdotool`. X11 only; on Wayland
    /// compositors without an XWayland focus this keeps failing and the
    /// process-scan sampler is the better choice.
    fn foreground_process() -> Result<Option<String>> {
        let output = util::run_command_with_timeout(
            Command::new("xdotool").args(["getactivewindow", "getwindowpid"]),
            util::DEFAULT_COMMAND_TIMEOUT,
        )
        .context("Failed to run xdotool (is it installed?)")?;
        if !output.status.success() {
            // xdotool exits nonzero when no window has focus
            return Ok(None);
        }
        let pid: u32 = String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse()
            .context("xdotool returned a non-numeric pid")?;
        match fs::read_to_string(format!("/proc/{pid}/comm")) {
            Ok(comm) => {
                let comm = comm.trim();
                Ok((!comm.is_empty()).then(|| comm.to_string()))
            }
            // the window's owner exited between the two reads
            Err(_) => Ok(None),
        }
    }

    /// Executable names from `/proc/<pid>/comm`.
    fn running_processes() -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir("/proc").context("Failed to read /proc")? {
            let Ok(entry) = entry else { continue };
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else { continue };
            if !name.bytes().all(|b| b.is_ascii_digit()) {
                continue;
            }
            if let Ok(comm) = fs::read_to_string(entry.path().join("comm")) {
                let comm = comm.trim();
                if !comm.is_empty() {
                    names.push(comm.to_string());
                }
            }
        }
        Ok(names)
    }

    fn name() -> &'static str {
        "linux"
    }
}
