//! macOS probes backed by `osascript` and `ps`.

use super::Platform;
use crate::util;
use anyhow::{Context, Result};
use std::process::Command;

pub struct MacOsPlatform;

const FRONTMOST_SCRIPT: &str = r#"tell application "System Events" to get name of first application process whose frontmost is true"#;

impl Platform for MacOsPlatform {
    /// Frontmost application name via System Events. Needs the
    /// accessibility permission the first time it runs.
    fn foreground_process() -> Result<Option<String>> {
        let output = util::run_command_with_timeout(
            Command::new("osascript").args(["-e", FRONTMOST_SCRIPT]),
            util::DEFAULT_COMMAND_TIMEOUT,
        )
        .context("Failed to run osascript")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("osascript failed: {}", stderr.trim());
        }
        let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!name.is_empty()).then_some(name))
    }

    /// Short process names via `ps`; `-c` drops the path portion.
    fn running_processes() -> Result<Vec<String>> {
        let output = util::run_command_with_timeout(
            Command::new("ps").args(["-axco", "comm="]),
            util::DEFAULT_COMMAND_TIMEOUT,
        )
        .context("Failed to run ps")?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect())
    }

    fn name() -> &'static str {
        "macos"
    }
}
