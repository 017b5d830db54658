//! Per-OS process probes backing the samplers.
//!
//! `foreground_process` answers `None` when no window has focus (lock
//! screen, bare desktop); `running_processes` yields executable names
//! without paths.

use anyhow::Result;

#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "macos")]
pub mod macos;
#[cfg(target_os = "windows")]
pub mod windows;

pub trait Platform {
    fn foreground_process() -> Result<Option<String>>;
    fn running_processes() -> Result<Vec<String>>;
    fn name() -> &'static str;
}

#[cfg(target_os = "linux")]
pub use linux::LinuxPlatform as CurrentPlatform;
#[cfg(target_os = "macos")]
pub use macos::MacOsPlatform as CurrentPlatform;
#[cfg(target_os = "windows")]
pub use windows::WindowsPlatform as CurrentPlatform;

pub fn foreground_process() -> Result<Option<String>> {
    CurrentPlatform::foreground_process()
}

pub fn running_processes() -> Result<Vec<String>> {
    CurrentPlatform::running_processes()
}

pub fn name() -> &'static str {
    CurrentPlatform::name()
}
