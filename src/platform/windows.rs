//! Windows probes via the Win32 API: the foreground window plus a
//! Toolhelp process snapshot, no subprocesses involved.

use super::Platform;
use anyhow::{bail, Result};
use std::ffi::OsString;
use std::os::windows::ffi::OsStringExt;
use winapi::um::handleapi::{CloseHandle, INVALID_HANDLE_VALUE};
use winapi::um::tlhelp32::{
    CreateToolhelp32Snapshot, Process32FirstW, Process32NextW, PROCESSENTRY32W, TH32CS_SNAPPROCESS,
};
use winapi::um::winuser::{GetForegroundWindow, GetWindowThreadProcessId};

pub struct WindowsPlatform;

impl Platform for WindowsPlatform {
    fn foreground_process() -> Result<Option<String>> {
        let hwnd = unsafe { GetForegroundWindow() };
        if hwnd.is_null() {
            return Ok(None);
        }
        let mut pid: u32 = 0;
        unsafe { GetWindowThreadProcessId(hwnd, &mut pid) };
        if pid == 0 {
            return Ok(None);
        }
        let name = snapshot_processes()?
            .into_iter()
            .find_map(|(entry_pid, name)| (entry_pid == pid).then_some(name));
        Ok(name)
    }

    fn running_processes() -> Result<Vec<String>> {
        Ok(snapshot_processes()?
            .into_iter()
            .map(|(_, name)| name)
            .collect())
    }

    fn name() -> &'static str {
        "windows"
    }
}

/// Walk a Toolhelp snapshot of every process into (pid, exe name) pairs.
fn snapshot_processes() -> Result<Vec<(u32, String)>> {
    let snapshot = unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPPROCESS, 0) };
    if snapshot == INVALID_HANDLE_VALUE {
        bail!("CreateToolhelp32Snapshot failed");
    }

    let mut entry: PROCESSENTRY32W = unsafe { std::mem::zeroed() };
    entry.dwSize = u32::try_from(std::mem::size_of::<PROCESSENTRY32W>()).unwrap_or(0);

    let mut processes = Vec::new();
    unsafe {
        if Process32FirstW(snapshot, &mut entry) != 0 {
            loop {
                let len = entry
                    .szExeFile
                    .iter()
                    .position(|&c| c == 0)
                    .unwrap_or(entry.szExeFile.len());
                let name = OsString::from_wide(&entry.szExeFile[..len])
                    .to_string_lossy()
                    .into_owned();
                processes.push((entry.th32ProcessID, name));
                if Process32NextW(snapshot, &mut entry) == 0 {
                    break;
                }
            }
        }
        CloseHandle(snapshot);
    }
    Ok(processes)
}
