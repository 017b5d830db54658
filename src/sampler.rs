//! Observation side: what is the machine doing right now?
//!
//! A sampler reduces the system's state to one identity string per tick.
//! Two strategies exist: the process owning the foreground window, and a
//! scan of the process table against the configured watch list. Both
//! answer `Ok("")` when there is genuinely nothing to report, which is a
//! valid observation; `Err` means the probe itself failed and the caller
//! should skip the tick.

use log::debug;
use thiserror::Error;

use crate::mapping::normalize_identity;
use crate::platform;

#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("no foreground application could be determined")]
    NoForeground,
    #[error("activity probe failed: {0:#}")]
    Probe(#[source] anyhow::Error),
}

pub trait ActivitySampler {
    fn sample(&mut self) -> Result<String, SamplerError>;
}

/// Identity of the process that owns the focused window.
#[derive(Debug, Default)]
pub struct ForegroundSampler;

impl ForegroundSampler {
    pub fn new() -> Self {
        Self
    }
}

impl ActivitySampler for ForegroundSampler {
    fn sample(&mut self) -> Result<String, SamplerError> {
        match platform::foreground_process().map_err(SamplerError::Probe)? {
            Some(name) => Ok(name),
            None => Err(SamplerError::NoForeground),
        }
    }
}

/// First watched application found in the process table, regardless of
/// focus. Watch keys follow the mapping table's containment rule, so a
/// watched `chrome` finds `Google Chrome Helper` too. The reported
/// identity is the watch key itself; which of the matching processes
/// the table lists first must not change what the engine sees.
#[derive(Debug)]
pub struct ProcessScanSampler {
    watch: Vec<String>,
}

impl ProcessScanSampler {
    pub fn new(watch: impl IntoIterator<Item = String>) -> Self {
        let watch: Vec<String> = watch
            .into_iter()
            .map(|key| normalize_identity(&key))
            .filter(|key| !key.is_empty())
            .collect();
        if watch.is_empty() {
            debug!("process scan has an empty watch list; every tick will observe nothing");
        }
        Self { watch }
    }

    /// Watch keys are checked in order, so earlier mapping entries win
    /// when several watched applications run at once. Returns the key,
    /// not the process name: a browser and its helper processes all
    /// collapse to the one identity they were watched under.
    fn first_match(&self, processes: &[String]) -> Option<&str> {
        for key in &self.watch {
            if processes
                .iter()
                .any(|process| normalize_identity(process).contains(key))
            {
                return Some(key);
            }
        }
        None
    }
}

impl ActivitySampler for ProcessScanSampler {
    fn sample(&mut self) -> Result<String, SamplerError> {
        let processes = platform::running_processes().map_err(SamplerError::Probe)?;
        Ok(self
            .first_match(&processes)
            .map(String::from)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processes(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_scan_reports_the_watch_key() {
        let sampler = ProcessScanSampler::new(vec!["chrome".into()]);
        let found = sampler
            .first_match(&processes(&["systemd", "Google Chrome Helper", "bash"]))
            .unwrap();
        assert_eq!(found, "chrome");
    }

    #[test]
    fn test_scan_watch_order_beats_process_order() {
        let sampler = ProcessScanSampler::new(vec!["code".into(), "chrome".into()]);
        let found = sampler
            .first_match(&processes(&["chrome.exe", "Code.exe"]))
            .unwrap();
        assert_eq!(found, "code");
    }

    #[test]
    fn test_scan_normalizes_watch_keys() {
        let sampler = ProcessScanSampler::new(vec!["VALORANT.exe".into()]);
        let found = sampler
            .first_match(&processes(&["valorant", "steam"]))
            .unwrap();
        assert_eq!(found, "valorant");
    }

    #[test]
    fn test_scan_identity_is_stable_across_process_order() {
        // a browser and its helpers match the same key; reordering the
        // process table must not look like an activity change
        let sampler = ProcessScanSampler::new(vec!["chrome".into()]);
        let first = sampler
            .first_match(&processes(&["Google Chrome", "Google Chrome Helper"]))
            .unwrap();
        let second = sampler
            .first_match(&processes(&["Google Chrome Helper", "Google Chrome"]))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "chrome");
    }

    #[test]
    fn test_scan_without_match_observes_nothing() {
        let sampler = ProcessScanSampler::new(vec!["chrome".into()]);
        assert!(sampler.first_match(&processes(&["bash", "vim"])).is_none());
    }

    #[test]
    fn test_empty_watch_list_never_matches() {
        let sampler = ProcessScanSampler::new(Vec::new());
        assert!(sampler.first_match(&processes(&["anything"])).is_none());

        // keys that normalize to nothing are dropped too
        let sampler = ProcessScanSampler::new(vec![".exe".into(), "  ".into()]);
        assert!(sampler.first_match(&processes(&["anything"])).is_none());
    }
}
