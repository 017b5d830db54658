//! Application-to-playlist mapping table.
//!
//! Keys are normalized process/application identities (lowercased, with
//! executable suffixes stripped), values carry the Spotify context to play
//! and a human-readable label for logging. Entries keep their configured
//! order and the first match wins, so users can put more specific keys
//! (`chrome-beta`) above broader ones (`chrome`).

use serde::{Deserialize, Serialize};

/// Executable suffixes stripped during normalization.
const STRIP_SUFFIXES: &[&str] = &[".exe", ".app"];

/// Normalize a raw identity for matching: trim, lowercase, and strip
/// trailing executable suffixes (repeatedly, so `game.exe.exe` and
/// `game.exe` collapse to the same key).
pub fn normalize_identity(raw: &str) -> String {
    let mut normalized = raw.trim().to_lowercase();
    loop {
        let before = normalized.len();
        for suffix in STRIP_SUFFIXES {
            if let Some(stripped) = normalized.strip_suffix(suffix) {
                normalized = stripped.to_string();
            }
        }
        if normalized.len() == before {
            break;
        }
    }
    normalized
}

/// One row of the mapping table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    /// Normalized identity fragment this entry matches against.
    pub match_key: String,
    /// Spotify context: a full `spotify:...` URI or a bare playlist ID.
    pub context: String,
    /// Label used in log lines ("Coding Mode", "Gaming").
    #[serde(default)]
    pub display_name: String,
}

impl MappingEntry {
    pub fn new(
        match_key: impl Into<String>,
        context: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            match_key: normalize_identity(&match_key.into()),
            context: context.into(),
            display_name: display_name.into(),
        }
    }
}

/// Ordered lookup table from observed identities to playback contexts.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    entries: Vec<MappingEntry>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from configured entries, normalizing every key.
    pub fn from_entries(entries: impl IntoIterator<Item = MappingEntry>) -> Self {
        let mut table = Self::new();
        for entry in entries {
            table.upsert(entry);
        }
        table
    }

    /// Find the first entry whose key is contained in the normalized
    /// identity. Returns `None` for an empty identity (the "nothing
    /// observed" value) and skips entries whose key normalized away to
    /// nothing, since every string contains the empty string.
    pub fn lookup(&self, identity: &str) -> Option<&MappingEntry> {
        let normalized = normalize_identity(identity);
        if normalized.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .filter(|e| !e.match_key.is_empty())
            .find(|e| normalized.contains(&e.match_key))
    }

    /// Insert an entry, or replace the entry with the same key in place so
    /// its position (and thus match priority) is preserved.
    pub fn upsert(&mut self, entry: MappingEntry) {
        let mut entry = entry;
        entry.match_key = normalize_identity(&entry.match_key);
        match self
            .entries
            .iter_mut()
            .find(|e| e.match_key == entry.match_key)
        {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Remove the entry whose key equals the normalized identity.
    /// Returns the removed entry, or `None` if no such key exists.
    pub fn remove(&mut self, identity: &str) -> Option<MappingEntry> {
        let key = normalize_identity(identity);
        let position = self.entries.iter().position(|e| e.match_key == key)?;
        Some(self.entries.remove(position))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    /// Normalized keys in table order, for the process-scan sampler's
    /// watch list.
    pub fn match_keys(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.match_key.clone()).collect()
    }
}
