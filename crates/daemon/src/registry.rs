//! Set of explicitly known channels
//!
//! The registry backs the root directory listing and is the only state
//! touched by `mkdir`/`rmdir`. It is seeded once at startup from an optional
//! channel list file.

use std::collections::BTreeSet;
use std::io;
use std::path::Path;

use parking_lot::RwLock;

/// Channel names listed under the filesystem root
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    channels: RwLock<BTreeSet<String>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry holding the given names
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            channels: RwLock::new(names.into_iter().map(Into::into).collect()),
        }
    }

    /// Load a channel list file: one name per line, surrounding whitespace
    /// trimmed, blank lines skipped.
    pub fn load_file(path: &Path) -> io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let names = parse_channel_list(&contents);
        tracing::info!(
            path = %path.display(),
            count = names.len(),
            "loaded channel list"
        );
        Ok(Self::from_names(names))
    }

    /// Add a channel. Returns false if it was already present.
    pub fn add(&self, name: &str) -> bool {
        self.channels.write().insert(name.to_string())
    }

    /// Remove a channel. Returns false if it was not present.
    pub fn remove(&self, name: &str) -> bool {
        self.channels.write().remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.channels.read().contains(name)
    }

    /// All channels in sorted order
    pub fn list(&self) -> Vec<String> {
        self.channels.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }
}

/// Parse channel list file contents
pub fn parse_channel_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
