//! Filesystem call contract over the channel namespace
//!
//! [`ChannelVfs`] answers path-level calls (getattr, readdir, mkdir, rmdir,
//! open) and handle-level calls (read, release) by composing the registry,
//! the liveness cache and the session table. It knows nothing about inodes;
//! the FUSE adapter translates between the two.
//!
//! | Call    | Root           | Channel dir          | Live file                | Invalid      |
//! |---------|----------------|----------------------|--------------------------|--------------|
//! | getattr | dir 755        | dir 755              | file 444 if live         | not found    |
//! | readdir | registry       | live file if live    | not found                | not found    |
//! | mkdir   | permission     | add to registry      | permission               | permission   |
//! | rmdir   | permission     | remove from registry | permission               | permission   |
//! | open    | not found      | not found            | spawn stream if live     | not found    |

use std::sync::Arc;

use crate::config::Config;
use crate::error::FsError;
use crate::liveness::LivenessCache;
use crate::namespace::{self, Location, LIVE_FILE_NAME};
use crate::registry::ChannelRegistry;
use crate::sessions::StreamSessionTable;
use crate::tools::{CommandFetcher, CommandProbe};

/// Permission bits of every directory
pub const DIR_PERM: u16 = 0o755;
/// Permission bits of the live file
pub const LIVE_FILE_PERM: u16 = 0o444;
/// Size reported for a live file. Streams have no length, but players
/// refuse to open zero-length or unknown-length files.
pub const LIVE_FILE_SIZE: u64 = 10_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directory,
    LiveFile,
}

/// Attributes of a node in the namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAttr {
    pub kind: NodeKind,
    pub perm: u16,
    pub nlink: u32,
    pub size: u64,
}

impl NodeAttr {
    pub const fn directory() -> Self {
        Self {
            kind: NodeKind::Directory,
            perm: DIR_PERM,
            nlink: 2,
            size: 0,
        }
    }

    pub const fn live_file() -> Self {
        Self {
            kind: NodeKind::LiveFile,
            perm: LIVE_FILE_PERM,
            nlink: 1,
            size: LIVE_FILE_SIZE,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }
}

/// Directory listing entry (`.` and `..` are left to the caller)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: NodeKind,
}

/// The channel filesystem's operation layer
#[derive(Debug, Clone)]
pub struct ChannelVfs {
    registry: Arc<ChannelRegistry>,
    liveness: Arc<LivenessCache>,
    sessions: Arc<StreamSessionTable>,
}

impl ChannelVfs {
    pub fn new(
        registry: Arc<ChannelRegistry>,
        liveness: Arc<LivenessCache>,
        sessions: Arc<StreamSessionTable>,
    ) -> Self {
        Self {
            registry,
            liveness,
            sessions,
        }
    }

    /// Wire up the external tools described by `config`
    pub fn from_config(config: &Config, registry: ChannelRegistry) -> Self {
        let probe = CommandProbe::new(config.tools.probe_command());
        let fetcher = CommandFetcher::new(config.tools.fetch_command());

        Self::new(
            Arc::new(registry),
            Arc::new(LivenessCache::new(Arc::new(probe), config.liveness())),
            Arc::new(StreamSessionTable::new(Arc::new(fetcher), config.kill_grace())),
        )
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    pub fn liveness(&self) -> &LivenessCache {
        &self.liveness
    }

    pub fn sessions(&self) -> &StreamSessionTable {
        &self.sessions
    }

    pub async fn getattr(&self, path: &str) -> Result<NodeAttr, FsError> {
        match namespace::resolve(path) {
            // Channel directories exist whether or not they were registered
            Location::Root | Location::ChannelDir(_) => Ok(NodeAttr::directory()),
            Location::LiveFile(channel) => {
                if self.liveness.is_live(channel).await {
                    Ok(NodeAttr::live_file())
                } else {
                    Err(FsError::NotFound)
                }
            }
            Location::Invalid => Err(FsError::NotFound),
        }
    }

    pub async fn readdir(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        match namespace::resolve(path) {
            Location::Root => Ok(self
                .registry
                .list()
                .into_iter()
                .map(|name| DirEntry {
                    name,
                    kind: NodeKind::Directory,
                })
                .collect()),
            Location::ChannelDir(channel) => {
                let mut entries = Vec::new();
                if self.liveness.is_live(channel).await {
                    entries.push(DirEntry {
                        name: LIVE_FILE_NAME.to_string(),
                        kind: NodeKind::LiveFile,
                    });
                }
                Ok(entries)
            }
            Location::LiveFile(_) | Location::Invalid => Err(FsError::NotFound),
        }
    }

    pub fn mkdir(&self, path: &str) -> Result<(), FsError> {
        match namespace::resolve(path) {
            Location::ChannelDir(channel) => {
                if self.registry.add(channel) {
                    tracing::info!(channel, "added channel");
                }
                Ok(())
            }
            _ => Err(FsError::PermissionDenied),
        }
    }

    pub fn rmdir(&self, path: &str) -> Result<(), FsError> {
        match namespace::resolve(path) {
            Location::ChannelDir(channel) => {
                if self.registry.remove(channel) {
                    tracing::info!(channel, "removed channel");
                }
                Ok(())
            }
            _ => Err(FsError::PermissionDenied),
        }
    }

    /// Start streaming a live file and return its handle
    pub async fn open(&self, path: &str) -> Result<u64, FsError> {
        let Location::LiveFile(channel) = namespace::resolve(path) else {
            return Err(FsError::NotFound);
        };

        // Liveness may have changed since getattr
        if !self.liveness.is_live(channel).await {
            tracing::debug!(channel, "open refused, channel offline");
            return Err(FsError::NotFound);
        }

        self.sessions.open(channel).map_err(|e| {
            tracing::warn!(channel, error = %e, "failed to start stream");
            FsError::NotFound
        })
    }

    /// Read up to `size` bytes from an open stream
    pub async fn read(&self, handle: u64, size: usize) -> Result<Vec<u8>, FsError> {
        self.sessions.read(handle, size).await
    }

    /// Close a stream. Unknown handles are a no-op.
    ///
    /// Must be called from within a tokio runtime.
    pub fn release(&self, handle: u64) {
        self.sessions.release(handle);
    }

    /// Terminate every open stream, returning how many there were
    pub fn shutdown(&self) -> usize {
        self.sessions.release_all()
    }
}
