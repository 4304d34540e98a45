//! Live video channels exposed as a filesystem
//!
//! The mounted tree looks like:
//!
//! ```text
//! /
//! ├── channel_a/
//! │   └── live.mp4     (present only while channel_a is live)
//! └── channel_b/
//! ```
//!
//! Opening `live.mp4` starts an external fetch process, and reads return
//! its stdout. Liveness comes from an external probe, cached per channel.

pub mod config;
pub mod error;
#[cfg(feature = "fuse")]
pub mod fuse;
pub mod liveness;
pub mod namespace;
pub mod registry;
pub mod sessions;
pub mod tools;
pub mod vfs;

pub use config::{Config, ConfigError, ToolsConfig};
pub use error::FsError;
pub use liveness::{Clock, LivenessCache, LivenessCacheConfig, ManualClock, SystemClock};
pub use namespace::{Location, LIVE_FILE_NAME};
pub use registry::ChannelRegistry;
pub use sessions::{StreamSession, StreamSessionTable};
pub use vfs::{ChannelVfs, DirEntry, NodeAttr, NodeKind};
