//! FUSE integration for the channel filesystem
//!
//! # Architecture
//!
//! - `ChannelFs`: `fuser::Filesystem` implementation, translating inode-based
//!   kernel requests into path-based [`ChannelVfs`](crate::vfs::ChannelVfs) calls
//! - `InodeTable`: bidirectional inode ↔ path mapping
//!
//! Requests arrive on the fuser session thread. Calls that can wait on a
//! liveness check or a stream (`lookup`, `getattr`, `readdir`, `open`,
//! `read`) are answered from tokio tasks, so one slow channel holds up only
//! the callers asking about it. `mkdir`, `rmdir` and `release` touch only
//! in-memory state and are answered inline.

mod channel_fs;
mod inode_table;

pub use channel_fs::{mount_options, ChannelFs};
pub use inode_table::InodeTable;
