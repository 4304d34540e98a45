//! External command-line collaborators
//!
//! Two tools sit behind the filesystem: a probe that answers whether a
//! channel is live, and a fetcher that writes the channel's raw media bytes
//! to stdout until it is terminated. Both are traits so the filesystem can be
//! driven by fakes in tests.

mod command;
mod fetch;
mod probe;

pub use command::ToolCommand;
pub use fetch::{CommandFetcher, FetchError, StreamFetcher};
pub use probe::{CommandProbe, LivenessProbe, ProbeError};
