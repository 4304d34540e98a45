//! Path classification for the channel namespace
//!
//! The tree is fixed in shape: the root holds channel directories, and each
//! channel directory holds at most one file, [`LIVE_FILE_NAME`]. Resolving a
//! path never touches the registry, the liveness cache, or any process.

/// Name of the single streamable file inside a channel directory
pub const LIVE_FILE_NAME: &str = "live.mp4";

/// Where a path lands in the namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location<'a> {
    /// `/`
    Root,
    /// `/<channel>`
    ChannelDir(&'a str),
    /// `/<channel>/live.mp4`
    LiveFile(&'a str),
    /// Anything deeper, or a second segment other than the live file
    Invalid,
}

/// Classify a `/`-delimited path. Empty segments are ignored, so `//foo/`
/// resolves the same as `/foo`.
pub fn resolve(path: &str) -> Location<'_> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());

    match (segments.next(), segments.next(), segments.next()) {
        (None, _, _) => Location::Root,
        (Some(channel), None, _) => Location::ChannelDir(channel),
        (Some(channel), Some(LIVE_FILE_NAME), None) => Location::LiveFile(channel),
        _ => Location::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root() {
        assert_eq!(resolve("/"), Location::Root);
        assert_eq!(resolve(""), Location::Root);
        assert_eq!(resolve("///"), Location::Root);
    }

    #[test]
    fn test_channel_dir() {
        assert_eq!(resolve("/foo"), Location::ChannelDir("foo"));
        assert_eq!(resolve("foo/"), Location::ChannelDir("foo"));
        assert_eq!(resolve("//foo//"), Location::ChannelDir("foo"));
    }

    #[test]
    fn test_live_file() {
        assert_eq!(resolve("/foo/live.mp4"), Location::LiveFile("foo"));
        assert_eq!(resolve("/foo//live.mp4/"), Location::LiveFile("foo"));
    }

    #[test]
    fn test_invalid() {
        assert_eq!(resolve("/foo/other.mp4"), Location::Invalid);
        assert_eq!(resolve("/foo/live.mp4/more"), Location::Invalid);
        assert_eq!(resolve("/a/b/c"), Location::Invalid);
    }

    #[test]
    fn test_live_file_name_as_channel() {
        // A top-level "live.mp4" is just a channel directory
        assert_eq!(resolve("/live.mp4"), Location::ChannelDir("live.mp4"));
    }
}
