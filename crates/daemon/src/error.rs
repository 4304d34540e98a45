//! Error taxonomy for filesystem calls
//!
//! Every failure a filesystem call can report maps onto one of these
//! variants, and each variant onto the errno handed back to the kernel.

use libc::c_int;

/// Failure of a channel filesystem operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FsError {
    /// Unknown path shape, offline live file, or nothing to open
    #[error("no such file or directory")]
    NotFound,
    /// Directory creation or removal outside the root level
    #[error("operation not permitted")]
    PermissionDenied,
    /// Read on a handle that is not (or no longer) registered
    #[error("bad file handle")]
    BadHandle,
    /// The stream pipe failed while reading
    #[error("stream i/o error")]
    Io,
}

impl FsError {
    /// The errno reported to the host filesystem layer
    pub fn errno(self) -> c_int {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::PermissionDenied => libc::EPERM,
            FsError::BadHandle => libc::EBADF,
            FsError::Io => libc::EIO,
        }
    }
}
