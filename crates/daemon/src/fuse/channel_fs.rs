//! `fuser::Filesystem` adapter over [`ChannelVfs`]

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::consts::FOPEN_DIRECT_IO;
use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, MountOption, ReplyAttr, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, Request,
};
use libc::c_int;
use parking_lot::Mutex;
use tokio::runtime::Handle;

use super::InodeTable;
use crate::vfs::{ChannelVfs, DirEntry, NodeAttr, NodeKind};

const BLOCK_SIZE: u32 = 512;
const FS_NAME: &str = "streamfs";

/// Options the channel filesystem is mounted with: read-write so channels
/// can be created, and private to the mounting user
pub fn mount_options() -> Vec<MountOption> {
    vec![
        MountOption::FSName(FS_NAME.to_string()),
        MountOption::Subtype(FS_NAME.to_string()),
        MountOption::RW,
        MountOption::NoAtime,
    ]
}

/// The channel filesystem as seen by the kernel
pub struct ChannelFs {
    vfs: ChannelVfs,
    inodes: Arc<Mutex<InodeTable>>,
    runtime: Handle,
    attr_ttl: Duration,
    mounted_at: SystemTime,
}

/// What every attribute reply shares for one request
#[derive(Debug, Clone, Copy)]
struct AttrTemplate {
    uid: u32,
    gid: u32,
    mounted_at: SystemTime,
}

impl AttrTemplate {
    fn file_attr(&self, ino: u64, attr: &NodeAttr) -> FileAttr {
        FileAttr {
            ino,
            size: attr.size,
            // Streams occupy no storage
            blocks: 0,
            atime: self.mounted_at,
            mtime: self.mounted_at,
            ctime: self.mounted_at,
            crtime: self.mounted_at,
            kind: file_type(attr.kind),
            perm: attr.perm,
            nlink: attr.nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }
}

/// One row of a directory listing as handed to the kernel
#[derive(Debug, Clone, PartialEq, Eq)]
struct ListingEntry {
    ino: u64,
    kind: FileType,
    name: String,
}

impl ChannelFs {
    /// `runtime` must belong to a runtime that outlives the mount. Calls that
    /// may wait on a liveness check or a stream are answered from tasks on it,
    /// so the fuser session thread never blocks on an external tool.
    pub fn new(vfs: ChannelVfs, runtime: Handle, attr_ttl: Duration) -> Self {
        Self {
            vfs,
            inodes: Arc::new(Mutex::new(InodeTable::new())),
            runtime,
            attr_ttl,
            mounted_at: SystemTime::now(),
        }
    }

    fn path_of(&self, ino: u64) -> Option<String> {
        self.inodes.lock().get_path(ino).map(str::to_owned)
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Option<String> {
        self.inodes.lock().child_path(parent, name.to_str()?)
    }

    /// Files are owned by whoever asks, matching a mount private to its user
    fn attrs(&self, req: &Request<'_>) -> AttrTemplate {
        AttrTemplate {
            uid: req.uid(),
            gid: req.gid(),
            mounted_at: self.mounted_at,
        }
    }
}

fn file_type(kind: NodeKind) -> FileType {
    match kind {
        NodeKind::Directory => FileType::Directory,
        NodeKind::LiveFile => FileType::RegularFile,
    }
}

/// `.` and `..` followed by `entries`, each child given an inode
fn directory_listing(
    inodes: &mut InodeTable,
    ino: u64,
    entries: Vec<DirEntry>,
) -> Vec<ListingEntry> {
    let parent = inodes.parent_inode(ino).unwrap_or(InodeTable::ROOT_INODE);

    let mut listing = vec![
        ListingEntry {
            ino,
            kind: FileType::Directory,
            name: ".".to_string(),
        },
        ListingEntry {
            ino: parent,
            kind: FileType::Directory,
            name: "..".to_string(),
        },
    ];
    for entry in entries {
        if let Some(child_path) = inodes.child_path(ino, &entry.name) {
            listing.push(ListingEntry {
                ino: inodes.get_or_create(&child_path),
                kind: file_type(entry.kind),
                name: entry.name,
            });
        }
    }
    listing
}

/// Entries from `offset` on, each paired with the offset that resumes after it
fn listing_from(
    listing: Vec<ListingEntry>,
    offset: i64,
) -> impl Iterator<Item = (i64, ListingEntry)> {
    let skip = usize::try_from(offset).unwrap_or(0);
    listing
        .into_iter()
        .enumerate()
        .skip(skip)
        .map(|(i, entry)| ((i + 1) as i64, entry))
}

impl Filesystem for ChannelFs {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        tracing::info!(
            channels = self.vfs.registry().len(),
            "channel filesystem mounted"
        );
        Ok(())
    }

    fn destroy(&mut self) {
        let _guard = self.runtime.enter();
        let released = self.vfs.shutdown();
        tracing::info!(released, "channel filesystem unmounted");
    }

    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::ENOENT);
            return;
        };

        let vfs = self.vfs.clone();
        let inodes = self.inodes.clone();
        let attrs = self.attrs(req);
        let ttl = self.attr_ttl;
        self.runtime.spawn(async move {
            match vfs.getattr(&path).await {
                Ok(attr) => {
                    let ino = inodes.lock().get_or_create(&path);
                    reply.entry(&ttl, &attrs.file_attr(ino, &attr), 0);
                }
                Err(e) => reply.error(e.errno()),
            }
        });
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        let vfs = self.vfs.clone();
        let attrs = self.attrs(req);
        let ttl = self.attr_ttl;
        self.runtime.spawn(async move {
            match vfs.getattr(&path).await {
                Ok(attr) => reply.attr(&ttl, &attrs.file_attr(ino, &attr)),
                Err(e) => reply.error(e.errno()),
            }
        });
    }

    fn mkdir(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::EPERM);
            return;
        };

        if let Err(e) = self.vfs.mkdir(&path) {
            reply.error(e.errno());
            return;
        }

        let ino = self.inodes.lock().get_or_create(&path);
        let attr = self.attrs(req).file_attr(ino, &NodeAttr::directory());
        reply.entry(&self.attr_ttl, &attr, 0);
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(path) = self.child_path(parent, name) else {
            reply.error(libc::EPERM);
            return;
        };

        match self.vfs.rmdir(&path) {
            Ok(()) => {
                self.inodes.lock().remove_tree(&path);
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            reply.error(libc::EACCES);
            return;
        }

        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        let vfs = self.vfs.clone();
        self.runtime.spawn(async move {
            match vfs.open(&path).await {
                // Direct I/O: short reads reach the reader unchanged and the
                // page cache never sees stream bytes
                Ok(fh) => reply.opened(fh, FOPEN_DIRECT_IO),
                Err(e) => reply.error(e.errno()),
            }
        });
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let vfs = self.vfs.clone();
        self.runtime.spawn(async move {
            match vfs.read(fh, size as usize).await {
                Ok(data) => reply.data(&data),
                Err(e) => reply.error(e.errno()),
            }
        });
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        let _guard = self.runtime.enter();
        self.vfs.release(fh);
        reply.ok();
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        let vfs = self.vfs.clone();
        let inodes = self.inodes.clone();
        self.runtime.spawn(async move {
            let entries = match vfs.readdir(&path).await {
                Ok(entries) => entries,
                Err(e) => {
                    reply.error(e.errno());
                    return;
                }
            };

            let listing = directory_listing(&mut inodes.lock(), ino, entries);
            for (next, entry) in listing_from(listing, offset) {
                if reply.add(entry.ino, next, entry.kind, &entry.name) {
                    break;
                }
            }
            reply.ok();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::vfs::{LIVE_FILE_PERM, LIVE_FILE_SIZE};

    fn template() -> AttrTemplate {
        AttrTemplate {
            uid: 1000,
            gid: 100,
            mounted_at: SystemTime::UNIX_EPOCH,
        }
    }

    fn dir_entry(name: &str, kind: NodeKind) -> DirEntry {
        DirEntry {
            name: name.to_string(),
            kind,
        }
    }

    fn names(listing: &[ListingEntry]) -> Vec<&str> {
        listing.iter().map(|e| e.name.as_str()).collect()
    }

    #[test]
    fn test_live_file_attr() {
        let attr = template().file_attr(7, &NodeAttr::live_file());
        assert_eq!(attr.ino, 7);
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.perm, LIVE_FILE_PERM);
        assert_eq!(attr.size, LIVE_FILE_SIZE);
        assert_eq!(attr.nlink, 1);
        assert_eq!(attr.blocks, 0);
    }

    #[test]
    fn test_directory_attr() {
        let attr = template().file_attr(InodeTable::ROOT_INODE, &NodeAttr::directory());
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.perm, 0o755);
        assert_eq!(attr.nlink, 2);
    }

    #[test]
    fn test_attr_owned_by_requester() {
        let attr = template().file_attr(3, &NodeAttr::live_file());
        assert_eq!(attr.uid, 1000);
        assert_eq!(attr.gid, 100);
        assert_eq!(attr.mtime, SystemTime::UNIX_EPOCH);
    }

    #[test]
    fn test_root_listing_has_dot_entries() {
        let mut inodes = InodeTable::new();
        let entries = vec![
            dir_entry("bar", NodeKind::Directory),
            dir_entry("foo", NodeKind::Directory),
        ];

        let listing = directory_listing(&mut inodes, InodeTable::ROOT_INODE, entries);

        assert_eq!(names(&listing), vec![".", "..", "bar", "foo"]);
        assert_eq!(listing[0].ino, InodeTable::ROOT_INODE);
        assert_eq!(listing[1].ino, InodeTable::ROOT_INODE);
        assert_eq!(listing[2].ino, inodes.get_inode("/bar").unwrap());
        assert_eq!(listing[3].ino, inodes.get_inode("/foo").unwrap());
        assert!(listing.iter().all(|e| e.kind == FileType::Directory));
    }

    #[test]
    fn test_channel_listing_points_back_to_root() {
        let mut inodes = InodeTable::new();
        let channel = inodes.get_or_create("/foo");
        let entries = vec![dir_entry("live.mp4", NodeKind::LiveFile)];

        let listing = directory_listing(&mut inodes, channel, entries);

        assert_eq!(names(&listing), vec![".", "..", "live.mp4"]);
        assert_eq!(listing[0].ino, channel);
        assert_eq!(listing[1].ino, InodeTable::ROOT_INODE);
        assert_eq!(listing[2].kind, FileType::RegularFile);
        assert_eq!(listing[2].ino, inodes.get_inode("/foo/live.mp4").unwrap());
    }

    #[test]
    fn test_listing_reuses_inodes() {
        let mut inodes = InodeTable::new();
        let first = directory_listing(
            &mut inodes,
            InodeTable::ROOT_INODE,
            vec![dir_entry("foo", NodeKind::Directory)],
        );
        let second = directory_listing(
            &mut inodes,
            InodeTable::ROOT_INODE,
            vec![dir_entry("foo", NodeKind::Directory)],
        );
        assert_eq!(first, second);
    }

    #[test]
    fn test_listing_offsets_resume_after_each_entry() {
        let mut inodes = InodeTable::new();
        let entries = vec![
            dir_entry("a", NodeKind::Directory),
            dir_entry("b", NodeKind::Directory),
        ];
        let listing = directory_listing(&mut inodes, InodeTable::ROOT_INODE, entries);

        let all: Vec<(i64, String)> = listing_from(listing.clone(), 0)
            .map(|(next, e)| (next, e.name))
            .collect();
        assert_eq!(
            all,
            vec![
                (1, ".".to_string()),
                (2, "..".to_string()),
                (3, "a".to_string()),
                (4, "b".to_string()),
            ]
        );

        // Resuming at the offset handed out with ".." starts at "a"
        let resumed: Vec<(i64, String)> = listing_from(listing.clone(), 2)
            .map(|(next, e)| (next, e.name))
            .collect();
        assert_eq!(resumed, vec![(3, "a".to_string()), (4, "b".to_string())]);

        assert_eq!(listing_from(listing.clone(), 4).count(), 0);
        assert_eq!(listing_from(listing.clone(), 99).count(), 0);
        assert_eq!(listing_from(listing, -1).count(), 4);
    }

    #[test]
    fn test_mount_options_are_private_and_writable() {
        let options = mount_options();
        assert!(options.contains(&MountOption::RW));
        assert!(!options.contains(&MountOption::AllowOther));
        assert!(!options.contains(&MountOption::RO));
    }
}
