//! Open stream sessions keyed by file handle
//!
//! Each successful `open` of a live file starts one fetch process and
//! registers its stdout pipe under a fresh handle. Reads pull bytes straight
//! from the pipe. Release drops the entry, signals the process, and leaves
//! reaping to a background task so the filesystem call never waits on it.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout};

use crate::error::FsError;
use crate::tools::{FetchError, StreamFetcher};

/// One running fetch process and its output pipe
#[derive(Debug)]
pub struct StreamSession {
    channel: String,
    pid: Option<u32>,
    opened_at: Instant,
    child: Mutex<Option<Child>>,
    stdout: tokio::sync::Mutex<ChildStdout>,
}

impl StreamSession {
    fn new(channel: &str, child: Child, stdout: ChildStdout) -> Self {
        Self {
            channel: channel.to_string(),
            pid: child.id(),
            opened_at: Instant::now(),
            child: Mutex::new(Some(child)),
            stdout: tokio::sync::Mutex::new(stdout),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    async fn read(&self, size: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; size];
        let n = self.stdout.lock().await.read(&mut buf).await?;
        buf.truncate(n);
        Ok(buf)
    }
}

/// Handle → session table
pub struct StreamSessionTable {
    sessions: Mutex<HashMap<u64, Arc<StreamSession>>>,
    /// Next handle to hand out; handles are never reused
    next_handle: AtomicU64,
    fetcher: Arc<dyn StreamFetcher>,
    kill_grace: Duration,
}

impl StreamSessionTable {
    /// `kill_grace` is how long a released process may take to exit after
    /// SIGTERM before it is killed outright.
    pub fn new(fetcher: Arc<dyn StreamFetcher>, kill_grace: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
            fetcher,
            kill_grace,
        }
    }

    /// Start streaming `channel` and register the session.
    ///
    /// Liveness is the caller's concern; this only spawns.
    pub fn open(&self, channel: &str) -> Result<u64, FetchError> {
        // Spawn outside the table lock
        let (child, stdout) = self.fetcher.spawn(channel)?;
        let session = Arc::new(StreamSession::new(channel, child, stdout));
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);

        tracing::info!(channel, handle, pid = ?session.pid(), "opened stream");
        self.sessions.lock().insert(handle, session);
        Ok(handle)
    }

    /// Read up to `size` bytes from the session's pipe. An empty result means
    /// the stream has ended.
    pub async fn read(&self, handle: u64, size: usize) -> Result<Vec<u8>, FsError> {
        let session = self.get(handle).ok_or(FsError::BadHandle)?;

        // Blocks only this handle; the table lock is already released
        session.read(size).await.map_err(|e| {
            tracing::warn!(handle, channel = session.channel(), error = %e, "stream read failed");
            FsError::Io
        })
    }

    /// Drop the session and terminate its process. Unknown handles are
    /// ignored. Returns whether a session was removed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn release(&self, handle: u64) -> bool {
        let Some(session) = self.sessions.lock().remove(&handle) else {
            return false;
        };

        tracing::info!(
            handle,
            channel = session.channel(),
            open_secs = session.opened_at.elapsed().as_secs(),
            "released stream"
        );
        self.terminate(&session);
        true
    }

    /// Release every open session, returning how many there were
    pub fn release_all(&self) -> usize {
        let drained: Vec<_> = self.sessions.lock().drain().collect();
        for (handle, session) in &drained {
            tracing::debug!(handle, channel = session.channel(), "terminating stream");
            self.terminate(session);
        }
        drained.len()
    }

    pub fn get(&self, handle: u64) -> Option<Arc<StreamSession>> {
        self.sessions.lock().get(&handle).cloned()
    }

    pub fn contains(&self, handle: u64) -> bool {
        self.sessions.lock().contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    fn terminate(&self, session: &StreamSession) {
        let Some(mut child) = session.child.lock().take() else {
            return;
        };

        if let Some(pid) = child.id() {
            if let Err(e) = send_sigterm(pid) {
                tracing::debug!(pid, error = %e, "SIGTERM failed");
            }
        }

        let grace = self.kill_grace;
        let channel = session.channel.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(grace, child.wait()).await {
                Ok(Ok(status)) => {
                    tracing::debug!(channel, %status, "stream process exited");
                }
                Ok(Err(e)) => {
                    tracing::warn!(channel, error = %e, "failed to wait on stream process");
                }
                Err(_) => {
                    tracing::warn!(
                        channel,
                        grace_secs = grace.as_secs(),
                        "stream process ignored SIGTERM, killing"
                    );
                    if let Err(e) = child.kill().await {
                        tracing::warn!(channel, error = %e, "failed to kill stream process");
                    }
                }
            }
        });
    }
}

impl std::fmt::Debug for StreamSessionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSessionTable")
            .field("open", &self.len())
            .field("next_handle", &self.next_handle)
            .field("kill_grace", &self.kill_grace)
            .finish()
    }
}

fn send_sigterm(pid: u32) -> io::Result<()> {
    let pid = i32::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    kill(Pid::from_raw(pid), Signal::SIGTERM)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::tools::{CommandFetcher, ToolCommand};

    fn table(script: &str) -> StreamSessionTable {
        let fetcher = CommandFetcher::new(ToolCommand::new("sh", ["-c", script]));
        StreamSessionTable::new(Arc::new(fetcher), Duration::from_secs(2))
    }

    #[tokio::test]
    async fn test_open_read_release() {
        let table = table("printf %s {channel}");

        let handle = table.open("chan").unwrap();
        assert!(table.contains(handle));

        let data = table.read(handle, 64).await.unwrap();
        assert_eq!(data, b"chan");

        // End of stream
        let data = table.read(handle, 64).await.unwrap();
        assert!(data.is_empty());

        assert!(table.release(handle));
        assert!(!table.contains(handle));
        assert_eq!(table.read(handle, 64).await, Err(FsError::BadHandle));
    }

    #[tokio::test]
    async fn test_read_respects_size() {
        let table = table("printf abcdef");
        let handle = table.open("chan").unwrap();

        let mut collected = Vec::new();
        loop {
            let chunk = table.read(handle, 2).await.unwrap();
            if chunk.is_empty() {
                break;
            }
            assert!(chunk.len() <= 2);
            collected.extend(chunk);
        }
        assert_eq!(collected, b"abcdef");
        table.release(handle);
    }

    #[tokio::test]
    async fn test_handles_are_unique() {
        let table = table("printf x");

        let a = table.open("one").unwrap();
        let b = table.open("two").unwrap();
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);

        table.release(a);
        let c = table.open("three").unwrap();
        assert_ne!(c, a);
        assert_ne!(c, b);

        assert_eq!(table.release_all(), 2);
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_release_unknown_handle() {
        let table = table("printf x");
        assert!(!table.release(42));
    }

    #[tokio::test]
    async fn test_read_unknown_handle() {
        let table = table("printf x");
        assert_eq!(table.read(7, 16).await, Err(FsError::BadHandle));
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let fetcher = CommandFetcher::new(ToolCommand::new(
            "/nonexistent/streamfs-fetch",
            Vec::<String>::new(),
        ));
        let table = StreamSessionTable::new(Arc::new(fetcher), Duration::from_secs(1));

        assert!(table.open("chan").is_err());
        assert!(table.is_empty());
    }

    fn process_alive(pid: u32) -> bool {
        kill(Pid::from_raw(pid as i32), None).is_ok()
    }

    #[tokio::test]
    async fn test_release_terminates_process() {
        let table = table("exec sleep 30");
        let handle = table.open("chan").unwrap();
        let pid = table.get(handle).unwrap().pid().unwrap();
        assert!(process_alive(pid));

        assert!(table.release(handle));

        let mut alive = true;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            alive = process_alive(pid);
            if !alive {
                break;
            }
        }
        assert!(!alive);
    }

    #[test]
    fn test_sigterm_rejects_out_of_range_pid() {
        let err = send_sigterm(u32::MAX).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
