//! TTL cache of channel liveness
//!
//! Probing a channel spawns an external process and costs a network round
//! trip, while `getattr`/`readdir` sit on the hot path of every file manager
//! and media player. Each channel is therefore probed at most once per TTL
//! window. Failed probes are cached as "offline" for the same window.

use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::sync::Cache;
use parking_lot::Mutex;

use crate::tools::LivenessProbe;

/// Source of the current instant
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to, for tests and simulations
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    elapsed: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        *self.elapsed.lock() += by;
    }

    /// Set the time elapsed since the clock was created
    pub fn set_elapsed(&self, elapsed: Duration) {
        *self.elapsed.lock() = elapsed;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.elapsed.lock()
    }
}

/// Configuration for the liveness cache
#[derive(Debug, Clone)]
pub struct LivenessCacheConfig {
    /// How long a probe result is trusted
    pub ttl: Duration,
    /// Upper bound on a single probe
    pub probe_timeout: Duration,
    /// Maximum number of channels kept
    pub max_channels: u64,
}

impl Default for LivenessCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            probe_timeout: Duration::from_secs(5),
            max_channels: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LivenessEntry {
    is_live: bool,
    checked_at: Instant,
}

/// Channel → (live, probed at) cache in front of a [`LivenessProbe`]
pub struct LivenessCache {
    entries: Cache<String, LivenessEntry>,
    /// One probe lock per channel; callers missing the cache together share
    /// a single probe
    probe_locks: Cache<String, Arc<tokio::sync::Mutex<()>>>,
    probe: Arc<dyn LivenessProbe>,
    clock: Arc<dyn Clock>,
    config: LivenessCacheConfig,
}

impl LivenessCache {
    pub fn new(probe: Arc<dyn LivenessProbe>, config: LivenessCacheConfig) -> Self {
        Self::with_clock(probe, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        probe: Arc<dyn LivenessProbe>,
        config: LivenessCacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        // Expiry is decided against `clock`, not by moka, so the window
        // follows whatever clock is injected.
        let entries = Cache::builder().max_capacity(config.max_channels).build();
        let probe_locks = Cache::builder().max_capacity(config.max_channels).build();

        Self {
            entries,
            probe_locks,
            probe,
            clock,
            config,
        }
    }

    /// Whether `channel` is live, probing only when the cached answer is
    /// missing or older than the TTL
    pub async fn is_live(&self, channel: &str) -> bool {
        if let Some(is_live) = self.cached(channel) {
            tracing::debug!(channel, is_live, "liveness cache hit");
            return is_live;
        }

        let lock = self
            .probe_locks
            .get_with(channel.to_string(), || Arc::new(tokio::sync::Mutex::new(())));
        let _probing = lock.lock().await;

        // Another caller may have probed while we waited
        if let Some(is_live) = self.cached(channel) {
            tracing::debug!(channel, is_live, "liveness resolved by concurrent probe");
            return is_live;
        }

        let checked_at = self.clock.now();
        let is_live = self.run_probe(channel).await;
        self.entries.insert(
            channel.to_string(),
            LivenessEntry {
                is_live,
                checked_at,
            },
        );
        is_live
    }

    /// The cached answer, if one exists and is still inside the TTL window
    pub fn cached(&self, channel: &str) -> Option<bool> {
        let entry = self.entries.get(channel)?;
        let age = self.clock.now().saturating_duration_since(entry.checked_at);
        (age < self.config.ttl).then_some(entry.is_live)
    }

    async fn run_probe(&self, channel: &str) -> bool {
        let started = Instant::now();
        let probe = self.probe.probe(channel);

        match tokio::time::timeout(self.config.probe_timeout, probe).await {
            Ok(Ok(output)) => {
                let is_live = parse_probe_output(&output);
                tracing::debug!(
                    channel,
                    is_live,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "probed channel"
                );
                is_live
            }
            Ok(Err(e)) => {
                tracing::warn!(channel, error = %e, "liveness probe failed, treating as offline");
                false
            }
            Err(_) => {
                tracing::warn!(
                    channel,
                    timeout_secs = self.config.probe_timeout.as_secs(),
                    "liveness probe timed out, treating as offline"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for LivenessCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivenessCache")
            .field("config", &self.config)
            .field("entry_count", &self.entries.entry_count())
            .finish()
    }
}

/// A probe answers "live" only with the literal `true`, ignoring case and
/// surrounding whitespace
pub fn parse_probe_output(output: &str) -> bool {
    output.trim().eq_ignore_ascii_case("true")
}
