//! Chain clock and sync classification.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Mainnet beacon chain genesis, 2020-12-01T12:00:00Z.
pub const MAINNET_GENESIS_UNIX: u64 = 1_606_824_000;
/// Slot duration on mainnet.
pub const MAINNET_SLOT_DURATION: Duration = Duration::from_secs(12);
/// Lag in slots still considered synced, 256 epochs.
pub const DEFAULT_IGNORE_THRESHOLD: u64 = 8192;

/// Current wall clock time in unix seconds.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Sync status of a peer relative to the expected chain head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStatus {
    pub synced: bool,
    /// Lag as a percentage of the expected head slot, `0` when synced.
    pub distance: u64,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.synced {
            write!(f, "synced")
        } else {
            write!(f, "unsynced ({}% behind)", self.distance)
        }
    }
}

/// Wall clock view of the chain, used to judge a peer's reported head slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainClock {
    pub genesis_unix: u64,
    pub slot_duration: Duration,
    pub ignore_threshold: u64,
}

impl Default for ChainClock {
    fn default() -> Self {
        ChainClock {
            genesis_unix: MAINNET_GENESIS_UNIX,
            slot_duration: MAINNET_SLOT_DURATION,
            ignore_threshold: DEFAULT_IGNORE_THRESHOLD,
        }
    }
}

impl ChainClock {
    /// Slot the chain should be at, `0` before genesis.
    pub fn expected_slot(&self, now_unix: u64) -> u64 {
        let seconds = self.slot_duration.as_secs().max(1);
        now_unix.saturating_sub(self.genesis_unix) / seconds
    }

    /// Classify a peer reporting `head_slot` at `now_unix`.
    pub fn classify(&self, head_slot: u64, now_unix: u64) -> SyncStatus {
        let expected = self.expected_slot(now_unix);
        let behind = expected.saturating_sub(head_slot);
        if behind <= self.ignore_threshold {
            SyncStatus {
                synced: true,
                distance: 0,
            }
        } else {
            SyncStatus {
                synced: false,
                // behind > threshold implies expected > 0.
                distance: behind.saturating_mul(100) / expected,
            }
        }
    }
}
