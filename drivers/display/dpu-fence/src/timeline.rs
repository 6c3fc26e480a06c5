//! # Device Timeline
//!
//! One sync timeline per display controller. Two counters live here:
//!
//! - `current_value`: how many frames have completed (owned by the sync
//!   timeline, advanced by [`DeviceTimeline::signal`]);
//! - `timeline_max`: the highest completion value handed to a fence.
//!
//! `timeline_max` only changes under the mint lock, and a reservation that
//! is not committed gives its value back on drop, so values are never
//! skipped or reused. Signaling does not take the mint lock; a value the
//! timeline has already reached is never given back, so it cannot be minted
//! a second time.

use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use spin::{Mutex, MutexGuard};

use crate::config::OutputType;
use crate::sw_sync::{SyncPrimitives, SyncTimeline};

// =============================================================================
// STATISTICS
// =============================================================================

/// Timeline snapshot for debugging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimelineStats {
    /// Completed frame count
    pub current_value: u64,
    /// Highest minted completion value
    pub timeline_max: u64,
    /// Points still waiting for the timeline
    pub pending_points: usize,
    /// Signal calls so far
    pub signal_count: u64,
}

// =============================================================================
// DEVICE TIMELINE
// =============================================================================

/// Per-device timeline and high-water mark
pub struct DeviceTimeline {
    /// Log tag
    id: u32,
    /// Backing primitives
    primitives: Arc<dyn SyncPrimitives>,
    /// Completion counter
    timeline: Arc<SyncTimeline>,
    /// Serializes every change of `timeline_max`
    mint_lock: Mutex<()>,
    /// Highest minted value
    timeline_max: AtomicU64,
}

impl DeviceTimeline {
    /// Create the timeline for device `id`
    pub fn create(
        primitives: Arc<dyn SyncPrimitives>,
        id: u32,
        out_type: OutputType,
        name: &str,
    ) -> Self {
        let timeline = primitives.timeline_create(name);
        let this = Self {
            id,
            primitives,
            timeline,
            mint_lock: Mutex::new(()),
            timeline_max: AtomicU64::new(0),
        };

        // Write-back outputs start from zero as well; kept as an explicit
        // reset for parity with the other output paths.
        if out_type == OutputType::Writeback {
            this.timeline_max.store(0, Ordering::Release);
        }

        log::debug!("decon{}: timeline '{}' created ({:?})", id, name, out_type);
        this
    }

    /// Device log tag
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Timeline name
    pub fn name(&self) -> &str {
        self.timeline.name()
    }

    /// Backing sync timeline
    pub fn sync_timeline(&self) -> &Arc<SyncTimeline> {
        &self.timeline
    }

    /// Backing primitives
    pub fn primitives(&self) -> &dyn SyncPrimitives {
        &*self.primitives
    }

    /// Completed frame count
    pub fn current_value(&self) -> u64 {
        self.timeline.value()
    }

    /// Highest minted completion value
    pub fn timeline_max(&self) -> u64 {
        self.timeline_max.load(Ordering::Acquire)
    }

    /// Reserve the next completion value
    pub fn next_value(&self) -> u64 {
        let _guard = self.mint_lock.lock();
        self.timeline_max.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Give back the most recently reserved value
    ///
    /// A value the timeline has already reached stays reserved.
    pub fn rollback(&self) {
        let _guard = self.mint_lock.lock();
        Self::undo_reservation(self.id, &self.timeline_max, &self.timeline);
    }

    /// Reserve the next value and keep minting exclusive until the
    /// reservation is committed or dropped
    pub fn begin_mint(&self) -> MintReservation<'_> {
        let guard = self.mint_lock.lock();
        let value = self.timeline_max.fetch_add(1, Ordering::AcqRel) + 1;
        MintReservation {
            _guard: guard,
            id: self.id,
            timeline_max: &self.timeline_max,
            timeline: &self.timeline,
            value,
            armed: true,
        }
    }

    /// Advance the timeline by `delta`, releasing every due point
    pub fn signal(&self, delta: u32) -> u64 {
        self.primitives.timeline_signal(&self.timeline, delta);
        let value = self.timeline.value();

        let max = self.timeline_max();
        if value > max {
            log::warn!(
                "decon{}: timeline signaled to {} past minted max {}",
                self.id,
                value,
                max
            );
        } else {
            log::debug!("decon{}: timeline signaled to {}", self.id, value);
        }
        value
    }

    /// Debug snapshot
    pub fn stats(&self) -> TimelineStats {
        TimelineStats {
            current_value: self.current_value(),
            timeline_max: self.timeline_max(),
            pending_points: self.timeline.pending_points(),
            signal_count: self.timeline.signal_count(),
        }
    }

    fn undo_reservation(id: u32, timeline_max: &AtomicU64, timeline: &SyncTimeline) {
        let prev = timeline_max.load(Ordering::Acquire);
        if prev == 0 {
            log::warn!("decon{}: rollback with nothing reserved", id);
            return;
        }
        let current = timeline.value();
        if current >= prev {
            log::warn!(
                "decon{}: value {} already signaled (timeline at {}), not rolled back",
                id,
                prev,
                current
            );
            return;
        }
        timeline_max.store(prev - 1, Ordering::Release);
    }
}

impl fmt::Debug for DeviceTimeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceTimeline")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("current_value", &self.current_value())
            .field("timeline_max", &self.timeline_max())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// MINT RESERVATION
// =============================================================================

/// Reserved completion value, rolled back on drop unless committed
pub struct MintReservation<'a> {
    _guard: MutexGuard<'a, ()>,
    id: u32,
    timeline_max: &'a AtomicU64,
    timeline: &'a SyncTimeline,
    value: u64,
    armed: bool,
}

impl MintReservation<'_> {
    /// Reserved value
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Keep the value
    pub fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for MintReservation<'_> {
    fn drop(&mut self) {
        if self.armed {
            log::debug!("decon{}: rolling back timeline value {}", self.id, self.value);
            DeviceTimeline::undo_reservation(self.id, self.timeline_max, self.timeline);
        }
    }
}

impl fmt::Debug for MintReservation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MintReservation")
            .field("value", &self.value)
            .field("armed", &self.armed)
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::sw_sync::SoftwareSync;

    fn timeline() -> DeviceTimeline {
        DeviceTimeline::create(Arc::new(SoftwareSync::new()), 0, OutputType::Dsi, "decon0")
    }

    #[test]
    fn test_create_starts_at_zero() {
        let tl = timeline();
        assert_eq!(tl.current_value(), 0);
        assert_eq!(tl.timeline_max(), 0);
        assert_eq!(tl.name(), "decon0");

        let wb = DeviceTimeline::create(
            Arc::new(SoftwareSync::new()),
            2,
            OutputType::Writeback,
            "decon2",
        );
        assert_eq!(wb.timeline_max(), 0);
    }

    #[test]
    fn test_next_value_and_rollback() {
        let tl = timeline();
        assert_eq!(tl.next_value(), 1);
        assert_eq!(tl.next_value(), 2);
        tl.rollback();
        assert_eq!(tl.timeline_max(), 1);
        assert_eq!(tl.next_value(), 2);
    }

    #[test]
    fn test_rollback_never_underflows() {
        let tl = timeline();
        tl.rollback();
        assert_eq!(tl.timeline_max(), 0);
    }

    #[test]
    fn test_reservation_rolls_back_on_drop() {
        let tl = timeline();
        {
            let mint = tl.begin_mint();
            assert_eq!(mint.value(), 1);
        }
        assert_eq!(tl.timeline_max(), 0);

        tl.begin_mint().commit();
        assert_eq!(tl.timeline_max(), 1);
    }

    #[test]
    fn test_rollback_keeps_signaled_value() {
        let tl = timeline();
        let mint = tl.begin_mint();
        assert_eq!(mint.value(), 1);

        // Completion path runs while the reservation is still open.
        assert_eq!(tl.signal(1), 1);
        drop(mint);

        assert_eq!(tl.timeline_max(), 1);
        assert_eq!(tl.next_value(), 2);
        assert!(tl.current_value() < tl.timeline_max());

        tl.signal(1);
        tl.rollback();
        assert_eq!(tl.timeline_max(), 2);
    }

    #[test]
    fn test_monotonic_under_interleaving() {
        let tl = timeline();
        let mut last_max = 0;
        for round in 0..20u64 {
            tl.next_value();
            if round % 3 == 0 {
                let mint = tl.begin_mint();
                drop(mint);
            }
            if round % 2 == 0 && tl.current_value() < tl.timeline_max() {
                tl.signal(1);
            }
            assert!(tl.timeline_max() >= last_max);
            assert!(tl.current_value() <= tl.timeline_max());
            last_max = tl.timeline_max();
        }
        assert_eq!(tl.timeline_max(), 20);
    }

    #[test]
    fn test_concurrent_minting_never_reuses_values() {
        let tl = Arc::new(timeline());
        let mut workers = std::vec::Vec::new();
        for _ in 0..4 {
            let tl = Arc::clone(&tl);
            workers.push(std::thread::spawn(move || {
                let mut values = std::vec::Vec::new();
                for i in 0..100 {
                    let mint = tl.begin_mint();
                    let value = mint.value();
                    if i % 5 == 0 {
                        drop(mint);
                    } else {
                        mint.commit();
                        values.push(value);
                    }
                }
                values
            }));
        }

        let mut all: std::vec::Vec<u64> = workers
            .into_iter()
            .flat_map(|w| w.join().unwrap())
            .collect();
        all.sort_unstable();
        let expected: std::vec::Vec<u64> = (1..=320).collect();
        assert_eq!(all, expected);
        assert_eq!(tl.timeline_max(), 320);
    }

    #[test]
    fn test_signal_advances_and_reports() {
        let tl = timeline();
        tl.next_value();
        tl.next_value();
        assert_eq!(tl.signal(1), 1);
        let stats = tl.stats();
        assert_eq!(stats.current_value, 1);
        assert_eq!(stats.timeline_max, 2);
        assert_eq!(stats.signal_count, 1);
    }
}
