//! # Software Sync Primitives
//!
//! Timeline, completion point and fence file objects, plus the
//! [`SyncPrimitives`] seam the display path uses to reach them.
//!
//! ## Object Graph
//!
//! ```text
//! ┌────────────────┐      ┌─────────────┐      ┌──────────────┐
//! │  SyncTimeline  │◀─────│  SyncPoint  │◀─────│   SyncFile   │◀── descriptors
//! │ value (atomic) │      │  value = V  │      │ (refcounted) │
//! └────────────────┘      └─────────────┘      └──────────────┘
//! ```
//!
//! A point is signaled once the timeline value reaches its target. The
//! timeline value is a single atomic store, so every point due at the new
//! value becomes visible to waiters at the same instant.

use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;

use crate::error::{Error, Result};

// =============================================================================
// FENCE STATUS
// =============================================================================

/// Observable state of a fence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// Bound value not reached yet
    Pending,
    /// Bound value reached; terminal
    Signaled,
}

// =============================================================================
// SYNC TIMELINE
// =============================================================================

/// Monotonic completion counter
#[derive(Debug)]
pub struct SyncTimeline {
    /// Debug name
    name: String,
    /// Current value; only written under `inner`
    value: AtomicU64,
    /// Outstanding points and counters
    inner: Mutex<TimelineInner>,
}

#[derive(Debug, Default)]
struct TimelineInner {
    /// Points not yet released
    pending: Vec<Weak<PointInner>>,
    /// Number of signal calls
    signal_count: u64,
}

impl SyncTimeline {
    /// Create a timeline at value 0
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: String::from(name),
            value: AtomicU64::new(0),
            inner: Mutex::new(TimelineInner::default()),
        })
    }

    /// Timeline name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value
    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    /// Number of live points still waiting for the timeline
    pub fn pending_points(&self) -> usize {
        self.inner
            .lock()
            .pending
            .iter()
            .filter(|pt| pt.strong_count() > 0)
            .count()
    }

    /// Number of signal calls so far
    pub fn signal_count(&self) -> u64 {
        self.inner.lock().signal_count
    }

    /// Advance by `delta` and release every point at or below the new value
    ///
    /// Returns the new value.
    pub fn signal(&self, delta: u32) -> u64 {
        let mut inner = self.inner.lock();

        let new_value = self.value.load(Ordering::Relaxed) + u64::from(delta);
        self.value.store(new_value, Ordering::Release);
        inner.signal_count += 1;

        inner.pending.retain(|pt| match pt.upgrade() {
            Some(pt) => pt.value > new_value,
            None => false,
        });

        new_value
    }

    fn attach(&self, point: &Arc<PointInner>) {
        let mut inner = self.inner.lock();
        if point.value > self.value.load(Ordering::Relaxed) {
            inner.pending.push(Arc::downgrade(point));
        }
    }
}

// =============================================================================
// SYNC POINT
// =============================================================================

#[derive(Debug)]
struct PointInner {
    value: u64,
}

/// "Timeline reaches value V"
#[derive(Debug, Clone)]
pub struct SyncPoint {
    timeline: Arc<SyncTimeline>,
    inner: Arc<PointInner>,
}

impl SyncPoint {
    /// Create a point on `timeline` for `value`
    pub fn new(timeline: &Arc<SyncTimeline>, value: u64) -> Self {
        let inner = Arc::new(PointInner { value });
        timeline.attach(&inner);
        Self {
            timeline: Arc::clone(timeline),
            inner,
        }
    }

    /// Target value
    pub fn value(&self) -> u64 {
        self.inner.value
    }

    /// Owning timeline
    pub fn timeline(&self) -> &Arc<SyncTimeline> {
        &self.timeline
    }

    /// Whether the timeline has reached the target
    pub fn is_signaled(&self) -> bool {
        self.timeline.value() >= self.inner.value
    }
}

// =============================================================================
// SYNC FILE
// =============================================================================

#[derive(Debug)]
struct SyncFileInner {
    id: u64,
    point: SyncPoint,
}

/// Waitable, reference-counted fence object
///
/// Cloning takes another file reference; the fence goes away with the last
/// one.
#[derive(Debug, Clone)]
pub struct SyncFile {
    inner: Arc<SyncFileInner>,
}

impl SyncFile {
    /// Wrap `point`, taking a reference on it
    pub fn new(point: &SyncPoint) -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            inner: Arc::new(SyncFileInner {
                id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
                point: point.clone(),
            }),
        }
    }

    /// Unique file id
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Wrapped completion point
    pub fn point(&self) -> &SyncPoint {
        &self.inner.point
    }

    /// Current state
    pub fn status(&self) -> FenceStatus {
        if self.inner.point.is_signaled() {
            FenceStatus::Signaled
        } else {
            FenceStatus::Pending
        }
    }

    /// Shorthand for `status() == Signaled`
    pub fn is_signaled(&self) -> bool {
        self.status() == FenceStatus::Signaled
    }

    /// Live references to this file
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Whether both handles refer to the same file
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

// =============================================================================
// CLOCK
// =============================================================================

/// Millisecond clock used to bound waits
pub trait MonotonicClock: Send + Sync {
    /// Milliseconds since an arbitrary fixed origin
    fn now_ms(&self) -> u64;
}

/// Clock backed by `std::time::Instant`
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    /// Clock with origin at the current instant
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl MonotonicClock for StdClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

// =============================================================================
// PRIMITIVES SEAM
// =============================================================================

/// Timeline/point/fence operations the display path depends on
pub trait SyncPrimitives: Send + Sync {
    /// Create a timeline at value 0
    fn timeline_create(&self, name: &str) -> Arc<SyncTimeline>;

    /// Create a point bound to `value`, or `None` on failure
    fn point_create(&self, timeline: &Arc<SyncTimeline>, value: u64) -> Option<SyncPoint>;

    /// Wrap a point in a fence file, or `None` on failure
    ///
    /// The caller keeps its own point reference and drops it afterwards.
    fn fence_wrap(&self, point: &SyncPoint) -> Option<SyncFile>;

    /// Block until `file` is signaled or `timeout_ms` elapses
    fn wait(&self, file: &SyncFile, timeout_ms: u32) -> Result<()>;

    /// Advance `timeline` by `delta`
    fn timeline_signal(&self, timeline: &SyncTimeline, delta: u32);
}

/// In-memory implementation of [`SyncPrimitives`]
pub struct SoftwareSync {
    clock: Arc<dyn MonotonicClock>,
}

impl core::fmt::Debug for SoftwareSync {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SoftwareSync").finish_non_exhaustive()
    }
}

impl SoftwareSync {
    /// Primitives timed by `clock`
    pub fn with_clock(clock: Arc<dyn MonotonicClock>) -> Self {
        Self { clock }
    }

    /// Primitives timed by the std clock
    #[cfg(feature = "std")]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(StdClock::new()))
    }

    fn relax() {
        #[cfg(feature = "std")]
        std::thread::sleep(core::time::Duration::from_micros(500));
        #[cfg(not(feature = "std"))]
        core::hint::spin_loop();
    }
}

impl SyncPrimitives for SoftwareSync {
    fn timeline_create(&self, name: &str) -> Arc<SyncTimeline> {
        SyncTimeline::new(name)
    }

    fn point_create(&self, timeline: &Arc<SyncTimeline>, value: u64) -> Option<SyncPoint> {
        Some(SyncPoint::new(timeline, value))
    }

    fn fence_wrap(&self, point: &SyncPoint) -> Option<SyncFile> {
        Some(SyncFile::new(point))
    }

    fn wait(&self, file: &SyncFile, timeout_ms: u32) -> Result<()> {
        let deadline = self.clock.now_ms() + u64::from(timeout_ms);

        loop {
            if file.is_signaled() {
                return Ok(());
            }
            if self.clock.now_ms() >= deadline {
                return Err(Error::WaitTimeout);
            }
            Self::relax();
        }
    }

    fn timeline_signal(&self, timeline: &SyncTimeline, delta: u32) {
        timeline.signal(delta);
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn test_point_signals_at_value() {
        let tl = SyncTimeline::new("test");
        let pt = SyncPoint::new(&tl, 2);
        assert!(!pt.is_signaled());
        assert_eq!(tl.pending_points(), 1);

        tl.signal(1);
        assert!(!pt.is_signaled());
        tl.signal(1);
        assert!(pt.is_signaled());
        assert_eq!(tl.pending_points(), 0);
        assert_eq!(tl.signal_count(), 2);
    }

    #[test]
    fn test_point_below_value_is_born_signaled() {
        let tl = SyncTimeline::new("test");
        tl.signal(3);
        let pt = SyncPoint::new(&tl, 2);
        assert!(pt.is_signaled());
        assert_eq!(tl.pending_points(), 0);
    }

    #[test]
    fn test_dropped_points_are_not_pending() {
        let tl = SyncTimeline::new("test");
        let pt = SyncPoint::new(&tl, 5);
        assert_eq!(tl.pending_points(), 1);
        drop(pt);
        assert_eq!(tl.pending_points(), 0);
    }

    #[test]
    fn test_file_refcount() {
        let tl = SyncTimeline::new("test");
        let pt = SyncPoint::new(&tl, 1);
        let file = SyncFile::new(&pt);
        drop(pt);
        assert_eq!(file.ref_count(), 1);
        let dup = file.clone();
        assert!(SyncFile::ptr_eq(&file, &dup));
        assert_eq!(file.ref_count(), 2);
        assert_eq!(dup.status(), FenceStatus::Pending);
        tl.signal(1);
        assert_eq!(file.status(), FenceStatus::Signaled);
    }

    #[test]
    fn test_wait_returns_immediately_when_signaled() {
        let sync = SoftwareSync::new();
        let tl = sync.timeline_create("test");
        let pt = sync.point_create(&tl, 1).unwrap();
        let file = sync.fence_wrap(&pt).unwrap();
        sync.timeline_signal(&tl, 1);
        assert_eq!(sync.wait(&file, 0), Ok(()));
        assert_eq!(sync.wait(&file, 900), Ok(()));
    }

    #[test]
    fn test_wait_times_out() {
        let sync = SoftwareSync::new();
        let tl = sync.timeline_create("test");
        let file = sync.fence_wrap(&sync.point_create(&tl, 1).unwrap()).unwrap();

        let start = std::time::Instant::now();
        assert_eq!(sync.wait(&file, 50), Err(Error::WaitTimeout));
        let elapsed = start.elapsed().as_millis();
        assert!(elapsed >= 49, "returned early after {} ms", elapsed);
        assert!(elapsed < 1000, "blocked for {} ms", elapsed);
        assert_eq!(tl.value(), 0);
    }

    #[test]
    fn test_wait_wakes_on_signal_from_other_thread() {
        let sync = Arc::new(SoftwareSync::new());
        let tl = sync.timeline_create("test");
        let file = sync.fence_wrap(&sync.point_create(&tl, 1).unwrap()).unwrap();

        let signaler = {
            let sync = Arc::clone(&sync);
            let tl = Arc::clone(&tl);
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(10));
                sync.timeline_signal(&tl, 1);
            })
        };

        assert_eq!(sync.wait(&file, 900), Ok(()));
        signaler.join().unwrap();
    }
}
