//! Fault-injecting collaborators for unit tests.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};

use spin::Mutex;

use crate::config::VALID_FD_FLOOR;
use crate::descriptor::{Descriptor, DescriptorFlags, HandleSpace};
use crate::error::{Error, Result};
use crate::handle_table::HandleTable;
use crate::sw_sync::{SoftwareSync, SyncFile, SyncPoint, SyncPrimitives, SyncTimeline};

/// Timeline plus a fence file pending on value 1
pub(crate) fn pending_file() -> (Arc<SyncTimeline>, SyncFile) {
    let timeline = SyncTimeline::new("test");
    let file = SyncFile::new(&SyncPoint::new(&timeline, 1));
    (timeline, file)
}

// =============================================================================
// FAULTY SYNC
// =============================================================================

/// [`SoftwareSync`] that can refuse point creation or wrapping
#[derive(Debug)]
pub(crate) struct FaultySync {
    inner: SoftwareSync,
    fail_points: AtomicBool,
    fail_wraps: AtomicBool,
    wait_error: AtomicI32,
}

impl FaultySync {
    pub(crate) fn new() -> Self {
        Self {
            inner: SoftwareSync::new(),
            fail_points: AtomicBool::new(false),
            fail_wraps: AtomicBool::new(false),
            wait_error: AtomicI32::new(0),
        }
    }

    pub(crate) fn fail_points(&self, fail: bool) {
        self.fail_points.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_wraps(&self, fail: bool) {
        self.fail_wraps.store(fail, Ordering::SeqCst);
    }

    /// Make every wait report `code`; 0 restores normal waits
    pub(crate) fn fail_waits(&self, code: i32) {
        self.wait_error.store(code, Ordering::SeqCst);
    }
}

impl SyncPrimitives for FaultySync {
    fn timeline_create(&self, name: &str) -> Arc<SyncTimeline> {
        self.inner.timeline_create(name)
    }

    fn point_create(&self, timeline: &Arc<SyncTimeline>, value: u64) -> Option<SyncPoint> {
        if self.fail_points.load(Ordering::SeqCst) {
            return None;
        }
        self.inner.point_create(timeline, value)
    }

    fn fence_wrap(&self, point: &SyncPoint) -> Option<SyncFile> {
        if self.fail_wraps.load(Ordering::SeqCst) {
            return None;
        }
        self.inner.fence_wrap(point)
    }

    fn wait(&self, file: &SyncFile, timeout_ms: u32) -> Result<()> {
        match self.wait_error.load(Ordering::SeqCst) {
            0 => self.inner.wait(file, timeout_ms),
            code => Err(Error::WaitFailed(code)),
        }
    }

    fn timeline_signal(&self, timeline: &SyncTimeline, delta: u32) {
        self.inner.timeline_signal(timeline, delta);
    }
}

// =============================================================================
// FAULTY HANDLES
// =============================================================================

/// [`HandleTable`] whose N-th `alloc` call fails
#[derive(Debug)]
pub(crate) struct FaultyHandles {
    table: HandleTable,
    calls: AtomicU64,
    fail_on: AtomicU64,
}

impl FaultyHandles {
    pub(crate) fn new(table: HandleTable) -> Self {
        Self {
            table,
            calls: AtomicU64::new(0),
            fail_on: AtomicU64::new(0),
        }
    }

    /// Fail the `call`-th allocation (1-based, counted from creation)
    pub(crate) fn fail_on(self, call: u64) -> Self {
        self.fail_on_call(call);
        self
    }

    pub(crate) fn fail_on_call(&self, call: u64) {
        self.fail_on.store(call, Ordering::SeqCst);
    }

    pub(crate) fn table(&self) -> &HandleTable {
        &self.table
    }
}

impl HandleSpace for FaultyHandles {
    fn alloc(&self, flags: DescriptorFlags) -> Result<Descriptor> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on.load(Ordering::SeqCst) {
            return Err(Error::TooManyOpenFiles);
        }
        self.table.alloc(flags)
    }

    fn free(&self, fd: Descriptor) {
        self.table.free(fd);
    }

    fn install(&self, fd: Descriptor, file: SyncFile) {
        self.table.install(fd, file);
    }

    fn close(&self, fd: Descriptor) -> Result<()> {
        self.table.close(fd)
    }

    fn get(&self, fd: Descriptor) -> Option<SyncFile> {
        self.table.get(fd)
    }
}

// =============================================================================
// STDIO-ONLY HANDLES
// =============================================================================

/// Handle space that only ever hands out 0, 1, 2, 0, ...
#[derive(Debug, Default)]
pub(crate) struct StdioOnlyHandles {
    next: AtomicU64,
    outstanding: Mutex<Vec<Descriptor>>,
}

impl StdioOnlyHandles {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn alloc_calls(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }

    /// Descriptors allocated and not freed yet
    pub(crate) fn outstanding(&self) -> Vec<Descriptor> {
        self.outstanding.lock().clone()
    }
}

impl HandleSpace for StdioOnlyHandles {
    fn alloc(&self, _flags: DescriptorFlags) -> Result<Descriptor> {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        let fd = Descriptor::from_raw((n % VALID_FD_FLOOR as u64) as i32)
            .ok_or(Error::TooManyOpenFiles)?;
        self.outstanding.lock().push(fd);
        Ok(fd)
    }

    fn free(&self, fd: Descriptor) {
        let mut outstanding = self.outstanding.lock();
        if let Some(pos) = outstanding.iter().rposition(|&o| o == fd) {
            outstanding.remove(pos);
        }
    }

    fn install(&self, fd: Descriptor, _file: SyncFile) {
        self.free(fd);
    }

    fn close(&self, fd: Descriptor) -> Result<()> {
        self.free(fd);
        Ok(())
    }

    fn get(&self, _fd: Descriptor) -> Option<SyncFile> {
        None
    }
}
