//! Best-effort pinning of mapped pages

use super::alignment::{align_down, align_up, is_valid_alignment};
use super::fragments::FragmentSet;
use crate::diagnostics::{default_sink, Diagnostic, DiagnosticSink};
use std::io;
use std::ops::Range;
use std::sync::Arc;
use tracing::debug;

#[cfg(target_os = "macos")]
const MLOCK_SUGGESTION: &str = "Try increasing the sysctl values 'vm.user_wire_limit' and \
     'vm.global_user_wire_limit' and/or decreasing 'vm.global_no_user_wire_amount'. \
     Also try increasing RLIMIT_MEMLOCK (ulimit -l).";
#[cfg(all(unix, not(target_os = "macos")))]
const MLOCK_SUGGESTION: &str = "Try increasing RLIMIT_MEMLOCK ('ulimit -l' as root).";

/// The OS calls a [`MemoryLock`] is built on
pub trait PageLocker {
    /// Lock sizes are rounded up to a multiple of this
    fn granularity(&self) -> usize;

    /// Pin `len` bytes starting at `addr`
    fn lock(&mut self, addr: *const u8, len: usize) -> io::Result<()>;

    /// Unpin `len` bytes starting at `addr`
    fn unlock(&mut self, addr: *const u8, len: usize) -> io::Result<()>;

    /// Advice to show the user when `lock` failed with `error`
    fn suggestion(&self, _error: &io::Error, _len: usize) -> Option<&'static str> {
        None
    }
}

/// `mlock`/`munlock` on unix; unsupported elsewhere
#[derive(Debug, Default, Clone, Copy)]
pub struct OsLocker;

impl PageLocker for OsLocker {
    fn granularity(&self) -> usize {
        #[cfg(unix)]
        {
            super::page_size()
        }
        #[cfg(not(unix))]
        {
            65_536
        }
    }

    #[cfg(unix)]
    fn lock(&mut self, addr: *const u8, len: usize) -> io::Result<()> {
        // SAFETY: mlock only changes residency; a bad range fails with ENOMEM
        if unsafe { libc::mlock(addr.cast(), len) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn lock(&mut self, _addr: *const u8, _len: usize) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "page locking is not supported on this platform",
        ))
    }

    #[cfg(unix)]
    fn unlock(&mut self, addr: *const u8, len: usize) -> io::Result<()> {
        // SAFETY: munlock only changes residency
        if unsafe { libc::munlock(addr.cast(), len) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn unlock(&mut self, _addr: *const u8, _len: usize) -> io::Result<()> {
        Ok(())
    }

    #[cfg(unix)]
    fn suggestion(&self, error: &io::Error, len: usize) -> Option<&'static str> {
        if error.raw_os_error() != Some(libc::ENOMEM) {
            return None;
        }
        let mut limit = libc::rlimit { rlim_cur: 0, rlim_max: 0 };
        // SAFETY: `limit` is a valid out-pointer
        if unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, &mut limit) } != 0 {
            return None;
        }
        // A hard limit with room to spare means the soft limit can be raised.
        if limit.rlim_max > limit.rlim_cur.saturating_add(len as libc::rlim_t) {
            return None;
        }
        Some(MLOCK_SUGGESTION)
    }
}

/// Progress of a [`MemoryLock`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// Nothing locked yet
    Untried,
    /// This many bytes from the base address are pinned
    Locked(usize),
    /// A lock attempt failed; no further attempts will be made
    Failed,
}

/// Pins a growing prefix of a mapping in physical memory.
///
/// The pinned prefix only grows. The first failed attempt unpins whatever was
/// pinned and turns every later [`grow_to`](MemoryLock::grow_to) into a no-op,
/// so a process over its lock limit pays for one failed syscall, not one per
/// call.
///
/// Ranges reported through [`forget`](MemoryLock::forget) have been unmapped
/// and lost their locks with them; they are skipped when locking and
/// unlocking.
pub struct MemoryLock<L: PageLocker = OsLocker> {
    addr: *const u8,
    state: LockState,
    released: Vec<Range<usize>>,
    locker: L,
    sink: Arc<dyn DiagnosticSink>,
}

// SAFETY: the address is only passed to the locker; all state changes need
// `&mut self`.
unsafe impl<L: PageLocker + Send> Send for MemoryLock<L> {}
unsafe impl<L: PageLocker + Sync> Sync for MemoryLock<L> {}

impl MemoryLock<OsLocker> {
    /// Start pinning at `addr` with the OS locker
    pub fn new(addr: *const u8) -> Self {
        Self::with_locker(addr, OsLocker, default_sink())
    }
}

impl<L: PageLocker> MemoryLock<L> {
    /// Start pinning at `addr` with a specific locker and sink
    pub fn with_locker(addr: *const u8, locker: L, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self { addr, state: LockState::Untried, released: Vec::new(), locker, sink }
    }

    /// Current state; `Locked` carries the high-water mark
    pub fn state(&self) -> LockState {
        self.state
    }

    /// Number of bytes currently pinned
    pub fn locked_len(&self) -> usize {
        self.live(self.watermark()).mapped_bytes()
    }

    /// Check whether locking has been given up
    pub fn has_failed(&self) -> bool {
        self.state == LockState::Failed
    }

    /// The locker in use
    pub fn locker(&self) -> &L {
        &self.locker
    }

    /// Record that `range` was unmapped, which drops its locks
    pub fn forget(&mut self, range: Range<usize>) {
        if !range.is_empty() {
            self.released.push(range);
        }
    }

    /// Pin at least `target_size` bytes from the base address
    pub fn grow_to(&mut self, target_size: usize) {
        let locked = match self.state {
            LockState::Failed => return,
            LockState::Untried => 0,
            LockState::Locked(len) => len,
        };

        let granularity = self.locker.granularity();
        if !is_valid_alignment(granularity) {
            self.sink.emit(Diagnostic::LockFailed {
                len: target_size.saturating_sub(locked),
                previously_locked: locked,
                message: format!("invalid lock granularity {}", granularity),
                suggestion: None,
            });
            self.unlock_below(locked);
            self.state = LockState::Failed;
            return;
        }

        let target = align_up(target_size, granularity)
            .unwrap_or_else(|| align_down(usize::MAX, granularity));
        if target <= locked {
            return;
        }

        let len = target - locked;
        let mut pending = self.live(target);
        pending.release(&(0..locked));
        for piece in pending.as_slice() {
            if let Err(error) = self.locker.lock(self.addr.wrapping_add(piece.start), piece.len()) {
                self.sink.emit(Diagnostic::LockFailed {
                    len,
                    previously_locked: locked,
                    message: error.to_string(),
                    suggestion: self.locker.suggestion(&error, len),
                });
                self.unlock_below(piece.start);
                self.state = LockState::Failed;
                return;
            }
        }

        debug!(locked = target, "locked pages");
        self.state = LockState::Locked(target);
    }

    fn watermark(&self) -> usize {
        match self.state {
            LockState::Locked(len) => len,
            LockState::Untried | LockState::Failed => 0,
        }
    }

    /// The parts of `[0, end)` that were not forgotten
    fn live(&self, end: usize) -> FragmentSet {
        let mut live = FragmentSet::new(end);
        for range in &self.released {
            live.release(range);
        }
        live
    }

    /// Unlock every live piece below `end`
    fn unlock_below(&mut self, end: usize) {
        let live = self.live(end);
        for piece in live.as_slice() {
            if let Err(error) = self.locker.unlock(self.addr.wrapping_add(piece.start), piece.len())
            {
                self.sink
                    .emit(Diagnostic::UnlockFailed { len: piece.len(), message: error.to_string() });
            }
        }
    }
}

impl<L: PageLocker> Drop for MemoryLock<L> {
    fn drop(&mut self) {
        let watermark = self.watermark();
        self.unlock_below(watermark);
    }
}

impl<L: PageLocker> std::fmt::Debug for MemoryLock<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLock").field("addr", &self.addr).field("state", &self.state).finish()
    }
}
