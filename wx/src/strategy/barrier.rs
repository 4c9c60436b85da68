//! Barrier-only strategy.
//!
//! For aarch64 systems with no per-thread JIT switch. HotSpot-style
//! cross-modification still needs the data and instruction synchronization
//! that `pthread_jit_write_protect_np` happens to perform on Darwin, so the
//! guard issues `dsb sy; isb sy` at the two hazardous boundaries:
//!
//! - entering `Exec`: the code about to run may just have been written
//! - leaving `Write`: the code just written may be run outside the scope
//!
//! Entering `Write` and leaving `Exec` issue nothing. The barrier is costly
//! on some Cortex cores; correctness wins.

use core::marker::PhantomData;

use crate::mode::WxMode;
use crate::thread::WxToggle;

/// A full-system data + instruction synchronization barrier.
pub trait CodeBarrier {
    /// Make all prior stores visible to every core, then discard any
    /// instructions fetched before the barrier.
    fn full_system_barrier();
}

/// The CPU barrier pair.
///
/// Off aarch64 (only reachable with `force-barriers`) this lowers to a
/// sequentially consistent fence.
#[derive(Debug, Clone, Copy)]
pub struct CpuBarrier;

impl CodeBarrier for CpuBarrier {
    #[inline(always)]
    fn full_system_barrier() {
        #[cfg(target_arch = "aarch64")]
        // SAFETY: barrier instructions only; no register or stack effects.
        // `nomem` is left off so this is also a compiler memory clobber.
        unsafe {
            core::arch::asm!("dsb sy", "isb sy", options(nostack, preserves_flags));
        }

        #[cfg(not(target_arch = "aarch64"))]
        core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
    }
}

/// Scoped W^X mode that only orders memory.
///
/// The thread argument is accepted so call sites match the other strategies.
#[must_use = "the write-side barrier is issued as soon as the guard is dropped"]
pub struct BarrierWxEnable<'a, B: CodeBarrier = CpuBarrier> {
    new_mode: WxMode,
    _marker: PhantomData<(&'a (), *const B)>,
}

impl<'a, B: CodeBarrier> BarrierWxEnable<'a, B> {
    /// Enter `new_mode`; barrier now if it is `Exec`.
    #[inline]
    pub fn new(new_mode: WxMode, _thread: Option<&'a dyn WxToggle>) -> Self {
        if new_mode == WxMode::Exec {
            B::full_system_barrier();
        }
        Self {
            new_mode,
            _marker: PhantomData,
        }
    }

    /// Mode requested at construction.
    pub fn mode(&self) -> WxMode {
        self.new_mode
    }
}

impl<B: CodeBarrier> Drop for BarrierWxEnable<'_, B> {
    #[inline]
    fn drop(&mut self) {
        if self.new_mode == WxMode::Write {
            B::full_system_barrier();
        }
    }
}
