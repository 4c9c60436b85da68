//! OS backends for the per-thread code-page permission flip.
//!
//! A backend performs the actual system call. It is only ever invoked by
//! the owning [`WxThread`](crate::WxThread), on that thread.

use crate::mode::WxMode;

/// Per-thread code-page permission switch provided by the OS.
pub trait WxBackend {
    /// Make the calling thread's code pages writable or executable.
    ///
    /// Must take effect for the calling thread before returning and must
    /// not affect other threads.
    fn set_wx(&self, mode: WxMode);
}

/// Backend for targets without a per-thread toggle.
///
/// The owning thread still tracks its logical mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

impl WxBackend for NullBackend {
    #[inline(always)]
    fn set_wx(&self, _mode: WxMode) {}
}

#[cfg(all(target_os = "macos", target_arch = "aarch64"))]
pub use self::darwin::JitWriteProtect;

#[cfg(all(target_os = "macos", target_arch = "aarch64"))]
mod darwin {
    use super::WxBackend;
    use crate::mode::WxMode;
    use core::ffi::c_int;

    #[link(name = "pthread")]
    extern "C" {
        fn pthread_jit_write_protect_supported_np() -> c_int;
        fn pthread_jit_write_protect_np(enabled: c_int);
    }

    static SUPPORTED: spin::Once<bool> = spin::Once::new();

    /// `pthread_jit_write_protect_np` on Apple silicon.
    ///
    /// Only meaningful for `MAP_JIT` mappings. When the process lacks the
    /// JIT entitlement the probe reports unsupported and the switch is
    /// skipped.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct JitWriteProtect;

    impl JitWriteProtect {
        /// Whether the running system honours the per-thread switch.
        pub fn is_supported() -> bool {
            *SUPPORTED.call_once(|| {
                // SAFETY: pure query, no preconditions.
                let supported = unsafe { pthread_jit_write_protect_supported_np() } != 0;
                log::debug!("[KPIO WX] pthread_jit_write_protect supported: {}", supported);
                supported
            })
        }
    }

    impl WxBackend for JitWriteProtect {
        #[inline]
        fn set_wx(&self, mode: WxMode) {
            if !Self::is_supported() {
                return;
            }
            let enabled = match mode {
                WxMode::Write => 0,
                WxMode::Exec => 1,
            };
            // SAFETY: affects only the calling thread's view of MAP_JIT pages.
            unsafe { pthread_jit_write_protect_np(enabled) };
        }
    }
}
