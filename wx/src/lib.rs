//! KPIO W^X Thread Mode Control
//!
//! The JIT emits and patches machine code at run time. On systems that
//! enforce write-xor-execute per thread, a thread must switch its view of
//! code pages to *writable* before emitting and back to *executable* before
//! running. On systems without that switch but with the same
//! cross-modifying-code hazard, the thread must instead issue data and
//! instruction synchronization barriers at the right boundaries.
//!
//! Both concerns are expressed through one scoped guard,
//! [`ThreadWxEnable`], whose implementation is chosen at build time:
//!
//! | Target                                   | Strategy                |
//! |------------------------------------------|-------------------------|
//! | macOS / aarch64                          | delegated OS toggle     |
//! | FreeBSD, NetBSD, OpenBSD, DragonFly / aarch64 | barrier-only       |
//! | everything else                          | no-op (compiled out)    |
//!
//! ```ignore
//! let _wx = ThreadWxEnable::new(WxMode::Write, Some(&thread));
//! // emit code...
//! // dropped here: previous mode restored / barrier issued
//! ```
//!
//! # Modules
//!
//! - `mode`: the two-valued [`WxMode`]
//! - `thread`: the [`WxToggle`] seam and the reference per-thread state owner
//! - `backend`: OS calls that actually flip code-page permissions
//! - `strategy`: the three guard implementations and build-time selection
//! - `code`: a code buffer that writes and runs under the guard

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod backend;
pub mod code;
pub mod mode;
pub mod strategy;
pub mod thread;

use core::fmt;

pub use backend::{NullBackend, WxBackend};
#[cfg(all(target_os = "macos", target_arch = "aarch64"))]
pub use backend::JitWriteProtect;
pub use code::{CodeBuffer, CodeError};
pub use mode::WxMode;
pub use strategy::{with_wx, ThreadWxEnable, WxStrategy, ACTIVE_STRATEGY};
pub use thread::{WxConfig, WxThread, WxToggle};

/// Thread W^X state errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WxError {
    /// The thread's W^X state has not been initialized.
    NotInitialized,
    /// The thread is not in the mode the caller expected.
    UnexpectedMode {
        /// Mode the caller required.
        expected: WxMode,
        /// Mode the thread is actually in.
        actual: WxMode,
    },
}

impl fmt::Display for WxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WxError::NotInitialized => write!(f, "W^X state not initialized"),
            WxError::UnexpectedMode { expected, actual } => {
                write!(f, "expected W^X mode {}, thread is in {}", expected, actual)
            }
        }
    }
}
