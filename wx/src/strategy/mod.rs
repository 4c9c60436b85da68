//! Guard strategies and build-time selection.
//!
//! All three guards are built on every target so they can be tested
//! anywhere. Only one of them is [`ThreadWxEnable`] for a given build:
//!
//! - delegated: macOS on aarch64
//! - barrier-only: BSDs on aarch64, or any other target with
//!   `force-barriers`
//! - no-op: everything else, or any target with `force-noop`

pub mod barrier;
pub mod delegated;
pub mod noop;

pub use barrier::{BarrierWxEnable, CodeBarrier, CpuBarrier};
pub use delegated::DelegatedWxEnable;
pub use noop::NoopWxEnable;

use crate::mode::WxMode;
use crate::thread::WxToggle;

/// How [`ThreadWxEnable`] is implemented in this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WxStrategy {
    /// The owning thread flips code-page permissions through the OS.
    Delegated,
    /// No permission change; dsb/isb at the hazardous boundaries.
    BarrierOnly,
    /// Compiled out.
    Noop,
}

#[cfg(all(
    target_os = "macos",
    target_arch = "aarch64",
    not(feature = "force-noop")
))]
mod selected {
    pub type ThreadWxEnable<'a> = super::DelegatedWxEnable<'a>;
    pub const ACTIVE_STRATEGY: super::WxStrategy = super::WxStrategy::Delegated;
}

#[cfg(all(
    not(feature = "force-noop"),
    not(all(target_os = "macos", target_arch = "aarch64")),
    any(
        feature = "force-barriers",
        all(
            target_arch = "aarch64",
            any(
                target_os = "freebsd",
                target_os = "netbsd",
                target_os = "openbsd",
                target_os = "dragonfly"
            )
        )
    )
))]
mod selected {
    pub type ThreadWxEnable<'a> = super::BarrierWxEnable<'a, super::CpuBarrier>;
    pub const ACTIVE_STRATEGY: super::WxStrategy = super::WxStrategy::BarrierOnly;
}

#[cfg(any(
    feature = "force-noop",
    not(any(
        all(target_os = "macos", target_arch = "aarch64"),
        feature = "force-barriers",
        all(
            target_arch = "aarch64",
            any(
                target_os = "freebsd",
                target_os = "netbsd",
                target_os = "openbsd",
                target_os = "dragonfly"
            )
        )
    ))
))]
mod selected {
    pub type ThreadWxEnable<'a> = super::NoopWxEnable<'a>;
    pub const ACTIVE_STRATEGY: super::WxStrategy = super::WxStrategy::Noop;
}

/// Scoped W^X mode for the current target.
///
/// `ThreadWxEnable::new(mode, thread)` enters `mode`; dropping the guard
/// undoes it. Bind it to a named variable (`let _wx = ...`), not `_`.
pub use selected::ThreadWxEnable;

/// Strategy compiled into [`ThreadWxEnable`].
pub use selected::ACTIVE_STRATEGY;

/// Run `f` with the calling thread in `mode`.
#[inline]
pub fn with_wx<R>(mode: WxMode, thread: Option<&dyn WxToggle>, f: impl FnOnce() -> R) -> R {
    let _wx = ThreadWxEnable::new(mode, thread);
    f()
}
