//! Delegated OS toggle.
//!
//! For targets with a real per-thread code-protection switch. The owning
//! thread performs the switch and reports the mode it replaced, which is
//! restored on drop.

use core::marker::PhantomData;

use crate::mode::WxMode;
use crate::thread::WxToggle;

/// Scoped W^X mode that swaps through the owning thread.
///
/// With no thread the guard assumes `Write` and does nothing.
#[must_use = "the previous mode is restored as soon as the guard is dropped"]
pub struct DelegatedWxEnable<'a> {
    thread: Option<&'a dyn WxToggle>,
    old_mode: WxMode,
    _not_send: PhantomData<*const ()>,
}

impl<'a> DelegatedWxEnable<'a> {
    /// Enter `new_mode` on `thread` until the guard is dropped.
    ///
    /// The toggle is called even if the thread is already in `new_mode`.
    #[inline]
    pub fn new(new_mode: WxMode, thread: Option<&'a dyn WxToggle>) -> Self {
        let old_mode = match thread {
            Some(thread) => thread.enable_wx(new_mode),
            None => WxMode::Write,
        };
        Self {
            thread,
            old_mode,
            _not_send: PhantomData,
        }
    }

    /// Mode that will be restored on drop.
    pub fn previous_mode(&self) -> WxMode {
        self.old_mode
    }
}

impl Drop for DelegatedWxEnable<'_> {
    #[inline]
    fn drop(&mut self) {
        if let Some(thread) = self.thread {
            thread.enable_wx(self.old_mode);
        }
    }
}
