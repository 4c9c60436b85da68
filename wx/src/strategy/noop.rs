//! No-op strategy for targets with neither a W^X switch nor the
//! cross-modification hazard.

use core::marker::PhantomData;

use crate::mode::WxMode;
use crate::thread::WxToggle;

/// Zero-sized scoped W^X mode that does nothing.
#[must_use]
pub struct NoopWxEnable<'a> {
    _marker: PhantomData<(&'a (), *const ())>,
}

impl<'a> NoopWxEnable<'a> {
    #[inline(always)]
    pub fn new(_new_mode: WxMode, _thread: Option<&'a dyn WxToggle>) -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}
