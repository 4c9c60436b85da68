//! Per-thread W^X state.
//!
//! [`WxToggle`] is the operation the delegating guard consumes. [`WxThread`]
//! is the state owner the runtime embeds in each of its threads: it tracks
//! the current mode and forwards real changes to a [`WxBackend`].

use core::cell::Cell;
use core::marker::PhantomData;

use crate::backend::{NullBackend, WxBackend};
use crate::mode::WxMode;
use crate::WxError;

/// Switch the calling thread's W^X mode.
pub trait WxToggle {
    /// Enter `mode` and return the mode that was active immediately before.
    ///
    /// Must be called on the thread that owns `self`.
    fn enable_wx(&self, mode: WxMode) -> WxMode;
}

/// W^X thread configuration.
#[derive(Debug, Clone, Copy)]
pub struct WxConfig {
    /// Mode applied by `init_wx`.
    pub initial_mode: WxMode,
    /// Check that the thread is in `Write` at runtime sync points.
    pub assert_at_thread_sync: bool,
}

impl Default for WxConfig {
    fn default() -> Self {
        WxConfig {
            initial_mode: WxMode::Write,
            assert_at_thread_sync: cfg!(debug_assertions),
        }
    }
}

/// W^X state of one runtime thread.
///
/// Neither `Send` nor `Sync`: the tracked mode describes the OS thread that
/// created it.
pub struct WxThread<B: WxBackend = NullBackend> {
    backend: B,
    config: WxConfig,
    /// `None` until initialized.
    state: Cell<Option<WxMode>>,
    /// Backend calls made so far.
    transitions: Cell<u64>,
    _not_send: PhantomData<*const ()>,
}

impl WxThread<NullBackend> {
    /// Thread state that tracks the mode without any OS switch.
    pub fn untracked() -> Self {
        Self::new(NullBackend, WxConfig::default())
    }
}

impl<B: WxBackend> WxThread<B> {
    /// Create uninitialized thread state.
    pub fn new(backend: B, config: WxConfig) -> Self {
        Self {
            backend,
            config,
            state: Cell::new(None),
            transitions: Cell::new(0),
            _not_send: PhantomData,
        }
    }

    /// Apply the configured initial mode.
    ///
    /// Called once, when the runtime attaches the current OS thread.
    pub fn init_wx(&self) {
        debug_assert!(self.state.get().is_none(), "second init_wx");
        log::debug!(
            "[KPIO WX] Initializing thread W^X state ({})",
            self.config.initial_mode
        );
        self.state.set(Some(self.config.initial_mode));
        self.apply(self.config.initial_mode);
    }

    /// Current mode, or `None` before `init_wx`.
    pub fn wx_state(&self) -> Option<WxMode> {
        self.state.get()
    }

    /// Whether `init_wx` has run.
    pub fn is_initialized(&self) -> bool {
        self.state.get().is_some()
    }

    /// Number of mode changes forwarded to the backend.
    pub fn transitions(&self) -> u64 {
        self.transitions.get()
    }

    /// Configuration in use.
    pub fn config(&self) -> &WxConfig {
        &self.config
    }

    /// Backend in use.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Verify the thread is in `expected`.
    pub fn check_wx_state(&self, expected: WxMode) -> Result<(), WxError> {
        match self.state.get() {
            None => Err(WxError::NotInitialized),
            Some(actual) if actual != expected => {
                Err(WxError::UnexpectedMode { expected, actual })
            }
            Some(_) => Ok(()),
        }
    }

    /// Panic in debug builds if the thread is not in `expected`.
    #[track_caller]
    pub fn assert_wx_state(&self, expected: WxMode) {
        if cfg!(debug_assertions) {
            if let Err(err) = self.check_wx_state(expected) {
                panic!("[KPIO WX] {}", err);
            }
        }
    }

    /// Runtime-internal code runs in `Write`; check it on thread
    /// transitions into the runtime when configured to.
    pub fn thread_sync_point(&self) -> Result<(), WxError> {
        if !self.config.assert_at_thread_sync {
            return Ok(());
        }
        self.check_wx_state(WxMode::Write)
    }

    fn apply(&self, mode: WxMode) {
        log::trace!("[KPIO WX] Thread mode -> {}", mode);
        self.backend.set_wx(mode);
        self.transitions.set(self.transitions.get() + 1);
    }
}

impl<B: WxBackend> WxToggle for WxThread<B> {
    fn enable_wx(&self, new_mode: WxMode) -> WxMode {
        let old_mode = match self.state.get() {
            Some(mode) => mode,
            None => {
                log::debug!("[KPIO WX] enable_wx before init_wx, initializing");
                self.init_wx();
                self.config.initial_mode
            }
        };
        if old_mode != new_mode {
            self.state.set(Some(new_mode));
            self.apply(new_mode);
        }
        old_mode
    }
}
