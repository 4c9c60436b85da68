//! JIT code buffer.
//!
//! Every mutation of the buffer happens inside a `Write` scope and every
//! run inside an `Exec` scope, so callers cannot forget the W^X switch or
//! the barrier that goes with it.

use alloc::vec::Vec;
use core::fmt;

use crate::mode::WxMode;
use crate::strategy::ThreadWxEnable;
use crate::thread::WxToggle;

/// Errors from code buffer operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeError {
    /// Exceeds the buffer's maximum size.
    ExceedsMaxSize,
    /// Patch range lies outside the emitted code.
    OutOfBounds,
    /// Buffer has been freed.
    RegionFreed,
    /// Nothing has been emitted yet.
    Empty,
}

impl fmt::Display for CodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeError::ExceedsMaxSize => write!(f, "code buffer size limit exceeded"),
            CodeError::OutOfBounds => write!(f, "patch outside emitted code"),
            CodeError::RegionFreed => write!(f, "code buffer freed"),
            CodeError::Empty => write!(f, "code buffer empty"),
        }
    }
}

/// Machine code emitted, patched and run under the thread's W^X guard.
#[derive(Debug)]
pub struct CodeBuffer {
    buffer: Vec<u8>,
    max_size: usize,
    freed: bool,
}

impl CodeBuffer {
    /// Default maximum code size: 16 MB.
    pub const DEFAULT_MAX_SIZE: usize = 16 * 1024 * 1024;

    pub fn new(max_size: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_size,
            freed: false,
        }
    }

    pub fn with_default_max() -> Self {
        Self::new(Self::DEFAULT_MAX_SIZE)
    }

    /// Append `code` and return the offset it starts at.
    pub fn emit(
        &mut self,
        thread: Option<&dyn WxToggle>,
        code: &[u8],
    ) -> Result<usize, CodeError> {
        self.check_live()?;
        if self.buffer.len() + code.len() > self.max_size {
            return Err(CodeError::ExceedsMaxSize);
        }

        let _wx = ThreadWxEnable::new(WxMode::Write, thread);
        let offset = self.buffer.len();
        self.buffer.extend_from_slice(code);
        log::trace!("[KPIO WX] Emitted {} bytes at {:#x}", code.len(), offset);
        Ok(offset)
    }

    /// Overwrite already-emitted code at `offset`.
    pub fn patch(
        &mut self,
        thread: Option<&dyn WxToggle>,
        offset: usize,
        code: &[u8],
    ) -> Result<(), CodeError> {
        self.check_live()?;
        let end = offset
            .checked_add(code.len())
            .ok_or(CodeError::OutOfBounds)?;
        if end > self.buffer.len() {
            return Err(CodeError::OutOfBounds);
        }

        let _wx = ThreadWxEnable::new(WxMode::Write, thread);
        self.buffer[offset..end].copy_from_slice(code);
        log::trace!("[KPIO WX] Patched {} bytes at {:#x}", code.len(), offset);
        Ok(())
    }

    /// Run `f` over the emitted code with the thread in `Exec`.
    pub fn execute<R>(
        &self,
        thread: Option<&dyn WxToggle>,
        f: impl FnOnce(&[u8]) -> R,
    ) -> Result<R, CodeError> {
        self.check_live()?;
        if self.buffer.is_empty() {
            return Err(CodeError::Empty);
        }

        let _wx = ThreadWxEnable::new(WxMode::Exec, thread);
        Ok(f(&self.buffer))
    }

    /// Emitted code, without any mode change.
    pub fn code(&self) -> Result<&[u8], CodeError> {
        self.check_live()?;
        Ok(&self.buffer)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Release the code. Further operations fail with `RegionFreed`.
    pub fn free(&mut self) {
        self.buffer = Vec::new();
        self.freed = true;
    }

    fn check_live(&self) -> Result<(), CodeError> {
        if self.freed {
            Err(CodeError::RegionFreed)
        } else {
            Ok(())
        }
    }
}
