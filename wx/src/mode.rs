//! Thread W^X access mode.

use core::fmt;

/// Access mode a thread holds for code memory.
///
/// On targets that enforce W^X per thread the two modes are mutually
/// exclusive. On barrier-only targets the mode is the logical intent of the
/// scope; nothing is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WxMode {
    /// Code pages are writable, not executable.
    Write,
    /// Code pages are executable, not writable.
    Exec,
}

impl fmt::Display for WxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WxMode::Write => f.write_str("write"),
            WxMode::Exec => f.write_str("exec"),
        }
    }
}
