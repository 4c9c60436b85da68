//! KPIO W^X Safety Verification
//!
//! Checks that the JIT's W^X guard restores thread state on every path and
//! that code written under it can be handed to another thread.

#![cfg_attr(not(any(test, feature = "std")), no_std)]
extern crate alloc;

use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use spin::Mutex;

use kpio_wx::strategy::DelegatedWxEnable;
use kpio_wx::{CodeBuffer, ThreadWxEnable, WxMode, WxThread, WxToggle};

/// Safety check result
#[derive(Debug, Clone)]
pub enum SafetyResult {
    /// Check passed
    Pass,
    /// Check failed with error
    Fail(String),
}

impl SafetyResult {
    pub fn passed(&self) -> bool {
        matches!(self, SafetyResult::Pass)
    }
}

/// Safety check trait
pub trait SafetyCheck {
    fn name(&self) -> &str;
    fn run(&mut self) -> SafetyResult;
}

fn attached_thread() -> WxThread {
    let thread = WxThread::untracked();
    thread.init_wx();
    thread
}

/// Delegated guard restores every prior mode
pub struct RestoreCheck;

impl SafetyCheck for RestoreCheck {
    fn name(&self) -> &str {
        "wx_restore"
    }

    fn run(&mut self) -> SafetyResult {
        for prior in [WxMode::Write, WxMode::Exec] {
            for requested in [WxMode::Write, WxMode::Exec] {
                let thread = attached_thread();
                thread.enable_wx(prior);
                {
                    let wx = DelegatedWxEnable::new(requested, Some(&thread));
                    if wx.previous_mode() != prior {
                        return SafetyResult::Fail(format!(
                            "previous mode {} recorded, expected {}",
                            wx.previous_mode(),
                            prior
                        ));
                    }
                    if thread.wx_state() != Some(requested) {
                        return SafetyResult::Fail(String::from("Mode not entered"));
                    }
                }
                if thread.wx_state() != Some(prior) {
                    return SafetyResult::Fail(format!(
                        "{} -> {} scope left thread in {:?}",
                        prior,
                        requested,
                        thread.wx_state()
                    ));
                }
            }
        }
        SafetyResult::Pass
    }
}

/// Nested guards of the active strategy unwind to the outer mode
pub struct NestingCheck;

impl SafetyCheck for NestingCheck {
    fn name(&self) -> &str {
        "wx_nesting"
    }

    fn run(&mut self) -> SafetyResult {
        let thread = attached_thread();
        for depth in 1..=8 {
            let mut guards = Vec::with_capacity(depth);
            for level in 0..depth {
                let mode = if level % 2 == 0 {
                    WxMode::Exec
                } else {
                    WxMode::Write
                };
                guards.push(ThreadWxEnable::new(mode, Some(&thread)));
            }
            // Innermost first
            while let Some(guard) = guards.pop() {
                drop(guard);
            }
            if thread.check_wx_state(WxMode::Write).is_err() {
                return SafetyResult::Fail(format!("Depth {} left thread in exec", depth));
            }
        }
        SafetyResult::Pass
    }
}

/// Guard without a thread never touches thread state
pub struct UntrackedGuardCheck;

impl SafetyCheck for UntrackedGuardCheck {
    fn name(&self) -> &str {
        "wx_untracked"
    }

    fn run(&mut self) -> SafetyResult {
        let thread = attached_thread();
        let before = thread.transitions();
        for mode in [WxMode::Write, WxMode::Exec] {
            let _wx = ThreadWxEnable::new(mode, None);
        }
        if thread.transitions() != before {
            return SafetyResult::Fail(String::from("Untracked guard changed thread"));
        }
        SafetyResult::Pass
    }
}

/// Emit, patch and run through the code buffer
pub struct CodeBufferCheck;

impl SafetyCheck for CodeBufferCheck {
    fn name(&self) -> &str {
        "code_buffer"
    }

    fn run(&mut self) -> SafetyResult {
        let thread = attached_thread();
        let mut code = CodeBuffer::new(256);

        // mov eax, imm32; ret
        let offset = match code.emit(Some(&thread), &[0xB8, 0, 0, 0, 0, 0xC3]) {
            Ok(offset) => offset,
            Err(e) => return SafetyResult::Fail(format!("emit: {}", e)),
        };
        if let Err(e) = code.patch(Some(&thread), offset + 1, &42u32.to_le_bytes()) {
            return SafetyResult::Fail(format!("patch: {}", e));
        }

        let imm = code.execute(Some(&thread), |bytes| {
            u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]])
        });
        if imm != Ok(42) {
            return SafetyResult::Fail(format!("Read back {:?}", imm));
        }
        if thread.check_wx_state(WxMode::Write).is_err() {
            return SafetyResult::Fail(String::from("Thread left in exec"));
        }
        SafetyResult::Pass
    }
}

/// Code shared behind a lock is only run after the writer's scope closed
pub struct SharedCodeCheck;

impl SafetyCheck for SharedCodeCheck {
    fn name(&self) -> &str {
        "shared_code"
    }

    fn run(&mut self) -> SafetyResult {
        let shared = Arc::new(Mutex::new(CodeBuffer::new(64)));

        let writer = attached_thread();
        {
            let mut code = shared.lock();
            if code.emit(Some(&writer), &[0x90, 0xC3]).is_err() {
                return SafetyResult::Fail(String::from("emit failed"));
            }
        }

        let reader = attached_thread();
        let code = shared.lock();
        match code.execute(Some(&reader), |bytes| bytes.to_vec()) {
            Ok(bytes) if bytes == vec![0x90, 0xC3] => SafetyResult::Pass,
            other => SafetyResult::Fail(format!("Reader saw {:?}", other)),
        }
    }
}

/// Writer thread publishes code, reader thread runs it
#[cfg(any(test, feature = "std"))]
pub struct PublishCheck;

#[cfg(any(test, feature = "std"))]
impl SafetyCheck for PublishCheck {
    fn name(&self) -> &str {
        "cross_thread_publish"
    }

    fn run(&mut self) -> SafetyResult {
        use core::sync::atomic::{AtomicBool, Ordering};

        let shared = Arc::new(Mutex::new(CodeBuffer::new(64)));
        let published = Arc::new(AtomicBool::new(false));

        let reader = {
            let shared = Arc::clone(&shared);
            let published = Arc::clone(&published);
            std::thread::spawn(move || {
                let thread = attached_thread();
                while !published.load(Ordering::Acquire) {
                    core::hint::spin_loop();
                }
                let code = shared.lock();
                code.execute(Some(&thread), |bytes| bytes.to_vec())
            })
        };

        let writer = {
            let shared = Arc::clone(&shared);
            let published = Arc::clone(&published);
            std::thread::spawn(move || {
                let thread = attached_thread();
                let emitted = shared.lock().emit(Some(&thread), &[0x31, 0xC0, 0xC3]);
                // Publish only once the write scope has closed
                published.store(true, Ordering::Release);
                emitted
            })
        };

        match (writer.join(), reader.join()) {
            (Ok(Ok(_)), Ok(Ok(bytes))) if bytes == vec![0x31, 0xC0, 0xC3] => SafetyResult::Pass,
            (Ok(Err(e)), _) => SafetyResult::Fail(format!("writer: {}", e)),
            (_, Ok(Err(e))) => SafetyResult::Fail(format!("reader: {}", e)),
            (Ok(Ok(_)), Ok(Ok(bytes))) => SafetyResult::Fail(format!("Reader saw {:?}", bytes)),
            _ => SafetyResult::Fail(String::from("thread panicked")),
        }
    }
}

/// Run all safety tests
pub fn run_all_tests() -> Vec<(String, SafetyResult)> {
    let mut results = Vec::new();

    let mut tests: Vec<Box<dyn SafetyCheck>> = vec![
        Box::new(RestoreCheck),
        Box::new(NestingCheck),
        Box::new(UntrackedGuardCheck),
        Box::new(CodeBufferCheck),
        Box::new(SharedCodeCheck),
    ];
    #[cfg(any(test, feature = "std"))]
    tests.push(Box::new(PublishCheck));

    for test in tests.iter_mut() {
        let result = test.run();
        results.push((String::from(test.name()), result));
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_checks_pass() {
        let results = run_all_tests();
        assert_eq!(results.len(), 6);
        for (name, result) in &results {
            assert!(result.passed(), "{} failed: {:?}", name, result);
        }
    }

    #[test]
    fn test_publish_check() {
        assert!(PublishCheck.run().passed());
    }
}
