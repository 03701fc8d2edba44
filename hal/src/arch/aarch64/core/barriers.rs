//! # Memory Barriers
//!
//! Thin wrappers over `DMB SY` / `DSB SY`. On non-AArch64 hosts (unit tests)
//! they degrade to a sequentially consistent atomic fence.

#[cfg(target_arch = "aarch64")]
use core::arch::asm;

/// Data Memory Barrier (DMB SY)
///
/// Orders memory accesses before the barrier against those after it.
#[inline]
pub fn dmb() {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        asm!("dmb sy", options(nostack, preserves_flags));
    }

    #[cfg(not(target_arch = "aarch64"))]
    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
}

/// Data Synchronization Barrier (DSB SY)
///
/// Completes every outstanding memory access before the next instruction
/// executes. Used before raising a message so the receiver observes all
/// stores made ahead of the signal.
#[inline]
pub fn dsb() {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        asm!("dsb sy", options(nostack, preserves_flags));
    }

    #[cfg(not(target_arch = "aarch64"))]
    core::sync::atomic::fence(core::sync::atomic::Ordering::SeqCst);
}
