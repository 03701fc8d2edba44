//! # Register Access
//!
//! Every GIC block (distributor, CPU interface, message-line windows) is
//! reached through [`RegisterIo`], which keeps the register layout code free
//! of raw pointers. [`Mmio`] is the hardware implementation.
//!
//! Offsets are in bytes from the start of the block. 32-bit accesses must be
//! 4-byte aligned.

use crate::arch::aarch64::core::barriers::{dmb, dsb};
use core::ptr::{read_volatile, write_volatile};

/// Access to one memory-mapped register block
pub trait RegisterIo: Send + Sync {
    /// Read a 32-bit register without ordering guarantees
    fn read_relaxed(&self, offset: usize) -> u32;

    /// Write a 32-bit register without ordering guarantees
    fn write_relaxed(&self, offset: usize, value: u32);

    /// Write a single byte register lane
    fn write_byte_relaxed(&self, offset: usize, value: u8);

    /// Read a register, ordered before any later memory access
    #[inline]
    fn read(&self, offset: usize) -> u32 {
        let value = self.read_relaxed(offset);
        dmb();
        value
    }

    /// Write a register, ordered after every earlier memory access
    #[inline]
    fn write(&self, offset: usize, value: u32) {
        dmb();
        self.write_relaxed(offset, value);
    }

    /// Write a register after all earlier memory accesses have completed
    ///
    /// Used for doorbell writes that another CPU reacts to.
    #[inline]
    fn write_synced(&self, offset: usize, value: u32) {
        dsb();
        self.write_relaxed(offset, value);
    }
}

impl<T: RegisterIo + ?Sized> RegisterIo for &T {
    #[inline]
    fn read_relaxed(&self, offset: usize) -> u32 {
        (**self).read_relaxed(offset)
    }

    #[inline]
    fn write_relaxed(&self, offset: usize, value: u32) {
        (**self).write_relaxed(offset, value);
    }

    #[inline]
    fn write_byte_relaxed(&self, offset: usize, value: u8) {
        (**self).write_byte_relaxed(offset, value);
    }
}

/// Memory-mapped register block
#[derive(Debug, Clone, Copy)]
pub struct Mmio {
    base: *mut u8,
}

// SAFETY: device registers are shared by all CPUs; accesses are volatile
// and serialized by the callers' locks where ordering matters.
unsafe impl Send for Mmio {}
unsafe impl Sync for Mmio {}

impl Mmio {
    /// Create a register block from its mapped base address
    ///
    /// # Safety
    ///
    /// `base` must be a valid, mapped, device-memory address for the whole
    /// register block and stay mapped for the lifetime of the value.
    #[inline]
    pub const unsafe fn new(base: *mut u8) -> Self {
        Self { base }
    }
}

impl RegisterIo for Mmio {
    #[inline]
    fn read_relaxed(&self, offset: usize) -> u32 {
        debug_assert!(offset % 4 == 0);
        // SAFETY: `new` guarantees the block is mapped.
        unsafe { read_volatile(self.base.add(offset) as *const u32) }
    }

    #[inline]
    fn write_relaxed(&self, offset: usize, value: u32) {
        debug_assert!(offset % 4 == 0);
        // SAFETY: `new` guarantees the block is mapped.
        unsafe { write_volatile(self.base.add(offset) as *mut u32, value) }
    }

    #[inline]
    fn write_byte_relaxed(&self, offset: usize, value: u8) {
        // SAFETY: `new` guarantees the block is mapped.
        unsafe { write_volatile(self.base.add(offset), value) }
    }
}
