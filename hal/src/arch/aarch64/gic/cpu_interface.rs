//! # GIC CPU Interface (GICC)
//!
//! The CPU Interface is the component that CPUs use to interact with the GIC
//! for interrupt acknowledgment, priority masking, and end-of-interrupt
//! signaling. The block is banked: every CPU sees its own interface at the
//! same address.
//!
//! ## Register Map
//!
//! | Offset    | Register    | Description                               |
//! |-----------|-------------|-------------------------------------------|
//! | 0x0000    | GICC_CTLR   | CPU Interface Control                     |
//! | 0x0004    | GICC_PMR    | Priority Mask                             |
//! | 0x000C    | GICC_IAR    | Interrupt Acknowledge                     |
//! | 0x0010    | GICC_EOIR   | End of Interrupt                          |
//!
//! ## Key Functions
//!
//! - **Acknowledge**: Read interrupt ID and mark as active
//! - **EOI**: Signal end of interrupt processing
//! - **Priority Mask**: Set threshold for interrupt delivery

use super::{mmio::RegisterIo, Priority};

// ============================================================================
// GICC Register Offsets
// ============================================================================

/// GICC Control Register
pub const GICC_CTLR: usize = 0x0000;

/// GICC Priority Mask Register
pub const GICC_PMR: usize = 0x0004;

/// GICC Interrupt Acknowledge Register
pub const GICC_IAR: usize = 0x000C;

/// GICC End of Interrupt Register
pub const GICC_EOIR: usize = 0x0010;

// ============================================================================
// GICC Register Bits
// ============================================================================

/// Signal interrupts to the connected processor
pub const GICC_CTLR_ENABLE: u32 = 1 << 0;

/// Source CPU field of GICC_IAR (SGIs only)
pub const GICC_IAR_CPUID_MASK: u32 = 0x1C00;

/// Interrupt ID field of GICC_IAR
pub const GICC_IAR_ID_MASK: u32 = 0x03FF;

/// First interrupt ID reserved for special values
pub const GICC_IAR_SPECIAL: u32 = 1020;

// ============================================================================
// Acknowledge Value
// ============================================================================

/// Raw GICC_IAR value returned by an acknowledge
///
/// The raw value must be written back on EOI; the interrupt ID alone is not
/// enough for SGIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct IrqStat(pub u32);

impl IrqStat {
    /// True when the acknowledge carried no interrupt
    ///
    /// Decided on the raw value, before the source CPU field is stripped:
    /// an ID field in the special range, or a source field with ID 0.
    /// SGI 0 never carries a message, so `0x400` is read as "nothing
    /// pending" rather than as SGI 0 from CPU 1.
    #[inline]
    pub const fn is_spurious(self) -> bool {
        let id = self.0 & GICC_IAR_ID_MASK;
        id >= GICC_IAR_SPECIAL || (id == 0 && self.0 & GICC_IAR_CPUID_MASK != 0)
    }

    /// Interrupt ID with the source CPU field stripped
    ///
    /// A spurious value is returned unchanged.
    #[inline]
    pub const fn intid(self) -> u32 {
        if self.is_spurious() {
            self.0
        } else {
            self.0 & !GICC_IAR_CPUID_MASK
        }
    }

    /// Raw register value
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

// ============================================================================
// CPU Interface Structure
// ============================================================================

/// Banked GICv2 CPU interface
#[derive(Debug)]
pub struct CpuInterface<R: RegisterIo> {
    regs: R,
}

impl<R: RegisterIo> CpuInterface<R> {
    /// Wrap a CPU interface register block
    #[inline]
    pub const fn new(regs: R) -> Self {
        Self { regs }
    }

    /// Access the underlying register block
    #[inline]
    pub fn regs(&self) -> &R {
        &self.regs
    }

    /// Start signalling interrupts to this CPU
    #[inline]
    pub fn enable(&self) {
        self.regs.write_relaxed(GICC_CTLR, GICC_CTLR_ENABLE);
    }

    /// Stop signalling interrupts to this CPU
    #[inline]
    pub fn disable(&self) {
        self.regs.write_relaxed(GICC_CTLR, 0);
    }

    /// Set priority mask (interrupts with priority >= mask are blocked)
    #[inline]
    pub fn set_priority_mask(&self, priority: Priority) {
        self.regs.write_relaxed(GICC_PMR, priority.value() as u32);
    }

    /// Acknowledge the highest priority pending interrupt
    #[inline]
    pub fn acknowledge(&self) -> IrqStat {
        IrqStat(self.regs.read_relaxed(GICC_IAR))
    }

    /// Signal end of interrupt with the raw acknowledge value
    #[inline]
    pub fn end_of_interrupt(&self, raw: u32) {
        self.regs.write_relaxed(GICC_EOIR, raw);
    }
}
