//! # AArch64 Generic Interrupt Controller (GIC) Framework
//!
//! GICv2 register blocks plus the Axxia multi-cluster controller built on
//! top of them.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                  Axxia GIC Architecture (per cluster)               │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                     │
//! │  Peripherals        GIC Distributor         CPU Interface    Core   │
//! │  ┌─────────┐       ┌──────────────┐        ┌───────────┐   ┌─────┐ │
//! │  │   SPI   │──────▶│              │        │           │──▶│     │ │
//! │  │(32-1019)│       │   Routing    │───────▶│  Priority │   │ CPU │ │
//! │  └─────────┘       │   & State    │        │  & Ack    │   │  0  │ │
//! │                    │              │        └───────────┘   └─────┘ │
//! │  ┌─────────┐       │              │        ┌───────────┐   ┌─────┐ │
//! │  │   PPI   │──────▶│              │───────▶│           │──▶│ CPU │ │
//! │  │ (16-31) │       │              │        │           │   │ 1-3 │ │
//! │  └─────────┘       └──────────────┘        └───────────┘   └─────┘ │
//! │                                                                     │
//! │  Message lines: 16 SPIs (4 lines x 4 cores) replace the SGIs for    │
//! │  inter-CPU signalling, so the SGI range (0-15) is never routed.     │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Interrupt Types
//!
//! | Type | Range     | Scope      | Description                          |
//! |------|-----------|------------|--------------------------------------|
//! | SGI  | 0-15      | Per-CPU    | Software Generated (unused on Axxia) |
//! | PPI  | 16-31     | Per-CPU    | Private Peripheral Interrupts        |
//! | SPI  | 32-1019   | Shared     | Shared Peripheral Interrupts         |

pub mod affinity;
pub mod axxia;
pub mod cpu_interface;
pub mod distributor;
pub mod mmio;

pub use affinity::AffinityTable;
pub use cpu_interface::CpuInterface;
pub use distributor::Distributor;
pub use mmio::{Mmio, RegisterIo};

// ============================================================================
// GIC Constants
// ============================================================================

/// Number of interrupt IDs the GIC can route (0-1019)
pub const MAX_IRQS: u32 = 1020;

/// First SPI interrupt ID
pub const SPI_BASE: u32 = 32;

/// First PPI interrupt ID
pub const PPI_BASE: u32 = 16;

/// Number of SGIs
pub const SGI_COUNT: u32 = 16;

/// Number of interrupts per register (32-bit register, 1 bit per interrupt)
pub const IRQS_PER_ENABLE_REG: u32 = 32;

/// Number of interrupts per priority register (32-bit register, 8 bits per interrupt)
pub const IRQS_PER_PRIORITY_REG: u32 = 4;

/// Number of interrupts per target register (32-bit register, 8 bits per interrupt)
pub const IRQS_PER_TARGET_REG: u32 = 4;

/// Number of interrupts per config register (32-bit register, 2 bits per interrupt)
pub const IRQS_PER_CONFIG_REG: u32 = 16;

/// Special interrupt ID indicating no pending interrupt
pub const INTID_SPURIOUS: u32 = 1023;

// ============================================================================
// Errors
// ============================================================================

/// Interrupt controller operation error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GicError {
    /// IRQ number, trigger type or CPU target out of range
    InvalidParameter,
    /// Operation not implemented by this controller
    NotSupported,
}

impl core::fmt::Display for GicError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            GicError::InvalidParameter => f.write_str("invalid parameter"),
            GicError::NotSupported => f.write_str("operation not supported"),
        }
    }
}

impl From<crate::arch::aarch64::smp::SmpError> for GicError {
    fn from(_: crate::arch::aarch64::smp::SmpError) -> Self {
        GicError::InvalidParameter
    }
}

// ============================================================================
// Interrupt Classes
// ============================================================================

/// SGIs and PPIs live in per-core banked registers and cannot be routed.
#[inline]
pub const fn is_banked(hwirq: u32) -> bool {
    hwirq < SPI_BASE
}

/// ITARGETSR byte selecting core `core` of a cluster
#[inline]
pub const fn target_byte(core: u32) -> u8 {
    1 << (core % 8)
}

// ============================================================================
// Priority and Trigger
// ============================================================================

/// Interrupt priority (0 = highest, 255 = lowest)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Priority(pub u8);

impl Priority {
    /// Priority programmed for every interrupt on Axxia
    pub const AXXIA_DEFAULT: Self = Priority(0xA0);

    /// CPU interface mask letting every Axxia priority through
    pub const AXXIA_MASK: Self = Priority(0xF0);

    /// Get raw priority value
    #[inline]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Same priority replicated into all four bytes of a register
    #[inline]
    pub const fn replicated(self) -> u32 {
        (self.0 as u32) * 0x0101_0101
    }
}

/// Interrupt trigger configuration as stored in GICD_ICFGR
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TriggerMode {
    /// Level-sensitive, active high
    Level = 0,
    /// Rising-edge triggered
    Edge  = 1,
}

bitflags::bitflags! {
    /// Trigger type requested by the generic interrupt layer
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IrqType: u32 {
        /// Rising edge
        const EDGE_RISING = 0x1;
        /// Falling edge
        const EDGE_FALLING = 0x2;
        /// Active-high level
        const LEVEL_HIGH = 0x4;
        /// Active-low level
        const LEVEL_LOW = 0x8;
    }
}

impl IrqType {
    /// Bits of a firmware specifier that carry the trigger type
    pub const SENSE_MASK: u32 = 0xF;
}

impl TryFrom<IrqType> for TriggerMode {
    type Error = GicError;

    /// Only level-high and edge-rising can be expressed in GICD_ICFGR.
    fn try_from(ty: IrqType) -> Result<Self, Self::Error> {
        if ty == IrqType::LEVEL_HIGH {
            Ok(TriggerMode::Level)
        } else if ty == IrqType::EDGE_RISING {
            Ok(TriggerMode::Edge)
        } else {
            Err(GicError::InvalidParameter)
        }
    }
}

// ============================================================================
// Controller Interface
// ============================================================================

/// Register-level controller interface consumed by the generic IRQ layer
///
/// All operations report a status instead of failing the caller, and none of
/// them retry internally.
pub trait IrqChip {
    /// Chip name shown by the generic layer
    const NAME: &'static str;

    /// Stop delivery of an interrupt
    fn mask(&self, hwirq: u32) -> Result<(), GicError>;

    /// Resume delivery of an interrupt
    fn unmask(&self, hwirq: u32) -> Result<(), GicError>;

    /// Signal end of interrupt on the handling CPU
    fn eoi(&self, hwirq: u32) -> Result<(), GicError>;

    /// Change the trigger type of an interrupt
    fn set_type(&self, hwirq: u32, ty: IrqType) -> Result<(), GicError>;

    /// Route an interrupt to one logical CPU
    fn set_affinity(&self, hwirq: u32, cpu: u32) -> Result<(), GicError>;

    /// Re-send an interrupt from hardware
    fn retrigger(&self, hwirq: u32) -> Result<(), GicError>;

    /// Configure an interrupt as a wakeup source
    fn set_wake(&self, hwirq: u32, on: bool) -> Result<(), GicError>;
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Calculate the register offset for a given interrupt ID
/// For registers with 1 bit per interrupt (enable, pending, active)
#[inline]
pub const fn bit_reg_offset(intid: u32) -> (usize, u32) {
    let reg_index = (intid / 32) as usize;
    let bit_index = intid % 32;
    (reg_index, bit_index)
}

/// Calculate the register offset for a given interrupt ID
/// For registers with 8 bits per interrupt (priority, targets)
#[inline]
pub const fn byte_reg_offset(intid: u32) -> (usize, u32) {
    let reg_index = (intid / 4) as usize;
    let byte_offset = (intid % 4) * 8;
    (reg_index, byte_offset)
}

/// Calculate the register offset for configuration registers
/// 2 bits per interrupt
#[inline]
pub const fn config_reg_offset(intid: u32) -> (usize, u32) {
    let reg_index = (intid / 16) as usize;
    let bit_offset = (intid % 16) * 2;
    (reg_index, bit_offset)
}

/// Number of `per_reg`-sized registers needed to cover `irqs` interrupts
#[inline]
pub const fn regs_for(irqs: u32, per_reg: u32) -> usize {
    irqs.div_ceil(per_reg) as usize
}
